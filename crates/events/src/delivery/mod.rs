//! Outbound delivery channels used by the alert system.

pub mod email;
pub mod slack;
pub mod webhook;
