//! Request extractors enforcing operator authentication.

pub mod admin;
