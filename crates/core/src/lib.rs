//! Pure domain logic for forgewatch: audit hash chains, run verdicts and
//! statistics, anomaly rules, incident lifecycle, alert routing config and
//! the auth-side anomaly rule engine.
//!
//! Nothing in this crate performs I/O. Stateful services live in
//! `forgewatch-monitor`; persistence lives in `forgewatch-db`.

pub mod alerting;
pub mod anomaly;
pub mod audit;
pub mod csrf;
pub mod error;
pub mod hashing;
pub mod incident;
pub mod run_log;
pub mod security;
pub mod types;
