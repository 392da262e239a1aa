//! Auth-side security pipeline: rule-based anomaly detection over
//! authentication events, session management, rate limiting and CSRF
//! tokens.

pub mod csrf;
pub mod detector;
pub mod rate_limit;
pub mod sessions;

pub use csrf::CsrfProtection;
pub use detector::AnomalyDetector;
pub use rate_limit::RateLimiter;
pub use sessions::SessionManager;
