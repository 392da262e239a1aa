//! CSRF token issuing and verification bound to a session id.

use chrono::Utc;
use forgewatch_core::csrf;

pub struct CsrfProtection {
    secret: Vec<u8>,
}

impl CsrfProtection {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue(&self, session_id: &str) -> String {
        csrf::issue_token(&self.secret, session_id, Utc::now())
    }

    pub fn verify(&self, session_id: &str, token: &str) -> bool {
        let valid = csrf::verify_token(&self.secret, session_id, token, Utc::now());
        if !valid {
            tracing::warn!(session_id, "CSRF token rejected");
        }
        valid
    }

    /// Whether requests with `method` must present a token.
    pub fn requires_token(method: &str) -> bool {
        csrf::requires_token(method)
    }
}
