//! User session lifecycle on top of a [`SessionStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgewatch_core::security::Session;
use forgewatch_db::store::SessionStore;
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;

/// How often expired sessions are deactivated.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Session, MonitorError> {
        let session = Session::new(user_id, ip_address, user_agent, Utc::now());
        self.store.insert_session(&session).await?;
        tracing::info!(user_id, session_id = %session.id, "Session created");
        Ok(session)
    }

    /// The session for `token` if it is active and unexpired.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, MonitorError> {
        Ok(self.store.find_valid(token, Utc::now()).await?)
    }

    pub async fn touch(&self, token: &str) -> Result<bool, MonitorError> {
        Ok(self.store.touch(token, Utc::now()).await?)
    }

    /// End one session. With `user_id` set the session must belong to that
    /// user.
    pub async fn terminate(&self, token: &str, user_id: Option<&str>) -> Result<bool, MonitorError> {
        let terminated = self.store.deactivate(token, user_id).await?;
        if terminated {
            tracing::info!(user_id, "Session terminated");
        }
        Ok(terminated)
    }

    /// End every session of `user_id` except `keep_token`.
    pub async fn terminate_all(
        &self,
        user_id: &str,
        keep_token: Option<&str>,
    ) -> Result<u64, MonitorError> {
        let count = self.store.deactivate_all(user_id, keep_token).await?;
        tracing::info!(user_id, count, "Sessions terminated");
        Ok(count)
    }

    /// Every session of `user_id`, most recently active first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, MonitorError> {
        Ok(self.store.list_for_user(user_id, None, None).await?)
    }

    pub async fn active_sessions(&self, user_id: &str) -> Result<Vec<Session>, MonitorError> {
        Ok(self
            .store
            .list_for_user(user_id, Some(Utc::now()), None)
            .await?)
    }

    /// Keep at most `max` valid sessions, terminating the least recently
    /// active ones. Returns how many were terminated.
    pub async fn enforce_limit(&self, user_id: &str, max: usize) -> Result<usize, MonitorError> {
        let active = self.active_sessions(user_id).await?;
        let mut terminated = 0;
        for session in active.iter().skip(max) {
            if self.store.deactivate(&session.session_token, Some(user_id)).await? {
                terminated += 1;
            }
        }
        if terminated > 0 {
            tracing::info!(user_id, terminated, max, "Session limit enforced");
        }
        Ok(terminated)
    }

    pub async fn cleanup_expired(&self) -> Result<u64, MonitorError> {
        Ok(self.store.deactivate_expired(Utc::now()).await?)
    }

    pub async fn run_cleanup(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = CLEANUP_INTERVAL.as_secs(),
            "Session cleanup job started"
        );

        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session cleanup job stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.cleanup_expired().await {
                        Ok(count) if count > 0 => {
                            tracing::info!(count, "Session cleanup: deactivated expired sessions");
                        }
                        Ok(_) => tracing::debug!("Session cleanup: nothing expired"),
                        Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
