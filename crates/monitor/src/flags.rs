//! Process-wide and persisted runtime flags.
//!
//! Three switches gate agents: the `AGENTS_ENABLED` environment toggle
//! fixed at startup, an in-process toggle flipped by the kill-switch, and
//! the shared `agents_enabled` configuration flag that is persisted so other
//! processes observe it. Agents run only while all three are set; neither the
//! store nor an operator can override the environment toggle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use forgewatch_db::store::RuntimeFlagStore;
use forgewatch_db::StoreError;
use tokio::sync::Mutex;

pub const AGENTS_ENABLED: &str = "agents_enabled";
pub const DEGRADE_TO_SIMULATION: &str = "degrade_to_simulation";

pub struct RuntimeFlags {
    env_enabled: bool,
    process_enabled: AtomicBool,
    config_enabled: AtomicBool,
    degraded: AtomicBool,
    /// Serializes degradation swaps with their persist step.
    degrade_lock: Mutex<()>,
    store: Arc<dyn RuntimeFlagStore>,
}

impl RuntimeFlags {
    /// `env_enabled` is the environment toggle and never changes afterwards.
    pub fn new(store: Arc<dyn RuntimeFlagStore>, env_enabled: bool) -> Self {
        Self {
            env_enabled,
            process_enabled: AtomicBool::new(true),
            config_enabled: AtomicBool::new(true),
            degraded: AtomicBool::new(false),
            degrade_lock: Mutex::new(()),
            store,
        }
    }

    pub fn env_enabled(&self) -> bool {
        self.env_enabled
    }

    /// Adopt previously persisted values, if any.
    pub async fn load(&self) -> Result<(), StoreError> {
        if let Some(enabled) = self.store.get_flag(AGENTS_ENABLED).await? {
            self.config_enabled.store(enabled, Ordering::SeqCst);
        }
        if let Some(degraded) = self.store.get_flag(DEGRADE_TO_SIMULATION).await? {
            self.degraded.store(degraded, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn agents_enabled(&self) -> bool {
        self.env_enabled
            && self.process_enabled.load(Ordering::SeqCst)
            && self.config_enabled.load(Ordering::SeqCst)
    }

    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Turn agents off in this process and in the shared configuration.
    pub async fn disable_agents(&self) {
        self.process_enabled.store(false, Ordering::SeqCst);
        self.config_enabled.store(false, Ordering::SeqCst);
        self.persist(AGENTS_ENABLED, false).await;
    }

    /// Turn agents back on in this process and in the shared configuration.
    /// Agents stay off while the environment toggle is false.
    pub async fn enable_agents(&self) {
        self.process_enabled.store(true, Ordering::SeqCst);
        self.config_enabled.store(true, Ordering::SeqCst);
        self.persist(AGENTS_ENABLED, true).await;
    }

    /// Set the degradation flag. Returns `false` if it already had `value`.
    pub async fn set_degraded(&self, value: bool) -> bool {
        let _guard = self.degrade_lock.lock().await;
        if self
            .degraded
            .compare_exchange(!value, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.persist(DEGRADE_TO_SIMULATION, value).await;
        true
    }

    async fn persist(&self, flag: &str, value: bool) {
        if let Err(e) = self.store.set_flag(flag, value).await {
            tracing::error!(error = %e, flag, value, "Failed to persist runtime flag");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use forgewatch_db::MemoryStore;

    #[tokio::test]
    async fn kill_switch_clears_both_flags_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let flags = RuntimeFlags::new(store.clone(), true);
        assert!(flags.agents_enabled());

        flags.disable_agents().await;
        assert!(!flags.agents_enabled());
        assert_eq!(store.get_flag(AGENTS_ENABLED).await.unwrap(), Some(false));

        flags.enable_agents().await;
        assert!(flags.agents_enabled());
        assert_eq!(store.get_flag(AGENTS_ENABLED).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn environment_toggle_alone_disables_agents() {
        let flags = RuntimeFlags::new(Arc::new(MemoryStore::new()), false);
        assert!(!flags.agents_enabled());
        assert!(!flags.env_enabled());
    }

    #[tokio::test]
    async fn persisted_flag_cannot_override_environment_toggle() {
        let store = Arc::new(MemoryStore::new());
        store.set_flag(AGENTS_ENABLED, true).await.unwrap();

        let flags = RuntimeFlags::new(store.clone(), false);
        flags.load().await.unwrap();
        assert!(!flags.agents_enabled());

        flags.enable_agents().await;
        assert!(!flags.agents_enabled());
        assert_eq!(store.get_flag(AGENTS_ENABLED).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn concurrent_degradation_toggles_leave_store_consistent() {
        let store = Arc::new(MemoryStore::new());
        let flags = Arc::new(RuntimeFlags::new(store.clone(), true));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let flags = flags.clone();
                tokio::spawn(async move { flags.set_degraded(i % 2 == 0).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let persisted = store
            .get_flag(DEGRADE_TO_SIMULATION)
            .await
            .unwrap()
            .unwrap_or(false);
        assert_eq!(persisted, flags.degraded());
    }

    #[tokio::test]
    async fn degradation_toggle_is_idempotent() {
        let flags = RuntimeFlags::new(Arc::new(MemoryStore::new()), true);
        assert!(flags.set_degraded(true).await);
        assert!(!flags.set_degraded(true).await);
        assert!(flags.degraded());
        assert!(flags.set_degraded(false).await);
        assert!(!flags.set_degraded(false).await);
    }

    #[tokio::test]
    async fn load_adopts_persisted_values() {
        let store = Arc::new(MemoryStore::new());
        store.set_flag(AGENTS_ENABLED, false).await.unwrap();
        store.set_flag(DEGRADE_TO_SIMULATION, true).await.unwrap();

        let flags = RuntimeFlags::new(store, true);
        flags.load().await.unwrap();
        assert!(!flags.agents_enabled());
        assert!(flags.degraded());
    }
}
