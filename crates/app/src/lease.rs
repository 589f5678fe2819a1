use uuid::Uuid;

use crate::cache::UsageCache;

/// Decides each cycle whether this process is the collecting leader.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    instance_id: String,
    ttl_ms: i64,
    is_leader: bool,
}

impl LeaseManager {
    /// A manager with a fresh random instance id.
    pub fn new(ttl_ms: i64) -> Self {
        Self::with_instance_id(format!("tokentop-{}", Uuid::new_v4()), ttl_ms)
    }

    pub fn with_instance_id(instance_id: impl Into<String>, ttl_ms: i64) -> Self {
        Self {
            instance_id: instance_id.into(),
            ttl_ms,
            is_leader: false,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Leadership as of the last [`LeaseManager::try_acquire`].
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Takes or renews the lease. A storage error counts as success:
    /// duplicate ingestion is idempotent, a stalled collector is not.
    pub fn try_acquire(&mut self, cache: &mut UsageCache, now_ms: i64) -> bool {
        let leader = match cache.try_acquire_lease(&self.instance_id, now_ms, self.ttl_ms) {
            Ok(acquired) => acquired,
            Err(err) => {
                tracing::warn!(
                    holder = %self.instance_id,
                    error = %err,
                    "lease check failed, collecting anyway"
                );
                true
            }
        };
        if leader != self.is_leader {
            tracing::info!(holder = %self.instance_id, leader, "leadership changed");
        }
        self.is_leader = leader;
        leader
    }

    /// Best-effort release on shutdown so another instance can take over
    /// without waiting out the TTL.
    pub fn release(&mut self, cache: &mut UsageCache) {
        match cache.release_lease(&self.instance_id) {
            Ok(true) => tracing::info!(holder = %self.instance_id, "lease released"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(holder = %self.instance_id, error = %err, "lease release failed");
            }
        }
        self.is_leader = false;
    }
}
