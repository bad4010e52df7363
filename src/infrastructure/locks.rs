//! In-memory lock service
//!
//! Named per-aggregate exclusivity with TTL expiry. Single-process only; a
//! clustered deployment replaces this with the distributed locking service
//! behind the same trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::{LockHandle, LockService};

struct Held {
    token: Uuid,
    expires_at: Instant,
}

/// Process-local lock table
#[derive(Default)]
pub struct InMemoryLockService {
    locks: DashMap<(String, String), Held>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, tenant_id: &str, name: &str, ttl: Duration) -> Option<LockHandle> {
        let key = (tenant_id.to_string(), name.to_string());
        let token = Uuid::new_v4();
        let now = Instant::now();

        let mut acquired = false;
        let mut entry = self.locks.entry(key).or_insert_with(|| {
            acquired = true;
            Held {
                token,
                expires_at: now + ttl,
            }
        });
        // An expired holder is displaced
        if !acquired && entry.expires_at <= now {
            acquired = true;
            *entry.value_mut() = Held {
                token,
                expires_at: now + ttl,
            };
        }
        drop(entry);

        if acquired {
            debug!(tenant_id, name, "Lock acquired");
            Some(LockHandle {
                tenant_id: tenant_id.to_string(),
                name: name.to_string(),
                token,
            })
        } else {
            None
        }
    }

    async fn release(&self, handle: LockHandle) {
        let key = (handle.tenant_id.clone(), handle.name.clone());
        let removed = self
            .locks
            .remove_if(&key, |_, held| held.token == handle.token);
        if removed.is_some() {
            debug!(
                tenant_id = handle.tenant_id.as_str(),
                name = handle.name.as_str(),
                "Lock released"
            );
        }
    }
}
