//! Session registry: active station WebSocket connections
//!
//! Keyed by (tenant, charge box). A reconnect evicts the previous session;
//! reconnects inside the debounce window are rejected to keep flapping
//! stations from thrashing the registry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::OcppVersion;

use super::connection::{Connection, EvictedSession};

/// Minimum interval between reconnections from the same station (seconds).
const RECONNECT_DEBOUNCE_SECS: i64 = 2;

/// Outcome of a registration attempt
pub enum RegisterResult {
    /// Fresh connection
    New { connection_id: u64 },
    /// Replaced an existing session (old sender was dropped)
    Evicted {
        evicted: EvictedSession,
        connection_id: u64,
    },
    /// Rejected because the station reconnected too quickly
    Debounced { seconds_remaining: i64 },
}

/// Thread-safe registry of active OCPP station sessions
pub struct SessionRegistry {
    sessions: DashMap<(String, String), Connection>,
    last_disconnect: DashMap<(String, String), DateTime<Utc>>,
    next_connection_id: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            last_disconnect: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    pub fn register(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
    ) -> RegisterResult {
        let key = (tenant_id.to_string(), charge_box_id.to_string());

        if let Some(last_dc) = self.last_disconnect.get(&key) {
            let elapsed = Utc::now().signed_duration_since(*last_dc).num_seconds();
            if elapsed < RECONNECT_DEBOUNCE_SECS {
                warn!(
                    charge_box_id,
                    elapsed_seconds = elapsed,
                    "Reconnection too fast, debouncing"
                );
                return RegisterResult::Debounced {
                    seconds_remaining: RECONNECT_DEBOUNCE_SECS - elapsed,
                };
            }
        }

        // Dropping the old sender closes its channel; the old write task exits
        let evicted = self.sessions.remove(&key).map(|(_, old)| {
            warn!(
                charge_box_id,
                connected_since = %old.connected_at,
                "Evicting stale session, new connection replaces old"
            );
            EvictedSession {
                tenant_id: old.tenant_id,
                charge_box_id: old.charge_box_id,
                connected_at: old.connected_at,
                last_activity: old.last_activity,
            }
        });

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        info!(charge_box_id, %ocpp_version, connection_id, "Registering station session");
        self.sessions.insert(
            key.clone(),
            Connection::new(connection_id, tenant_id, charge_box_id, sender, ocpp_version),
        );
        self.last_disconnect.remove(&key);

        metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);

        match evicted {
            Some(evicted) => RegisterResult::Evicted {
                evicted,
                connection_id,
            },
            None => RegisterResult::New { connection_id },
        }
    }

    /// Only removes the session when `connection_id` matches, so a stale
    /// connection's cleanup cannot remove its replacement.
    pub fn unregister(&self, tenant_id: &str, charge_box_id: &str, connection_id: u64) {
        let key = (tenant_id.to_string(), charge_box_id.to_string());
        let removed = self
            .sessions
            .remove_if(&key, |_, conn| conn.connection_id == connection_id);
        if removed.is_some() {
            self.last_disconnect.insert(key, Utc::now());
            metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
            info!(charge_box_id, connection_id, "Unregistered station session");
        }
    }

    pub fn send_to(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        message: String,
    ) -> Result<(), String> {
        let key = (tenant_id.to_string(), charge_box_id.to_string());
        match self.sessions.get(&key) {
            Some(conn) => conn.send(message),
            None => Err(format!("Station {charge_box_id} not connected")),
        }
    }

    pub fn touch(&self, tenant_id: &str, charge_box_id: &str) {
        let key = (tenant_id.to_string(), charge_box_id.to_string());
        if let Some(mut conn) = self.sessions.get_mut(&key) {
            conn.touch();
        }
    }

    pub fn is_connected(&self, tenant_id: &str, charge_box_id: &str) -> bool {
        self.sessions
            .contains_key(&(tenant_id.to_string(), charge_box_id.to_string()))
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> mpsc::UnboundedSender<String> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[test]
    fn register_new_session() {
        let registry = SessionRegistry::new();
        let result = registry.register("t1", "CS-001", make_sender(), OcppVersion::V16);
        assert!(matches!(result, RegisterResult::New { .. }));
        assert!(registry.is_connected("t1", "CS-001"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn register_evicts_existing_session() {
        let registry = SessionRegistry::new();
        registry.register("t1", "CS-001", make_sender(), OcppVersion::V16);
        let result = registry.register("t1", "CS-001", make_sender(), OcppVersion::V16);
        assert!(matches!(result, RegisterResult::Evicted { .. }));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn same_id_in_other_tenant_is_separate() {
        let registry = SessionRegistry::new();
        registry.register("t1", "CS-001", make_sender(), OcppVersion::V16);
        let result = registry.register("t2", "CS-001", make_sender(), OcppVersion::V16);
        assert!(matches!(result, RegisterResult::New { .. }));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn debounce_rejects_fast_reconnect() {
        let registry = SessionRegistry::new();
        let connection_id = match registry.register("t1", "CS-001", make_sender(), OcppVersion::V16)
        {
            RegisterResult::New { connection_id } => connection_id,
            _ => panic!("expected New"),
        };
        registry.unregister("t1", "CS-001", connection_id);

        let result = registry.register("t1", "CS-001", make_sender(), OcppVersion::V16);
        assert!(matches!(result, RegisterResult::Debounced { .. }));
    }

    #[test]
    fn stale_cleanup_does_not_remove_new_session() {
        let registry = SessionRegistry::new();
        let old_id = match registry.register("t1", "CS-001", make_sender(), OcppVersion::V16) {
            RegisterResult::New { connection_id } => connection_id,
            _ => panic!("expected New"),
        };
        let new_id = match registry.register("t1", "CS-001", make_sender(), OcppVersion::V16) {
            RegisterResult::Evicted { connection_id, .. } => connection_id,
            _ => panic!("expected Evicted"),
        };

        registry.unregister("t1", "CS-001", old_id);
        assert!(registry.is_connected("t1", "CS-001"));

        registry.unregister("t1", "CS-001", new_id);
        assert!(!registry.is_connected("t1", "CS-001"));
    }

    #[test]
    fn send_to_connected_station() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("t1", "CS-001", tx, OcppVersion::V16);

        registry.send_to("t1", "CS-001", "hello".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert!(registry.send_to("t1", "CS-404", "x".into()).is_err());
    }
}
