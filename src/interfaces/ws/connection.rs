//! WebSocket connection abstraction

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::OcppVersion;

/// An active WebSocket connection from a charging station
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection instance
    pub connection_id: u64,
    pub tenant_id: String,
    pub charge_box_id: String,
    /// Channel to the connection's write task
    pub sender: mpsc::UnboundedSender<String>,
    pub ocpp_version: OcppVersion,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Info returned when an existing session is evicted by a new connection
#[derive(Debug)]
pub struct EvictedSession {
    pub tenant_id: String,
    pub charge_box_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        connection_id: u64,
        tenant_id: impl Into<String>,
        charge_box_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            tenant_id: tenant_id.into(),
            charge_box_id: charge_box_id.into(),
            sender,
            ocpp_version,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Send a raw frame to the station
    pub fn send(&self, message: String) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|e| format!("Failed to send message: {}", e))
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_delivers_to_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::new(1, "t1", "CS-001", tx, OcppVersion::V16);
        connection.send("[2,\"a\",\"Heartbeat\",{}]".into()).unwrap();
        assert!(rx.try_recv().unwrap().contains("Heartbeat"));
    }

    #[test]
    fn send_after_receiver_drop_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let connection = Connection::new(1, "t1", "CS-001", tx, OcppVersion::V16);
        assert!(connection.send("x".into()).is_err());
    }
}
