//! Central-system-to-station command transport
//!
//! Sends `[2, id, action, payload]` frames through the session registry and
//! correlates CallResult/CallError frames back to the pending request. This
//! is the concrete `StationCommandPort` the post-boot configuration push and
//! remote stops go through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::ports::StationCommandPort;
use crate::domain::{DomainError, DomainResult};
use crate::support::ocpp_frame::OcppFrame;

use super::registry::SharedSessionRegistry;

const RESPONSE_TIMEOUT_SECS: u64 = 30;

struct PendingRequest {
    action: String,
    response_sender: oneshot::Sender<DomainResult<Value>>,
}

/// Command sender over the WebSocket sessions
pub struct CommandSender {
    registry: SharedSessionRegistry,
    pending: DashMap<(String, String, String), PendingRequest>,
    message_counter: AtomicU64,
}

/// Shared, reference-counted command sender
pub type SharedCommandSender = Arc<CommandSender>;

impl CommandSender {
    pub fn new(registry: SharedSessionRegistry) -> Self {
        Self {
            registry,
            pending: DashMap::new(),
            message_counter: AtomicU64::new(1),
        }
    }

    pub fn shared(registry: SharedSessionRegistry) -> SharedCommandSender {
        Arc::new(Self::new(registry))
    }

    fn next_message_id(&self) -> String {
        format!("CS-{}", self.message_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Route an inbound CallResult to its waiting command.
    pub fn handle_response(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        message_id: &str,
        payload: Value,
    ) {
        let key = (
            tenant_id.to_string(),
            charge_box_id.to_string(),
            message_id.to_string(),
        );
        if let Some((_, pending)) = self.pending.remove(&key) {
            info!(
                charge_box_id,
                action = pending.action.as_str(),
                message_id,
                "Received command response"
            );
            let _ = pending.response_sender.send(Ok(payload));
        } else {
            warn!(charge_box_id, message_id, "Response for unknown request");
        }
    }

    /// Route an inbound CallError to its waiting command.
    pub fn handle_error(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        message_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        let key = (
            tenant_id.to_string(),
            charge_box_id.to_string(),
            message_id.to_string(),
        );
        if let Some((_, pending)) = self.pending.remove(&key) {
            warn!(
                charge_box_id,
                action = pending.action.as_str(),
                error_code,
                "Command answered with CallError"
            );
            let _ = pending.response_sender.send(Err(DomainError::Integration {
                service: "station-command",
                message: format!("{error_code}: {error_description}"),
            }));
        }
    }
}

#[async_trait]
impl StationCommandPort for CommandSender {
    async fn send(
        &self,
        tenant_id: &str,
        station_id: &str,
        action: &str,
        payload: Value,
    ) -> DomainResult<Value> {
        let message_id = self.next_message_id();
        let frame = OcppFrame::Call {
            unique_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };

        let (tx, rx) = oneshot::channel();
        let key = (
            tenant_id.to_string(),
            station_id.to_string(),
            message_id.clone(),
        );
        self.pending.insert(
            key.clone(),
            PendingRequest {
                action: action.to_string(),
                response_sender: tx,
            },
        );

        info!(
            charge_box_id = station_id,
            action,
            message_id = message_id.as_str(),
            "Sending command"
        );

        if let Err(e) = self
            .registry
            .send_to(tenant_id, station_id, frame.serialize())
        {
            self.pending.remove(&key);
            return Err(DomainError::Integration {
                service: "station-command",
                message: e,
            });
        }

        match timeout(Duration::from_secs(RESPONSE_TIMEOUT_SECS), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&key);
                Err(DomainError::Integration {
                    service: "station-command",
                    message: "response channel closed".into(),
                })
            }
            Err(_) => {
                self.pending.remove(&key);
                warn!(charge_box_id = station_id, action, "Command timed out");
                Err(DomainError::Timeout(format!("{action} to {station_id}")))
            }
        }
    }
}
