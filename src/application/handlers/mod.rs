//! OCPP message handlers
//!
//! One file per station-to-central-system action. The dispatcher routes a
//! normalized request, and every failure is converted into the rejection
//! payload the protocol requires for that action; no handler error ever
//! reaches the transport as a panic or an unhandled exception.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::context::OcppHeader;
use crate::application::normalizer::{IdTagStatus, OcppRequest, OcppResponse};
use crate::application::ports::{
    BillingPort, InactivityClassifier, LockService, NotificationPort, PricingPort, RoamingPort,
    SiteAuthorizationPort, SmartChargingPort, StationCommandPort, Storage, TemplateCatalog,
};
use crate::config::AppConfig;
use crate::domain::{ChargingStation, DomainError, DomainResult, Tenant};
use crate::support::clock::SharedClock;
use crate::support::deferred::DeferredScheduler;

pub mod effects;
mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_diagnostics_status_notification;
mod handle_firmware_status_notification;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;
pub mod recovery;

#[cfg(test)]
pub(crate) mod testkit;
#[cfg(test)]
mod scenarios;

pub use handle_stop_transaction::{StopMode, StopParams};

/// Seconds a central remote-stop request stays authoritative for the
/// stopper-tag resolution.
pub const REMOTE_STOP_WINDOW_SECS: i64 = 60;

/// Bundle of everything a handler needs: ports, clock, scheduler, config.
/// One instance is shared by all connections.
pub struct OcppHandler {
    pub storage: Arc<dyn Storage>,
    pub locks: Arc<dyn LockService>,
    pub pricing: Arc<dyn PricingPort>,
    pub billing: Arc<dyn BillingPort>,
    pub roaming: Arc<dyn RoamingPort>,
    pub site_authorization: Arc<dyn SiteAuthorizationPort>,
    pub smart_charging: Arc<dyn SmartChargingPort>,
    pub notifications: Arc<dyn NotificationPort>,
    pub templates: Arc<dyn TemplateCatalog>,
    pub inactivity: Arc<dyn InactivityClassifier>,
    pub commands: Arc<dyn StationCommandPort>,
    pub scheduler: DeferredScheduler,
    pub clock: SharedClock,
    pub config: AppConfig,
}

/// Shared, reference-counted handler bundle
pub type SharedOcppHandler = Arc<OcppHandler>;

impl OcppHandler {
    /// Resolve the tenant, failing with `UnknownTenant`.
    pub(crate) async fn load_tenant(&self, header: &OcppHeader) -> DomainResult<Tenant> {
        self.storage
            .get_tenant(&header.tenant_id)
            .await?
            .ok_or_else(|| DomainError::UnknownTenant(header.tenant_id.clone()))
    }

    /// Resolve tenant and station, failing with `StationNotFound` for a
    /// station that never booted.
    pub(crate) async fn load_tenant_and_station(
        &self,
        header: &OcppHeader,
    ) -> DomainResult<(Tenant, ChargingStation)> {
        let tenant = self.load_tenant(header).await?;
        let station = self
            .storage
            .get_station(&tenant.id, &header.charge_box_id)
            .await?
            .ok_or_else(|| DomainError::StationNotFound(header.charge_box_id.clone()))?;
        Ok((tenant, station))
    }

    /// Handle one normalized request, returning the protocol response.
    ///
    /// Returns `Err` only for the anomalies the OCPP spec answers with an
    /// error envelope (unknown transaction, duplicate stop); everything else
    /// is mapped to a rejection payload here.
    pub async fn handle(
        &self,
        header: &OcppHeader,
        request: OcppRequest,
    ) -> DomainResult<OcppResponse> {
        let action = request.action();
        metrics::counter!("ocpp_messages_total", "action" => action).increment(1);

        let result = match request {
            OcppRequest::BootNotification(req) => {
                handle_boot_notification::handle(self, header, req).await
            }
            OcppRequest::Heartbeat => handle_heartbeat::handle(self, header).await,
            OcppRequest::StatusNotification(req) => {
                handle_status_notification::handle(self, header, req).await
            }
            OcppRequest::Authorize(req) => handle_authorize::handle(self, header, req).await,
            OcppRequest::StartTransaction(req) => {
                handle_start_transaction::handle(self, header, req).await
            }
            OcppRequest::MeterValues(req) => {
                handle_meter_values::handle(self, header, req).await
            }
            OcppRequest::StopTransaction(req) => {
                handle_stop_transaction::handle(self, header, req).await
            }
            OcppRequest::DataTransfer(req) => {
                handle_data_transfer::handle(self, header, req).await
            }
            OcppRequest::FirmwareStatusNotification { status } => {
                handle_firmware_status_notification::handle(self, header, &status).await
            }
            OcppRequest::DiagnosticsStatusNotification { status } => {
                handle_diagnostics_status_notification::handle(self, header, &status).await
            }
        };

        match result {
            Ok(response) => Ok(response),
            Err(err) => {
                self.log_failure(header, action, &err);
                match self.rejection_response(action, &err) {
                    Some(response) => Ok(response),
                    None => Err(err),
                }
            }
        }
    }

    fn log_failure(&self, header: &OcppHeader, action: &str, err: &DomainError) {
        if err.is_soft() {
            warn!(
                charge_box_id = header.charge_box_id.as_str(),
                action,
                error = %err,
                "Handler soft failure"
            );
        } else {
            error!(
                charge_box_id = header.charge_box_id.as_str(),
                action,
                error = %err,
                "Handler failure"
            );
        }
    }

    /// Rejection payload the protocol requires for a failed action. `None` means the
    /// carrier must answer with a protocol error envelope instead.
    fn rejection_response(&self, action: &str, err: &DomainError) -> Option<OcppResponse> {
        match action {
            "BootNotification" => Some(OcppResponse::BootNotification {
                status: crate::domain::RegistrationStatus::Rejected,
                current_time: self.clock.now(),
                interval_secs: self.config.ocpp.boot_reject_retry_secs,
            }),
            "Authorize" => Some(OcppResponse::Authorize {
                status: IdTagStatus::Invalid,
            }),
            "StartTransaction" => Some(OcppResponse::StartTransaction {
                transaction_id: 0,
                status: IdTagStatus::Invalid,
            }),
            "StopTransaction" => match err {
                // Wrong-version transactionData and payload problems reject
                // with Invalid; unknown or already-stopped transactions go
                // back as an error envelope.
                DomainError::Validation(_) | DomainError::Unauthorized { .. } => {
                    Some(OcppResponse::StopTransaction {
                        status: IdTagStatus::Invalid,
                    })
                }
                _ => None,
            },
            "StatusNotification" => Some(OcppResponse::StatusNotification),
            "MeterValues" => Some(OcppResponse::MeterValues),
            "Heartbeat" => Some(OcppResponse::Heartbeat {
                current_time: self.clock.now(),
            }),
            "DataTransfer" => Some(OcppResponse::DataTransfer {
                status: crate::application::normalizer::DataTransferResult::Rejected,
                data: None,
            }),
            "FirmwareStatusNotification" => Some(OcppResponse::FirmwareStatusNotification),
            "DiagnosticsStatusNotification" => Some(OcppResponse::DiagnosticsStatusNotification),
            _ => None,
        }
    }

    /// Mirror the transaction's live fields onto its connector.
    pub(crate) fn mirror_transaction_on_connector(
        station: &mut ChargingStation,
        transaction: &crate::domain::Transaction,
    ) {
        if let Some(connector) = station.connector_mut(transaction.connector_id) {
            connector.current_transaction_id = transaction.id;
            connector.current_transaction_date = Some(transaction.timestamp);
            connector.current_tag_id = Some(transaction.tag_id.clone());
            connector.current_user_id = transaction.user_id.clone();
            connector.current_instant_watts = transaction.current_instant_watts;
            connector.current_total_consumption_wh = transaction.current_total_consumption_wh;
            connector.current_total_inactivity_secs = transaction.current_total_inactivity_secs;
            connector.current_inactivity_status = Some(transaction.current_inactivity_status);
            connector.current_state_of_charge =
                (transaction.current_state_of_charge > 0 || transaction.state_of_charge > 0)
                    .then_some(transaction.current_state_of_charge);
        }
    }
}

/// Log-only acknowledgment used by the informational notifications.
pub(crate) fn acknowledge(header: &OcppHeader, action: &str, detail: &str) {
    info!(
        charge_box_id = header.charge_box_id.as_str(),
        tenant_id = header.tenant_id.as_str(),
        action,
        detail,
        "Notification acknowledged"
    );
}
