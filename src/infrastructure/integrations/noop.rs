//! No-op and logging implementations for collaborators a development
//! deployment does not have. Each logs at debug so message flow stays
//! observable without the real integration.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::application::ports::{
    BillingPort, NotificationPort, RoamingAction, RoamingPort, SessionAction,
    SiteAuthorizationPort, SmartChargingPort, StationCommandPort,
};
use crate::domain::{
    ChargingStation, Connector, DomainError, DomainResult, RoamingProtocol, Tenant, Transaction,
};

// ── Site authorization ─────────────────────────────────────────

/// Site policy for deployments without site-area assignments: every valid
/// tag may start on every station.
#[derive(Default)]
pub struct OpenSiteAuthorization;

#[async_trait]
impl SiteAuthorizationPort for OpenSiteAuthorization {
    async fn authorizes_start(
        &self,
        _tenant: &Tenant,
        station: &ChargingStation,
        tag_id: &str,
    ) -> DomainResult<bool> {
        debug!(
            charge_box_id = station.id.as_str(),
            tag_id, "Site authorization open, start allowed"
        );
        Ok(true)
    }
}

// ── Billing ────────────────────────────────────────────────────

#[derive(Default)]
pub struct NoopBilling;

#[async_trait]
impl BillingPort for NoopBilling {
    async fn bill(&self, action: SessionAction, transaction: &Transaction) -> DomainResult<()> {
        debug!(
            transaction_id = transaction.id,
            ?action,
            "Billing no-op"
        );
        Ok(())
    }
}

// ── Roaming ────────────────────────────────────────────────────

#[derive(Default)]
pub struct NoopRoaming;

#[async_trait]
impl RoamingPort for NoopRoaming {
    async fn authorize(&self, _tenant: &Tenant, tag_id: &str) -> DomainResult<Option<String>> {
        debug!(tag_id, "Roaming authorize no-op (unknown tag)");
        Ok(None)
    }

    async fn process_session(
        &self,
        protocol: RoamingProtocol,
        action: RoamingAction,
        transaction: &mut Transaction,
        _station: &ChargingStation,
    ) -> DomainResult<()> {
        debug!(
            transaction_id = transaction.id,
            ?protocol,
            ?action,
            "Roaming session no-op"
        );
        Ok(())
    }

    async fn push_cdr(
        &self,
        protocol: RoamingProtocol,
        transaction: &mut Transaction,
        _station: &ChargingStation,
    ) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, ?protocol, "CDR push no-op");
        Ok(())
    }

    async fn push_connector_status(
        &self,
        protocol: RoamingProtocol,
        station: &ChargingStation,
        connector: &Connector,
    ) -> DomainResult<()> {
        debug!(
            charge_box_id = station.id.as_str(),
            connector_id = connector.connector_id,
            ?protocol,
            "Connector status push no-op"
        );
        Ok(())
    }
}

// ── Smart charging ─────────────────────────────────────────────

#[derive(Default)]
pub struct NoopSmartCharging;

#[async_trait]
impl SmartChargingPort for NoopSmartCharging {
    async fn compute_and_apply(&self, tenant_id: &str, site_area_id: &str) -> DomainResult<()> {
        debug!(tenant_id, site_area_id, "Smart-charging no-op");
        Ok(())
    }

    async fn clear_tx_profile(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "Clear TX profile no-op");
        Ok(())
    }
}

// ── Notifications ──────────────────────────────────────────────

#[derive(Default)]
pub struct LoggingNotifications;

#[async_trait]
impl NotificationPort for LoggingNotifications {
    async fn station_registered(&self, station: &ChargingStation) -> DomainResult<()> {
        debug!(charge_box_id = station.id.as_str(), "notify: station registered");
        Ok(())
    }

    async fn station_offline(&self, station: &ChargingStation) -> DomainResult<()> {
        debug!(charge_box_id = station.id.as_str(), "notify: station offline");
        Ok(())
    }

    async fn session_started(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "notify: session started");
        Ok(())
    }

    async fn end_of_charge(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "notify: end of charge");
        Ok(())
    }

    async fn optimal_charge_reached(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "notify: optimal charge reached");
        Ok(())
    }

    async fn end_of_session(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "notify: end of session");
        Ok(())
    }

    async fn end_of_signed_session(&self, transaction: &Transaction) -> DomainResult<()> {
        debug!(transaction_id = transaction.id, "notify: end of signed session");
        Ok(())
    }

    async fn status_error(
        &self,
        station: &ChargingStation,
        connector_id: u32,
        error_code: &str,
    ) -> DomainResult<()> {
        debug!(
            charge_box_id = station.id.as_str(),
            connector_id, error_code, "notify: status error"
        );
        Ok(())
    }
}

// ── Station commands ───────────────────────────────────────────

/// Command port for deployments without a connected transport (tests, tools).
/// Every send fails soft.
#[derive(Default)]
pub struct UnconnectedStationCommand;

#[async_trait]
impl StationCommandPort for UnconnectedStationCommand {
    async fn send(
        &self,
        _tenant_id: &str,
        station_id: &str,
        action: &str,
        _payload: Value,
    ) -> DomainResult<Value> {
        Err(DomainError::Integration {
            service: "station-command",
            message: format!("{station_id} is not connected for {action}"),
        })
    }
}
