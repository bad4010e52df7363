//! Outbound integration ports: locks, pricing, billing, roaming,
//! smart charging, notifications, templates, station commands.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    ChargingStation, Connector, Consumption, DomainResult, InactivityStatus, RoamingProtocol,
    Tenant, Transaction,
};

// ── Site authorization ─────────────────────────────────────────

/// Site-area assignment rules: whether a tag may start a session on this
/// station. The rules live in the external authorization component; the core
/// consumes the outcome as a predicate.
#[async_trait]
pub trait SiteAuthorizationPort: Send + Sync {
    async fn authorizes_start(
        &self,
        tenant: &Tenant,
        station: &ChargingStation,
        tag_id: &str,
    ) -> DomainResult<bool>;
}

// ── Locks ──────────────────────────────────────────────────────

/// Proof of ownership of a named lock
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub tenant_id: String,
    pub name: String,
    pub token: Uuid,
}

/// Named per-aggregate exclusivity. `acquire` returns `None` when the lock is
/// held elsewhere; callers skip silently (a later event re-triggers).
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, tenant_id: &str, name: &str, ttl: Duration) -> Option<LockHandle>;
    async fn release(&self, handle: LockHandle);
}

// ── Session side effects ───────────────────────────────────────

/// Lifecycle moment a pricing/billing call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    Update,
    Stop,
}

/// Roaming session actions; `End` pushes the CDR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamingAction {
    Start,
    Update,
    Stop,
    End,
}

/// Pricing integration. May mutate the consumption's pricing snapshot and the
/// transaction's cumulated price.
#[async_trait]
pub trait PricingPort: Send + Sync {
    async fn price(
        &self,
        action: SessionAction,
        transaction: &mut Transaction,
        consumption: &mut Consumption,
    ) -> DomainResult<()>;
}

/// Billing integration. Failures are soft.
#[async_trait]
pub trait BillingPort: Send + Sync {
    async fn bill(&self, action: SessionAction, transaction: &Transaction) -> DomainResult<()>;
}

/// Roaming bridges (CPO/EMSP connectors)
#[async_trait]
pub trait RoamingPort: Send + Sync {
    /// Remote authorization of a tag unknown locally. Returns the roaming
    /// authorization id when the platform accepts it.
    async fn authorize(&self, tenant: &Tenant, tag_id: &str) -> DomainResult<Option<String>>;

    async fn process_session(
        &self,
        protocol: RoamingProtocol,
        action: RoamingAction,
        transaction: &mut Transaction,
        station: &ChargingStation,
    ) -> DomainResult<()>;

    /// Push the finalized CDR. Callers must hold the per-transaction CDR lock.
    async fn push_cdr(
        &self,
        protocol: RoamingProtocol,
        transaction: &mut Transaction,
        station: &ChargingStation,
    ) -> DomainResult<()>;

    async fn push_connector_status(
        &self,
        protocol: RoamingProtocol,
        station: &ChargingStation,
        connector: &Connector,
    ) -> DomainResult<()>;
}

/// Smart-charging optimizer
#[async_trait]
pub trait SmartChargingPort: Send + Sync {
    async fn compute_and_apply(&self, tenant_id: &str, site_area_id: &str) -> DomainResult<()>;
    async fn clear_tx_profile(&self, transaction: &Transaction) -> DomainResult<()>;
}

/// Notification dispatcher. All methods are best-effort; the core runs them
/// fire-and-forget and swallows failures.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn station_registered(&self, station: &ChargingStation) -> DomainResult<()>;
    async fn station_offline(&self, station: &ChargingStation) -> DomainResult<()>;
    async fn session_started(&self, transaction: &Transaction) -> DomainResult<()>;
    async fn end_of_charge(&self, transaction: &Transaction) -> DomainResult<()>;
    async fn optimal_charge_reached(&self, transaction: &Transaction) -> DomainResult<()>;
    async fn end_of_session(&self, transaction: &Transaction) -> DomainResult<()>;
    async fn end_of_signed_session(&self, transaction: &Transaction) -> DomainResult<()>;
    async fn status_error(
        &self,
        station: &ChargingStation,
        connector_id: u32,
        error_code: &str,
    ) -> DomainResult<()>;
}

// ── Templates & classification ─────────────────────────────────

/// Result of applying a vendor/model template to a station
#[derive(Debug, Clone, Default)]
pub struct TemplateApplied {
    pub updated: bool,
    pub ocpp_standard_updated: bool,
    pub ocpp_vendor_updated: bool,
    /// OCPP configuration keys the template prescribes for this station
    pub configuration_keys: Vec<(String, String)>,
}

/// Declarative vendor/model enrichment catalog. Application is idempotent
/// given the same (vendor, model, firmware).
pub trait TemplateCatalog: Send + Sync {
    fn apply(&self, station: &mut ChargingStation) -> TemplateApplied;
}

/// Maps accumulated inactivity onto a severity, using station/site thresholds
/// configured outside the core.
pub trait InactivityClassifier: Send + Sync {
    fn classify(
        &self,
        station: &ChargingStation,
        connector_id: u32,
        total_inactivity_secs: i64,
    ) -> InactivityStatus;
}

// ── Station commands ───────────────────────────────────────────

/// Deliver a central-system call to a connected station and await its
/// CallResult payload. Used by the post-boot configuration push.
#[async_trait]
pub trait StationCommandPort: Send + Sync {
    async fn send(
        &self,
        tenant_id: &str,
        station_id: &str,
        action: &str,
        payload: Value,
    ) -> DomainResult<Value>;
}
