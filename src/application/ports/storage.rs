//! Storage port
//!
//! The persistence layer is an external collaborator; the core only depends
//! on this trait. `save_station_last_seen` exists separately because it is a
//! hot, compact write issued on nearly every inbound message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ChargingStation, Consumption, DomainResult, NormalizedMeterValue, RegistrationToken, Tag,
    Tenant, Transaction, User,
};

/// Raw boot notification audit record
#[derive(Debug, Clone)]
pub struct BootRecord {
    pub tenant_id: String,
    pub charge_box_id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Storage trait for persistence operations
#[async_trait]
pub trait Storage: Send + Sync {
    // Tenant operations
    async fn get_tenant(&self, tenant_id: &str) -> DomainResult<Option<Tenant>>;
    async fn list_tenants(&self) -> DomainResult<Vec<Tenant>>;

    // Charging station operations
    async fn get_station(
        &self,
        tenant_id: &str,
        station_id: &str,
    ) -> DomainResult<Option<ChargingStation>>;
    async fn save_station(&self, station: ChargingStation) -> DomainResult<()>;
    async fn list_stations(&self, tenant_id: &str) -> DomainResult<Vec<ChargingStation>>;
    /// Hot compact write: bump `last_seen` without rewriting the record
    async fn save_station_last_seen(
        &self,
        tenant_id: &str,
        station_id: &str,
        last_seen: DateTime<Utc>,
    ) -> DomainResult<()>;

    // Registration tokens
    async fn get_registration_token(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> DomainResult<Option<RegistrationToken>>;
    async fn save_registration_token(&self, token: RegistrationToken) -> DomainResult<()>;

    // Transaction operations
    /// Next dense transaction id for the tenant
    async fn next_transaction_id(&self, tenant_id: &str) -> DomainResult<i32>;
    async fn get_transaction(
        &self,
        tenant_id: &str,
        transaction_id: i32,
    ) -> DomainResult<Option<Transaction>>;
    async fn save_transaction(&self, transaction: Transaction) -> DomainResult<()>;
    async fn delete_transaction(&self, tenant_id: &str, transaction_id: i32) -> DomainResult<()>;
    /// The open transaction on (station, connector), if any
    async fn get_active_transaction(
        &self,
        tenant_id: &str,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<Transaction>>;
    /// Most recent transaction on (station, connector), stopped or not
    async fn get_last_transaction(
        &self,
        tenant_id: &str,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<Transaction>>;

    // Consumption operations
    async fn save_consumption(&self, consumption: Consumption) -> DomainResult<()>;
    async fn list_consumptions(
        &self,
        tenant_id: &str,
        transaction_id: i32,
    ) -> DomainResult<Vec<Consumption>>;

    // Raw meter values (audit trail)
    async fn save_meter_value(
        &self,
        tenant_id: &str,
        station_id: &str,
        value: NormalizedMeterValue,
    ) -> DomainResult<()>;

    // Boot audit records
    async fn save_boot_record(&self, record: BootRecord) -> DomainResult<()>;

    // Tags and users
    async fn get_tag(&self, tenant_id: &str, tag_id: &str) -> DomainResult<Option<Tag>>;
    async fn get_user(&self, tenant_id: &str, user_id: &str) -> DomainResult<Option<User>>;
    async fn save_user(&self, tenant_id: &str, user: User) -> DomainResult<()>;
}
