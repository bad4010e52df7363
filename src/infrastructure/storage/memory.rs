//! In-memory storage for development and testing
//!
//! Everything is keyed by tenant first, mirroring the document store's
//! isolation boundary. Seed helpers exist so fixtures can register tenants,
//! tags, users, and tokens without going through OCPP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::application::ports::{BootRecord, Storage};
use crate::domain::{
    ChargingStation, Consumption, DomainError, DomainResult, NormalizedMeterValue,
    RegistrationToken, Tag, Tenant, Transaction, User,
};

/// In-memory storage
#[derive(Default)]
pub struct InMemoryStorage {
    tenants: DashMap<String, Tenant>,
    stations: DashMap<(String, String), ChargingStation>,
    tokens: DashMap<(String, String), RegistrationToken>,
    transactions: DashMap<(String, i32), Transaction>,
    transaction_counters: DashMap<String, i32>,
    consumptions: DashMap<(String, i32), Vec<Consumption>>,
    meter_values: DashMap<(String, String), Vec<NormalizedMeterValue>>,
    boot_records: DashMap<String, Vec<BootRecord>>,
    tags: DashMap<(String, String), Tag>,
    users: DashMap<(String, String), User>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seed helpers ───────────────────────────────────────

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn add_station(&self, station: ChargingStation) {
        self.stations
            .insert((station.tenant_id.clone(), station.id.clone()), station);
    }

    pub fn add_registration_token(&self, token: RegistrationToken) {
        self.tokens
            .insert((token.tenant_id.clone(), token.token.clone()), token);
    }

    pub fn add_tag(&self, tag: Tag) {
        self.tags.insert((tag.tenant_id.clone(), tag.id.clone()), tag);
    }

    pub fn add_user(&self, tenant_id: &str, user: User) {
        self.users
            .insert((tenant_id.to_string(), user.id.clone()), user);
    }

    /// Raw meter values stored for a station (audit trail)
    pub fn meter_value_count(&self, tenant_id: &str, station_id: &str) -> usize {
        self.meter_values
            .get(&(tenant_id.to_string(), station_id.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn boot_record_count(&self, tenant_id: &str) -> usize {
        self.boot_records
            .get(tenant_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_tenant(&self, tenant_id: &str) -> DomainResult<Option<Tenant>> {
        Ok(self.tenants.get(tenant_id).map(|t| t.clone()))
    }

    async fn list_tenants(&self) -> DomainResult<Vec<Tenant>> {
        Ok(self.tenants.iter().map(|t| t.value().clone()).collect())
    }

    async fn get_station(
        &self,
        tenant_id: &str,
        station_id: &str,
    ) -> DomainResult<Option<ChargingStation>> {
        Ok(self
            .stations
            .get(&(tenant_id.to_string(), station_id.to_string()))
            .map(|s| s.clone()))
    }

    async fn save_station(&self, station: ChargingStation) -> DomainResult<()> {
        self.stations
            .insert((station.tenant_id.clone(), station.id.clone()), station);
        Ok(())
    }

    async fn list_stations(&self, tenant_id: &str) -> DomainResult<Vec<ChargingStation>> {
        Ok(self
            .stations
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save_station_last_seen(
        &self,
        tenant_id: &str,
        station_id: &str,
        last_seen: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(mut station) = self
            .stations
            .get_mut(&(tenant_id.to_string(), station_id.to_string()))
        {
            station.last_seen = last_seen;
        }
        Ok(())
    }

    async fn get_registration_token(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> DomainResult<Option<RegistrationToken>> {
        Ok(self
            .tokens
            .get(&(tenant_id.to_string(), token.to_string()))
            .map(|t| t.clone()))
    }

    async fn save_registration_token(&self, token: RegistrationToken) -> DomainResult<()> {
        self.tokens
            .insert((token.tenant_id.clone(), token.token.clone()), token);
        Ok(())
    }

    async fn next_transaction_id(&self, tenant_id: &str) -> DomainResult<i32> {
        let mut counter = self
            .transaction_counters
            .entry(tenant_id.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn get_transaction(
        &self,
        tenant_id: &str,
        transaction_id: i32,
    ) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .get(&(tenant_id.to_string(), transaction_id))
            .map(|t| t.clone()))
    }

    async fn save_transaction(&self, transaction: Transaction) -> DomainResult<()> {
        self.transactions
            .insert((transaction.tenant_id.clone(), transaction.id), transaction);
        Ok(())
    }

    async fn delete_transaction(&self, tenant_id: &str, transaction_id: i32) -> DomainResult<()> {
        self.transactions
            .remove(&(tenant_id.to_string(), transaction_id))
            .ok_or(DomainError::TransactionNotFound(transaction_id))?;
        self.consumptions
            .remove(&(tenant_id.to_string(), transaction_id));
        Ok(())
    }

    async fn get_active_transaction(
        &self,
        tenant_id: &str,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|entry| {
                let tx = entry.value();
                entry.key().0 == tenant_id
                    && tx.charge_box_id == station_id
                    && tx.connector_id == connector_id
                    && tx.is_active()
            })
            .map(|entry| entry.value().clone())
            .max_by_key(|tx| tx.id))
    }

    async fn get_last_transaction(
        &self,
        tenant_id: &str,
        station_id: &str,
        connector_id: u32,
    ) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|entry| {
                let tx = entry.value();
                entry.key().0 == tenant_id
                    && tx.charge_box_id == station_id
                    && tx.connector_id == connector_id
            })
            .map(|entry| entry.value().clone())
            .max_by_key(|tx| tx.id))
    }

    async fn save_consumption(&self, consumption: Consumption) -> DomainResult<()> {
        // Consumptions live under the transaction's tenant
        let tenant_id = self
            .transactions
            .iter()
            .find(|entry| entry.key().1 == consumption.transaction_id)
            .map(|entry| entry.key().0.clone());
        let Some(tenant_id) = tenant_id else {
            return Err(DomainError::TransactionNotFound(consumption.transaction_id));
        };
        self.consumptions
            .entry((tenant_id, consumption.transaction_id))
            .or_default()
            .push(consumption);
        Ok(())
    }

    async fn list_consumptions(
        &self,
        tenant_id: &str,
        transaction_id: i32,
    ) -> DomainResult<Vec<Consumption>> {
        Ok(self
            .consumptions
            .get(&(tenant_id.to_string(), transaction_id))
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    async fn save_meter_value(
        &self,
        tenant_id: &str,
        station_id: &str,
        value: NormalizedMeterValue,
    ) -> DomainResult<()> {
        self.meter_values
            .entry((tenant_id.to_string(), station_id.to_string()))
            .or_default()
            .push(value);
        Ok(())
    }

    async fn save_boot_record(&self, record: BootRecord) -> DomainResult<()> {
        self.boot_records
            .entry(record.tenant_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn get_tag(&self, tenant_id: &str, tag_id: &str) -> DomainResult<Option<Tag>> {
        Ok(self
            .tags
            .get(&(tenant_id.to_string(), tag_id.to_string()))
            .map(|t| t.clone()))
    }

    async fn get_user(&self, tenant_id: &str, user_id: &str) -> DomainResult<Option<User>> {
        Ok(self
            .users
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .map(|u| u.clone()))
    }

    async fn save_user(&self, tenant_id: &str, user: User) -> DomainResult<()> {
        self.users
            .insert((tenant_id.to_string(), user.id.clone()), user);
        Ok(())
    }
}
