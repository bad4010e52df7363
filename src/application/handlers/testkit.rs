//! Test harness: a fully wired handler over in-memory infrastructure with a
//! fixed clock, plus seed data and request builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::application::context::OcppHeader;
use crate::support::clock::Clock;
use crate::application::normalizer::{self, message, OcppRequest, OcppResponse, TransactionData};
use crate::application::ports::{RoamingAction, RoamingPort, SiteAuthorizationPort};
use crate::config::AppConfig;
use crate::domain::{
    ChargingStation, Connector, ConnectorStatus, DomainResult, OcppTransport, OcppVersion,
    RegistrationToken, RoamingProtocol, Tag, Tenant, Transaction, User, UserStatus,
};
use crate::infrastructure::{
    InMemoryLockService, InMemoryStorage, LoggingNotifications, NoopSmartCharging,
    NoopBilling, SimpleTariffPricing, StaticTemplateCatalog, ThresholdInactivityClassifier,
    UnconnectedStationCommand,
};
use crate::support::clock::FixedClock;
use crate::support::deferred::DeferredScheduler;
use crate::support::shutdown::ShutdownSignal;

use super::OcppHandler;

pub(crate) const TENANT: &str = "t1";
pub(crate) const STATION: &str = "CS-001";
pub(crate) const TOKEN: &str = "REG-TOKEN-1";
pub(crate) const TAG: &str = "TAG-001";
pub(crate) const USER: &str = "u1";
pub(crate) const PRICE_PER_KWH: &str = "0.50";

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

/// Roaming double: authorizes tags prefixed `ROAM`, counts CDR pushes.
#[derive(Default)]
pub(crate) struct CountingRoaming {
    pub cdr_pushes: AtomicUsize,
}

#[async_trait]
impl RoamingPort for CountingRoaming {
    async fn authorize(&self, _tenant: &Tenant, tag_id: &str) -> DomainResult<Option<String>> {
        Ok(tag_id
            .starts_with("ROAM")
            .then(|| format!("auth-{tag_id}")))
    }

    async fn process_session(
        &self,
        _protocol: RoamingProtocol,
        _action: RoamingAction,
        _transaction: &mut Transaction,
        _station: &ChargingStation,
    ) -> DomainResult<()> {
        Ok(())
    }

    async fn push_cdr(
        &self,
        _protocol: RoamingProtocol,
        _transaction: &mut Transaction,
        _station: &ChargingStation,
    ) -> DomainResult<()> {
        self.cdr_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn push_connector_status(
        &self,
        _protocol: RoamingProtocol,
        _station: &ChargingStation,
        _connector: &Connector,
    ) -> DomainResult<()> {
        Ok(())
    }
}

/// Site-policy double: denies starts for tags on its deny list.
#[derive(Default)]
pub(crate) struct DenyListSiteAuthorization {
    denied: std::sync::Mutex<Vec<String>>,
}

impl DenyListSiteAuthorization {
    pub fn deny(&self, tag_id: &str) {
        self.denied.lock().unwrap().push(tag_id.to_string());
    }
}

#[async_trait]
impl SiteAuthorizationPort for DenyListSiteAuthorization {
    async fn authorizes_start(
        &self,
        _tenant: &Tenant,
        _station: &ChargingStation,
        tag_id: &str,
    ) -> DomainResult<bool> {
        Ok(!self.denied.lock().unwrap().iter().any(|t| t == tag_id))
    }
}

pub(crate) struct TestHarness {
    pub handler: OcppHandler,
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<FixedClock>,
    pub roaming: Arc<CountingRoaming>,
    pub site_authorization: Arc<DenyListSiteAuthorization>,
}

impl TestHarness {
    pub fn new() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let clock = FixedClock::at(t0());
        let roaming = Arc::new(CountingRoaming::default());
        let site_authorization = Arc::new(DenyListSiteAuthorization::default());

        let mut tenant = Tenant::new(TENANT, "Acme Mobility");
        tenant.features.pricing = true;
        tenant.features.ocpi = true;
        storage.add_tenant(tenant);

        storage.add_registration_token(RegistrationToken {
            tenant_id: TENANT.into(),
            token: TOKEN.into(),
            expiration_date: None,
            revocation_date: None,
            site_area_id: Some("sa-1".into()),
            last_used_on: None,
        });

        storage.add_user(
            TENANT,
            User {
                id: USER.into(),
                name: "Alex Driver".into(),
                email: None,
                status: UserStatus::Active,
                default_car_id: None,
                last_selected_car_id: None,
            },
        );
        storage.add_tag(Tag {
            id: TAG.into(),
            tenant_id: TENANT.into(),
            user_id: Some(USER.into()),
            active: true,
            expiry_date: None,
            description: None,
        });

        let handler = OcppHandler {
            storage: storage.clone(),
            locks: Arc::new(InMemoryLockService::new()),
            pricing: Arc::new(SimpleTariffPricing::new(
                PRICE_PER_KWH.parse().unwrap(),
                "EUR",
            )),
            billing: Arc::new(NoopBilling),
            roaming: roaming.clone(),
            site_authorization: site_authorization.clone(),
            smart_charging: Arc::new(NoopSmartCharging),
            notifications: Arc::new(LoggingNotifications),
            templates: Arc::new(StaticTemplateCatalog::new()),
            inactivity: Arc::new(ThresholdInactivityClassifier::default()),
            commands: Arc::new(UnconnectedStationCommand),
            scheduler: DeferredScheduler::new(4, ShutdownSignal::new()),
            clock: clock.clone(),
            config: AppConfig::default(),
        };

        Self {
            handler,
            storage,
            clock,
            roaming,
            site_authorization,
        }
    }

    pub fn header(&self) -> OcppHeader {
        OcppHeader::new(TENANT, STATION, OcppVersion::V16, OcppTransport::Json)
            .with_client_ip("10.0.0.42")
            .with_token(Some(TOKEN.into()))
    }

    pub async fn send(&self, request: OcppRequest) -> DomainResult<OcppResponse> {
        self.handler.handle(&self.header(), request).await
    }

    pub fn boot_request(&self) -> OcppRequest {
        OcppRequest::BootNotification(message::BootNotification {
            charge_point_vendor: "Schneider Electric".into(),
            charge_point_model: "EVlink City".into(),
            charge_point_serial_number: Some("SN-100".into()),
            firmware_version: Some("3.2.0".into()),
            ..Default::default()
        })
    }

    pub async fn boot(&self) -> OcppResponse {
        self.send(self.boot_request()).await.unwrap()
    }

    pub fn status_request(
        &self,
        connector_id: u32,
        status: ConnectorStatus,
        timestamp: DateTime<Utc>,
    ) -> OcppRequest {
        OcppRequest::StatusNotification(message::StatusNotification {
            connector_id,
            status,
            error_code: "NoError".into(),
            info: None,
            timestamp: Some(timestamp),
            vendor_id: None,
            vendor_error_code: None,
        })
    }

    pub async fn notify_status(
        &self,
        connector_id: u32,
        status: ConnectorStatus,
        timestamp: DateTime<Utc>,
    ) -> OcppResponse {
        self.send(self.status_request(connector_id, status, timestamp))
            .await
            .unwrap()
    }

    /// Start a transaction, returning the allocated id.
    pub async fn start(&self, connector_id: u32, tag: &str, meter_start: f64) -> i32 {
        let response = self
            .send(OcppRequest::StartTransaction(message::StartTransaction {
                connector_id,
                id_tag: tag.into(),
                meter_start,
                timestamp: self.clock.now(),
                reservation_id: None,
            }))
            .await
            .unwrap();
        match response {
            OcppResponse::StartTransaction { transaction_id, .. } => transaction_id,
            other => panic!("unexpected: {other:?}"),
        }
    }

    /// One periodic energy sample through the normalizer (wire-shaped JSON).
    pub async fn energy_sample(&self, connector_id: u32, transaction_id: i32, wh: f64) {
        let payload = serde_json::json!({
            "connectorId": connector_id,
            "transactionId": transaction_id,
            "meterValue": [{
                "timestamp": self.clock.now().to_rfc3339(),
                "sampledValue": [{"value": wh.to_string()}]
            }]
        });
        let request = normalizer::decode_json("MeterValues", &payload).unwrap();
        self.send(request).await.unwrap();
    }

    pub fn stop_request(
        &self,
        transaction_id: i32,
        id_tag: Option<&str>,
        meter_stop: f64,
    ) -> OcppRequest {
        OcppRequest::StopTransaction(message::StopTransaction {
            transaction_id,
            id_tag: id_tag.map(String::from),
            meter_stop,
            timestamp: self.clock.now(),
            reason: None,
            transaction_data: TransactionData::Absent,
        })
    }

    pub async fn transaction(&self, id: i32) -> Transaction {
        use crate::application::ports::Storage as _;
        self.storage
            .get_transaction(TENANT, id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn station(&self) -> ChargingStation {
        use crate::application::ports::Storage as _;
        self.storage
            .get_station(TENANT, STATION)
            .await
            .unwrap()
            .unwrap()
    }
}
