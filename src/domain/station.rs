//! Charging station and connector entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ocpp::{OcppTransport, OcppVersion, RegistrationStatus};

/// Connector status, exactly the OCPP 1.6 set (1.5 statuses map into it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            // 1.5 statuses "Occupied" and "Unavailable"/"Faulted" overlap 1.6
            "Available" => Some(Self::Available),
            "Preparing" => Some(Self::Preparing),
            "Charging" => Some(Self::Charging),
            "Occupied" => Some(Self::Charging),
            "SuspendedEV" => Some(Self::SuspendedEV),
            "SuspendedEVSE" => Some(Self::SuspendedEVSE),
            "Finishing" => Some(Self::Finishing),
            "Reserved" => Some(Self::Reserved),
            "Unavailable" => Some(Self::Unavailable),
            "Faulted" => Some(Self::Faulted),
            _ => None,
        }
    }
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of current delivered by the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentType {
    AC,
    DC,
}

impl Default for CurrentType {
    fn default() -> Self {
        Self::AC
    }
}

/// Classification of accumulated inactivity on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InactivityStatus {
    Info,
    Warning,
    Error,
}

impl Default for InactivityStatus {
    fn default() -> Self {
        Self::Info
    }
}

/// A single outlet on a charging station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    pub vendor_error_code: Option<String>,
    pub status_last_changed_on: Option<DateTime<Utc>>,
    /// Plug type (Type2, CCS, CHAdeMO, ...) from the station template
    pub connector_type: Option<String>,
    /// Rated power in watts, from the station template
    pub power_watts: f64,
    /// Number of phases wired to this connector (1 or 3 for AC)
    pub number_of_connected_phases: Option<u8>,
    pub amperage_limit: Option<f64>,

    // Live-session fields, zeroed while no transaction is ongoing
    pub current_transaction_id: i32,
    pub current_transaction_date: Option<DateTime<Utc>>,
    pub current_tag_id: Option<String>,
    pub current_user_id: Option<String>,
    pub current_instant_watts: f64,
    pub current_total_consumption_wh: f64,
    pub current_total_inactivity_secs: i64,
    pub current_inactivity_status: Option<InactivityStatus>,
    pub current_state_of_charge: Option<u8>,
}

impl Connector {
    pub fn new(connector_id: u32) -> Self {
        Self {
            connector_id,
            status: ConnectorStatus::Unavailable,
            error_code: None,
            info: None,
            vendor_error_code: None,
            status_last_changed_on: None,
            connector_type: None,
            power_watts: 0.0,
            number_of_connected_phases: None,
            amperage_limit: None,
            current_transaction_id: 0,
            current_transaction_date: None,
            current_tag_id: None,
            current_user_id: None,
            current_instant_watts: 0.0,
            current_total_consumption_wh: 0.0,
            current_total_inactivity_secs: 0,
            current_inactivity_status: None,
            current_state_of_charge: None,
        }
    }

    pub fn has_active_transaction(&self) -> bool {
        self.current_transaction_id > 0
    }

    /// Zero every live-session field (transaction finished or recovered).
    pub fn clear_session(&mut self) {
        self.current_transaction_id = 0;
        self.current_transaction_date = None;
        self.current_tag_id = None;
        self.current_user_id = None;
        self.current_instant_watts = 0.0;
        self.current_total_consumption_wh = 0.0;
        self.current_total_inactivity_secs = 0;
        self.current_inactivity_status = None;
        self.current_state_of_charge = None;
    }
}

/// Charging station entity, keyed by the station-declared ChargeBoxIdentity
/// within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: String,
    pub tenant_id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub ocpp_version: OcppVersion,
    pub ocpp_transport: OcppTransport,
    pub registration_status: RegistrationStatus,
    pub last_reboot: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub current_ip: Option<String>,
    /// SOAP callback endpoint, seeded from the `From.Address` header
    pub endpoint: Option<String>,
    pub site_area_id: Option<String>,
    pub site_id: Option<String>,
    pub current_type: CurrentType,
    /// Template identifier applied on boot (enrichment is idempotent per template)
    pub template_id: Option<String>,
    pub connectors: Vec<Connector>,
    /// Owned locally (true) vs shadowed from a roaming platform (false)
    pub issuer: bool,
    /// Visible to roaming users
    pub public: bool,
    pub deleted: bool,
    /// Set by the heartbeat monitor when `last_seen` falls behind
    pub inactive: bool,
}

impl ChargingStation {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            vendor: vendor.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: OcppTransport::Json,
            registration_status: RegistrationStatus::Pending,
            last_reboot: now,
            last_seen: now,
            current_ip: None,
            endpoint: None,
            site_area_id: None,
            site_id: None,
            current_type: CurrentType::AC,
            template_id: None,
            connectors: Vec::new(),
            issuer: true,
            public: false,
            deleted: false,
            inactive: false,
        }
    }

    pub fn connector(&self, connector_id: u32) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.connector_id == connector_id)
    }

    pub fn connector_mut(&mut self, connector_id: u32) -> Option<&mut Connector> {
        self.connectors
            .iter_mut()
            .find(|c| c.connector_id == connector_id)
    }

    /// Get or create the connector, keeping the list ordered by id.
    pub fn ensure_connector(&mut self, connector_id: u32) -> &mut Connector {
        if self.connector(connector_id).is_none() {
            self.connectors.push(Connector::new(connector_id));
            self.sort_connectors();
        }
        // The connector exists at this point
        self.connectors
            .iter_mut()
            .find(|c| c.connector_id == connector_id)
            .unwrap()
    }

    pub fn sort_connectors(&mut self) {
        self.connectors.sort_by_key(|c| c.connector_id);
    }

    /// Per-phase voltage used for watt/amp conversions when the template did
    /// not say otherwise.
    pub fn voltage(&self) -> f64 {
        match self.current_type {
            CurrentType::AC => 230.0,
            CurrentType::DC => 400.0,
        }
    }
}
