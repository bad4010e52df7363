//! Charging transaction entity
//!
//! A transaction is the aggregate root for billing: it outlives the live
//! session and carries the denormalized totals, the phase-resolved instants,
//! the signed-meter payloads, and the roaming/pricing state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::station::InactivityStatus;

/// Roaming protocols the platform bridges to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoamingProtocol {
    Ocpi,
    Oicp,
}

impl RoamingProtocol {
    /// Name fragment used in the per-transaction CDR lock.
    pub fn cdr_lock_name(&self) -> &'static str {
        match self {
            Self::Ocpi => "ocpi-cdr",
            Self::Oicp => "oicp-cdr",
        }
    }
}

/// Roaming session attached to a transaction started by a remote user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoamingSession {
    pub protocol: RoamingProtocol,
    pub session_id: String,
    pub authorization_id: Option<String>,
    /// Set once the CDR has been pushed; guarded by the CDR lock
    pub cdr_pushed: bool,
}

/// Central remote-stop request recorded against the transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStop {
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Anchor of the consumption builder: last processed energy reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastConsumption {
    pub timestamp: DateTime<Utc>,
    pub cumulated_wh: f64,
}

/// Immutable block written exactly once when the transaction stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStop {
    pub timestamp: DateTime<Utc>,
    pub meter_stop: f64,
    pub tag_id: String,
    pub user_id: Option<String>,
    pub total_consumption_wh: f64,
    pub total_inactivity_secs: i64,
    pub inactivity_status: InactivityStatus,
    pub total_duration_secs: i64,
    pub extra_inactivity_secs: i64,
    pub extra_inactivity_computed: bool,
    pub state_of_charge: Option<u8>,
    pub signed_data: Option<String>,
    pub price: Option<Decimal>,
    pub rounded_price: Option<Decimal>,
    pub price_unit: Option<String>,
    pub pricing_source: Option<String>,
}

/// Charging transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Server-issued dense integer, unique within the tenant
    pub id: i32,
    pub tenant_id: String,
    pub charge_box_id: String,
    pub connector_id: u32,
    pub tag_id: String,
    /// None for unauthenticated roaming sessions
    pub user_id: Option<String>,
    pub car_id: Option<String>,
    pub site_area_id: Option<String>,
    pub site_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub meter_start: f64,

    // Running fields, mirrored onto the connector while the session is live
    pub current_instant_watts: f64,
    pub current_instant_watts_l1: f64,
    pub current_instant_watts_l2: f64,
    pub current_instant_watts_l3: f64,
    pub current_instant_watts_dc: f64,
    pub current_instant_volts: f64,
    pub current_instant_volts_l1: f64,
    pub current_instant_volts_l2: f64,
    pub current_instant_volts_l3: f64,
    pub current_instant_volts_dc: f64,
    pub current_instant_amps: f64,
    pub current_instant_amps_l1: f64,
    pub current_instant_amps_l2: f64,
    pub current_instant_amps_l3: f64,
    pub current_instant_amps_dc: f64,
    pub current_total_consumption_wh: f64,
    pub current_total_inactivity_secs: i64,
    pub current_inactivity_status: InactivityStatus,
    pub current_state_of_charge: u8,
    pub current_cumulated_price: Option<Decimal>,

    /// State of charge reported at Transaction.Begin
    pub state_of_charge: u8,
    pub number_of_meter_values: u32,
    /// 1, 2 or 3 once a phase-tagged meter value arrived
    pub phases_used: Option<u8>,
    /// Signed payload from Transaction.Begin
    pub signed_data: Option<String>,
    /// Signed payload from Transaction.End, copied into the stop block
    pub current_signed_data: Option<String>,
    /// First Transaction.End frame seen: instants were reset once and later
    /// clock values no longer feed consumption
    pub transaction_end_received: bool,
    pub last_consumption: Option<LastConsumption>,

    pub remote_stop: Option<RemoteStop>,
    pub roaming: Option<RoamingSession>,

    // Notification dedup gates
    pub notified_end_of_charge: bool,
    pub notified_optimal_charge: bool,

    pub issuer: bool,
    pub stop: Option<TransactionStop>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i32,
        tenant_id: impl Into<String>,
        charge_box_id: impl Into<String>,
        connector_id: u32,
        tag_id: impl Into<String>,
        meter_start: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            charge_box_id: charge_box_id.into(),
            connector_id,
            tag_id: tag_id.into(),
            user_id: None,
            car_id: None,
            site_area_id: None,
            site_id: None,
            timestamp,
            meter_start,
            current_instant_watts: 0.0,
            current_instant_watts_l1: 0.0,
            current_instant_watts_l2: 0.0,
            current_instant_watts_l3: 0.0,
            current_instant_watts_dc: 0.0,
            current_instant_volts: 0.0,
            current_instant_volts_l1: 0.0,
            current_instant_volts_l2: 0.0,
            current_instant_volts_l3: 0.0,
            current_instant_volts_dc: 0.0,
            current_instant_amps: 0.0,
            current_instant_amps_l1: 0.0,
            current_instant_amps_l2: 0.0,
            current_instant_amps_l3: 0.0,
            current_instant_amps_dc: 0.0,
            current_total_consumption_wh: 0.0,
            current_total_inactivity_secs: 0,
            current_inactivity_status: InactivityStatus::Info,
            current_state_of_charge: 0,
            current_cumulated_price: None,
            state_of_charge: 0,
            number_of_meter_values: 0,
            phases_used: None,
            signed_data: None,
            current_signed_data: None,
            transaction_end_received: false,
            last_consumption: None,
            remote_stop: None,
            roaming: None,
            notified_end_of_charge: false,
            notified_optimal_charge: false,
            issuer: true,
            stop: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stop.is_none()
    }

    /// Anchor for the consumption builder; before the first energy sample it
    /// is the transaction start itself.
    pub fn consumption_anchor(&self) -> LastConsumption {
        self.last_consumption.unwrap_or(LastConsumption {
            timestamp: self.timestamp,
            cumulated_wh: self.meter_start,
        })
    }

    /// Last cumulative meter reading known for this transaction.
    pub fn last_known_meter(&self) -> f64 {
        self.consumption_anchor().cumulated_wh
    }

    /// Zero the instant phase/voltage/amperage/watts/SoC fields. Done once
    /// when the first Transaction.End frame arrives, so the end values
    /// replace rather than accumulate with interim readings.
    pub fn reset_instant_values(&mut self) {
        self.current_instant_watts = 0.0;
        self.current_instant_watts_l1 = 0.0;
        self.current_instant_watts_l2 = 0.0;
        self.current_instant_watts_l3 = 0.0;
        self.current_instant_watts_dc = 0.0;
        self.current_instant_volts = 0.0;
        self.current_instant_volts_l1 = 0.0;
        self.current_instant_volts_l2 = 0.0;
        self.current_instant_volts_l3 = 0.0;
        self.current_instant_volts_dc = 0.0;
        self.current_instant_amps = 0.0;
        self.current_instant_amps_l1 = 0.0;
        self.current_instant_amps_l2 = 0.0;
        self.current_instant_amps_l3 = 0.0;
        self.current_instant_amps_dc = 0.0;
        self.current_state_of_charge = 0;
    }

    /// Whether a central remote stop was issued within `window_secs` of `now`.
    pub fn remote_stop_within(&self, now: DateTime<Utc>, window_secs: i64) -> Option<&RemoteStop> {
        self.remote_stop.as_ref().filter(|rs| {
            let age = now.signed_duration_since(rs.timestamp).num_seconds();
            (0..=window_secs).contains(&age)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_tx() -> Transaction {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Transaction::new(1, "tenant-1", "CS-001", 1, "TAG-001", 1000.0, t0)
    }

    #[test]
    fn new_transaction_is_active() {
        let tx = sample_tx();
        assert!(tx.is_active());
        assert_eq!(tx.meter_start, 1000.0);
        assert_eq!(tx.number_of_meter_values, 0);
        assert!(tx.stop.is_none());
    }

    #[test]
    fn anchor_starts_at_meter_start() {
        let tx = sample_tx();
        let anchor = tx.consumption_anchor();
        assert_eq!(anchor.cumulated_wh, 1000.0);
        assert_eq!(anchor.timestamp, tx.timestamp);
    }

    #[test]
    fn anchor_follows_last_consumption() {
        let mut tx = sample_tx();
        let later = tx.timestamp + chrono::Duration::seconds(60);
        tx.last_consumption = Some(LastConsumption {
            timestamp: later,
            cumulated_wh: 1500.0,
        });
        assert_eq!(tx.consumption_anchor().cumulated_wh, 1500.0);
        assert_eq!(tx.last_known_meter(), 1500.0);
    }

    #[test]
    fn reset_instant_values_clears_phase_fields() {
        let mut tx = sample_tx();
        tx.current_instant_watts = 7000.0;
        tx.current_instant_amps_l2 = 16.0;
        tx.current_instant_volts_dc = 400.0;
        tx.current_state_of_charge = 55;

        tx.reset_instant_values();
        assert_eq!(tx.current_instant_watts, 0.0);
        assert_eq!(tx.current_instant_amps_l2, 0.0);
        assert_eq!(tx.current_instant_volts_dc, 0.0);
        assert_eq!(tx.current_state_of_charge, 0);
    }

    #[test]
    fn remote_stop_window() {
        let mut tx = sample_tx();
        let now = tx.timestamp + chrono::Duration::seconds(600);
        tx.remote_stop = Some(RemoteStop {
            tag_id: "OPERATOR".into(),
            timestamp: now - chrono::Duration::seconds(30),
        });
        assert!(tx.remote_stop_within(now, 60).is_some());
        assert!(tx.remote_stop_within(now + chrono::Duration::seconds(120), 60).is_none());
    }

    #[test]
    fn cdr_lock_names_differ_per_protocol() {
        assert_eq!(RoamingProtocol::Ocpi.cdr_lock_name(), "ocpi-cdr");
        assert_eq!(RoamingProtocol::Oicp.cdr_lock_name(), "oicp-cdr");
    }
}
