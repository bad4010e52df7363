//! Derived consumption intervals
//!
//! One `Consumption` per interval between two adjacent energy register
//! readings; totals roll up into the transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Origin of the charging limit in force during an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitSource {
    /// A smart-charging profile is actively limiting the session
    ChargingProfile,
    /// The connector's static amperage limit
    Connector,
}

/// Pricing snapshot attached by the pricing integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub amount: Decimal,
    pub rounded_amount: Decimal,
    pub cumulated_amount: Decimal,
    pub currency_code: String,
    pub source: String,
}

/// One derived consumption interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    pub transaction_id: i32,
    pub charge_box_id: String,
    pub connector_id: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Energy delivered during this interval (Wh, never negative)
    pub consumption_wh: f64,
    pub instant_watts: f64,
    pub instant_amps: f64,
    /// Meter reading minus `meter_start` at the end of the interval
    pub cumulated_consumption_wh: f64,
    pub total_inactivity_secs: i64,
    pub state_of_charge: Option<u8>,
    pub limit_source: Option<LimitSource>,
    pub limit_amps: Option<f64>,
    pub pricing: Option<PricingSnapshot>,
}

impl Consumption {
    pub fn duration_secs(&self) -> i64 {
        self.ended_at
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    pub fn is_idle(&self) -> bool {
        self.consumption_wh == 0.0
    }
}
