//! Charging engine: consumption derivation, authorization, end-of-charge.

pub mod authorization;
pub mod consumption;
pub mod end_of_charge;

pub use authorization::{
    resolve as resolve_authorization, resolve_for_start as resolve_start_authorization,
    Authorization,
};
pub use consumption::{ConsumptionBuilder, ProcessedMeterValues};
pub use end_of_charge::{ChargeNotification, EndOfChargePolicy};
