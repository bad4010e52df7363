//! Core business entities and value objects.
//!
//! Entities reference each other by id only (a `Connector` holds a
//! `current_transaction_id`, a `Transaction` holds a `charge_box_id`);
//! aggregate-root loading hydrates what a handler needs.

pub mod consumption;
pub mod meter_value;
pub mod ocpp;
pub mod station;
pub mod tenant;
pub mod token;
pub mod transaction;

pub use consumption::{Consumption, LimitSource, PricingSnapshot};
pub use meter_value::{
    Measurand, MeterLocation, MeterPhase, MeterReading, MeterUnit, MeterValueAttributes,
    NormalizedMeterValue, ReadingContext, ValueFormat,
};
pub use ocpp::{OcppTransport, OcppVersion, RegistrationStatus};
pub use station::{
    ChargingStation, Connector, ConnectorStatus, CurrentType, InactivityStatus,
};
pub use tenant::{Tenant, TenantFeatures};
pub use token::{RegistrationToken, Tag, User, UserStatus};
pub use transaction::{
    LastConsumption, RemoteStop, RoamingProtocol, RoamingSession, Transaction, TransactionStop,
};

pub use crate::support::errors::{DomainError, DomainResult};
