//! Simple integration implementations: flat-tariff pricing, a declarative
//! template catalog, threshold inactivity classification, and logging no-ops
//! for the collaborators a development deployment does not have.

mod inactivity;
mod noop;
mod pricing;
mod templates;

pub use inactivity::ThresholdInactivityClassifier;
pub use noop::{
    LoggingNotifications, NoopBilling, NoopRoaming, NoopSmartCharging, OpenSiteAuthorization,
    UnconnectedStationCommand,
};
pub use pricing::SimpleTariffPricing;
pub use templates::StaticTemplateCatalog;
