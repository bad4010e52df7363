//! In-memory implementations of the ports: storage, locks, and the simple
//! integrations used for development and tests. Production deployments swap
//! these for the real document store, distributed locks, and platform
//! bridges behind the same traits.

pub mod integrations;
pub mod locks;
pub mod storage;

pub use integrations::{
    LoggingNotifications, NoopBilling, NoopRoaming, NoopSmartCharging, OpenSiteAuthorization,
    SimpleTariffPricing, StaticTemplateCatalog, ThresholdInactivityClassifier,
    UnconnectedStationCommand,
};
pub use locks::InMemoryLockService;
pub use storage::InMemoryStorage;
