//! Ports to the external collaborators the core consumes.
//!
//! Each integration sits behind a narrow trait; the core inspects results and
//! logs soft failures instead of letting them escape to the transport.

mod integrations;
mod storage;

pub use integrations::{
    BillingPort, InactivityClassifier, LockHandle, LockService, NotificationPort, PricingPort,
    RoamingAction, RoamingPort, SessionAction, SiteAuthorizationPort, SmartChargingPort,
    StationCommandPort, TemplateApplied, TemplateCatalog,
};
pub use storage::{BootRecord, Storage};
