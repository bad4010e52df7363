//! Use-case layer: the protocol normalizer, the OCPP message handlers, the
//! charging engine, the ports to external collaborators, and long-running
//! services.

pub mod charging;
pub mod context;
pub mod handlers;
pub mod normalizer;
pub mod ports;
pub mod services;

pub use context::OcppHeader;
pub use handlers::{OcppHandler, SharedOcppHandler};
