//! # Voltaris CSMS Core
//!
//! OCPP 1.5/1.6 central system core for an EV charging platform: terminates
//! station messages, drives the per-connector state machine, runs the
//! transaction engine and consumption builder, and fans out to pricing,
//! billing, roaming, smart charging, and notifications through narrow ports.
//!
//! ## Architecture
//!
//! - **support**: Cross-cutting utilities (errors, clock, framing, deferred work)
//! - **domain**: Core business entities and value objects
//! - **application**: Normalizer, message handlers, charging engine, ports
//! - **infrastructure**: In-memory port implementations (dev/test wiring)
//! - **interfaces**: Ingress carriers (OCPP-J WebSocket, OCPP-S HTTP)
//! - **config**: TOML-based application configuration

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod support;

// Re-export commonly used types at crate root
pub use application::handlers::{OcppHandler, SharedOcppHandler};
pub use application::OcppHeader;
pub use config::{default_config_path, AppConfig};
pub use support::errors::{AppError, DomainError, DomainResult};
