//! OCPP-J (JSON over WebSocket) ingress carrier

mod commands;
mod connection;
mod registry;
mod server;

pub use commands::{CommandSender, SharedCommandSender};
pub use connection::{Connection, EvictedSession};
pub use registry::{RegisterResult, SessionRegistry, SharedSessionRegistry};
pub use server::OcppServer;
