//! Long-running application services.

mod heartbeat_monitor;

pub use heartbeat_monitor::HeartbeatMonitor;
