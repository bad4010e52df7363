//! Heartbeat monitor
//!
//! Periodic sweep comparing every station's `last_seen` against the
//! configured online/offline boundary. Crossing the boundary flips the
//! station's `inactive` marker and emits a best-effort offline notification;
//! a station that reports back in is flipped online again silently.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::ports::{NotificationPort, Storage};
use crate::domain::DomainResult;
use crate::support::clock::SharedClock;
use crate::support::shutdown::ShutdownSignal;

const CHECK_INTERVAL_SECS: u64 = 60;

/// Periodic last-seen sweep
pub struct HeartbeatMonitor {
    storage: Arc<dyn Storage>,
    notifications: Arc<dyn NotificationPort>,
    clock: SharedClock,
    max_last_seen_interval_secs: i64,
}

impl HeartbeatMonitor {
    pub fn new(
        storage: Arc<dyn Storage>,
        notifications: Arc<dyn NotificationPort>,
        clock: SharedClock,
        max_last_seen_interval_secs: i64,
    ) -> Self {
        Self {
            storage,
            notifications,
            clock,
            max_last_seen_interval_secs,
        }
    }

    /// Spawn the sweep loop; it runs until the shutdown signal fires.
    pub fn start(self: Arc<Self>, shutdown: ShutdownSignal) {
        tokio::spawn(async move {
            info!(
                max_last_seen_interval_secs = self.max_last_seen_interval_secs,
                "Heartbeat monitor started"
            );
            let mut ticker = tokio::time::interval(Duration::from_secs(CHECK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "Heartbeat sweep failed");
                        }
                    }
                    _ = shutdown.wait() => {
                        info!("Heartbeat monitor stopped");
                        return;
                    }
                }
            }
        });
    }

    /// One pass over every station of every tenant.
    pub async fn sweep(&self) -> DomainResult<()> {
        let now = self.clock.now();
        for tenant in self.storage.list_tenants().await? {
            for mut station in self.storage.list_stations(&tenant.id).await? {
                let silence_secs = now.signed_duration_since(station.last_seen).num_seconds();
                let silent_too_long = silence_secs > self.max_last_seen_interval_secs;

                if silent_too_long && !station.inactive {
                    warn!(
                        charge_box_id = station.id.as_str(),
                        silence_secs, "Station went offline"
                    );
                    station.inactive = true;
                    self.storage.save_station(station.clone()).await?;
                    if let Err(e) = self.notifications.station_offline(&station).await {
                        debug!(
                            charge_box_id = station.id.as_str(),
                            error = %e,
                            "Offline notification failed (ignored)"
                        );
                    }
                } else if !silent_too_long && station.inactive {
                    info!(charge_box_id = station.id.as_str(), "Station back online");
                    station.inactive = false;
                    self.storage.save_station(station).await?;
                }
            }
        }
        Ok(())
    }
}
