//! Side-effect dispatcher
//!
//! Pricing and billing run inline with bounded timeouts and fail soft.
//! Roaming CDR pushes are serialized behind a per-transaction named lock.
//! Smart charging and the post-boot configuration push are deferred onto the
//! scheduler. Notifications are fire-and-forget.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::application::ports::{RoamingAction, SessionAction};
use crate::domain::{
    ChargingStation, Consumption, DomainResult, RoamingProtocol, Transaction,
};

use super::OcppHandler;

/// TTL of the CDR dedup lock
const CDR_LOCK_TTL: Duration = Duration::from_secs(60);
/// Max hold of the smart-charging lock
const SMART_CHARGING_LOCK_TTL: Duration = Duration::from_secs(30);

impl OcppHandler {
    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.jobs.per_call_timeout_ms)
    }

    async fn soft<T>(
        &self,
        service: &'static str,
        fut: impl Future<Output = DomainResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.call_timeout(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(service, error = %e, "Integration failed (soft)");
                None
            }
            Err(_) => {
                warn!(service, "Integration timed out (soft)");
                None
            }
        }
    }

    /// Price a consumption; failures are logged and swallowed.
    pub(crate) async fn price_soft(
        &self,
        action: SessionAction,
        transaction: &mut Transaction,
        consumption: &mut Consumption,
    ) {
        let pricing = self.pricing.clone();
        self.soft("pricing", pricing.price(action, transaction, consumption))
            .await;
    }

    /// Bill the transaction; failures are logged and swallowed.
    pub(crate) async fn bill_soft(&self, action: SessionAction, transaction: &Transaction) {
        let billing = self.billing.clone();
        self.soft("billing", billing.bill(action, transaction)).await;
    }

    /// Forward a session event to the roaming bridge; failures are soft.
    pub(crate) async fn roaming_session_soft(
        &self,
        protocol: RoamingProtocol,
        action: RoamingAction,
        transaction: &mut Transaction,
        station: &ChargingStation,
    ) {
        let roaming = self.roaming.clone();
        self.soft(
            "roaming",
            roaming.process_session(protocol, action, transaction, station),
        )
        .await;
    }

    /// Push the CDR exactly once, serialized behind the named lock
    /// `(tenant, "<proto>-cdr", transactionId)`. Without the lock, or when
    /// the CDR was already pushed, this is a silent no-op.
    pub(crate) async fn push_cdr_locked(
        &self,
        transaction: &mut Transaction,
        station: &ChargingStation,
    ) -> DomainResult<()> {
        let Some(roaming_session) = transaction.roaming.clone() else {
            return Ok(());
        };
        if roaming_session.cdr_pushed {
            return Ok(());
        }

        let lock_name = format!(
            "{}-{}",
            roaming_session.protocol.cdr_lock_name(),
            transaction.id
        );
        let Some(handle) = self
            .locks
            .acquire(&transaction.tenant_id, &lock_name, CDR_LOCK_TTL)
            .await
        else {
            debug!(
                transaction_id = transaction.id,
                lock = lock_name.as_str(),
                "CDR lock held elsewhere, skipping push"
            );
            return Ok(());
        };

        // Re-read under the lock: a concurrent holder may have pushed already
        let result = match self
            .storage
            .get_transaction(&transaction.tenant_id, transaction.id)
            .await?
        {
            Some(fresh) if fresh.roaming.as_ref().is_some_and(|r| r.cdr_pushed) => {
                debug!(transaction_id = transaction.id, "CDR already pushed");
                Ok(())
            }
            _ => {
                let roaming = self.roaming.clone();
                let pushed = self
                    .soft(
                        "roaming-cdr",
                        roaming.push_cdr(roaming_session.protocol, transaction, station),
                    )
                    .await
                    .is_some();
                if pushed {
                    if let Some(session) = transaction.roaming.as_mut() {
                        session.cdr_pushed = true;
                    }
                    self.storage.save_transaction(transaction.clone()).await?;
                    info!(
                        transaction_id = transaction.id,
                        protocol = ?roaming_session.protocol,
                        "CDR pushed"
                    );
                }
                Ok(())
            }
        };

        self.locks.release(handle).await;
        result
    }

    /// Best-effort connector status push to the roaming peers.
    pub(crate) async fn push_connector_status_soft(
        &self,
        protocol: RoamingProtocol,
        station: &ChargingStation,
        connector_id: u32,
    ) {
        let Some(connector) = station.connector(connector_id) else {
            return;
        };
        let roaming = self.roaming.clone();
        self.soft(
            "roaming-status",
            roaming.push_connector_status(protocol, station, connector),
        )
        .await;
    }

    /// Defer a smart-charging recomputation for the site area, behind the
    /// `(tenant, "smart-charging", siteAreaId)` lock. Contention skips.
    pub(crate) fn schedule_smart_charging(
        &self,
        tenant_id: &str,
        site_area_id: Option<&str>,
        delay_ms: u64,
    ) {
        let Some(site_area_id) = site_area_id else {
            return;
        };
        let tenant_id = tenant_id.to_string();
        let site_area_id = site_area_id.to_string();
        let locks = self.locks.clone();
        let smart_charging = self.smart_charging.clone();

        self.scheduler.submit_after(
            Duration::from_millis(delay_ms),
            "smart-charging",
            async move {
                let lock_name = format!("smart-charging-{site_area_id}");
                let Some(handle) = locks
                    .acquire(&tenant_id, &lock_name, SMART_CHARGING_LOCK_TTL)
                    .await
                else {
                    debug!(
                        site_area_id = site_area_id.as_str(),
                        "Smart-charging lock held elsewhere, skipping"
                    );
                    return;
                };
                if let Err(e) = smart_charging
                    .compute_and_apply(&tenant_id, &site_area_id)
                    .await
                {
                    warn!(site_area_id = site_area_id.as_str(), error = %e, "Smart-charging recomputation failed");
                }
                locks.release(handle).await;
            },
        );
    }

    /// Defer the post-boot configuration push: set the heartbeat interval
    /// (both key spellings, success on either), then the template keys.
    pub(crate) fn schedule_post_boot_config(
        &self,
        tenant_id: &str,
        station_id: &str,
        interval_secs: i64,
        template_keys: Vec<(String, String)>,
    ) {
        let tenant_id = tenant_id.to_string();
        let station_id = station_id.to_string();
        let commands = self.commands.clone();
        let delay = Duration::from_millis(self.config.jobs.post_boot_config_delay_ms);

        self.scheduler.submit_after(delay, "post-boot-config", async move {
            let mut interval_set = false;
            for key in ["HeartBeatInterval", "HeartbeatInterval"] {
                let payload = serde_json::json!({
                    "key": key,
                    "value": interval_secs.to_string(),
                });
                match commands
                    .send(&tenant_id, &station_id, "ChangeConfiguration", payload)
                    .await
                {
                    Ok(_) => {
                        interval_set = true;
                        break;
                    }
                    Err(e) => {
                        debug!(
                            charge_box_id = station_id.as_str(),
                            key,
                            error = %e,
                            "Heartbeat interval key not accepted"
                        );
                    }
                }
            }
            if !interval_set {
                // Both spellings failed; the boot stays accepted regardless
                error!(
                    charge_box_id = station_id.as_str(),
                    "Failed to set heartbeat interval under either key spelling"
                );
            }

            for (key, value) in template_keys {
                let payload = serde_json::json!({ "key": key, "value": value });
                if let Err(e) = commands
                    .send(&tenant_id, &station_id, "ChangeConfiguration", payload)
                    .await
                {
                    warn!(
                        charge_box_id = station_id.as_str(),
                        key = key.as_str(),
                        error = %e,
                        "Template configuration key push failed"
                    );
                }
            }
        });
    }

    /// Run a notification in the background, swallowing any failure.
    pub(crate) fn spawn_notification<F>(&self, kind: &'static str, fut: F)
    where
        F: Future<Output = DomainResult<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                debug!(kind, error = %e, "Notification failed (ignored)");
            }
        });
    }

    pub(crate) fn notify_session_started(&self, transaction: &Transaction) {
        let notifications = self.notifications.clone();
        let transaction = transaction.clone();
        self.spawn_notification("session-started", async move {
            notifications.session_started(&transaction).await
        });
    }

    pub(crate) fn notify_end_of_session(&self, transaction: &Transaction) {
        let notifications = self.notifications.clone();
        let transaction = transaction.clone();
        self.spawn_notification("end-of-session", async move {
            notifications.end_of_session(&transaction).await
        });
    }

    pub(crate) fn notify_end_of_signed_session(&self, transaction: &Transaction) {
        let notifications = self.notifications.clone();
        let transaction = transaction.clone();
        self.spawn_notification("end-of-signed-session", async move {
            notifications.end_of_signed_session(&transaction).await
        });
    }

    pub(crate) fn notify_end_of_charge(&self, transaction: &Transaction) {
        let notifications = self.notifications.clone();
        let transaction = transaction.clone();
        self.spawn_notification("end-of-charge", async move {
            notifications.end_of_charge(&transaction).await
        });
    }

    pub(crate) fn notify_optimal_charge(&self, transaction: &Transaction) {
        let notifications = self.notifications.clone();
        let transaction = transaction.clone();
        self.spawn_notification("optimal-charge", async move {
            notifications.optimal_charge_reached(&transaction).await
        });
    }

    pub(crate) fn notify_station_registered(&self, station: &ChargingStation) {
        let notifications = self.notifications.clone();
        let station = station.clone();
        self.spawn_notification("station-registered", async move {
            notifications.station_registered(&station).await
        });
    }

    pub(crate) fn notify_status_error(
        &self,
        station: &ChargingStation,
        connector_id: u32,
        error_code: &str,
    ) {
        let notifications = self.notifications.clone();
        let station = station.clone();
        let error_code = error_code.to_string();
        self.spawn_notification("status-error", async move {
            notifications
                .status_error(&station, connector_id, &error_code)
                .await
        });
    }
}
