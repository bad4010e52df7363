//! StatusNotification handler: the per-connector state machine
//!
//! All transitions are legal (firmware reality); policies act on the
//! interesting ones: recovery on Available-with-transaction, extra
//! inactivity and the CDR push on Available-after-stop, smart charging on
//! entering Charging/SuspendedEV, admin notification on Faulted.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::application::context::OcppHeader;
use crate::application::normalizer::{OcppResponse, StatusNotification};
use crate::domain::{
    ChargingStation, Consumption, ConnectorStatus, DomainResult, Tenant,
};

use super::{recovery, OcppHandler};

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: StatusNotification,
) -> DomainResult<OcppResponse> {
    let (tenant, mut station) = handler.load_tenant_and_station(header).await?;
    let now = handler.clock.now();

    // Connector 0 is the station itself; informational only
    if payload.connector_id == 0 {
        info!(
            charge_box_id = station.id.as_str(),
            status = %payload.status,
            error_code = payload.error_code.as_str(),
            "Station-level StatusNotification"
        );
        return Ok(OcppResponse::StatusNotification);
    }

    let notification_timestamp = payload.timestamp.unwrap_or(now);

    let is_new = station.connector(payload.connector_id).is_none();
    if is_new {
        station.ensure_connector(payload.connector_id);
        // Template enrichment knows the types/power of the new connector
        handler.templates.apply(&mut station);
        info!(
            charge_box_id = station.id.as_str(),
            connector_id = payload.connector_id,
            "Connector created from StatusNotification"
        );
    }

    // No-change guard against firmware chatter
    let connector = station
        .connector(payload.connector_id)
        .expect("connector ensured above");
    if !is_new
        && connector.status == payload.status
        && connector.error_code.as_deref() == Some(payload.error_code.as_str())
        && connector.info == payload.info
    {
        debug!(
            charge_box_id = station.id.as_str(),
            connector_id = payload.connector_id,
            status = %payload.status,
            "StatusNotification without change, not persisted"
        );
        return Ok(OcppResponse::StatusNotification);
    }

    if payload.status == ConnectorStatus::Available {
        if connector.has_active_transaction() {
            // ABB-class bug: Available while a session is still attached
            recovery::stop_or_delete_active_transactions(
                handler,
                &tenant,
                &mut station,
                payload.connector_id,
            )
            .await?;
        }
        compute_extra_inactivity(
            handler,
            &tenant,
            &mut station,
            payload.connector_id,
            notification_timestamp,
        )
        .await?;
    }

    let previous_status = station
        .connector(payload.connector_id)
        .map(|c| c.status)
        .unwrap_or_default();
    {
        let connector = station
            .connector_mut(payload.connector_id)
            .expect("connector ensured above");
        connector.status = payload.status;
        connector.error_code = Some(payload.error_code.clone());
        connector.info = payload.info.clone();
        connector.vendor_error_code = payload.vendor_error_code.clone();
        connector.status_last_changed_on = Some(notification_timestamp);
    }
    station.sort_connectors();
    station.last_seen = now;
    handler.storage.save_station(station.clone()).await?;

    info!(
        charge_box_id = station.id.as_str(),
        connector_id = payload.connector_id,
        from = %previous_status,
        to = %payload.status,
        error_code = payload.error_code.as_str(),
        "Connector status changed"
    );

    match payload.status {
        ConnectorStatus::Charging | ConnectorStatus::SuspendedEV => {
            if tenant.features.smart_charging {
                handler.schedule_smart_charging(
                    &tenant.id,
                    station.site_area_id.as_deref(),
                    handler.config.jobs.smart_charging_delay_ms,
                );
            }
        }
        ConnectorStatus::Faulted => {
            handler.notify_status_error(&station, payload.connector_id, &payload.error_code);
        }
        _ => {}
    }

    // Best-effort status push to the roaming peers
    if station.public {
        if let Some(protocol) = tenant.active_roaming_protocol() {
            handler
                .push_connector_status_soft(protocol, &station, payload.connector_id)
                .await;
        }
    }

    Ok(OcppResponse::StatusNotification)
}

/// Available after a completed transaction: the gap between the stop and
/// this notification is billed as extra inactivity, once.
async fn compute_extra_inactivity(
    handler: &OcppHandler,
    tenant: &Tenant,
    station: &mut ChargingStation,
    connector_id: u32,
    notification_timestamp: DateTime<Utc>,
) -> DomainResult<()> {
    let Some(mut transaction) = handler
        .storage
        .get_last_transaction(&tenant.id, &station.id, connector_id)
        .await?
    else {
        return Ok(());
    };

    {
        let Some(stop) = transaction.stop.as_mut() else {
            return Ok(());
        };
        if stop.extra_inactivity_computed {
            return Ok(());
        }

        let extra_secs = notification_timestamp
            .signed_duration_since(stop.timestamp)
            .num_seconds()
            .max(0);
        stop.extra_inactivity_secs = extra_secs;
        stop.total_inactivity_secs += extra_secs;
        stop.extra_inactivity_computed = true;
        stop.inactivity_status =
            handler
                .inactivity
                .classify(station, connector_id, stop.total_inactivity_secs);

        let gap = Consumption {
            transaction_id: transaction.id,
            charge_box_id: station.id.clone(),
            connector_id,
            started_at: stop.timestamp,
            ended_at: notification_timestamp,
            consumption_wh: 0.0,
            instant_watts: 0.0,
            instant_amps: 0.0,
            cumulated_consumption_wh: stop.total_consumption_wh,
            total_inactivity_secs: stop.total_inactivity_secs,
            state_of_charge: stop.state_of_charge,
            limit_source: None,
            limit_amps: None,
            pricing: None,
        };
        handler.storage.save_consumption(gap).await?;

        info!(
            charge_box_id = station.id.as_str(),
            connector_id,
            transaction_id = transaction.id,
            extra_inactivity_secs = extra_secs,
            inactivity_status = ?stop.inactivity_status,
            "Extra inactivity attached to stopped transaction"
        );
    }

    handler.storage.save_transaction(transaction.clone()).await?;

    // The session is final now; push the CDR behind its dedup lock
    handler.push_cdr_locked(&mut transaction, station).await?;

    Ok(())
}
