//! MeterValues handler
//!
//! Persists the raw normalized rows, feeds them to the consumption builder,
//! prices/bills each derived interval, mirrors the running totals onto the
//! connector, and evaluates the end-of-charge policy.

use tracing::{debug, info, warn};

use crate::application::charging::{ChargeNotification, ConsumptionBuilder, EndOfChargePolicy};
use crate::application::context::OcppHeader;
use crate::application::normalizer::{MeterValues, OcppResponse};
use crate::application::ports::{RoamingAction, SessionAction};
use crate::domain::{DomainResult, Transaction};

use super::OcppHandler;

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: MeterValues,
) -> DomainResult<OcppResponse> {
    let (tenant, mut station) = handler.load_tenant_and_station(header).await?;
    let now = handler.clock.now();

    // Audit trail first: every row is kept even when no transaction matches
    for value in &payload.values {
        handler
            .storage
            .save_meter_value(&tenant.id, &station.id, value.clone())
            .await?;
    }

    // Some firmwares omit transactionId; fall back to the connector's active
    // transaction
    let transaction = match payload.transaction_id {
        Some(id) if id > 0 => handler.storage.get_transaction(&tenant.id, id).await?,
        _ => {
            handler
                .storage
                .get_active_transaction(&tenant.id, &station.id, payload.connector_id)
                .await?
        }
    };
    let Some(mut transaction) = transaction else {
        warn!(
            charge_box_id = station.id.as_str(),
            connector_id = payload.connector_id,
            "MeterValues without a matching transaction"
        );
        station.last_seen = now;
        handler.storage.save_station(station).await?;
        return Ok(OcppResponse::MeterValues);
    };
    if transaction.stop.is_some() {
        debug!(
            charge_box_id = station.id.as_str(),
            transaction_id = transaction.id,
            "MeterValues for an already-stopped transaction, stored only"
        );
        station.last_seen = now;
        handler.storage.save_station(station).await?;
        return Ok(OcppResponse::MeterValues);
    }

    info!(
        charge_box_id = station.id.as_str(),
        connector_id = payload.connector_id,
        transaction_id = transaction.id,
        samples = payload.values.len(),
        "MeterValues"
    );

    let processed = {
        let builder = ConsumptionBuilder::new(&station);
        builder.process(&mut transaction, &payload.values)
    };
    if processed.ignored_after_end > 0 {
        warn!(
            charge_box_id = station.id.as_str(),
            transaction_id = transaction.id,
            ignored = processed.ignored_after_end,
            "Ignored clock values after the transaction end frame"
        );
    }

    for mut consumption in processed.consumptions {
        handler
            .price_soft(SessionAction::Update, &mut transaction, &mut consumption)
            .await;
        handler.storage.save_consumption(consumption).await?;
    }
    handler.bill_soft(SessionAction::Update, &transaction).await;

    transaction.current_inactivity_status = handler.inactivity.classify(
        &station,
        transaction.connector_id,
        transaction.current_total_inactivity_secs,
    );

    // First complete reading with known phases re-triggers the optimizer
    if processed.phases_detected && tenant.features.smart_charging {
        handler.schedule_smart_charging(
            &tenant.id,
            station.site_area_id.as_deref(),
            handler.config.jobs.smart_charging_delay_ms,
        );
    }

    evaluate_end_of_charge(handler, &tenant.id, &mut transaction).await?;

    handler.storage.save_transaction(transaction.clone()).await?;

    OcppHandler::mirror_transaction_on_connector(&mut station, &transaction);
    station.last_seen = now;
    handler.storage.save_station(station.clone()).await?;

    if let Some(roaming_session) = transaction.roaming.clone() {
        handler
            .roaming_session_soft(
                roaming_session.protocol,
                RoamingAction::Update,
                &mut transaction,
                &station,
            )
            .await;
        handler.storage.save_transaction(transaction.clone()).await?;
    }

    Ok(OcppResponse::MeterValues)
}

async fn evaluate_end_of_charge(
    handler: &OcppHandler,
    tenant_id: &str,
    transaction: &mut Transaction,
) -> DomainResult<()> {
    let policy = EndOfChargePolicy {
        end_of_charge_enabled: handler.config.notifications.end_of_charge_enabled,
        optimal_charge_enabled: handler.config.notifications.before_end_of_charge_enabled,
        optimal_charge_percent: handler.config.notifications.before_end_of_charge_percent,
        ..EndOfChargePolicy::default()
    };

    let recent = handler
        .storage
        .list_consumptions(tenant_id, transaction.id)
        .await?;

    match policy.evaluate(transaction, &recent) {
        Some(ChargeNotification::EndOfCharge) => {
            transaction.notified_end_of_charge = true;
            handler.notify_end_of_charge(transaction);
        }
        Some(ChargeNotification::OptimalChargeReached) => {
            transaction.notified_optimal_charge = true;
            handler.notify_optimal_charge(transaction);
        }
        None => {}
    }
    Ok(())
}
