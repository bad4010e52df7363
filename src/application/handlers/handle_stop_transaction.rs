//! StopTransaction handler
//!
//! Also the engine behind soft stops: the recovery path and central-system
//! remote stops reuse `execute_stop` with synthesized parameters.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::application::charging::{resolve_authorization, ConsumptionBuilder};
use crate::application::context::OcppHeader;
use crate::application::normalizer::{
    IdTagStatus, OcppResponse, StopTransaction, TransactionData,
};
use crate::application::ports::{RoamingAction, SessionAction};
use crate::domain::{
    ChargingStation, DomainError, DomainResult, MeterReading, MeterValueAttributes,
    NormalizedMeterValue, PricingSnapshot, ReadingContext, Tenant, Transaction, TransactionStop,
};

use super::{OcppHandler, REMOTE_STOP_WINDOW_SECS};

/// Who is stopping the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// The station sent a StopTransaction message
    Station,
    /// Central-system soft stop (recovery, remote stop); skips tag
    /// authorization and synthesizes `meterStop` when absent
    Soft,
}

/// Parameters of a stop, from the wire or synthesized
#[derive(Debug, Clone)]
pub struct StopParams {
    pub id_tag: Option<String>,
    /// `None` synthesizes the last known cumulative reading
    pub meter_stop: Option<f64>,
    /// `None` uses the server wallclock
    pub timestamp: Option<DateTime<Utc>>,
    pub transaction_data: TransactionData,
    pub mode: StopMode,
}

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: StopTransaction,
) -> DomainResult<OcppResponse> {
    // Some firmwares send transactionId=0 end frames; acknowledge and move on
    if payload.transaction_id == 0 {
        warn!(
            charge_box_id = header.charge_box_id.as_str(),
            "StopTransaction with transactionId=0 ignored"
        );
        return Ok(OcppResponse::StopTransaction {
            status: IdTagStatus::Accepted,
        });
    }

    let (tenant, mut station) = handler.load_tenant_and_station(header).await?;

    if payload.transaction_data.is_mismatched() {
        return Err(DomainError::Validation(format!(
            "transactionData does not match the declared {} payload shape",
            station.ocpp_version
        )));
    }

    let mut transaction = handler
        .storage
        .get_transaction(&tenant.id, payload.transaction_id)
        .await?
        .ok_or(DomainError::TransactionNotFound(payload.transaction_id))?;
    if transaction.stop.is_some() {
        return Err(DomainError::TransactionAlreadyStopped(transaction.id));
    }

    execute_stop(
        handler,
        &tenant,
        &mut station,
        &mut transaction,
        StopParams {
            id_tag: payload.id_tag,
            meter_stop: Some(payload.meter_stop),
            timestamp: Some(payload.timestamp),
            transaction_data: payload.transaction_data,
            mode: StopMode::Station,
        },
    )
    .await?;

    Ok(OcppResponse::StopTransaction {
        status: IdTagStatus::Accepted,
    })
}

/// Close a transaction: resolve the stopper tag, free the connector, derive
/// the closing consumption, write the stop block once, fan out.
pub(crate) async fn execute_stop(
    handler: &OcppHandler,
    tenant: &Tenant,
    station: &mut ChargingStation,
    transaction: &mut Transaction,
    params: StopParams,
) -> DomainResult<()> {
    let now = handler.clock.now();
    let stop_timestamp = params.timestamp.unwrap_or(now);

    // A central remote stop issued moments ago supplies the stopper tag
    let stopper_tag = match transaction.remote_stop_within(now, REMOTE_STOP_WINDOW_SECS) {
        Some(remote) => remote.tag_id.clone(),
        None => params
            .id_tag
            .clone()
            .unwrap_or_else(|| transaction.tag_id.clone()),
    };

    let mut stop_user_id = transaction.user_id.clone();
    if params.mode == StopMode::Station {
        let authorization = resolve_authorization(
            handler.storage.as_ref(),
            handler.roaming.as_ref(),
            tenant,
            station,
            &stopper_tag,
            now,
        )
        .await;
        if !authorization.is_accepted() {
            return Err(DomainError::Unauthorized {
                tag: stopper_tag,
                reason: format!("stop rejected with {}", authorization.status.as_str()),
            });
        }
        if let Some(user) = authorization.user {
            stop_user_id = Some(user.id);
        }
    }

    // Free the connector; its status follows from the station's own
    // StatusNotification, not from here
    if let Some(connector) = station.connector_mut(transaction.connector_id) {
        if connector.current_transaction_id == transaction.id {
            connector.clear_session();
        }
    }
    station.last_seen = now;
    handler.storage.save_station(station.clone()).await?;

    let meter_stop = params
        .meter_stop
        .unwrap_or_else(|| transaction.last_known_meter());

    // Closing meter values: the wire transactionData plus a synthesized
    // Transaction.End energy row. When the end frame already arrived through
    // MeterValues, the builder ignores the extras, so the closing interval is
    // derived exactly once.
    let mut closing_values = match params.transaction_data {
        TransactionData::Values(values) => values,
        _ => Vec::new(),
    };
    closing_values.push(NormalizedMeterValue {
        connector_id: transaction.connector_id,
        transaction_id: Some(transaction.id),
        timestamp: stop_timestamp,
        attribute: MeterValueAttributes {
            context: ReadingContext::TransactionEnd,
            ..Default::default()
        },
        value: MeterReading::Numeric(meter_stop),
    });

    let processed = {
        let builder = ConsumptionBuilder::new(station);
        builder.process(transaction, &closing_values)
    };

    let mut last_pricing: Option<PricingSnapshot> = None;
    for mut consumption in processed.consumptions {
        handler
            .price_soft(SessionAction::Stop, transaction, &mut consumption)
            .await;
        if consumption.pricing.is_some() {
            last_pricing = consumption.pricing.clone();
        }
        handler.storage.save_consumption(consumption).await?;
    }
    handler.bill_soft(SessionAction::Stop, transaction).await;

    // When the closing rows derived nothing new (the station already sent
    // the end frame), the final price is the last priced interval's
    if last_pricing.is_none() {
        last_pricing = handler
            .storage
            .list_consumptions(&tenant.id, transaction.id)
            .await?
            .iter()
            .rev()
            .find_map(|c| c.pricing.clone());
    }

    let total_duration_secs = stop_timestamp
        .signed_duration_since(transaction.timestamp)
        .num_seconds()
        .max(0);
    let inactivity_status = handler.inactivity.classify(
        station,
        transaction.connector_id,
        transaction.current_total_inactivity_secs,
    );
    transaction.current_inactivity_status = inactivity_status;

    let soc_seen =
        transaction.current_state_of_charge > 0 || transaction.state_of_charge > 0;
    transaction.stop = Some(TransactionStop {
        timestamp: stop_timestamp,
        meter_stop,
        tag_id: stopper_tag,
        user_id: stop_user_id,
        total_consumption_wh: transaction.current_total_consumption_wh,
        total_inactivity_secs: transaction.current_total_inactivity_secs,
        inactivity_status,
        total_duration_secs,
        extra_inactivity_secs: 0,
        extra_inactivity_computed: false,
        state_of_charge: soc_seen.then_some(transaction.current_state_of_charge),
        signed_data: transaction.current_signed_data.clone(),
        price: last_pricing.as_ref().map(|p| p.cumulated_amount),
        rounded_price: last_pricing.as_ref().map(|p| p.cumulated_amount.round_dp(2)),
        price_unit: last_pricing.as_ref().map(|p| p.currency_code.clone()),
        pricing_source: last_pricing.as_ref().map(|p| p.source.clone()),
    });

    // Roaming stop event before the final persist so session mutations land
    if let Some(roaming_session) = transaction.roaming.clone() {
        let station_snapshot = station.clone();
        handler
            .roaming_session_soft(
                roaming_session.protocol,
                RoamingAction::Stop,
                transaction,
                &station_snapshot,
            )
            .await;
    }

    handler.storage.save_transaction(transaction.clone()).await?;

    let soft_stop = params.mode == StopMode::Soft;
    info!(
        charge_box_id = station.id.as_str(),
        transaction_id = transaction.id,
        meter_stop,
        total_consumption_wh = transaction.current_total_consumption_wh,
        total_inactivity_secs = transaction.current_total_inactivity_secs,
        soft_stop,
        "Transaction stopped"
    );
    metrics::gauge!("ocpp_open_transactions").decrement(1.0);

    handler.notify_end_of_session(transaction);
    if transaction
        .stop
        .as_ref()
        .is_some_and(|s| s.signed_data.is_some())
    {
        handler.notify_end_of_signed_session(transaction);
    }

    if tenant.features.smart_charging {
        if let Err(e) = handler.smart_charging.clear_tx_profile(transaction).await {
            warn!(
                transaction_id = transaction.id,
                error = %e,
                "Clearing TX charging profile failed"
            );
        }
        handler.schedule_smart_charging(
            &tenant.id,
            station.site_area_id.as_deref(),
            handler.config.jobs.smart_charging_delay_ms,
        );
    }

    Ok(())
}
