//! StartTransaction handler

use tracing::{info, warn};

use crate::application::charging::resolve_start_authorization;
use crate::application::context::OcppHeader;
use crate::application::normalizer::{IdTagStatus, OcppResponse, StartTransaction};
use crate::application::ports::{RoamingAction, SessionAction};
use crate::domain::{
    Consumption, DomainError, DomainResult, RoamingSession, Transaction,
};

use super::{recovery, OcppHandler};

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: StartTransaction,
) -> DomainResult<OcppResponse> {
    let (tenant, mut station) = handler.load_tenant_and_station(header).await?;

    if payload.connector_id == 0 {
        return Err(DomainError::Validation(
            "StartTransaction on connector 0".into(),
        ));
    }

    let authorization = resolve_start_authorization(
        handler.storage.as_ref(),
        handler.roaming.as_ref(),
        handler.site_authorization.as_ref(),
        &tenant,
        &station,
        &payload.id_tag,
        handler.clock.now(),
    )
    .await;
    if !authorization.is_accepted() {
        info!(
            charge_box_id = station.id.as_str(),
            id_tag = payload.id_tag.as_str(),
            status = authorization.status.as_str(),
            "StartTransaction rejected by authorization"
        );
        return Ok(OcppResponse::StartTransaction {
            transaction_id: 0,
            status: authorization.status,
        });
    }

    // Orphaned sessions on this connector are cleaned up before a new one
    recovery::stop_or_delete_active_transactions(
        handler,
        &tenant,
        &mut station,
        payload.connector_id,
    )
    .await?;

    let transaction_id = handler.storage.next_transaction_id(&tenant.id).await?;

    let mut transaction = Transaction::new(
        transaction_id,
        &tenant.id,
        &station.id,
        payload.connector_id,
        &payload.id_tag,
        payload.meter_start,
        payload.timestamp,
    );
    transaction.site_area_id = station.site_area_id.clone();
    transaction.site_id = station.site_id.clone();

    if let Some(user) = &authorization.user {
        transaction.user_id = Some(user.id.clone());
        if tenant.features.car {
            transaction.car_id = user
                .last_selected_car_id
                .clone()
                .or_else(|| user.default_car_id.clone());
            // The picked car is consumed by this session
            let mut user = user.clone();
            if user.last_selected_car_id.take().is_some() {
                handler.storage.save_user(&tenant.id, user).await?;
            }
        }
    }
    if let Some(authorization_id) = &authorization.roaming_authorization_id {
        if let Some(protocol) = tenant.active_roaming_protocol() {
            transaction.roaming = Some(RoamingSession {
                protocol,
                session_id: uuid::Uuid::new_v4().to_string(),
                authorization_id: Some(authorization_id.clone()),
                cdr_pushed: false,
            });
        }
    }

    let result = start_effects(handler, &tenant, &mut station, &mut transaction).await;
    if let Err(e) = result {
        // Roll back the allocated transaction; the station sees Invalid
        warn!(
            charge_box_id = station.id.as_str(),
            transaction_id,
            error = %e,
            "StartTransaction failed after id allocation, rolling back"
        );
        let _ = handler
            .storage
            .delete_transaction(&tenant.id, transaction_id)
            .await;
        return Ok(OcppResponse::StartTransaction {
            transaction_id: 0,
            status: IdTagStatus::Invalid,
        });
    }

    info!(
        charge_box_id = station.id.as_str(),
        connector_id = payload.connector_id,
        transaction_id,
        id_tag = payload.id_tag.as_str(),
        meter_start = payload.meter_start,
        "Transaction started"
    );
    metrics::gauge!("ocpp_open_transactions").increment(1.0);
    handler.notify_session_started(&transaction);

    Ok(OcppResponse::StartTransaction {
        transaction_id,
        status: IdTagStatus::Accepted,
    })
}

/// Everything after id allocation; failure triggers the rollback above.
async fn start_effects(
    handler: &OcppHandler,
    tenant: &crate::domain::Tenant,
    station: &mut crate::domain::ChargingStation,
    transaction: &mut Transaction,
) -> DomainResult<()> {
    // Synthetic Transaction.Begin consumption carries the initial pricing
    let mut begin_consumption = Consumption {
        transaction_id: transaction.id,
        charge_box_id: transaction.charge_box_id.clone(),
        connector_id: transaction.connector_id,
        started_at: transaction.timestamp,
        ended_at: transaction.timestamp,
        consumption_wh: 0.0,
        instant_watts: 0.0,
        instant_amps: 0.0,
        cumulated_consumption_wh: 0.0,
        total_inactivity_secs: 0,
        state_of_charge: None,
        limit_source: None,
        limit_amps: None,
        pricing: None,
    };
    handler
        .price_soft(SessionAction::Start, transaction, &mut begin_consumption)
        .await;
    handler.bill_soft(SessionAction::Start, transaction).await;
    handler.storage.save_consumption(begin_consumption).await?;

    if let Some(roaming_session) = transaction.roaming.clone() {
        let station_snapshot = station.clone();
        handler
            .roaming_session_soft(
                roaming_session.protocol,
                RoamingAction::Start,
                transaction,
                &station_snapshot,
            )
            .await;
    }

    handler.storage.save_transaction(transaction.clone()).await?;

    station.ensure_connector(transaction.connector_id);
    OcppHandler::mirror_transaction_on_connector(station, transaction);
    station.last_seen = handler.clock.now();
    handler.storage.save_station(station.clone()).await?;

    Ok(())
}
