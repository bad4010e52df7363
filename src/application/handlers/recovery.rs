//! Active-transaction cleanup
//!
//! Invoked on StartTransaction, and on a StatusNotification that reports
//! `Available` while the connector still carries a transaction (the
//! ABB-class firmware bug). Sessions with no consumption are deleted;
//! sessions with consumption are soft-stopped at their last known reading.

use tracing::{info, warn};

use crate::application::normalizer::TransactionData;
use crate::domain::{ChargingStation, DomainResult, Tenant};

use super::handle_stop_transaction::{execute_stop, StopMode, StopParams};
use super::OcppHandler;

/// Stop or delete every transaction still open on `(station, connector)`.
pub async fn stop_or_delete_active_transactions(
    handler: &OcppHandler,
    tenant: &Tenant,
    station: &mut ChargingStation,
    connector_id: u32,
) -> DomainResult<()> {
    let mut last_seen_id = 0;
    loop {
        let Some(mut transaction) = handler
            .storage
            .get_active_transaction(&tenant.id, &station.id, connector_id)
            .await?
        else {
            break;
        };

        // Fixed-point guard: seeing the same id twice means neither the stop
        // nor the delete took effect, bail instead of spinning
        if transaction.id == last_seen_id {
            warn!(
                charge_box_id = station.id.as_str(),
                connector_id,
                transaction_id = transaction.id,
                "Cleanup made no progress, aborting"
            );
            break;
        }
        last_seen_id = transaction.id;

        if transaction.current_total_consumption_wh <= 0.0 {
            info!(
                charge_box_id = station.id.as_str(),
                connector_id,
                transaction_id = transaction.id,
                "Deleting empty orphaned transaction"
            );
            handler
                .storage
                .delete_transaction(&tenant.id, transaction.id)
                .await?;
            if let Some(connector) = station.connector_mut(connector_id) {
                if connector.current_transaction_id == transaction.id {
                    connector.clear_session();
                }
            }
            handler.storage.save_station(station.clone()).await?;
        } else {
            info!(
                charge_box_id = station.id.as_str(),
                connector_id,
                transaction_id = transaction.id,
                consumption_wh = transaction.current_total_consumption_wh,
                "Soft-stopping orphaned transaction"
            );
            execute_stop(
                handler,
                tenant,
                station,
                &mut transaction,
                StopParams {
                    id_tag: None,
                    meter_stop: None,
                    timestamp: None,
                    transaction_data: TransactionData::Absent,
                    mode: StopMode::Soft,
                },
            )
            .await?;
        }
    }
    Ok(())
}
