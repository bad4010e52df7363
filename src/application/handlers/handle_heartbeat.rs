//! Heartbeat handler

use tracing::debug;

use crate::application::context::OcppHeader;
use crate::application::normalizer::OcppResponse;
use crate::domain::DomainResult;

use super::OcppHandler;

pub async fn handle(handler: &OcppHandler, header: &OcppHeader) -> DomainResult<OcppResponse> {
    let now = handler.clock.now();

    // Hot path: a compact last-seen write, no full station rewrite
    handler
        .storage
        .save_station_last_seen(&header.tenant_id, &header.charge_box_id, now)
        .await?;

    debug!(
        charge_box_id = header.charge_box_id.as_str(),
        "Heartbeat"
    );

    Ok(OcppResponse::Heartbeat { current_time: now })
}
