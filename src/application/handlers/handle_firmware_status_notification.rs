//! FirmwareStatusNotification handler

use crate::application::context::OcppHeader;
use crate::application::normalizer::OcppResponse;
use crate::domain::DomainResult;

use super::{acknowledge, OcppHandler};

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    status: &str,
) -> DomainResult<OcppResponse> {
    let now = handler.clock.now();
    handler
        .storage
        .save_station_last_seen(&header.tenant_id, &header.charge_box_id, now)
        .await?;
    acknowledge(header, "FirmwareStatusNotification", status);
    Ok(OcppResponse::FirmwareStatusNotification)
}
