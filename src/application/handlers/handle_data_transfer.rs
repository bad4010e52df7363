//! DataTransfer handler
//!
//! Vendor-specific payloads are acknowledged and logged; the core does not
//! interpret them.

use tracing::info;

use crate::application::context::OcppHeader;
use crate::application::normalizer::{DataTransfer, DataTransferResult, OcppResponse};
use crate::domain::DomainResult;

use super::OcppHandler;

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: DataTransfer,
) -> DomainResult<OcppResponse> {
    // Station must be known; the response itself is always Accepted
    let (_, station) = handler.load_tenant_and_station(header).await?;

    info!(
        charge_box_id = station.id.as_str(),
        vendor_id = payload.vendor_id.as_str(),
        message_id = ?payload.message_id,
        "DataTransfer"
    );

    Ok(OcppResponse::DataTransfer {
        status: DataTransferResult::Accepted,
        data: None,
    })
}
