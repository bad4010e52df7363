//! Authorize handler
//!
//! An Authorize is the station asking whether this tag may start a session
//! here, so it runs the same resolution as StartTransaction, site-area
//! assignment predicate included.

use tracing::info;

use crate::application::charging::resolve_start_authorization;
use crate::application::context::OcppHeader;
use crate::application::normalizer::{Authorize, OcppResponse};
use crate::domain::DomainResult;

use super::OcppHandler;

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: Authorize,
) -> DomainResult<OcppResponse> {
    let (tenant, station) = handler.load_tenant_and_station(header).await?;

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

    info!(
        charge_box_id = station.id.as_str(),
        id_tag = payload.id_tag.as_str(),
        status = authorization.status.as_str(),
        "Authorize"
    );

    Ok(OcppResponse::Authorize {
        status: authorization.status,
    })
}
