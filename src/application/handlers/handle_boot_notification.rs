//! BootNotification handler
//!
//! First boot of a new station requires a valid registration token; a
//! re-boot must match the stored vendor/model/serial. Template enrichment
//! and the heartbeat-interval push follow the accepted boot.

use tracing::{info, warn};

use crate::application::context::OcppHeader;
use crate::application::normalizer::{BootNotification, OcppResponse};
use crate::application::ports::BootRecord;
use crate::domain::{ChargingStation, DomainError, DomainResult, OcppTransport, RegistrationStatus};

use super::OcppHandler;

pub async fn handle(
    handler: &OcppHandler,
    header: &OcppHeader,
    payload: BootNotification,
) -> DomainResult<OcppResponse> {
    let tenant = handler.load_tenant(header).await?;
    let now = handler.clock.now();

    info!(
        charge_box_id = header.charge_box_id.as_str(),
        tenant_id = tenant.id.as_str(),
        vendor = payload.charge_point_vendor.as_str(),
        model = payload.charge_point_model.as_str(),
        "BootNotification"
    );

    let existing = handler
        .storage
        .get_station(&tenant.id, &header.charge_box_id)
        .await?;

    let mut station = match existing {
        None => register_new_station(handler, header, &tenant.id, &payload).await?,
        Some(station) => reboot_existing_station(header, station, &payload, now)?,
    };

    // Transport facts are refreshed on every boot
    station.ocpp_version = header.ocpp_version;
    station.ocpp_transport = header.ocpp_transport;
    station.last_reboot = now;
    station.last_seen = now;
    station.current_ip = header.client_ip.clone();
    if header.from_address.is_some() {
        station.endpoint = header.from_address.clone();
    }

    let template = handler.templates.apply(&mut station);
    if template.updated {
        info!(
            charge_box_id = station.id.as_str(),
            template_id = ?station.template_id,
            "Station template applied"
        );
    }

    handler.storage.save_station(station.clone()).await?;
    handler
        .storage
        .save_boot_record(BootRecord {
            tenant_id: tenant.id.clone(),
            charge_box_id: station.id.clone(),
            vendor: payload.charge_point_vendor.clone(),
            model: payload.charge_point_model.clone(),
            serial_number: payload.charge_point_serial_number.clone(),
            firmware_version: payload.firmware_version.clone(),
            timestamp: now,
        })
        .await?;

    let interval_secs = heartbeat_interval_secs(handler, header.ocpp_transport);
    let template_keys = if template.ocpp_standard_updated || template.ocpp_vendor_updated {
        template.configuration_keys
    } else {
        Vec::new()
    };
    handler.schedule_post_boot_config(&tenant.id, &station.id, interval_secs, template_keys);

    handler.notify_station_registered(&station);
    metrics::counter!("ocpp_boots_accepted_total").increment(1);

    Ok(OcppResponse::BootNotification {
        status: RegistrationStatus::Accepted,
        current_time: station.last_reboot,
        interval_secs,
    })
}

fn heartbeat_interval_secs(handler: &OcppHandler, transport: OcppTransport) -> i64 {
    match transport {
        OcppTransport::Soap => handler.config.ocpp.heartbeat_interval_soap_secs,
        OcppTransport::Json => handler.config.ocpp.heartbeat_interval_json_secs,
    }
}

/// First boot: the station must present a valid registration token.
async fn register_new_station(
    handler: &OcppHandler,
    header: &OcppHeader,
    tenant_id: &str,
    payload: &BootNotification,
) -> DomainResult<ChargingStation> {
    let now = handler.clock.now();
    let token_value = header.token.as_deref().ok_or_else(|| {
        DomainError::InvalidRegistrationToken("no token presented by unknown station".into())
    })?;

    let mut token = handler
        .storage
        .get_registration_token(tenant_id, token_value)
        .await?
        .ok_or_else(|| DomainError::InvalidRegistrationToken("token not found".into()))?;
    if !token.is_valid(now) {
        return Err(DomainError::InvalidRegistrationToken(
            "token expired or revoked".into(),
        ));
    }

    let mut station = ChargingStation::new(
        &header.charge_box_id,
        tenant_id,
        &payload.charge_point_vendor,
        &payload.charge_point_model,
        now,
    );
    station.serial_number = payload.charge_point_serial_number.clone();
    station.firmware_version = payload.firmware_version.clone();
    station.registration_status = RegistrationStatus::Accepted;
    station.issuer = true;
    station.site_area_id = token.site_area_id.clone();

    token.last_used_on = Some(now);
    handler.storage.save_registration_token(token).await?;

    info!(
        charge_box_id = station.id.as_str(),
        site_area_id = ?station.site_area_id,
        "New charging station registered by token"
    );

    Ok(station)
}

/// Re-boot: identity attributes must match what was registered.
fn reboot_existing_station(
    header: &OcppHeader,
    mut station: ChargingStation,
    payload: &BootNotification,
    now: chrono::DateTime<chrono::Utc>,
) -> DomainResult<ChargingStation> {
    let mismatch = |field: &'static str| {
        warn!(
            charge_box_id = header.charge_box_id.as_str(),
            field, "Boot attribute mismatch, rejecting"
        );
        DomainError::AttributeMismatch {
            station: header.charge_box_id.clone(),
            field,
        }
    };

    if station.vendor != payload.charge_point_vendor {
        return Err(mismatch("chargePointVendor"));
    }
    if station.model != payload.charge_point_model {
        return Err(mismatch("chargePointModel"));
    }
    if let (Some(stored), Some(reported)) =
        (&station.serial_number, &payload.charge_point_serial_number)
    {
        if stored != reported {
            return Err(mismatch("chargePointSerialNumber"));
        }
    }

    if payload.charge_point_serial_number.is_some() {
        station.serial_number = payload.charge_point_serial_number.clone();
    }
    station.firmware_version = payload.firmware_version.clone();
    station.registration_status = RegistrationStatus::Accepted;
    station.deleted = false;
    station.inactive = false;
    station.last_reboot = now;

    Ok(station)
}
