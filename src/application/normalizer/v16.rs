//! OCPP 1.6 (JSON) decoding and response encoding
//!
//! Simple payloads go through the `rust_ocpp` wire types. Meter values are
//! decoded by hand so unknown measurand/context strings survive unchanged
//! (forward compatibility) instead of failing enum deserialization.

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::authorize::AuthorizeRequest;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionResponse;
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, ChargePointStatus, DataTransferStatus, IdTagInfo, RegistrationStatus,
};
use serde_json::Value;

use crate::domain::{
    ConnectorStatus, DomainError, DomainResult, Measurand, MeterLocation, MeterPhase,
    MeterReading, MeterUnit, MeterValueAttributes, NormalizedMeterValue, ReadingContext,
    ValueFormat,
};

use super::message::{
    self, DataTransferResult, IdTagStatus, OcppRequest, OcppResponse, TransactionData,
};

// ── Request decoding ───────────────────────────────────────────

pub fn decode(action: &str, payload: &Value) -> DomainResult<OcppRequest> {
    match action {
        "BootNotification" => {
            let req: BootNotificationRequest = parse(payload)?;
            Ok(OcppRequest::BootNotification(message::BootNotification {
                charge_point_vendor: req.charge_point_vendor,
                charge_point_model: req.charge_point_model,
                charge_point_serial_number: req.charge_point_serial_number,
                charge_box_serial_number: req.charge_box_serial_number,
                firmware_version: req.firmware_version,
                iccid: req.iccid,
                imsi: req.imsi,
                meter_type: req.meter_type,
                meter_serial_number: req.meter_serial_number,
            }))
        }
        "Heartbeat" => Ok(OcppRequest::Heartbeat),
        "StatusNotification" => {
            let req: StatusNotificationRequest = parse(payload)?;
            Ok(OcppRequest::StatusNotification(message::StatusNotification {
                connector_id: req.connector_id,
                status: map_status(&req.status),
                error_code: format!("{:?}", req.error_code),
                info: req.info,
                timestamp: req.timestamp,
                vendor_id: req.vendor_id,
                vendor_error_code: req.vendor_error_code,
            }))
        }
        "Authorize" => {
            let req: AuthorizeRequest = parse(&stringify_id_tag(payload))?;
            Ok(OcppRequest::Authorize(message::Authorize {
                id_tag: req.id_tag,
            }))
        }
        "StartTransaction" => {
            let req: StartTransactionRequest = parse(&stringify_id_tag(payload))?;
            Ok(OcppRequest::StartTransaction(message::StartTransaction {
                connector_id: req.connector_id,
                id_tag: req.id_tag,
                meter_start: req.meter_start as f64,
                timestamp: req.timestamp,
                reservation_id: req.reservation_id,
            }))
        }
        "MeterValues" => decode_meter_values(payload),
        "StopTransaction" => decode_stop_transaction(payload),
        "DataTransfer" => {
            let req: DataTransferRequest = parse(payload)?;
            Ok(OcppRequest::DataTransfer(message::DataTransfer {
                vendor_id: req.vendor_string,
                message_id: req.message_id,
                data: req.data,
            }))
        }
        "FirmwareStatusNotification" => Ok(OcppRequest::FirmwareStatusNotification {
            status: status_string(payload),
        }),
        "DiagnosticsStatusNotification" => Ok(OcppRequest::DiagnosticsStatusNotification {
            status: status_string(payload),
        }),
        other => Err(DomainError::Validation(format!(
            "Unsupported action: {other}"
        ))),
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: &Value) -> DomainResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| DomainError::Validation(format!("Malformed payload: {e}")))
}

fn status_string(payload: &Value) -> String {
    payload["status"].as_str().unwrap_or("Unknown").to_string()
}

/// Some firmwares send numeric idTags as JSON numbers; accept both forms.
fn stringify_id_tag(payload: &Value) -> Value {
    let mut payload = payload.clone();
    if let Some(obj) = payload.as_object_mut() {
        if let Some(Value::Number(n)) = obj.get("idTag") {
            let n = n.to_string();
            obj.insert("idTag".to_string(), Value::String(n));
        }
    }
    payload
}

fn map_status(status: &ChargePointStatus) -> ConnectorStatus {
    match status {
        ChargePointStatus::Available => ConnectorStatus::Available,
        ChargePointStatus::Preparing => ConnectorStatus::Preparing,
        ChargePointStatus::Charging => ConnectorStatus::Charging,
        ChargePointStatus::SuspendedEV => ConnectorStatus::SuspendedEV,
        ChargePointStatus::SuspendedEVSE => ConnectorStatus::SuspendedEVSE,
        ChargePointStatus::Finishing => ConnectorStatus::Finishing,
        ChargePointStatus::Reserved => ConnectorStatus::Reserved,
        ChargePointStatus::Unavailable => ConnectorStatus::Unavailable,
        ChargePointStatus::Faulted => ConnectorStatus::Faulted,
    }
}

fn decode_meter_values(payload: &Value) -> DomainResult<OcppRequest> {
    let connector_id = required_u32(payload, "connectorId")?;
    let transaction_id = payload["transactionId"].as_i64().map(|v| v as i32);
    let entries = payload["meterValue"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let values = decode_meter_value_entries(connector_id, transaction_id, &entries)?;
    Ok(OcppRequest::MeterValues(message::MeterValues {
        connector_id,
        transaction_id,
        values,
    }))
}

fn decode_stop_transaction(payload: &Value) -> DomainResult<OcppRequest> {
    let transaction_id = payload["transactionId"]
        .as_i64()
        .ok_or_else(|| DomainError::Validation("StopTransaction without transactionId".into()))?
        as i32;
    let meter_stop = payload["meterStop"]
        .as_f64()
        .ok_or_else(|| DomainError::Validation("StopTransaction without meterStop".into()))?;
    let timestamp = required_timestamp(payload, "timestamp")?;
    let id_tag = match &payload["idTag"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    let reason = payload["reason"].as_str().map(String::from);

    // 1.6 transactionData is an array of {timestamp, sampledValue[]}. An
    // object shape (the 1.5 `values` form) means firmware sent the wrong
    // protocol variant; the stop is rejected, a retry without the block is
    // accepted.
    let transaction_data = match &payload["transactionData"] {
        Value::Null => TransactionData::Absent,
        Value::Array(entries) => {
            let values = decode_meter_value_entries(0, Some(transaction_id), entries)?;
            TransactionData::Values(values)
        }
        _ => TransactionData::Mismatched,
    };

    Ok(OcppRequest::StopTransaction(message::StopTransaction {
        transaction_id,
        id_tag,
        meter_stop,
        timestamp,
        reason,
        transaction_data,
    }))
}

/// Flatten `[{timestamp, sampledValue: [...]}, ...]` into normalized rows.
pub(super) fn decode_meter_value_entries(
    connector_id: u32,
    transaction_id: Option<i32>,
    entries: &[Value],
) -> DomainResult<Vec<NormalizedMeterValue>> {
    let mut rows = Vec::new();
    for entry in entries {
        let timestamp = required_timestamp(entry, "timestamp")?;
        let sampled = entry["sampledValue"].as_array().cloned().unwrap_or_default();
        for sample in &sampled {
            rows.push(decode_sampled_value(connector_id, transaction_id, timestamp, sample)?);
        }
    }
    Ok(rows)
}

fn decode_sampled_value(
    connector_id: u32,
    transaction_id: Option<i32>,
    timestamp: DateTime<Utc>,
    sample: &Value,
) -> DomainResult<NormalizedMeterValue> {
    let mut attribute = MeterValueAttributes::default();
    if let Some(context) = sample["context"].as_str() {
        attribute.context = ReadingContext::parse(context);
    }
    if let Some(format) = sample["format"].as_str() {
        attribute.format = ValueFormat::parse(format);
    }
    if let Some(measurand) = sample["measurand"].as_str() {
        attribute.measurand = Measurand::parse(measurand);
    }
    if let Some(location) = sample["location"].as_str() {
        attribute.location = MeterLocation::parse(location);
    }
    if let Some(unit) = sample["unit"].as_str() {
        attribute.unit = MeterUnit::parse(unit);
    }
    attribute.phase = sample["phase"].as_str().and_then(MeterPhase::parse);

    let raw = match &sample["value"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(DomainError::Validation(format!(
                "sampledValue.value has unexpected type: {other}"
            )))
        }
    };

    let value = match attribute.format {
        ValueFormat::SignedData => MeterReading::Signed(raw),
        ValueFormat::Raw => {
            let numeric = raw.trim().parse::<f64>().map_err(|_| {
                DomainError::Validation(format!("Non-numeric meter value: {raw}"))
            })?;
            MeterReading::Numeric(numeric)
        }
    };

    Ok(NormalizedMeterValue {
        connector_id,
        transaction_id,
        timestamp,
        attribute,
        value,
    })
}

fn required_u32(payload: &Value, field: &str) -> DomainResult<u32> {
    payload[field]
        .as_u64()
        .map(|v| v as u32)
        .ok_or_else(|| DomainError::Validation(format!("Missing field: {field}")))
}

fn required_timestamp(payload: &Value, field: &str) -> DomainResult<DateTime<Utc>> {
    let raw = payload[field]
        .as_str()
        .ok_or_else(|| DomainError::Validation(format!("Missing field: {field}")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Validation(format!("Bad timestamp {raw}: {e}")))
}

// ── Response encoding ──────────────────────────────────────────

pub fn encode_response(response: &OcppResponse) -> Value {
    match response {
        OcppResponse::BootNotification {
            status,
            current_time,
            interval_secs,
        } => to_value(&BootNotificationResponse {
            current_time: *current_time,
            interval: *interval_secs as _,
            status: match status {
                crate::domain::RegistrationStatus::Accepted => RegistrationStatus::Accepted,
                crate::domain::RegistrationStatus::Pending => RegistrationStatus::Pending,
                crate::domain::RegistrationStatus::Rejected => RegistrationStatus::Rejected,
            },
        }),
        OcppResponse::Heartbeat { current_time } => to_value(&HeartbeatResponse {
            current_time: *current_time,
        }),
        OcppResponse::StatusNotification
        | OcppResponse::MeterValues
        | OcppResponse::FirmwareStatusNotification
        | OcppResponse::DiagnosticsStatusNotification => serde_json::json!({}),
        OcppResponse::Authorize { status } => to_value(
            &rust_ocpp::v1_6::messages::authorize::AuthorizeResponse {
                id_tag_info: id_tag_info(*status),
            },
        ),
        OcppResponse::StartTransaction {
            transaction_id,
            status,
        } => to_value(&StartTransactionResponse {
            transaction_id: *transaction_id,
            id_tag_info: id_tag_info(*status),
        }),
        OcppResponse::StopTransaction { status } => to_value(&StopTransactionResponse {
            id_tag_info: Some(id_tag_info(*status)),
        }),
        OcppResponse::DataTransfer { status, data } => to_value(&DataTransferResponse {
            status: match status {
                DataTransferResult::Accepted => DataTransferStatus::Accepted,
                DataTransferResult::Rejected => DataTransferStatus::Rejected,
                DataTransferResult::UnknownVendorId => DataTransferStatus::UnknownVendorId,
            },
            data: data.clone(),
        }),
    }
}

fn id_tag_info(status: IdTagStatus) -> IdTagInfo {
    IdTagInfo {
        status: match status {
            IdTagStatus::Accepted => AuthorizationStatus::Accepted,
            IdTagStatus::Blocked => AuthorizationStatus::Blocked,
            IdTagStatus::Expired => AuthorizationStatus::Expired,
            IdTagStatus::Invalid => AuthorizationStatus::Invalid,
            IdTagStatus::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
        },
        expiry_date: None,
        parent_id_tag: None,
    }
}

fn to_value<T: serde::Serialize>(response: &T) -> Value {
    // Response structs serialize infallibly
    serde_json::to_value(response).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_boot_notification() {
        let payload = json!({
            "chargePointVendor": "Schneider",
            "chargePointModel": "EVlink",
            "chargePointSerialNumber": "SN-1",
            "firmwareVersion": "3.2.0"
        });
        match decode("BootNotification", &payload).unwrap() {
            OcppRequest::BootNotification(boot) => {
                assert_eq!(boot.charge_point_vendor, "Schneider");
                assert_eq!(boot.charge_point_serial_number.as_deref(), Some("SN-1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn meter_values_flatten_with_defaults() {
        let payload = json!({
            "connectorId": 1,
            "transactionId": 7,
            "meterValue": [{
                "timestamp": "2024-03-01T08:01:00Z",
                "sampledValue": [
                    {"value": "1500"},
                    {"value": "7.2", "measurand": "Power.Active.Import", "unit": "kW"}
                ]
            }]
        });
        match decode("MeterValues", &payload).unwrap() {
            OcppRequest::MeterValues(mv) => {
                assert_eq!(mv.values.len(), 2);
                let energy = &mv.values[0];
                assert!(energy.is_energy());
                assert_eq!(energy.attribute.context, ReadingContext::SamplePeriodic);
                assert_eq!(energy.base_value(), Some(1500.0));

                let power = &mv.values[1];
                assert_eq!(power.attribute.measurand, Measurand::PowerActiveImport);
                assert_eq!(power.base_value(), Some(7200.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_measurand_is_preserved() {
        let payload = json!({
            "connectorId": 1,
            "meterValue": [{
                "timestamp": "2024-03-01T08:01:00Z",
                "sampledValue": [{"value": "49.9", "measurand": "Frequency"}]
            }]
        });
        match decode("MeterValues", &payload).unwrap() {
            OcppRequest::MeterValues(mv) => {
                assert_eq!(mv.values[0].attribute.measurand.as_str(), "Frequency");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn signed_data_kept_verbatim() {
        let payload = json!({
            "connectorId": 1,
            "meterValue": [{
                "timestamp": "2024-03-01T08:01:00Z",
                "sampledValue": [{
                    "value": "ABCD==",
                    "format": "SignedData",
                    "context": "Transaction.Begin"
                }]
            }]
        });
        match decode("MeterValues", &payload).unwrap() {
            OcppRequest::MeterValues(mv) => {
                assert!(mv.values[0].is_signed_data());
                assert_eq!(mv.values[0].value, MeterReading::Signed("ABCD==".into()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stop_with_array_transaction_data_decodes() {
        let payload = json!({
            "transactionId": 42,
            "meterStop": 5200,
            "timestamp": "2024-03-01T09:00:00Z",
            "transactionData": [{
                "timestamp": "2024-03-01T09:00:00Z",
                "sampledValue": [{"value": "5200", "context": "Transaction.End"}]
            }]
        });
        match decode("StopTransaction", &payload).unwrap() {
            OcppRequest::StopTransaction(stop) => {
                assert_eq!(stop.transaction_id, 42);
                match stop.transaction_data {
                    TransactionData::Values(values) => assert_eq!(values.len(), 1),
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stop_with_object_transaction_data_is_mismatched() {
        let payload = json!({
            "transactionId": 42,
            "meterStop": 5200,
            "timestamp": "2024-03-01T09:00:00Z",
            "transactionData": {"values": [{"timestamp": "2024-03-01T09:00:00Z"}]}
        });
        match decode("StopTransaction", &payload).unwrap() {
            OcppRequest::StopTransaction(stop) => {
                assert!(stop.transaction_data.is_mismatched());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn numeric_id_tag_is_accepted_as_string() {
        let payload = json!({"idTag": 4242});
        match decode("Authorize", &payload).unwrap() {
            OcppRequest::Authorize(auth) => assert_eq!(auth.id_tag, "4242"),
            other => panic!("unexpected: {other:?}"),
        }

        let payload = json!({
            "connectorId": 1,
            "idTag": 4242,
            "meterStart": 0,
            "timestamp": "2024-03-01T08:00:00Z"
        });
        match decode("StartTransaction", &payload).unwrap() {
            OcppRequest::StartTransaction(start) => assert_eq!(start.id_tag, "4242"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_boot_fails_validation() {
        let payload = json!({"chargePointVendor": 12});
        assert!(matches!(
            decode("BootNotification", &payload),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn boot_response_shape() {
        let response = OcppResponse::BootNotification {
            status: crate::domain::RegistrationStatus::Accepted,
            current_time: "2024-03-01T08:00:00Z".parse().unwrap(),
            interval_secs: 300,
        };
        let value = encode_response(&response);
        assert_eq!(value["status"], "Accepted");
        assert_eq!(value["interval"], 300);
        assert!(value["currentTime"].as_str().unwrap().starts_with("2024-03-01T08:00:00"));
    }

    #[test]
    fn start_response_shape() {
        let value = encode_response(&OcppResponse::StartTransaction {
            transaction_id: 0,
            status: IdTagStatus::Invalid,
        });
        assert_eq!(value["transactionId"], 0);
        assert_eq!(value["idTagInfo"]["status"], "Invalid");
    }
}
