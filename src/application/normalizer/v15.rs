//! OCPP 1.5 (SOAP) decoding and response encoding
//!
//! The SOAP carrier hands over the request element from the envelope body.
//! 1.5 meter values arrive as `<values>` blocks whose `<value>` elements
//! carry the attribute block as XML attributes; they flatten into the same
//! normalized rows as the 1.6 `sampledValue` form.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::{
    ConnectorStatus, DomainError, DomainResult, Measurand, MeterLocation, MeterPhase,
    MeterReading, MeterUnit, MeterValueAttributes, NormalizedMeterValue, ReadingContext,
    ValueFormat,
};
use crate::support::soap_envelope::{escape_xml, XmlElement};

use super::message::{
    self, DataTransferResult, OcppRequest, OcppResponse, TransactionData,
};

// ── Request decoding ───────────────────────────────────────────

pub fn decode(body: &XmlElement) -> DomainResult<OcppRequest> {
    match body.name.as_str() {
        "bootNotificationRequest" => Ok(OcppRequest::BootNotification(message::BootNotification {
            charge_point_vendor: required_text(body, "chargePointVendor")?,
            charge_point_model: required_text(body, "chargePointModel")?,
            charge_point_serial_number: optional_text(body, "chargePointSerialNumber"),
            charge_box_serial_number: optional_text(body, "chargeBoxSerialNumber"),
            firmware_version: optional_text(body, "firmwareVersion"),
            iccid: optional_text(body, "iccid"),
            imsi: optional_text(body, "imsi"),
            meter_type: optional_text(body, "meterType"),
            meter_serial_number: optional_text(body, "meterSerialNumber"),
        })),
        "heartbeatRequest" => Ok(OcppRequest::Heartbeat),
        "statusNotificationRequest" => {
            let status_raw = required_text(body, "status")?;
            let status = ConnectorStatus::parse(&status_raw).ok_or_else(|| {
                DomainError::Validation(format!("Unknown connector status: {status_raw}"))
            })?;
            Ok(OcppRequest::StatusNotification(message::StatusNotification {
                connector_id: required_number(body, "connectorId")? as u32,
                status,
                error_code: optional_text(body, "errorCode").unwrap_or_else(|| "NoError".into()),
                info: optional_text(body, "info"),
                timestamp: optional_timestamp(body, "timestamp")?,
                vendor_id: optional_text(body, "vendorId"),
                vendor_error_code: optional_text(body, "vendorErrorCode"),
            }))
        }
        "authorizeRequest" => Ok(OcppRequest::Authorize(message::Authorize {
            id_tag: required_text(body, "idTag")?,
        })),
        "startTransactionRequest" => Ok(OcppRequest::StartTransaction(message::StartTransaction {
            connector_id: required_number(body, "connectorId")? as u32,
            id_tag: required_text(body, "idTag")?,
            meter_start: required_number(body, "meterStart")?,
            timestamp: required_timestamp(body, "timestamp")?,
            reservation_id: optional_text(body, "reservationId")
                .and_then(|v| v.parse::<i32>().ok()),
        })),
        "meterValuesRequest" => {
            let connector_id = required_number(body, "connectorId")? as u32;
            let transaction_id = optional_text(body, "transactionId")
                .and_then(|v| v.parse::<i32>().ok());
            let mut values = Vec::new();
            for block in body.children_named("values") {
                decode_values_block(connector_id, transaction_id, block, &mut values)?;
            }
            Ok(OcppRequest::MeterValues(message::MeterValues {
                connector_id,
                transaction_id,
                values,
            }))
        }
        "stopTransactionRequest" => {
            let transaction_id = required_number(body, "transactionId")? as i32;
            let transaction_data = decode_transaction_data(body, transaction_id)?;
            Ok(OcppRequest::StopTransaction(message::StopTransaction {
                transaction_id,
                id_tag: optional_text(body, "idTag"),
                meter_stop: required_number(body, "meterStop")?,
                timestamp: required_timestamp(body, "timestamp")?,
                reason: None,
                transaction_data,
            }))
        }
        "dataTransferRequest" => Ok(OcppRequest::DataTransfer(message::DataTransfer {
            vendor_id: required_text(body, "vendorId")?,
            message_id: optional_text(body, "messageId"),
            data: optional_text(body, "data"),
        })),
        "firmwareStatusNotificationRequest" => Ok(OcppRequest::FirmwareStatusNotification {
            status: optional_text(body, "status").unwrap_or_else(|| "Unknown".into()),
        }),
        "diagnosticsStatusNotificationRequest" => Ok(OcppRequest::DiagnosticsStatusNotification {
            status: optional_text(body, "status").unwrap_or_else(|| "Unknown".into()),
        }),
        other => Err(DomainError::Validation(format!(
            "Unsupported SOAP action element: {other}"
        ))),
    }
}

fn decode_transaction_data(
    body: &XmlElement,
    transaction_id: i32,
) -> DomainResult<TransactionData> {
    let Some(data) = body.child("transactionData") else {
        return Ok(TransactionData::Absent);
    };
    // A `sampledValue` element means the firmware sent the 1.6 shape inside a
    // 1.5 frame; the stop is rejected, a retry without the block is accepted.
    if contains_element(data, "sampledValue") {
        return Ok(TransactionData::Mismatched);
    }
    if data.child("values").is_none() && !data.children.is_empty() {
        return Ok(TransactionData::Mismatched);
    }
    let mut values = Vec::new();
    for block in data.children_named("values") {
        decode_values_block(0, Some(transaction_id), block, &mut values)?;
    }
    Ok(TransactionData::Values(values))
}

fn contains_element(element: &XmlElement, name: &str) -> bool {
    element
        .children
        .iter()
        .any(|c| c.name == name || contains_element(c, name))
}

/// Decode one `<values>` block: shared timestamp, one or more `<value>`
/// elements with their attribute blocks.
fn decode_values_block(
    connector_id: u32,
    transaction_id: Option<i32>,
    block: &XmlElement,
    out: &mut Vec<NormalizedMeterValue>,
) -> DomainResult<()> {
    let timestamp = required_timestamp(block, "timestamp")?;
    for value in block.children_named("value") {
        let mut attribute = MeterValueAttributes::default();
        if let Some(context) = value.attr("context") {
            attribute.context = ReadingContext::parse(context);
        }
        if let Some(format) = value.attr("format") {
            attribute.format = ValueFormat::parse(format);
        }
        if let Some(measurand) = value.attr("measurand") {
            attribute.measurand = Measurand::parse(measurand);
        }
        if let Some(location) = value.attr("location") {
            attribute.location = MeterLocation::parse(location);
        }
        if let Some(unit) = value.attr("unit") {
            attribute.unit = MeterUnit::parse(unit);
        }
        attribute.phase = value.attr("phase").and_then(MeterPhase::parse);

        let raw = value.text.trim();
        let reading = match attribute.format {
            ValueFormat::SignedData => MeterReading::Signed(raw.to_string()),
            ValueFormat::Raw => MeterReading::Numeric(raw.parse::<f64>().map_err(|_| {
                DomainError::Validation(format!("Non-numeric meter value: {raw}"))
            })?),
        };

        out.push(NormalizedMeterValue {
            connector_id,
            transaction_id,
            timestamp,
            attribute,
            value: reading,
        });
    }
    Ok(())
}

fn required_text(element: &XmlElement, name: &str) -> DomainResult<String> {
    element
        .text_of(name)
        .map(String::from)
        .ok_or_else(|| DomainError::Validation(format!("Missing element: {name}")))
}

fn optional_text(element: &XmlElement, name: &str) -> Option<String> {
    element.text_of(name).map(String::from)
}

fn required_number(element: &XmlElement, name: &str) -> DomainResult<f64> {
    let raw = required_text(element, name)?;
    raw.parse::<f64>()
        .map_err(|_| DomainError::Validation(format!("Element {name} is not numeric: {raw}")))
}

fn required_timestamp(element: &XmlElement, name: &str) -> DomainResult<DateTime<Utc>> {
    let raw = required_text(element, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Validation(format!("Bad timestamp {raw}: {e}")))
}

fn optional_timestamp(element: &XmlElement, name: &str) -> DomainResult<Option<DateTime<Utc>>> {
    match element.text_of(name) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| DomainError::Validation(format!("Bad timestamp {raw}: {e}"))),
        None => Ok(None),
    }
}

// ── Response encoding ──────────────────────────────────────────

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn id_tag_info(status: &str) -> String {
    format!("<cs:idTagInfo><cs:status>{status}</cs:status></cs:idTagInfo>")
}

/// Render the response body element for the SOAP envelope.
pub fn encode_response(response: &OcppResponse) -> String {
    match response {
        OcppResponse::BootNotification {
            status,
            current_time,
            interval_secs,
        } => format!(
            concat!(
                "<cs:bootNotificationResponse>",
                "<cs:status>{status}</cs:status>",
                "<cs:currentTime>{time}</cs:currentTime>",
                "<cs:heartbeatInterval>{interval}</cs:heartbeatInterval>",
                "</cs:bootNotificationResponse>"
            ),
            status = status.as_str(),
            time = iso(current_time),
            interval = interval_secs,
        ),
        OcppResponse::Heartbeat { current_time } => format!(
            "<cs:heartbeatResponse><cs:currentTime>{}</cs:currentTime></cs:heartbeatResponse>",
            iso(current_time)
        ),
        OcppResponse::StatusNotification => "<cs:statusNotificationResponse/>".to_string(),
        OcppResponse::MeterValues => "<cs:meterValuesResponse/>".to_string(),
        OcppResponse::FirmwareStatusNotification => {
            "<cs:firmwareStatusNotificationResponse/>".to_string()
        }
        OcppResponse::DiagnosticsStatusNotification => {
            "<cs:diagnosticsStatusNotificationResponse/>".to_string()
        }
        OcppResponse::Authorize { status } => format!(
            "<cs:authorizeResponse>{}</cs:authorizeResponse>",
            id_tag_info(status.as_str())
        ),
        OcppResponse::StartTransaction {
            transaction_id,
            status,
        } => format!(
            concat!(
                "<cs:startTransactionResponse>",
                "<cs:transactionId>{id}</cs:transactionId>",
                "{info}",
                "</cs:startTransactionResponse>"
            ),
            id = transaction_id,
            info = id_tag_info(status.as_str()),
        ),
        OcppResponse::StopTransaction { status } => format!(
            "<cs:stopTransactionResponse>{}</cs:stopTransactionResponse>",
            id_tag_info(status.as_str())
        ),
        OcppResponse::DataTransfer { status, data } => {
            let status = match status {
                DataTransferResult::Accepted => "Accepted",
                DataTransferResult::Rejected => "Rejected",
                DataTransferResult::UnknownVendorId => "UnknownVendorId",
            };
            let data = data
                .as_deref()
                .map(|d| format!("<cs:data>{}</cs:data>", escape_xml(d)))
                .unwrap_or_default();
            format!(
                "<cs:dataTransferResponse><cs:status>{status}</cs:status>{data}</cs:dataTransferResponse>"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::normalizer::message::IdTagStatus;

    fn body(xml: &str) -> XmlElement {
        XmlElement::parse(xml).unwrap()
    }

    #[test]
    fn decodes_boot_notification() {
        let element = body(
            "<bootNotificationRequest>
                <chargePointVendor>ABB</chargePointVendor>
                <chargePointModel>Terra</chargePointModel>
                <chargeBoxSerialNumber>CB-9</chargeBoxSerialNumber>
             </bootNotificationRequest>",
        );
        match decode(&element).unwrap() {
            OcppRequest::BootNotification(boot) => {
                assert_eq!(boot.charge_point_vendor, "ABB");
                assert_eq!(boot.charge_box_serial_number.as_deref(), Some("CB-9"));
                assert!(boot.firmware_version.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decodes_meter_values_with_attributes() {
        let element = body(
            r#"<meterValuesRequest>
                <connectorId>1</connectorId>
                <transactionId>7</transactionId>
                <values>
                  <timestamp>2024-03-01T08:01:00Z</timestamp>
                  <value unit="Wh" context="Sample.Periodic">1500</value>
                  <value unit="V" measurand="Voltage" phase="L1-N">231.2</value>
                </values>
               </meterValuesRequest>"#,
        );
        match decode(&element).unwrap() {
            OcppRequest::MeterValues(mv) => {
                assert_eq!(mv.connector_id, 1);
                assert_eq!(mv.transaction_id, Some(7));
                assert_eq!(mv.values.len(), 2);
                assert!(mv.values[0].is_energy());
                assert_eq!(mv.values[1].attribute.measurand, Measurand::Voltage);
                assert_eq!(mv.values[1].attribute.phase, Some(MeterPhase::L1N));
                // Both rows share the block timestamp
                assert_eq!(mv.values[0].timestamp, mv.values[1].timestamp);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decodes_stop_with_values_transaction_data() {
        let element = body(
            r#"<stopTransactionRequest>
                <transactionId>42</transactionId>
                <timestamp>2024-03-01T09:00:00Z</timestamp>
                <meterStop>5200</meterStop>
                <transactionData>
                  <values>
                    <timestamp>2024-03-01T09:00:00Z</timestamp>
                    <value context="Transaction.End">5200</value>
                  </values>
                </transactionData>
               </stopTransactionRequest>"#,
        );
        match decode(&element).unwrap() {
            OcppRequest::StopTransaction(stop) => {
                assert_eq!(stop.transaction_id, 42);
                assert_eq!(stop.meter_stop, 5200.0);
                match stop.transaction_data {
                    TransactionData::Values(values) => {
                        assert_eq!(values.len(), 1);
                        assert_eq!(
                            values[0].attribute.context,
                            ReadingContext::TransactionEnd
                        );
                    }
                    other => panic!("unexpected: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sixteen_shaped_transaction_data_is_mismatched() {
        let element = body(
            r#"<stopTransactionRequest>
                <transactionId>42</transactionId>
                <timestamp>2024-03-01T09:00:00Z</timestamp>
                <meterStop>5200</meterStop>
                <transactionData>
                  <meterValue>
                    <timestamp>2024-03-01T09:00:00Z</timestamp>
                    <sampledValue><value>5200</value></sampledValue>
                  </meterValue>
                </transactionData>
               </stopTransactionRequest>"#,
        );
        match decode(&element).unwrap() {
            OcppRequest::StopTransaction(stop) => {
                assert!(stop.transaction_data.is_mismatched());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn occupied_status_maps_to_charging() {
        let element = body(
            "<statusNotificationRequest>
                <connectorId>2</connectorId>
                <status>Occupied</status>
                <errorCode>NoError</errorCode>
             </statusNotificationRequest>",
        );
        match decode(&element).unwrap() {
            OcppRequest::StatusNotification(status) => {
                assert_eq!(status.connector_id, 2);
                assert_eq!(status.status, ConnectorStatus::Charging);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn boot_response_uses_heartbeat_interval_element() {
        let xml = encode_response(&OcppResponse::BootNotification {
            status: crate::domain::RegistrationStatus::Accepted,
            current_time: "2024-03-01T08:00:00Z".parse().unwrap(),
            interval_secs: 240,
        });
        assert!(xml.contains("<cs:status>Accepted</cs:status>"));
        assert!(xml.contains("<cs:heartbeatInterval>240</cs:heartbeatInterval>"));
    }

    #[test]
    fn stop_response_carries_id_tag_info() {
        let xml = encode_response(&OcppResponse::StopTransaction {
            status: IdTagStatus::Invalid,
        });
        assert!(xml.contains("<cs:status>Invalid</cs:status>"));
    }
}
