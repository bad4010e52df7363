//! Normalized internal message shapes
//!
//! One tagged variant per inbound OCPP action. Version differences live in
//! the sibling decoder modules; handlers only ever see these types.

use chrono::{DateTime, Utc};

use crate::domain::{ConnectorStatus, NormalizedMeterValue, RegistrationStatus};

/// BootNotification payload
#[derive(Debug, Clone, Default)]
pub struct BootNotification {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    pub charge_point_serial_number: Option<String>,
    pub charge_box_serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
}

/// StatusNotification payload
#[derive(Debug, Clone)]
pub struct StatusNotification {
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: String,
    pub info: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub vendor_id: Option<String>,
    pub vendor_error_code: Option<String>,
}

/// Authorize payload
#[derive(Debug, Clone)]
pub struct Authorize {
    pub id_tag: String,
}

/// StartTransaction payload
#[derive(Debug, Clone)]
pub struct StartTransaction {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: f64,
    pub timestamp: DateTime<Utc>,
    pub reservation_id: Option<i32>,
}

/// Flattened MeterValues payload
#[derive(Debug, Clone)]
pub struct MeterValues {
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub values: Vec<NormalizedMeterValue>,
}

/// StopTransaction's optional transactionData, shape-checked against the
/// station's declared protocol version
#[derive(Debug, Clone)]
pub enum TransactionData {
    Absent,
    Values(Vec<NormalizedMeterValue>),
    /// Present but shaped for the other protocol version
    Mismatched,
}

impl TransactionData {
    pub fn is_mismatched(&self) -> bool {
        matches!(self, Self::Mismatched)
    }
}

/// StopTransaction payload
#[derive(Debug, Clone)]
pub struct StopTransaction {
    pub transaction_id: i32,
    pub id_tag: Option<String>,
    pub meter_stop: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub transaction_data: TransactionData,
}

/// DataTransfer payload
#[derive(Debug, Clone)]
pub struct DataTransfer {
    pub vendor_id: String,
    pub message_id: Option<String>,
    pub data: Option<String>,
}

/// Inbound OCPP request, already normalized
#[derive(Debug, Clone)]
pub enum OcppRequest {
    BootNotification(BootNotification),
    Heartbeat,
    StatusNotification(StatusNotification),
    MeterValues(MeterValues),
    Authorize(Authorize),
    StartTransaction(StartTransaction),
    StopTransaction(StopTransaction),
    DataTransfer(DataTransfer),
    FirmwareStatusNotification { status: String },
    DiagnosticsStatusNotification { status: String },
}

impl OcppRequest {
    /// OCPP action name, as it appears on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            Self::BootNotification(_) => "BootNotification",
            Self::Heartbeat => "Heartbeat",
            Self::StatusNotification(_) => "StatusNotification",
            Self::MeterValues(_) => "MeterValues",
            Self::Authorize(_) => "Authorize",
            Self::StartTransaction(_) => "StartTransaction",
            Self::StopTransaction(_) => "StopTransaction",
            Self::DataTransfer(_) => "DataTransfer",
            Self::FirmwareStatusNotification { .. } => "FirmwareStatusNotification",
            Self::DiagnosticsStatusNotification { .. } => "DiagnosticsStatusNotification",
        }
    }
}

/// idTagInfo status on authorize/start/stop responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTagStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

impl IdTagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Blocked => "Blocked",
            Self::Expired => "Expired",
            Self::Invalid => "Invalid",
            Self::ConcurrentTx => "ConcurrentTx",
        }
    }
}

/// DataTransfer response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTransferResult {
    Accepted,
    Rejected,
    UnknownVendorId,
}

/// Outbound OCPP response, rendered per the station's negotiated version
#[derive(Debug, Clone)]
pub enum OcppResponse {
    BootNotification {
        status: RegistrationStatus,
        current_time: DateTime<Utc>,
        interval_secs: i64,
    },
    Heartbeat {
        current_time: DateTime<Utc>,
    },
    StatusNotification,
    MeterValues,
    Authorize {
        status: IdTagStatus,
    },
    StartTransaction {
        transaction_id: i32,
        status: IdTagStatus,
    },
    StopTransaction {
        status: IdTagStatus,
    },
    DataTransfer {
        status: DataTransferResult,
        data: Option<String>,
    },
    FirmwareStatusNotification,
    DiagnosticsStatusNotification,
}
