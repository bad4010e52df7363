//! OCPP-J message framing
//!
//! Transport envelope for OCPP over WebSocket (identical in 1.6 and later):
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! `parse_lenient` additionally repairs the malformed frames some vendor
//! firmwares emit (null transactionId/meterStop/connectorId, truncated
//! CallError arrays) before giving up.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Error)]
pub enum OcppFrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

impl OcppFrame {
    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let arr: Vec<Value> =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;
        Self::from_array(&arr)
    }

    /// Parse with vendor-bug repair: null required fields are defaulted and
    /// truncated CallError arrays are padded before re-parsing.
    pub fn parse_lenient(text: &str) -> Result<Self, OcppFrameError> {
        match Self::parse(text) {
            Ok(frame) => Ok(frame),
            Err(first_err) => match Self::sanitize(text) {
                Some(frame) => {
                    warn!(error = %first_err, "OCPP-J frame repaired by sanitizer");
                    Ok(frame)
                }
                None => Err(first_err),
            },
        }
    }

    fn from_array(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.is_empty() {
            return Err(OcppFrameError::EmptyArray);
        }
        let msg_type = arr[0].as_u64().ok_or(OcppFrameError::InvalidMessageType)?;
        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(arr),
            other => Err(OcppFrameError::UnknownMessageType(other)),
        }
    }

    fn parse_call(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        Ok(Self::Call {
            unique_id,
            action,
            payload: arr[3].clone(),
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 3 {
            return Err(OcppFrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        Ok(Self::CallResult {
            unique_id,
            payload: arr[2].clone(),
        })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        let error_code = arr[2].as_str().unwrap_or("InternalError").to_string();
        let error_description = arr
            .get(3)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let error_details = arr
            .get(4)
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    /// Repair common vendor-firmware framing bugs and re-parse.
    fn sanitize(text: &str) -> Option<Self> {
        let mut value: Value = serde_json::from_str(text).ok()?;
        let arr = value.as_array_mut()?;
        let msg_type = arr.first()?.as_u64()?;

        // CallResult: pad to 3 elements, replace a null payload
        if msg_type == MSG_TYPE_CALL_RESULT {
            while arr.len() < 3 {
                arr.push(serde_json::json!({}));
            }
            if arr[2].is_null() {
                arr[2] = serde_json::json!({});
            }
        }

        // CallError: pad to 5 elements
        if msg_type == MSG_TYPE_CALL_ERROR {
            while arr.len() < 5 {
                match arr.len() {
                    2 => arr.push(serde_json::json!("NotImplemented")),
                    3 => arr.push(serde_json::json!("")),
                    _ => arr.push(serde_json::json!({})),
                }
            }
        }

        // Call: null required numeric fields default to 0
        if msg_type == MSG_TYPE_CALL && arr.len() >= 4 {
            let action = arr.get(2)?.as_str()?.to_string();
            if let Some(obj) = arr.get_mut(3)?.as_object_mut() {
                let null_to_zero = |obj: &mut serde_json::Map<String, Value>, key: &str| {
                    if obj.get(key).map_or(false, Value::is_null) {
                        obj.insert(key.to_string(), Value::Number(0.into()));
                    }
                };
                match action.as_str() {
                    "StopTransaction" => {
                        null_to_zero(obj, "transactionId");
                        null_to_zero(obj, "meterStop");
                    }
                    "StartTransaction" => {
                        null_to_zero(obj, "meterStart");
                        null_to_zero(obj, "connectorId");
                    }
                    "MeterValues" | "StatusNotification" => {
                        null_to_zero(obj, "connectorId");
                    }
                    _ => {}
                }
            }
        }

        Self::from_array(arr).ok()
    }

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // serde_json::to_string on a Value never fails
        serde_json::to_string(&arr).unwrap()
    }

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Default::default()),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    pub fn is_call_result(&self) -> bool {
        matches!(self, Self::CallResult { .. })
    }
}
