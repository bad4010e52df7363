//! OCPP protocol version and transport

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.5 (SOAP / OCPP-S)
    V15,
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier, where one exists (1.5 is SOAP-only).
    pub fn subprotocol(&self) -> Option<&'static str> {
        match self {
            Self::V15 => None,
            Self::V16 => Some("ocpp1.6"),
        }
    }

    /// Parse an OCPP version from a WebSocket subprotocol string.
    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.6" => Some(Self::V16),
            _ => None,
        }
    }

    /// Human-readable version string.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V15 => "1.5",
            Self::V16 => "1.6",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}

/// Transport a station connects over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcppTransport {
    /// SOAP over HTTP (OCPP-S)
    Soap,
    /// JSON over WebSocket (OCPP-J)
    Json,
}

impl fmt::Display for OcppTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soap => write!(f, "SOAP"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// Station registration status from the central system's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Pending => "Pending",
            Self::Rejected => "Rejected",
        }
    }
}
