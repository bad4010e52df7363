//! Per-request header context
//!
//! The ingress carrier decodes the transport headers into this immutable
//! value and passes it through every handler signature; the core never reads
//! ambient request state.

use crate::domain::{OcppTransport, OcppVersion};

/// Header context accompanying every inbound OCPP frame
#[derive(Debug, Clone)]
pub struct OcppHeader {
    pub tenant_id: String,
    pub charge_box_id: String,
    pub client_ip: Option<String>,
    pub ocpp_version: OcppVersion,
    pub ocpp_transport: OcppTransport,
    /// Registration token presented at first boot
    pub token: Option<String>,
    /// SOAP `From.Address`, seeds the station endpoint
    pub from_address: Option<String>,
}

impl OcppHeader {
    pub fn new(
        tenant_id: impl Into<String>,
        charge_box_id: impl Into<String>,
        ocpp_version: OcppVersion,
        ocpp_transport: OcppTransport,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            charge_box_id: charge_box_id.into(),
            client_ip: None,
            ocpp_version,
            ocpp_transport,
            token: None,
            from_address: None,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_from_address(mut self, address: Option<String>) -> Self {
        self.from_address = address;
        self
    }
}
