//! Ingress carriers: OCPP-J over WebSocket and OCPP-S over HTTP.

pub mod soap;
pub mod ws;
