//! OCPP-S (SOAP over HTTP) ingress carrier
//!
//! OCPP 1.5 stations POST envelopes to `/ocpp/soap/{tenant_id}`. The
//! ChargeBoxIdentity and action come from the SOAP header; `From/Address`
//! seeds the station's callback endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::context::OcppHeader;
use crate::application::handlers::SharedOcppHandler;
use crate::application::normalizer;
use crate::domain::{OcppTransport, OcppVersion};
use crate::support::shutdown::ShutdownSignal;
use crate::support::soap_envelope::SoapEnvelope;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";
const REGISTRATION_TOKEN_HEADER: &str = "x-registration-token";

/// Build the SOAP ingress router.
pub fn router(handler: SharedOcppHandler) -> Router {
    Router::new()
        .route("/ocpp/soap/:tenant_id", post(handle_soap))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Serve the SOAP carrier until shutdown.
pub async fn serve(
    bind_addr: &str,
    handler: SharedOcppHandler,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("OCPP-S server listening on http://{}/ocpp/soap/{{tenant_id}}", bind_addr);
    axum::serve(
        listener,
        router(handler).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.wait().await })
    .await?;
    Ok(())
}

async fn handle_soap(
    State(handler): State<SharedOcppHandler>,
    Path(tenant_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let envelope = match SoapEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(tenant_id = tenant_id.as_str(), error = %e, "Unparseable SOAP envelope");
            return soap_fault(StatusCode::BAD_REQUEST, "Sender", &e.to_string());
        }
    };

    let Some(charge_box_id) = envelope.header.charge_box_identity.clone() else {
        return soap_fault(
            StatusCode::BAD_REQUEST,
            "Sender",
            "Missing chargeBoxIdentity header",
        );
    };

    let request = match normalizer::decode_soap(&envelope.body) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                charge_box_id = charge_box_id.as_str(),
                error = %e,
                "Undecodable OCPP 1.5 body"
            );
            return soap_fault(StatusCode::BAD_REQUEST, "Sender", &e.to_string());
        }
    };
    let action = request.action();

    let token = headers
        .get(REGISTRATION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let ocpp_header = OcppHeader::new(
        tenant_id,
        charge_box_id,
        OcppVersion::V15,
        OcppTransport::Soap,
    )
    .with_client_ip(peer.ip().to_string())
    .with_token(token)
    .with_from_address(envelope.header.from_address.clone());

    match handler.handle(&ocpp_header, request).await {
        Ok(response) => {
            let body_xml = normalizer::encode_soap_response(&response);
            let rendered = SoapEnvelope::render_response(
                action,
                envelope.header.message_id.as_deref(),
                &body_xml,
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)],
                rendered,
            )
                .into_response()
        }
        Err(e) => soap_fault(StatusCode::OK, "Receiver", &e.to_string()),
    }
}

fn soap_fault(status: StatusCode, code: &str, reason: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)],
        SoapEnvelope::render_fault(code, reason),
    )
        .into_response()
}

/// Convenience wrapper for tests and tools: feed one raw envelope through
/// the same path the HTTP route uses.
pub async fn process_envelope(
    handler: &SharedOcppHandler,
    tenant_id: &str,
    client_ip: &str,
    token: Option<String>,
    raw_envelope: &str,
) -> Result<String, crate::support::errors::AppError> {
    let envelope = SoapEnvelope::parse(raw_envelope).map_err(crate::support::errors::AppError::Infra)?;
    let charge_box_id = envelope
        .header
        .charge_box_identity
        .clone()
        .unwrap_or_default();
    let request = normalizer::decode_soap(&envelope.body)
        .map_err(crate::support::errors::AppError::Domain)?;
    let action = request.action();

    let ocpp_header = OcppHeader::new(
        tenant_id,
        charge_box_id,
        OcppVersion::V15,
        OcppTransport::Soap,
    )
    .with_client_ip(client_ip)
    .with_token(token)
    .with_from_address(envelope.header.from_address.clone());

    let response = handler
        .handle(&ocpp_header, request)
        .await
        .map_err(crate::support::errors::AppError::Domain)?;
    let body_xml = normalizer::encode_soap_response(&response);
    Ok(SoapEnvelope::render_response(
        action,
        envelope.header.message_id.as_deref(),
        &body_xml,
    ))
}
