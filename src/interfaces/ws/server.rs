//! OCPP-J WebSocket server
//!
//! Stations connect to `ws://<host>:<port>/ocpp/{tenant_id}/{charge_box_id}`
//! with the `ocpp1.6` subprotocol. One read loop per connection keeps the
//! per-station FIFO ordering contract; responses and central-system calls go
//! out through the connection's write task.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::context::OcppHeader;
use crate::application::handlers::SharedOcppHandler;
use crate::application::normalizer;
use crate::config::ServerConfig;
use crate::domain::{OcppTransport, OcppVersion};
use crate::support::ocpp_frame::OcppFrame;
use crate::support::shutdown::ShutdownSignal;

use super::commands::SharedCommandSender;
use super::registry::{RegisterResult, SharedSessionRegistry};

const REGISTRATION_TOKEN_HEADER: &str = "x-registration-token";

/// OCPP WebSocket server
pub struct OcppServer {
    config: ServerConfig,
    handler: SharedOcppHandler,
    registry: SharedSessionRegistry,
    commands: SharedCommandSender,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    pub fn new(
        config: ServerConfig,
        handler: SharedOcppHandler,
        registry: SharedSessionRegistry,
        commands: SharedCommandSender,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            handler,
            registry,
            commands,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{}:{}", self.config.ws_host, self.config.ws_port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "OCPP-J server listening on ws://{}/ocpp/{{tenant_id}}/{{charge_box_id}}",
            addr
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("OCPP-J server shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let handler = self.handler.clone();
        let registry = self.registry.clone();
        let commands = self.commands.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, peer, handler, registry, commands, shutdown).await
            {
                warn!(peer = %peer, error = %e, "Connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: SharedOcppHandler,
    registry: SharedSessionRegistry,
    commands: SharedCommandSender,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut path = String::new();
    let mut token: Option<String> = None;
    let mut subprotocol_offered = false;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            token = request
                .headers()
                .get(REGISTRATION_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            if let Some(protocols) = request
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|v| v.to_str().ok())
            {
                if protocols
                    .split(',')
                    .filter_map(OcppVersion::from_subprotocol)
                    .any(|v| v == OcppVersion::V16)
                {
                    subprotocol_offered = true;
                    response.headers_mut().insert(
                        "sec-websocket-protocol",
                        "ocpp1.6".parse().expect("static header value"),
                    );
                }
            }
            Ok(response)
        },
    )
    .await?;

    let Some((tenant_id, charge_box_id)) = parse_ocpp_path(&path) else {
        warn!(peer = %peer, path = path.as_str(), "Rejecting connection with bad path");
        return Ok(());
    };
    if !subprotocol_offered {
        debug!(
            charge_box_id = charge_box_id.as_str(),
            "Station offered no ocpp1.6 subprotocol, continuing anyway"
        );
    }

    let (sender, mut outbox) = mpsc::unbounded_channel::<String>();
    let connection_id =
        match registry.register(&tenant_id, &charge_box_id, sender, OcppVersion::V16) {
            RegisterResult::New { connection_id } => connection_id,
            RegisterResult::Evicted { connection_id, .. } => connection_id,
            RegisterResult::Debounced { seconds_remaining } => {
                warn!(
                    charge_box_id = charge_box_id.as_str(),
                    seconds_remaining, "Debounced reconnect, closing"
                );
                return Ok(());
            }
        };

    let header = Arc::new(
        OcppHeader::new(
            tenant_id.clone(),
            charge_box_id.clone(),
            OcppVersion::V16,
            OcppTransport::Json,
        )
        .with_client_ip(peer.ip().to_string())
        .with_token(token),
    );

    let (mut ws_sink, mut ws_source) = ws_stream.split();

    // Write task: everything queued for this station goes out here
    let write_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if ws_sink.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Read loop: one message at a time, preserving the per-station FIFO
    loop {
        tokio::select! {
            message = ws_source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        registry.touch(&tenant_id, &charge_box_id);
                        if let Some(reply) = process_frame(
                            &handler,
                            &commands,
                            &header,
                            &text,
                        )
                        .await
                        {
                            if registry.send_to(&tenant_id, &charge_box_id, reply).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by tungstenite
                    Some(Err(e)) => {
                        debug!(charge_box_id = charge_box_id.as_str(), error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown.wait() => break,
        }
    }

    registry.unregister(&tenant_id, &charge_box_id, connection_id);
    write_task.abort();
    info!(charge_box_id = charge_box_id.as_str(), "Connection closed");
    Ok(())
}

/// `/ocpp/{tenant_id}/{charge_box_id}` → (tenant, charge box)
fn parse_ocpp_path(path: &str) -> Option<(String, String)> {
    let mut segments = path.trim_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("ocpp"), Some(tenant), Some(station), None)
            if !tenant.is_empty() && !station.is_empty() =>
        {
            Some((tenant.to_string(), station.to_string()))
        }
        _ => None,
    }
}

/// Handle one inbound OCPP-J frame; the return value is the frame to send
/// back, if any.
async fn process_frame(
    handler: &SharedOcppHandler,
    commands: &SharedCommandSender,
    header: &OcppHeader,
    text: &str,
) -> Option<String> {
    let frame = match OcppFrame::parse_lenient(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(
                charge_box_id = header.charge_box_id.as_str(),
                error = %e,
                "Unparseable OCPP-J frame"
            );
            return None;
        }
    };

    match frame {
        OcppFrame::Call {
            unique_id,
            action,
            payload,
        } => {
            let response = match normalizer::decode_json(&action, &payload) {
                Ok(request) => match handler.handle(header, request).await {
                    Ok(response) => OcppFrame::CallResult {
                        unique_id,
                        payload: normalizer::encode_json_response(&response),
                    },
                    Err(e) => OcppFrame::error_response(unique_id, "InternalError", e.to_string()),
                },
                Err(e) => {
                    OcppFrame::error_response(unique_id, "FormationViolation", e.to_string())
                }
            };
            Some(response.serialize())
        }
        OcppFrame::CallResult { unique_id, payload } => {
            commands.handle_response(
                &header.tenant_id,
                &header.charge_box_id,
                &unique_id,
                payload,
            );
            None
        }
        OcppFrame::CallError {
            unique_id,
            error_code,
            error_description,
            ..
        } => {
            commands.handle_error(
                &header.tenant_id,
                &header.charge_box_id,
                &unique_id,
                &error_code,
                &error_description,
            );
            None
        }
    }
}
