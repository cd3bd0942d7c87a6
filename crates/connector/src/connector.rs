// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual-TLS WebSocket connector to the PCP broker: connect loop,
//! association handshake, keepalive, and the `send_*` surface (spec.md
//! §4.8), grounded on `lib/src/pxp_connector.cc` and
//! `lib/src/pxp_connector_v1.cc`/`_v2.cc`.

use crate::error::ConnectorError;
use crate::frame::{parse as parse_frame, render as render_frame};
use crate::tls::build_client_config;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pxp_core::{ActionRequest, ActionResponse, ConnectorTuning, PcpVersion, RequestId, TlsMaterial};
use pxp_wire::{encode, OutboundMessage, ParsedChunks};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::Connector;

/// Pause between connection attempts after an association error (spec.md
/// §4.8 "wait a random delay in `[base, 2·base]` seconds").
const ASSOCIATION_RETRY_BASE_S: u64 = 5;

pub type MessageHandler = Arc<dyn Fn(ParsedChunks) + Send + Sync>;

/// A random delay in `[base, 2·base]` seconds (spec.md §4.8 association
/// retry backoff).
fn pick_backoff_secs(base_s: u64) -> f64 {
    let base = base_s as f64;
    rand::thread_rng().gen_range(base..=(2.0 * base))
}

/// Common interface over the v1/v2 wire dialects (spec.md §4.8).
#[async_trait]
pub trait PcpConnector: Send + Sync {
    /// Runs the connect/monitor loop forever, invoking `handler` for every
    /// validated inbound message. Returns only on a fatal configuration
    /// error; transport and association errors are retried internally.
    async fn run(&self, handler: MessageHandler) -> Result<(), ConnectorError>;

    async fn send_provisional_response(&self, request: &ActionRequest);
    async fn send_blocking_response(&self, response: &ActionResponse, request: &ActionRequest);
    async fn send_status_response(&self, response: &ActionResponse, request: &ActionRequest);
    async fn send_non_blocking_response(&self, response: &ActionResponse);
    async fn send_pxp_error(&self, request: &ActionRequest, description: &str);
    async fn send_pcp_error(&self, request_id: RequestId, description: &str, endpoints: Vec<String>);
}

/// The WebSocket-backed connector. One instance per agent process; `run`
/// owns the connection for as long as the process lives.
pub struct WsConnector {
    identity: String,
    broker_uris: Vec<String>,
    version: PcpVersion,
    tuning: ConnectorTuning,
    tls_config: Arc<tokio_rustls::rustls::ClientConfig>,
    pcp_message_ttl_s: u64,
    next_broker: AtomicUsize,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
}

impl WsConnector {
    pub fn new(
        identity: String,
        broker_uris: Vec<String>,
        version: PcpVersion,
        tuning: ConnectorTuning,
        pcp_message_ttl_s: u64,
        tls: &TlsMaterial,
    ) -> Result<Self, ConnectorError> {
        if broker_uris.is_empty() {
            return Err(ConnectorError::Fatal("no broker_ws_uris configured".into()));
        }
        let tls_config = build_client_config(tls)?;
        Ok(Self {
            identity,
            broker_uris,
            version,
            tuning,
            tls_config,
            pcp_message_ttl_s,
            next_broker: AtomicUsize::new(0),
            outbound: Mutex::new(None),
        })
    }

    fn next_broker_uri(&self) -> &str {
        let i = self.next_broker.fetch_add(1, Ordering::Relaxed) % self.broker_uris.len();
        &self.broker_uris[i]
    }

    async fn connect_once(
        &self,
    ) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, ConnectorError>
    {
        let uri = self.next_broker_uri().to_string();
        let request = uri
            .into_client_request()
            .map_err(|e| ConnectorError::Fatal(format!("invalid broker uri: {e}")))?;

        let connect = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            Some(Connector::Rustls(self.tls_config.clone())),
        );

        let (stream, _response) = tokio::time::timeout(self.tuning.ws_connection_timeout(), connect)
            .await
            .map_err(|_| ConnectorError::Transport(format!("timed out connecting to {uri}")))?
            .map_err(|e| ConnectorError::Transport(format!("failed to connect to {uri}: {e}")))?;

        tracing::info!(broker = %uri, "connected to broker");
        Ok(stream)
    }

    /// v1 performs a request/response association handshake; v2 advertises
    /// itself and proceeds without waiting for a reply (spec.md §4.8
    /// "performs the association (v1) or advertises itself (v2)").
    async fn associate(
        &self,
        stream: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    ) -> Result<(), ConnectorError> {
        let message_type = match self.version {
            PcpVersion::V1 => "http://puppetlabs.com/associate_request",
            PcpVersion::V2 => "http://puppetlabs.com/associate_request_v2",
        };
        let body = serde_json::json!({});
        let frame = serde_json::json!({
            "envelope": {
                "sender": self.identity,
                "target": ["pcp:///server"],
                "message_type": message_type,
                "id": RequestId::new(nanoid::nanoid!()),
            },
            "data": { "content_type": "application/json", "payload": body },
            "debug": [],
        })
        .to_string();

        stream
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| ConnectorError::Association(e.to_string()))?;

        if self.version == PcpVersion::V1 {
            let reply = tokio::time::timeout(Duration::from_secs(self.tuning.association_timeout_s), stream.next())
                .await
                .map_err(|_| ConnectorError::Association("timed out waiting for association response".into()))?;
            match reply {
                Some(Ok(WsMessage::Text(_))) => {}
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ConnectorError::Association(e.to_string())),
                None => return Err(ConnectorError::Association("connection closed during association".into())),
            }
        }

        tracing::info!(version = ?self.version, "associated with broker");
        Ok(())
    }

    /// Reads inbound frames and dispatches them to `handler` until the
    /// connection closes or exceeds its keepalive allowance (spec.md §4.8
    /// "up to `allowed_keepalive_timeouts + 1` missed pongs close the
    /// session"). Concurrently drains the outbound queue onto the socket.
    async fn monitor_connection(
        &self,
        mut stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        handler: MessageHandler,
    ) -> Result<(), ConnectorError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock().await = Some(tx);

        let mut missed_pongs = 0u32;
        let mut ping_interval = tokio::time::interval(self.tuning.ping_interval());
        ping_interval.tick().await;

        loop {
            tokio::select! {
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            missed_pongs = 0;
                            match parse_frame(&text) {
                                Ok(chunks) => {
                                    if chunks.malformed_debug_count > 0 {
                                        tracing::warn!(count = chunks.malformed_debug_count, "dropped malformed debug sub-chunks");
                                    }
                                    handler(chunks);
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "rejecting malformed inbound frame");
                                    // parse_frame failed before an envelope could be trusted;
                                    // best-effort recover a sender to reply to, otherwise address
                                    // the broker itself. A malformed frame still gets a PCP-level
                                    // error reply, never just a dropped log line.
                                    let sender = serde_json::from_str::<serde_json::Value>(&text)
                                        .ok()
                                        .and_then(|v| v.get("envelope")?.get("sender")?.as_str().map(str::to_string))
                                        .unwrap_or_else(|| "pcp:///server".to_string());
                                    self.send_pcp_error(
                                        RequestId::new(nanoid::nanoid!()),
                                        &e.to_string(),
                                        vec![sender],
                                    )
                                    .await;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Pong(_))) => { missed_pongs = 0; }
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::info!(?frame, "broker closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(ConnectorError::Transport(e.to_string()));
                        }
                        None => break,
                    }
                }
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(msg) => {
                            if let Err(e) = stream.send(msg).await {
                                return Err(ConnectorError::Transport(e.to_string()));
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    missed_pongs += 1;
                    if missed_pongs > self.tuning.allowed_keepalive_timeouts {
                        return Err(ConnectorError::Transport("exceeded allowed keepalive timeouts".into()));
                    }
                    if stream.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        return Err(ConnectorError::Transport("failed to send keepalive ping".into()));
                    }
                }
            }
        }

        *self.outbound.lock().await = None;
        Ok(())
    }

    async fn backoff_sleep(&self) {
        tokio::time::sleep(Duration::from_secs_f64(pick_backoff_secs(ASSOCIATION_RETRY_BASE_S))).await;
    }

    /// Enqueue a frame for the writer half of the active connection. Per
    /// spec.md §4.8 "Send semantics", a transport error here is logged and
    /// the message is simply lost — no retry.
    async fn enqueue(&self, msg: pxp_wire::EncodedMessage, target: Vec<String>) {
        let id = RequestId::new(nanoid::nanoid!());
        let text = render_frame(msg, &self.identity, target, id);
        let sender = self.outbound.lock().await;
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(WsMessage::Text(text.into())).is_err() {
                    tracing::error!("failed to enqueue outbound message: connection writer gone");
                }
            }
            None => {
                tracing::error!("dropped outbound message: no active connection");
            }
        }
    }
}

#[async_trait]
impl PcpConnector for WsConnector {
    async fn run(&self, handler: MessageHandler) -> Result<(), ConnectorError> {
        loop {
            let mut stream = match self.connect_once().await {
                Ok(s) => s,
                Err(e @ ConnectorError::Fatal(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to connect; retrying");
                    self.backoff_sleep().await;
                    continue;
                }
            };

            if let Err(e) = self.associate(&mut stream).await {
                tracing::warn!(error = %e, "association failed; retrying");
                self.backoff_sleep().await;
                continue;
            }

            if let Err(e) = self.monitor_connection(stream, handler.clone()).await {
                tracing::warn!(error = %e, "connection lost; reconnecting");
            }
        }
    }

    async fn send_provisional_response(&self, request: &ActionRequest) {
        let msg = encode(
            OutboundMessage::ProvisionalResponse {
                in_reply_to: request.id.clone(),
                transaction_id: request.transaction_id.to_string(),
                debug: request.debug.clone(),
            },
            self.version,
            self.pcp_message_ttl_s,
            "1970-01-01T00:00:00.000Z",
        );
        self.enqueue(msg, vec![request.sender.clone()]).await;
    }

    async fn send_blocking_response(&self, response: &ActionResponse, request: &ActionRequest) {
        let msg = encode(
            OutboundMessage::BlockingResponse {
                in_reply_to: request.id.clone(),
                response: response.clone(),
                debug: request.debug.clone(),
            },
            self.version,
            self.pcp_message_ttl_s,
            &response.action_metadata.start,
        );
        self.enqueue(msg, vec![request.sender.clone()]).await;
    }

    async fn send_status_response(&self, response: &ActionResponse, request: &ActionRequest) {
        let msg = encode(
            OutboundMessage::StatusResponse {
                in_reply_to: request.id.clone(),
                response: response.clone(),
                debug: request.debug.clone(),
            },
            self.version,
            self.pcp_message_ttl_s,
            &response.action_metadata.start,
        );
        self.enqueue(msg, vec![request.sender.clone()]).await;
    }

    async fn send_non_blocking_response(&self, response: &ActionResponse) {
        let target = response.action_metadata.requester.clone();
        let msg = encode(
            OutboundMessage::NonBlockingResponse { response: response.clone() },
            self.version,
            self.pcp_message_ttl_s,
            &response.action_metadata.start,
        );
        self.enqueue(msg, vec![target]).await;
    }

    async fn send_pxp_error(&self, request: &ActionRequest, description: &str) {
        let msg = encode(
            OutboundMessage::PxpError { in_reply_to: request.id.clone(), description: description.to_string() },
            self.version,
            self.pcp_message_ttl_s,
            "1970-01-01T00:00:00.000Z",
        );
        self.enqueue(msg, vec![request.sender.clone()]).await;
    }

    async fn send_pcp_error(&self, request_id: RequestId, description: &str, endpoints: Vec<String>) {
        let msg = encode(
            OutboundMessage::PcpError { request_id, description: description.to_string(), endpoints: endpoints.clone() },
            self.version,
            self.pcp_message_ttl_s,
            "1970-01-01T00:00:00.000Z",
        );
        self.enqueue(msg, endpoints).await;
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
