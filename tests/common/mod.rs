#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use planewatch_client::planes::Client;
use planewatch_client::ws::ConnectionState;
use planewatch_client::ws::config::{Config, Heartbeat, ReconnectConfig, ReconnectStrategy};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// How long helpers wait for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Instructions for the broker side of every open connection.
#[derive(Clone, Debug)]
enum Control {
    Text(String),
    Binary(Vec<u8>),
    Close(u16, String),
    /// Drop the TCP stream without a close frame
    Drop,
    /// Stop reading, so PINGs go unanswered
    Stall,
}

/// Mock plane.watch broker speaking the `planes` subprotocol.
pub struct MockBroker {
    addr: SocketAddr,
    /// Instructions fanned out to every open connection
    control_tx: broadcast::Sender<Control>,
    /// Text frames received from clients, across all connections
    frames_rx: mpsc::UnboundedReceiver<String>,
    /// Number of accepted handshakes
    connections: Arc<AtomicUsize>,
}

impl MockBroker {
    /// Start a mock broker on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (control_tx, _) = broadcast::channel::<Control>(2048);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<String>();
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_control = control_tx.clone();
        let accept_connections = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                // Subscribe before the handshake so nothing sent after the client opens is missed
                let mut control_rx = accept_control.subscribe();
                let frames_tx = frames_tx.clone();

                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, negotiate).await
                else {
                    continue;
                };
                accept_connections.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(frames_tx.send(text.as_str().to_owned()));
                                    }
                                    // Keep reading so tungstenite flushes its close reply
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            control = control_rx.recv() => {
                                let message = match control {
                                    Ok(Control::Text(text)) => Message::Text(text.into()),
                                    Ok(Control::Binary(bytes)) => Message::Binary(bytes.into()),
                                    Ok(Control::Close(code, reason)) => Message::Close(Some(CloseFrame {
                                        code: code.into(),
                                        reason: reason.into(),
                                    })),
                                    Ok(Control::Stall) => {
                                        tokio::time::sleep(Duration::from_secs(60)).await;
                                        break;
                                    }
                                    Ok(Control::Drop) | Err(_) => break,
                                };
                                if write.send(message).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            control_tx,
            frames_rx,
            connections,
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/planes", self.addr)
    }

    /// Push a JSON frame to every open connection.
    pub fn push(&self, frame: &Value) {
        self.push_text(&frame.to_string());
    }

    pub fn push_text(&self, text: &str) {
        drop(self.control_tx.send(Control::Text(text.to_owned())));
    }

    pub fn push_binary(&self, bytes: &[u8]) {
        drop(self.control_tx.send(Control::Binary(bytes.to_vec())));
    }

    /// Close every open connection with `code`.
    pub fn close(&self, code: u16, reason: &str) {
        drop(self.control_tx.send(Control::Close(code, reason.to_owned())));
    }

    /// Drop every open connection without a close frame.
    pub fn drop_connections(&self) {
        drop(self.control_tx.send(Control::Drop));
    }

    /// Stop answering on every open connection.
    pub fn stall(&self) {
        drop(self.control_tx.send(Control::Stall));
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame a client sent, parsed as JSON.
    pub async fn recv_frame(&mut self) -> Option<Value> {
        timeout(PATIENCE, self.frames_rx.recv())
            .await
            .ok()
            .flatten()
            .map(|text| serde_json::from_str(&text).unwrap())
    }

    /// `None` if no frame arrives within `window`.
    pub async fn frame_within(&mut self, window: Duration) -> Option<Value> {
        timeout(window, self.frames_rx.recv())
            .await
            .ok()
            .flatten()
            .map(|text| serde_json::from_str(&text).unwrap())
    }
}

/// Accept only clients that offer `planes`, and select it.
#[expect(
    clippy::result_large_err,
    reason = "Signature is dictated by tungstenite's handshake callback"
)]
fn negotiate(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|p| p.trim() == "planes"));

    if offered {
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("planes"));
        Ok(response)
    } else {
        let mut error = ErrorResponse::new(Some("planes subprotocol required".to_owned()));
        *error.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::BAD_REQUEST;
        Err(error)
    }
}

/// Quick reconnects and no heartbeat, so tests run fast and deterministically.
#[must_use]
pub fn fast_config(reconnect_delay: Duration) -> Config {
    Config::builder()
        .heartbeat(Heartbeat::Disabled)
        .reconnect(
            ReconnectConfig::builder()
                .strategy(ReconnectStrategy::fixed(reconnect_delay))
                .build(),
        )
        .build()
}

/// Connect a fresh client to `broker` and wait for it to open.
pub async fn connected_client(broker: &MockBroker, config: Config) -> Client {
    let client = Client::new(&broker.url(), config).unwrap();
    client.connect().unwrap();
    timeout(PATIENCE, client.wait_until_open())
        .await
        .unwrap()
        .unwrap();
    client
}

/// Wait until the state satisfies `predicate`, returning it.
pub async fn wait_for_state<F>(state_rx: &mut watch::Receiver<ConnectionState>, predicate: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    timeout(PATIENCE, state_rx.wait_for(predicate))
        .await
        .unwrap()
        .unwrap()
        .clone()
}
