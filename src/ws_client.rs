//! Socket.IO client for the ticket queue server.
//!
//! Runs in a Tokio background task. Every inbound event is stamped with a
//! monotonic sequence number and forwarded to the UI thread, which drains
//! the queue through `SocketIoChannel::pump`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::channel::{ConnectionStatus, Delivery, SharedStatus, SocketIoChannel};
use crate::socketio::{EnginePacket, SocketPacket, encode_pong, normalize_namespace};

/// What the client needs to know to reach the server.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: Url,
    /// Always normalized, so it compares equal to what the server echoes.
    namespace: String,
    pub reconnect_delay: Duration,
}

impl ClientOptions {
    pub fn new(endpoint: Url, namespace: &str, reconnect_delay: Duration) -> Self {
        Self {
            endpoint,
            namespace: normalize_namespace(namespace),
            reconnect_delay,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Spawn the reconnecting client task and return the UI-side channel.
pub fn spawn_client(runtime: &tokio::runtime::Runtime, options: ClientOptions) -> SocketIoChannel {
    let status: SharedStatus = Arc::new(Mutex::new(ConnectionStatus::Connecting));
    let (tx, rx) = mpsc::unbounded_channel::<Delivery>();

    runtime.spawn(client_loop(Arc::clone(&status), options, tx));

    SocketIoChannel::new(rx, status)
}

fn set_status(shared: &SharedStatus, status: ConnectionStatus) {
    if let Ok(mut current) = shared.lock() {
        *current = status;
    }
}

/// Reconnecting client loop. Exits when the UI side drops its receiver.
async fn client_loop(status: SharedStatus, options: ClientOptions, tx: mpsc::UnboundedSender<Delivery>) {
    let url = options.endpoint.to_string();
    // Lives outside the loop so numbering survives reconnects.
    let mut next_seq: u64 = 0;

    loop {
        set_status(&status, ConnectionStatus::Connecting);

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!(target: "ws_client", url = %url, "WebSocket connected");
                let (mut write, mut read) = ws_stream.split();

                loop {
                    let msg = match read.next().await {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            error!(target: "ws_client", url = %url, "WebSocket error: {}", e);
                            set_status(&status, ConnectionStatus::Error(format!("WS error: {}", e)));
                            break;
                        }
                        None => {
                            info!(target: "ws_client", url = %url, "WebSocket closed by server");
                            break;
                        }
                    };

                    let text = match msg {
                        Message::Text(text) => text,
                        Message::Ping(data) => {
                            let _ = write.send(Message::Pong(data)).await;
                            continue;
                        }
                        Message::Close(_) => {
                            info!(target: "ws_client", url = %url, "WebSocket closed by server");
                            break;
                        }
                        _ => continue,
                    };

                    let packet = match EnginePacket::parse(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!(target: "ws_client", "Skipping unreadable packet: {}", e);
                            continue;
                        }
                    };

                    match packet {
                        EnginePacket::Open(handshake) => {
                            debug!(target: "ws_client", sid = %handshake.sid,
                                ping_interval = handshake.ping_interval, "Engine.IO open");
                            let connect = SocketPacket::encode_connect(&options.namespace);
                            if let Err(e) = write.send(Message::Text(connect.into())).await {
                                error!(target: "ws_client", "Failed to send namespace connect: {}", e);
                                break;
                            }
                        }
                        EnginePacket::Ping(data) => {
                            if let Err(e) = write.send(Message::Text(encode_pong(&data).into())).await {
                                error!(target: "ws_client", "Failed to answer ping: {}", e);
                                break;
                            }
                        }
                        EnginePacket::Close => {
                            info!(target: "ws_client", url = %url, "Engine.IO close");
                            break;
                        }
                        EnginePacket::Message(socket_packet) => {
                            if !handle_socket_packet(socket_packet, &options.namespace, &status, &tx, &mut next_seq) {
                                break;
                            }
                        }
                        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                    }
                }

                if let Ok(mut current) = status.lock() {
                    if *current == ConnectionStatus::Connected || *current == ConnectionStatus::Connecting {
                        *current = ConnectionStatus::Disconnected;
                    }
                }
            }
            Err(e) => {
                warn!(target: "ws_client", url = %url, "Connection failed: {}, retrying in {:?}", e, options.reconnect_delay);
                set_status(&status, ConnectionStatus::Error(format!("Connect failed: {}", e)));
            }
        }

        if tx.is_closed() {
            debug!(target: "ws_client", "UI side gone, stopping client");
            return;
        }

        tokio::time::sleep(options.reconnect_delay).await;
    }
}

/// Apply one Socket.IO packet. Returns `false` when the connection should be
/// dropped.
fn handle_socket_packet(
    packet: SocketPacket,
    namespace: &str,
    status: &SharedStatus,
    tx: &mpsc::UnboundedSender<Delivery>,
    next_seq: &mut u64,
) -> bool {
    match packet {
        SocketPacket::Connect { namespace: ns } if ns == namespace => {
            info!(target: "ws_client", namespace = %ns, "Socket.IO connected");
            set_status(status, ConnectionStatus::Connected);
            true
        }
        SocketPacket::ConnectError { namespace: ns, message } => {
            warn!(target: "ws_client", namespace = %ns, "Socket.IO connect refused: {}", message);
            set_status(status, ConnectionStatus::Error(format!("Refused: {}", message)));
            false
        }
        SocketPacket::Disconnect { namespace: ns } if ns == namespace => {
            info!(target: "ws_client", namespace = %ns, "Socket.IO disconnected by server");
            false
        }
        SocketPacket::Event { namespace: ns, name, mut args, .. } if ns == namespace => {
            *next_seq += 1;
            let payload = if args.is_empty() {
                serde_json::Value::Null
            } else {
                args.swap_remove(0)
            };
            let delivery = Delivery {
                seq: *next_seq,
                event: name,
                payload,
                received_at: Utc::now(),
            };
            debug!(target: "ws_client", seq = delivery.seq, event = %delivery.event, "Event received");
            // Receiver gone means the window closed.
            tx.send(delivery).is_ok()
        }
        SocketPacket::Binary => {
            debug!(target: "ws_client", "Ignoring binary packet");
            true
        }
        _ => true,
    }
}
