//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the subset a listening client needs: handshake, heartbeats,
//! namespace connect and inbound events. Binary attachments are not
//! supported.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   engine open
//! 2 / 3                                   ping / pong
//! 40                                      socket connect, default namespace
//! 42["fila_atualizada",{...}]             socket event
//! 42/admin,7["evt",{...}]                 event on /admin with ack id 7
//! ```

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine packet type {0:?}")]
    UnknownEngineType(char),

    #[error("unknown socket packet type {0:?}")]
    UnknownSocketType(char),

    #[error("invalid packet body: {0}")]
    InvalidBody(String),

    #[error("event packet has no name")]
    MissingEventName,

    #[error("invalid server url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Handshake sent by the server in the engine open packet.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<serde_json::Value>,
    },
    Ack {
        namespace: String,
        ack_id: Option<u64>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    /// Binary event or ack. Attachments arrive as separate frames we do not read.
    Binary,
}

impl EnginePacket {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let body = chars.as_str();

        match kind {
            '0' => serde_json::from_str(body)
                .map(EnginePacket::Open)
                .map_err(|e| ProtocolError::InvalidBody(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => SocketPacket::parse(body).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ProtocolError::UnknownEngineType(other)),
        }
    }
}

impl SocketPacket {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        let (namespace, rest) = split_namespace(rest);
        let (ack_id, body) = split_ack_id(rest);

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args: Vec<serde_json::Value> = serde_json::from_str(body)
                    .map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;
                if args.is_empty() {
                    return Err(ProtocolError::MissingEventName);
                }
                let name = match args.remove(0) {
                    serde_json::Value::String(name) => name,
                    _ => return Err(ProtocolError::MissingEventName),
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => Ok(SocketPacket::Ack { namespace, ack_id }),
            '4' => {
                let message = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or_else(|| body.to_string());
                Ok(SocketPacket::ConnectError { namespace, message })
            }
            '5' | '6' => Ok(SocketPacket::Binary),
            other => Err(ProtocolError::UnknownSocketType(other)),
        }
    }

    /// Text frame asking the server to join `namespace`.
    pub fn encode_connect(namespace: &str) -> String {
        match normalize_namespace(namespace).as_str() {
            "/" => "40".to_string(),
            ns => format!("40{},", ns),
        }
    }
}

/// Namespace in the form the server echoes back: `""` is `/`, and a missing
/// leading slash is added.
pub fn normalize_namespace(namespace: &str) -> String {
    let trimmed = namespace.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Pong reply for a ping carrying `data`.
pub fn encode_pong(data: &str) -> String {
    format!("3{}", data)
}

fn split_namespace(text: &str) -> (String, &str) {
    if !text.starts_with('/') {
        return ("/".to_string(), text);
    }
    match text.find(',') {
        Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
        None => (text.to_string(), ""),
    }
}

fn split_ack_id(text: &str) -> (Option<u64>, &str) {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, text);
    }
    (text[..digits].parse().ok(), &text[digits..])
}

/// WebSocket endpoint for a Socket.IO server.
///
/// Accepts `http(s)://` or `ws(s)://` base URLs and appends the Engine.IO
/// path and query.
pub fn endpoint_url(server: &str, path: &str) -> Result<Url, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidUrl {
        url: server.to_string(),
        reason,
    };

    let mut url = Url::parse(server).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot change scheme".to_string()))?;

    let path = path.trim_matches('/');
    url.set_path(&format!("/{}/", path));
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_open_handshake() {
        let packet = EnginePacket::parse(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "abc");
                assert_eq!(hs.ping_interval, 25000);
                assert_eq!(hs.ping_timeout, 20000);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn parses_heartbeats() {
        assert_eq!(EnginePacket::parse("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(
            EnginePacket::parse("2probe").unwrap(),
            EnginePacket::Ping("probe".to_string())
        );
        assert_eq!(encode_pong("probe"), "3probe");
    }

    #[test]
    fn parses_event_on_default_namespace() {
        let packet = EnginePacket::parse(r#"42["fila_atualizada",{"fila":[],"agentes":[]}]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/".to_string(),
                ack_id: None,
                name: "fila_atualizada".to_string(),
                args: vec![json!({"fila": [], "agentes": []})],
            })
        );
    }

    #[test]
    fn parses_event_with_namespace_and_ack() {
        let packet = SocketPacket::parse(r#"2/admin,12["ping",1]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/admin".to_string(),
                ack_id: Some(12),
                name: "ping".to_string(),
                args: vec![json!(1)],
            }
        );
    }

    #[test]
    fn parses_connect_and_connect_error() {
        assert_eq!(
            SocketPacket::parse(r#"0{"sid":"x"}"#).unwrap(),
            SocketPacket::Connect { namespace: "/".to_string() }
        );
        assert_eq!(
            SocketPacket::parse(r#"4/admin,{"message":"Not authorized"}"#).unwrap(),
            SocketPacket::ConnectError {
                namespace: "/admin".to_string(),
                message: "Not authorized".to_string(),
            }
        );
    }

    #[test]
    fn rejects_bad_packets() {
        assert_eq!(EnginePacket::parse(""), Err(ProtocolError::Empty));
        assert_eq!(EnginePacket::parse("9"), Err(ProtocolError::UnknownEngineType('9')));
        assert_eq!(SocketPacket::parse("2[]"), Err(ProtocolError::MissingEventName));
        assert_eq!(SocketPacket::parse("2[5]"), Err(ProtocolError::MissingEventName));
        assert!(matches!(SocketPacket::parse("2{oops"), Err(ProtocolError::InvalidBody(_))));
    }

    #[test]
    fn encodes_namespace_connect() {
        assert_eq!(SocketPacket::encode_connect("/"), "40");
        assert_eq!(SocketPacket::encode_connect(""), "40");
        assert_eq!(SocketPacket::encode_connect("/admin"), "40/admin,");
        assert_eq!(SocketPacket::encode_connect("suporte"), "40/suporte,");
    }

    #[test]
    fn namespaces_are_normalized() {
        assert_eq!(normalize_namespace(""), "/");
        assert_eq!(normalize_namespace("/"), "/");
        assert_eq!(normalize_namespace("suporte"), "/suporte");
        assert_eq!(normalize_namespace(" /suporte "), "/suporte");
    }

    #[test]
    fn builds_websocket_endpoint() {
        let url = endpoint_url("http://localhost:5000", "socket.io").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5000/socket.io/?EIO=4&transport=websocket");

        let url = endpoint_url("https://support.example.com/", "/rt/socket.io/").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://support.example.com/rt/socket.io/?EIO=4&transport=websocket"
        );

        assert!(endpoint_url("ftp://example.com", "socket.io").is_err());
        assert!(endpoint_url("not a url", "socket.io").is_err());
    }
}
