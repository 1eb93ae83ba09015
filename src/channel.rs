//! Push-channel capability injected into the renderer.
//!
//! A channel delivers named events to subscribed handlers. Handlers always
//! run on the UI thread, inside `pump()`, one at a time and in delivery
//! order. Three implementations:
//!
//! - `LocalChannel`: in-process queue, fed by `emit`.
//! - `ReplayChannel`: plays a JSON Lines file of recorded payloads.
//! - `SocketIoChannel`: live server, fed by the `ws_client` background task.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// One event as received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Monotonic per channel, assigned on receipt.
    pub seq: u64,
    pub event: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

pub type EventHandler = Box<dyn FnMut(&Delivery)>;

/// Connection status shown in the dashboard header.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error(String),
    Replay,
}

/// Shared between the WebSocket task and the UI thread.
pub type SharedStatus = Arc<Mutex<ConnectionStatus>>;

pub trait PushChannel {
    /// Register `handler` for every future delivery of `event`.
    fn subscribe(&mut self, event: &str, handler: EventHandler);

    /// Dispatch whatever arrived since the last call. Returns the number of
    /// handler invocations.
    fn pump(&mut self) -> usize;

    fn status(&self) -> ConnectionStatus;
}

/// Handler table shared by the channel implementations.
#[derive(Default)]
struct Dispatcher {
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl Dispatcher {
    fn subscribe(&mut self, event: &str, handler: EventHandler) {
        self.handlers.entry(event.to_string()).or_default().push(handler);
    }

    fn dispatch(&mut self, delivery: &Delivery) -> usize {
        match self.handlers.get_mut(&delivery.event) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(delivery);
                }
                handlers.len()
            }
            None => {
                debug!(target: "channel", event = %delivery.event, seq = delivery.seq, "No subscriber");
                0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LocalChannel
// ---------------------------------------------------------------------------

/// In-process channel. `emit` queues; `pump` dispatches.
#[derive(Default)]
pub struct LocalChannel {
    dispatcher: Dispatcher,
    pending: VecDeque<Delivery>,
    next_seq: u64,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `payload` under `event` with the next sequence number.
    pub fn emit(&mut self, event: &str, payload: serde_json::Value) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.deliver(Delivery {
            seq,
            event: event.to_string(),
            payload,
            received_at: Utc::now(),
        });
        seq
    }

    /// Queue a delivery as-is, keeping its sequence number.
    pub fn deliver(&mut self, delivery: Delivery) {
        self.pending.push_back(delivery);
    }
}

impl PushChannel for LocalChannel {
    fn subscribe(&mut self, event: &str, handler: EventHandler) {
        self.dispatcher.subscribe(event, handler);
    }

    fn pump(&mut self) -> usize {
        let mut invoked = 0;
        while let Some(delivery) = self.pending.pop_front() {
            invoked += self.dispatcher.dispatch(&delivery);
        }
        invoked
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::Connected
    }
}

// ---------------------------------------------------------------------------
// ReplayChannel
// ---------------------------------------------------------------------------

/// Plays recorded payloads, one every `interval`.
pub struct ReplayChannel {
    local: LocalChannel,
    event: String,
    frames: VecDeque<serde_json::Value>,
    interval: Duration,
    next_due: Instant,
}

impl ReplayChannel {
    /// Load a JSON Lines file: one payload per non-empty line.
    pub fn from_file(path: &Path, event: &str, interval: Duration) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        Self::from_lines(&content, event, interval)
            .with_context(|| format!("Invalid replay file {}", path.display()))
    }

    pub fn from_lines(content: &str, event: &str, interval: Duration) -> Result<Self> {
        let mut frames = VecDeque::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("line {} is not valid JSON", idx + 1))?;
            frames.push_back(value);
        }

        Ok(Self {
            local: LocalChannel::new(),
            event: event.to_string(),
            frames,
            interval,
            next_due: Instant::now(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    fn tick(&mut self, now: Instant) {
        if now < self.next_due {
            return;
        }
        if let Some(frame) = self.frames.pop_front() {
            let seq = self.local.emit(&self.event, frame);
            debug!(target: "channel", seq, remaining = self.frames.len(), "Replaying frame");
            self.next_due = now + self.interval;
        }
    }
}

impl PushChannel for ReplayChannel {
    fn subscribe(&mut self, event: &str, handler: EventHandler) {
        self.local.subscribe(event, handler);
    }

    fn pump(&mut self) -> usize {
        self.tick(Instant::now());
        self.local.pump()
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::Replay
    }
}

// ---------------------------------------------------------------------------
// SocketIoChannel
// ---------------------------------------------------------------------------

/// UI-side end of the live Socket.IO connection.
pub struct SocketIoChannel {
    dispatcher: Dispatcher,
    inbound: mpsc::UnboundedReceiver<Delivery>,
    status: SharedStatus,
}

impl SocketIoChannel {
    pub fn new(inbound: mpsc::UnboundedReceiver<Delivery>, status: SharedStatus) -> Self {
        Self {
            dispatcher: Dispatcher::default(),
            inbound,
            status,
        }
    }
}

impl PushChannel for SocketIoChannel {
    fn subscribe(&mut self, event: &str, handler: EventHandler) {
        self.dispatcher.subscribe(event, handler);
    }

    fn pump(&mut self) -> usize {
        let mut pending = Vec::new();
        while let Ok(delivery) = self.inbound.try_recv() {
            pending.push(delivery);
        }

        let batch = coalesce(pending);
        let mut invoked = 0;
        for delivery in &batch {
            invoked += self.dispatcher.dispatch(delivery);
        }
        invoked
    }

    fn status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| ConnectionStatus::Error("status lock poisoned".to_string()))
    }
}

/// Keep only the newest delivery per event name, in arrival order of the
/// survivors. Every payload is a full snapshot, so older ones are superseded.
fn coalesce(pending: Vec<Delivery>) -> Vec<Delivery> {
    let total = pending.len();
    let mut newest: HashMap<String, usize> = HashMap::new();
    for (idx, delivery) in pending.iter().enumerate() {
        newest.insert(delivery.event.clone(), idx);
    }

    let batch: Vec<Delivery> = pending
        .into_iter()
        .enumerate()
        .filter(|(idx, d)| newest.get(&d.event) == Some(idx))
        .map(|(_, d)| d)
        .collect();

    if batch.len() < total {
        debug!(target: "channel", superseded = total - batch.len(), "Dropped superseded deliveries");
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(channel: &mut dyn PushChannel, event: &str) -> Rc<RefCell<Vec<u64>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        channel.subscribe(event, Box::new(move |d: &Delivery| sink.borrow_mut().push(d.seq)));
        seen
    }

    fn delivery(seq: u64, event: &str) -> Delivery {
        Delivery {
            seq,
            event: event.to_string(),
            payload: json!({ "seq": seq }),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn local_channel_dispatches_in_order_on_pump() {
        let mut channel = LocalChannel::new();
        let seen = recorder(&mut channel, "fila_atualizada");

        channel.emit("fila_atualizada", json!({}));
        channel.emit("outro_evento", json!({}));
        channel.emit("fila_atualizada", json!({}));
        assert!(seen.borrow().is_empty());

        assert_eq!(channel.pump(), 2);
        assert_eq!(*seen.borrow(), vec![1, 3]);
        assert_eq!(channel.pump(), 0);
    }

    #[test]
    fn coalesce_keeps_newest_per_event() {
        let batch = coalesce(vec![
            delivery(1, "a"),
            delivery(2, "b"),
            delivery(3, "a"),
            delivery(4, "a"),
        ]);
        let seqs: Vec<u64> = batch.iter().map(|d| d.seq).collect();
        assert_eq!(seqs, vec![2, 4]);
    }

    #[test]
    fn socketio_channel_drains_and_coalesces() {
        let (tx, rx) = mpsc::unbounded_channel();
        let status: SharedStatus = Arc::new(Mutex::new(ConnectionStatus::Connected));
        let mut channel = SocketIoChannel::new(rx, status);
        let seen = recorder(&mut channel, "fila_atualizada");

        tx.send(delivery(1, "fila_atualizada")).unwrap();
        tx.send(delivery(2, "fila_atualizada")).unwrap();
        tx.send(delivery(3, "ignorado")).unwrap();

        assert_eq!(channel.pump(), 1);
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(channel.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn replay_emits_one_frame_per_interval() {
        let content = "{\"fila\":[],\"agentes\":[]}\n\n{\"fila\":[],\"agentes\":[]}\n";
        let mut channel =
            ReplayChannel::from_lines(content, "fila_atualizada", Duration::from_secs(3600)).unwrap();
        let seen = recorder(&mut channel, "fila_atualizada");
        assert_eq!(channel.remaining(), 2);

        assert_eq!(channel.pump(), 1);
        // Next frame is not due for an hour.
        assert_eq!(channel.pump(), 0);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(channel.remaining(), 1);
        assert_eq!(channel.status(), ConnectionStatus::Replay);
    }

    #[test]
    fn replay_rejects_invalid_lines() {
        let err = ReplayChannel::from_lines("{}\nnot json\n", "e", Duration::ZERO)
            .err()
            .expect("second line is invalid");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn replay_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.jsonl");
        std::fs::write(&path, "{\"fila\":[],\"agentes\":[]}\n").unwrap();

        let channel = ReplayChannel::from_file(&path, "fila_atualizada", Duration::ZERO).unwrap();
        assert_eq!(channel.remaining(), 1);

        assert!(ReplayChannel::from_file(&dir.path().join("missing.jsonl"), "e", Duration::ZERO).is_err());
    }
}
