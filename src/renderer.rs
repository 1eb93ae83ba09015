//! Snapshot-to-view reconciliation.
//!
//! `SnapshotRenderer` subscribes to the queue update event and, on every
//! snapshot, rebuilds the `fila` and `agentes` containers from scratch. There
//! is no diffing and no keyed reuse: each pass clears a container and appends
//! one element per entity, in the order the server sent them.
//!
//! A pass either fully succeeds or leaves both containers untouched. The
//! whole snapshot is validated and both containers are located before the
//! first mutation.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel::{Delivery, PushChannel};
use crate::protocol::{Agent, QueueSnapshot, Ticket};
use crate::view::{Element, ViewBinding};

pub const QUEUE_CONTAINER: &str = "fila";
pub const AGENT_CONTAINER: &str = "agentes";
pub const UPDATE_EVENT: &str = "fila_atualizada";

pub const UNASSIGNED: &str = "Não atribuído";
pub const NO_CURRENT_TICKET: &str = "Nenhum";

pub const TICKET_CLASS: &str = "ticket";
pub const AGENT_CLASS: &str = "agent";
pub const PRIORITY_CLASS_PREFIX: &str = "priority-";

pub const PRIORITY_LABEL: &str = "Prioridade";
pub const ESTIMATE_LABEL: &str = "Tempo estimado";
pub const AGENT_LABEL: &str = "Agente";
pub const CURRENT_TICKET_LABEL: &str = "Chamado atual";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("container not found: {0}")]
    MissingContainer(String),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("renderer is already listening")]
    AlreadyListening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub tickets: usize,
    pub agents: usize,
}

/// Admits only deliveries newer than the last one admitted.
#[derive(Debug, Default)]
pub struct SequenceGate {
    last: Option<u64>,
}

impl SequenceGate {
    pub fn admit(&mut self, seq: u64) -> bool {
        match self.last {
            Some(last) if seq <= last => false,
            _ => {
                self.last = Some(seq);
                true
            }
        }
    }
}

struct RendererCore<V> {
    view: V,
    gate: SequenceGate,
    last_error: Option<RenderError>,
    last_rendered_at: Option<DateTime<Utc>>,
    renders: u64,
}

impl<V: ViewBinding> RendererCore<V> {
    fn render(&mut self, snapshot: &QueueSnapshot) -> Result<RenderSummary, RenderError> {
        validate(snapshot)?;

        for id in [QUEUE_CONTAINER, AGENT_CONTAINER] {
            if self.view.container(id).is_none() {
                return Err(RenderError::MissingContainer(id.to_string()));
            }
        }

        let queue = self
            .view
            .container(QUEUE_CONTAINER)
            .ok_or_else(|| RenderError::MissingContainer(QUEUE_CONTAINER.to_string()))?;
        queue.clear();
        for ticket in &snapshot.queue {
            queue.append_child(ticket_element(ticket)?);
        }

        let agents = self
            .view
            .container(AGENT_CONTAINER)
            .ok_or_else(|| RenderError::MissingContainer(AGENT_CONTAINER.to_string()))?;
        agents.clear();
        for agent in &snapshot.agents {
            agents.append_child(agent_element(agent));
        }

        Ok(RenderSummary {
            tickets: snapshot.queue.len(),
            agents: snapshot.agents.len(),
        })
    }

    fn record(&mut self, result: &Result<RenderSummary, RenderError>) {
        match result {
            Ok(summary) => {
                self.last_error = None;
                self.last_rendered_at = Some(Utc::now());
                self.renders += 1;
                debug!(target: "renderer", tickets = summary.tickets, agents = summary.agents, "Rendered snapshot");
            }
            Err(e) => {
                warn!(target: "renderer", "Render pass failed: {}", e);
                self.last_error = Some(e.clone());
            }
        }
    }

    fn handle(&mut self, delivery: &Delivery) {
        if !self.gate.admit(delivery.seq) {
            debug!(target: "renderer", seq = delivery.seq, "Dropping stale snapshot");
            return;
        }

        let result = serde_json::from_value::<QueueSnapshot>(delivery.payload.clone())
            .map_err(|e| RenderError::MalformedSnapshot(e.to_string()))
            .and_then(|snapshot| self.render(&snapshot));
        self.record(&result);
    }
}

/// Renders queue snapshots into a view binding.
///
/// Cloning is cheap and shares the same view; the channel handler holds one
/// clone, the dashboard another.
pub struct SnapshotRenderer<V> {
    core: Rc<RefCell<RendererCore<V>>>,
    listening: bool,
}

impl<V: ViewBinding + 'static> SnapshotRenderer<V> {
    pub fn new(view: V) -> Self {
        Self {
            core: Rc::new(RefCell::new(RendererCore {
                view,
                gate: SequenceGate::default(),
                last_error: None,
                last_rendered_at: None,
                renders: 0,
            })),
            listening: false,
        }
    }

    /// Subscribe to `event` on `channel`. Call once.
    pub fn initialize(&mut self, channel: &mut dyn PushChannel, event: &str) -> Result<(), RenderError> {
        if self.listening {
            return Err(RenderError::AlreadyListening);
        }

        let core = Rc::clone(&self.core);
        channel.subscribe(
            event,
            Box::new(move |delivery: &Delivery| core.borrow_mut().handle(delivery)),
        );
        self.listening = true;
        info!(target: "renderer", event, "Listening for queue snapshots");
        Ok(())
    }

    /// Replace both panels with the content of `snapshot`.
    pub fn on_snapshot(&self, snapshot: &QueueSnapshot) -> Result<RenderSummary, RenderError> {
        let mut core = self.core.borrow_mut();
        let result = core.render(snapshot);
        core.record(&result);
        result
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn view(&self) -> Ref<'_, V> {
        Ref::map(self.core.borrow(), |core| &core.view)
    }

    /// Error from the most recent pass, cleared by the next successful one.
    pub fn last_error(&self) -> Option<RenderError> {
        self.core.borrow().last_error.clone()
    }

    pub fn last_rendered_at(&self) -> Option<DateTime<Utc>> {
        self.core.borrow().last_rendered_at
    }

    pub fn renders(&self) -> u64 {
        self.core.borrow().renders
    }
}

fn validate(snapshot: &QueueSnapshot) -> Result<(), RenderError> {
    for (idx, ticket) in snapshot.queue.iter().enumerate() {
        if ticket.priority.is_empty() {
            return Err(RenderError::MalformedSnapshot(format!(
                "ticket {} ({}) has no priority",
                idx, ticket.customer_name
            )));
        }
    }
    Ok(())
}

/// Classifier token for a ticket, from its first priority value only.
pub fn priority_class(ticket: &Ticket) -> Result<String, RenderError> {
    ticket
        .primary_priority()
        .map(|p| format!("{}{}", PRIORITY_CLASS_PREFIX, p))
        .ok_or_else(|| {
            RenderError::MalformedSnapshot(format!("ticket {} has no priority", ticket.customer_name))
        })
}

pub fn ticket_element(ticket: &Ticket) -> Result<Element, RenderError> {
    Ok(Element::new(format!("{} - {}", ticket.customer_name, ticket.ticket_type))
        .with_class(TICKET_CLASS)
        .with_class(priority_class(ticket)?)
        .with_line(PRIORITY_LABEL, ticket.priority_text())
        .with_line(ESTIMATE_LABEL, ticket.estimated_time.clone())
        .with_line(AGENT_LABEL, ticket.agent().unwrap_or(UNASSIGNED)))
}

pub fn agent_element(agent: &Agent) -> Element {
    Element::new(agent.name.clone())
        .with_class(AGENT_CLASS)
        .with_line(CURRENT_TICKET_LABEL, agent.ticket().unwrap_or(NO_CURRENT_TICKET))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalChannel;
    use crate::view::{Container, Panel, Panels};
    use serde_json::{Value, json};

    fn ticket(name: &str, kind: &str, priority: &[u64], agent: Option<&str>) -> Value {
        json!({
            "cliente_nome": name,
            "tipo_chamado": kind,
            "prioridade": priority,
            "tempo_estimado": "10m",
            "agente_atribuido": agent,
        })
    }

    fn agent(name: &str, current: Option<&str>) -> Value {
        json!({ "nome": name, "chamado_atual": current })
    }

    fn snapshot(queue: Vec<Value>, agents: Vec<Value>) -> Value {
        json!({ "fila": queue, "agentes": agents })
    }

    fn listening() -> (SnapshotRenderer<Panels>, LocalChannel) {
        let mut channel = LocalChannel::new();
        let mut renderer = SnapshotRenderer::new(Panels::new(QUEUE_CONTAINER, AGENT_CONTAINER));
        renderer.initialize(&mut channel, UPDATE_EVENT).unwrap();
        (renderer, channel)
    }

    fn push(channel: &mut LocalChannel, payload: Value) {
        channel.emit(UPDATE_EVENT, payload);
        channel.pump();
    }

    fn titles(panel: &Panel) -> Vec<String> {
        panel.children().iter().map(|e| e.title.clone()).collect()
    }

    #[test]
    fn renders_single_ticket_and_agent() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(vec![ticket("Ana", "Billing", &[1, 3], None)], vec![agent("Bob", None)]),
        );

        let view = renderer.view();
        let items = view.queue.children();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Ana - Billing");
        assert_eq!(items[0].line(PRIORITY_LABEL), Some("1,3"));
        assert_eq!(items[0].line(ESTIMATE_LABEL), Some("10m"));
        assert_eq!(items[0].line(AGENT_LABEL), Some("Não atribuído"));
        assert_eq!(items[0].class_name(), "ticket priority-1");

        let agents = view.agents.children();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].title, "Bob");
        assert_eq!(agents[0].line(CURRENT_TICKET_LABEL), Some("Nenhum"));
        assert!(agents[0].has_class(AGENT_CLASS));
    }

    #[test]
    fn preserves_input_order() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(
                vec![
                    ticket("Zeca", "Dúvida", &[4, 2], None),
                    ticket("Ana", "Server down", &[1, 1], Some("ag1")),
                    ticket("Caio", "Sem impacto", &[3, 3], None),
                ],
                vec![agent("Carlos", None), agent("Ana Silva", Some("INC-2"))],
            ),
        );

        let view = renderer.view();
        assert_eq!(
            titles(&view.queue),
            vec!["Zeca - Dúvida", "Ana - Server down", "Caio - Sem impacto"]
        );
        assert_eq!(titles(&view.agents), vec!["Carlos", "Ana Silva"]);
    }

    #[test]
    fn assigned_agent_and_current_ticket_are_literal() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(
                vec![ticket("Ana", "Billing", &[2], Some("ag7"))],
                vec![agent("Bob", Some("INC-9"))],
            ),
        );

        let view = renderer.view();
        assert_eq!(view.queue.children()[0].line(AGENT_LABEL), Some("ag7"));
        assert_eq!(view.agents.children()[0].line(CURRENT_TICKET_LABEL), Some("INC-9"));
    }

    #[test]
    fn empty_strings_render_sentinels() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(vec![ticket("Ana", "Billing", &[2], Some(""))], vec![agent("Bob", Some(""))]),
        );

        let view = renderer.view();
        assert_eq!(view.queue.children()[0].line(AGENT_LABEL), Some(UNASSIGNED));
        assert_eq!(view.agents.children()[0].line(CURRENT_TICKET_LABEL), Some(NO_CURRENT_TICKET));
    }

    #[test]
    fn classifier_uses_first_priority_only() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(
                vec![
                    ticket("Ana", "Billing", &[2, 1], None),
                    ticket("Bia", "Billing", &[2, 3], None),
                ],
                vec![],
            ),
        );

        let view = renderer.view();
        let items = view.queue.children();
        assert_eq!(items[0].classes, items[1].classes);
        assert!(items[0].has_class("priority-2"));
        assert_ne!(items[0].line(PRIORITY_LABEL), items[1].line(PRIORITY_LABEL));
    }

    #[test]
    fn repeated_snapshot_does_not_accumulate() {
        let (renderer, mut channel) = listening();
        let payload = snapshot(
            vec![ticket("Ana", "Billing", &[1, 3], None), ticket("Bia", "Dúvida", &[4, 2], None)],
            vec![agent("Bob", None)],
        );

        push(&mut channel, payload.clone());
        let once = renderer.view().clone();
        push(&mut channel, payload);

        let view = renderer.view();
        assert_eq!(view.queue.children(), once.queue.children());
        assert_eq!(view.agents.children(), once.agents.children());
        assert_eq!(renderer.renders(), 2);
    }

    #[test]
    fn empty_snapshot_clears_both_panels() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(vec![ticket("Ana", "Billing", &[1], None)], vec![agent("Bob", None)]),
        );
        push(&mut channel, snapshot(vec![], vec![]));

        let view = renderer.view();
        assert!(view.queue.children().is_empty());
        assert!(view.agents.children().is_empty());
    }

    #[test]
    fn shrinking_snapshot_removes_extra_items() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(
                vec![ticket("Ana", "Billing", &[1], None), ticket("Bia", "Billing", &[2], None)],
                vec![],
            ),
        );
        push(&mut channel, snapshot(vec![ticket("Bia", "Billing", &[2], None)], vec![]));

        assert_eq!(titles(&renderer.view().queue), vec!["Bia - Billing"]);
    }

    #[test]
    fn empty_priority_rejects_whole_snapshot() {
        let (renderer, mut channel) = listening();
        push(
            &mut channel,
            snapshot(vec![ticket("Ana", "Billing", &[1], None)], vec![agent("Bob", None)]),
        );
        push(
            &mut channel,
            snapshot(
                vec![ticket("Bia", "Billing", &[2], None), ticket("Caio", "Billing", &[], None)],
                vec![],
            ),
        );

        // Previous render is left intact.
        assert_eq!(titles(&renderer.view().queue), vec!["Ana - Billing"]);
        assert_eq!(titles(&renderer.view().agents), vec!["Bob"]);
        match renderer.last_error() {
            Some(RenderError::MalformedSnapshot(reason)) => assert!(reason.contains("Caio")),
            other => panic!("expected malformed snapshot, got {:?}", other),
        }

        // The next good snapshot clears the error.
        push(&mut channel, snapshot(vec![], vec![]));
        assert_eq!(renderer.last_error(), None);
    }

    #[test]
    fn undecodable_payload_is_malformed() {
        let (renderer, mut channel) = listening();
        push(&mut channel, json!({ "fila": "not a list", "agentes": [] }));
        assert!(matches!(renderer.last_error(), Some(RenderError::MalformedSnapshot(_))));
        assert_eq!(renderer.renders(), 0);
    }

    #[test]
    fn stale_deliveries_are_dropped() {
        let (renderer, mut channel) = listening();
        let newer = snapshot(vec![ticket("Nova", "Billing", &[1], None)], vec![]);
        let older = snapshot(vec![ticket("Velha", "Billing", &[1], None)], vec![]);

        channel.deliver(Delivery {
            seq: 10,
            event: UPDATE_EVENT.to_string(),
            payload: newer,
            received_at: Utc::now(),
        });
        channel.deliver(Delivery {
            seq: 9,
            event: UPDATE_EVENT.to_string(),
            payload: older,
            received_at: Utc::now(),
        });
        channel.pump();

        assert_eq!(titles(&renderer.view().queue), vec!["Nova - Billing"]);
        assert_eq!(renderer.renders(), 1);
    }

    #[test]
    fn other_events_are_ignored() {
        let (renderer, mut channel) = listening();
        channel.emit("atualizar_fila", snapshot(vec![ticket("Ana", "Billing", &[1], None)], vec![]));
        channel.pump();
        assert!(renderer.view().queue.children().is_empty());
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (mut renderer, mut channel) = listening();
        assert!(renderer.is_listening());
        assert_eq!(
            renderer.initialize(&mut channel, UPDATE_EVENT),
            Err(RenderError::AlreadyListening)
        );

        // Still exactly one subscription.
        channel.emit(UPDATE_EVENT, snapshot(vec![], vec![]));
        assert_eq!(channel.pump(), 1);
    }

    struct QueueOnly {
        queue: Panel,
    }

    impl ViewBinding for QueueOnly {
        fn container(&mut self, id: &str) -> Option<&mut dyn Container> {
            (id == QUEUE_CONTAINER).then_some(&mut self.queue as &mut dyn Container)
        }
    }

    #[test]
    fn missing_container_fails_without_touching_the_other() {
        let mut queue = Panel::new(QUEUE_CONTAINER);
        queue.append_child(Element::new("anterior"));
        let renderer = SnapshotRenderer::new(QueueOnly { queue });

        let parsed: QueueSnapshot =
            serde_json::from_value(snapshot(vec![ticket("Ana", "Billing", &[1], None)], vec![])).unwrap();
        assert_eq!(
            renderer.on_snapshot(&parsed),
            Err(RenderError::MissingContainer(AGENT_CONTAINER.to_string()))
        );
        assert_eq!(titles(&renderer.view().queue), vec!["anterior"]);
    }

    struct AgentsOnly {
        agents: Panel,
    }

    impl ViewBinding for AgentsOnly {
        fn container(&mut self, id: &str) -> Option<&mut dyn Container> {
            (id == AGENT_CONTAINER).then_some(&mut self.agents as &mut dyn Container)
        }
    }

    #[test]
    fn missing_queue_container_leaves_agents_untouched() {
        let mut agents = Panel::new(AGENT_CONTAINER);
        agents.append_child(Element::new("anterior"));
        let renderer = SnapshotRenderer::new(AgentsOnly { agents });

        let parsed: QueueSnapshot = serde_json::from_value(snapshot(
            vec![ticket("Ana", "Billing", &[1], None)],
            vec![agent("Bob", None)],
        ))
        .unwrap();
        assert_eq!(
            renderer.on_snapshot(&parsed),
            Err(RenderError::MissingContainer(QUEUE_CONTAINER.to_string()))
        );
        assert_eq!(titles(&renderer.view().agents), vec!["anterior"]);
        assert!(renderer.last_rendered_at().is_none());
    }

    #[test]
    fn tickets_in_service_do_not_block_rendering() {
        let (renderer, mut channel) = listening();
        let mut payload = snapshot(vec![ticket("Ana", "Billing", &[1, 3], None)], vec![agent("Bob", None)]);
        payload["chamados_em_atendimento"] =
            json!([{ "id": "INC-1", "cliente": "X", "status": "Em atendimento" }]);
        push(&mut channel, payload);

        assert_eq!(titles(&renderer.view().queue), vec!["Ana - Billing"]);
        assert_eq!(titles(&renderer.view().agents), vec!["Bob"]);
        assert_eq!(renderer.last_error(), None);
    }

    #[test]
    fn direct_render_reports_counts() {
        let renderer = SnapshotRenderer::new(Panels::new(QUEUE_CONTAINER, AGENT_CONTAINER));
        let parsed: QueueSnapshot = serde_json::from_value(snapshot(
            vec![ticket("Ana", "Billing", &[1, 3], None)],
            vec![agent("Bob", None), agent("Carlos", None)],
        ))
        .unwrap();

        assert_eq!(
            renderer.on_snapshot(&parsed),
            Ok(RenderSummary { tickets: 1, agents: 2 })
        );
        assert!(renderer.last_rendered_at().is_some());
        assert!(!renderer.is_listening());
    }

    #[test]
    fn sequence_gate_is_strictly_increasing() {
        let mut gate = SequenceGate::default();
        assert!(gate.admit(1));
        assert!(!gate.admit(1));
        assert!(gate.admit(5));
        assert!(!gate.admit(3));
        assert!(gate.admit(6));
    }
}
