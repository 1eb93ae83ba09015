//! Ticket queue protocol types.
//!
//! Defines the JSON payload carried by the queue update event. The server
//! uses Portuguese keys; the Rust side uses English names and serde renames.
//! Aliases accept the shorter keys the server uses for tickets in service
//! (`cliente`, `agente`).
//!
//! Keys the dashboard does not draw, such as `chamados_em_atendimento`, are
//! not decoded at all, so a bad entry there cannot reject a snapshot.

use std::fmt;

use serde::Deserialize;

/// The complete queue state pushed by the server at one point in time.
///
/// There are no partial or delta snapshots: every message replaces
/// everything previously received.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    #[serde(rename = "fila")]
    pub queue: Vec<Ticket>,
    #[serde(rename = "agentes")]
    pub agents: Vec<Agent>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Ticket {
    #[serde(rename = "cliente_nome", alias = "cliente")]
    pub customer_name: String,
    #[serde(rename = "tipo_chamado")]
    pub ticket_type: String,
    /// Ticket priority first, then customer tier. Lower is more urgent.
    #[serde(rename = "prioridade")]
    pub priority: Vec<PriorityLevel>,
    #[serde(rename = "tempo_estimado")]
    pub estimated_time: String,
    #[serde(rename = "agente_atribuido", alias = "agente", default)]
    pub assigned_agent: Option<String>,
    // Decoded but not drawn.
    #[allow(dead_code)]
    #[serde(default)]
    pub id: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub status: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "tipo_cliente", default)]
    pub customer_tier: Option<String>,
}

impl Ticket {
    /// The level that drives styling, if the sequence is non-empty.
    pub fn primary_priority(&self) -> Option<&PriorityLevel> {
        self.priority.first()
    }

    /// All priority values joined by a comma, e.g. `1,3`.
    pub fn priority_text(&self) -> String {
        self.priority
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The assigned agent, treating an empty string like an absent one.
    pub fn agent(&self) -> Option<&str> {
        present(&self.assigned_agent)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Agent {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "chamado_atual", default)]
    pub current_ticket: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub id: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "especialidades", default)]
    pub specialties: Vec<String>,
}

impl Agent {
    /// The ticket being worked on, treating an empty string like an absent one.
    pub fn ticket(&self) -> Option<&str> {
        present(&self.current_ticket)
    }
}

/// One element of a priority sequence.
///
/// Kept as a JSON number so it prints exactly as the server sent it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct PriorityLevel(serde_json::Number);

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
