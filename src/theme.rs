//! Colour theme for the dashboard.
//!
//! The renderer only emits classifier tokens (`ticket`, `priority-N`,
//! `agent`). This module is the stylesheet: it maps those tokens to colours.
//! Everything can be overridden from the `[theme]` section of the config
//! file; omitted keys keep their defaults.

use serde::{Deserialize, Serialize};
use vello::peniko::Color;

use crate::renderer::{AGENT_CLASS, PRIORITY_CLASS_PREFIX};
use crate::view::Element;

/// RGBA, each channel in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub fn color(self) -> Color {
        Color::new(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: Rgba,
    pub panel: Rgba,
    pub panel_border: Rgba,
    pub header: Rgba,
    pub card: Rgba,
    pub text_primary: Rgba,
    pub text_secondary: Rgba,
    pub agent_accent: Rgba,
    /// `priority[0]` of 1 uses the first entry, 2 the second, and so on.
    pub priority: Vec<Rgba>,
    /// Levels outside the list, and non-integer levels.
    pub priority_fallback: Rgba,
    pub status_ok: Rgba,
    pub status_pending: Rgba,
    pub status_error: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgba([1.0, 0.894, 0.769, 1.0]),
            panel: Rgba([1.0, 0.922, 0.827, 1.0]),
            panel_border: Rgba([0.87, 0.72, 0.53, 1.0]),
            header: Rgba([0.80, 0.62, 0.40, 1.0]),
            card: Rgba([1.0, 0.95, 0.89, 1.0]),
            text_primary: Rgba([0.0, 0.0, 0.0, 1.0]),
            text_secondary: Rgba([0.0, 0.0, 0.0, 0.65]),
            agent_accent: Rgba([0.22, 0.46, 0.72, 1.0]),
            priority: vec![
                Rgba([0.80, 0.20, 0.18, 1.0]), // server down
                Rgba([0.85, 0.60, 0.10, 1.0]), // production impact
                Rgba([0.20, 0.65, 0.32, 1.0]), // no impact
                Rgba([0.45, 0.45, 0.45, 1.0]), // question
            ],
            priority_fallback: Rgba([0.60, 0.60, 0.60, 1.0]),
            status_ok: Rgba([0.20, 0.65, 0.32, 1.0]),
            status_pending: Rgba([0.85, 0.60, 0.10, 1.0]),
            status_error: Rgba([0.80, 0.20, 0.18, 1.0]),
        }
    }
}

impl Theme {
    /// Accent for a card, from its classifier tokens.
    pub fn accent(&self, element: &Element) -> Rgba {
        if element.has_class(AGENT_CLASS) {
            return self.agent_accent;
        }
        element
            .classes
            .iter()
            .find_map(|c| c.strip_prefix(PRIORITY_CLASS_PREFIX))
            .map(|level| self.priority_color(level))
            .unwrap_or(self.priority_fallback)
    }

    fn priority_color(&self, level: &str) -> Rgba {
        level
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.priority.get(idx))
            .copied()
            .unwrap_or(self.priority_fallback)
    }
}
