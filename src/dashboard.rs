//! Dashboard painting using vello.
//!
//! Paints the retained `Panels` produced by the renderer: a header with the
//! connection state, an error banner when the last render pass failed, the
//! ticket queue on the left and the agent roster on the right. Card accents
//! come from the theme, keyed on each element's classifier tokens.

use chrono::{DateTime, Local, Utc};
use vello::Scene;
use vello::kurbo::{Affine, Circle, Point, Rect, RoundedRect, Stroke};
use vello::peniko::{Color, Fill};

use crate::channel::ConnectionStatus;
use crate::text::TextPainter;
use crate::theme::Theme;
use crate::view::{Container, Element, Panel, Panels};

const MARGIN: f64 = 24.0;
const PANEL_PADDING: f64 = 16.0;
const PANEL_GAP: f64 = 16.0;
const HEADER_HEIGHT: f64 = 72.0;
const BANNER_HEIGHT: f64 = 44.0;
const PANEL_TITLE_HEIGHT: f64 = 48.0;
const CARD_GAP: f64 = 10.0;
const CARD_PADDING: f64 = 12.0;
const CARD_TITLE_SIZE: f64 = 24.0;
const CARD_LINE_SIZE: f64 = 18.0;
const CARD_LINE_HEIGHT: f64 = 26.0;
const ACCENT_WIDTH: f64 = 6.0;
const CORNER_RADIUS: f64 = 8.0;
const STATUS_DOT_RADIUS: f64 = 8.0;

/// Everything one frame needs, borrowed from the app.
pub struct Frame<'a> {
    pub panels: &'a Panels,
    pub status: &'a ConnectionStatus,
    pub last_error: Option<String>,
    pub last_rendered_at: Option<DateTime<Utc>>,
    pub theme: &'a Theme,
    pub text: &'a TextPainter,
}

/// Top-level render function: draws the full dashboard.
pub fn render_dashboard(scene: &mut Scene, width: f64, height: f64, frame: &Frame<'_>) {
    let theme = frame.theme;
    let bg_rect = Rect::new(0.0, 0.0, width, height);
    scene.fill(Fill::NonZero, Affine::IDENTITY, theme.background.color(), None, &bg_rect);

    draw_header(scene, width, frame);
    if width <= 2.0 * MARGIN + PANEL_GAP {
        return;
    }

    let mut content_top = HEADER_HEIGHT + MARGIN;
    if let Some(error) = &frame.last_error {
        draw_error_banner(scene, MARGIN, content_top, width - 2.0 * MARGIN, error, frame);
        content_top += BANNER_HEIGHT + PANEL_GAP;
    }

    let content_height = height - content_top - MARGIN;
    let panel_width = (width - 2.0 * MARGIN - PANEL_GAP) / 2.0;
    if panel_width <= 0.0 || content_height <= 0.0 {
        return;
    }

    draw_panel(
        scene,
        Rect::new(MARGIN, content_top, MARGIN + panel_width, content_top + content_height),
        &format!("Fila ({})", frame.panels.queue.children().len()),
        "Fila vazia",
        &frame.panels.queue,
        frame,
    );

    let right_x = MARGIN + panel_width + PANEL_GAP;
    draw_panel(
        scene,
        Rect::new(right_x, content_top, right_x + panel_width, content_top + content_height),
        &format!("Agentes ({})", frame.panels.agents.children().len()),
        "Nenhum agente",
        &frame.panels.agents,
        frame,
    );
}

fn draw_header(scene: &mut Scene, width: f64, frame: &Frame<'_>) {
    let theme = frame.theme;
    let title_rect = Rect::new(0.0, 0.0, width, HEADER_HEIGHT);
    scene.fill(Fill::NonZero, Affine::IDENTITY, theme.header.color(), None, &title_rect);
    frame
        .text
        .draw(scene, MARGIN, 48.0, "FILA DE CHAMADOS", theme.text_primary.color(), 36.0);

    let (status_color, status_text) = match frame.status {
        ConnectionStatus::Connected => (theme.status_ok, "conectado".to_string()),
        ConnectionStatus::Replay => (theme.status_ok, "reprodução".to_string()),
        ConnectionStatus::Connecting => (theme.status_pending, "conectando...".to_string()),
        ConnectionStatus::Disconnected => (theme.status_error, "desconectado".to_string()),
        ConnectionStatus::Error(e) => (theme.status_error, format!("erro: {}", e)),
    };

    let updated = match frame.last_rendered_at {
        Some(at) => format!("atualizado {}", at.with_timezone(&Local).format("%H:%M:%S")),
        None => "aguardando dados".to_string(),
    };

    let right = format!("{}  |  {}", status_text, updated);
    let text = frame.text.fit(&right, 22.0, width * 0.5);
    let text_w = frame.text.measure(&text, 22.0);
    let text_x = width - MARGIN - text_w;
    frame
        .text
        .draw(scene, text_x, 46.0, &text, theme.text_primary.color(), 22.0);
    draw_circle(
        scene,
        text_x - STATUS_DOT_RADIUS - 10.0,
        38.0,
        STATUS_DOT_RADIUS,
        status_color.color(),
    );
}

fn draw_error_banner(scene: &mut Scene, x: f64, y: f64, w: f64, error: &str, frame: &Frame<'_>) {
    let rect = RoundedRect::new(x, y, x + w, y + BANNER_HEIGHT, CORNER_RADIUS);
    scene.fill(Fill::NonZero, Affine::IDENTITY, frame.theme.status_error.color(), None, &rect);
    let message = frame
        .text
        .fit(&format!("Falha ao atualizar: {}", error), 20.0, w - 2.0 * PANEL_PADDING);
    frame
        .text
        .draw(scene, x + PANEL_PADDING, y + 29.0, &message, Color::WHITE, 20.0);
}

fn draw_panel(
    scene: &mut Scene,
    area: Rect,
    title: &str,
    empty_text: &str,
    panel: &Panel,
    frame: &Frame<'_>,
) {
    let theme = frame.theme;
    let panel_rect = RoundedRect::new(area.x0, area.y0, area.x1, area.y1, CORNER_RADIUS);
    scene.fill(Fill::NonZero, Affine::IDENTITY, theme.panel.color(), None, &panel_rect);
    scene.stroke(
        &Stroke::new(1.5),
        Affine::IDENTITY,
        theme.panel_border.color(),
        None,
        &panel_rect,
    );

    let inner_x = area.x0 + PANEL_PADDING;
    let inner_w = area.width() - 2.0 * PANEL_PADDING;
    let bottom = area.y1 - PANEL_PADDING;

    frame.text.draw(
        scene,
        inner_x,
        area.y0 + PANEL_PADDING + 24.0,
        title,
        theme.text_secondary.color(),
        26.0,
    );
    let mut cursor_y = area.y0 + PANEL_PADDING + PANEL_TITLE_HEIGHT;

    let children = panel.children();
    if children.is_empty() {
        frame.text.draw(
            scene,
            inner_x,
            cursor_y + 24.0,
            empty_text,
            theme.text_secondary.color(),
            20.0,
        );
        return;
    }

    for (idx, element) in children.iter().enumerate() {
        let h = card_height(element);
        let remaining = children.len() - idx;
        // Leave room for the overflow note unless this is the last card.
        let reserve = if remaining > 1 { CARD_LINE_HEIGHT } else { 0.0 };
        if cursor_y + h + reserve > bottom {
            frame.text.draw(
                scene,
                inner_x,
                cursor_y + 20.0,
                &format!("+{} mais", remaining),
                theme.text_secondary.color(),
                CARD_LINE_SIZE,
            );
            return;
        }
        draw_card(scene, inner_x, cursor_y, inner_w, element, frame);
        cursor_y += h + CARD_GAP;
    }
}

fn card_height(element: &Element) -> f64 {
    2.0 * CARD_PADDING + CARD_TITLE_SIZE + 8.0 + element.lines.len() as f64 * CARD_LINE_HEIGHT
}

fn draw_card(scene: &mut Scene, x: f64, y: f64, w: f64, element: &Element, frame: &Frame<'_>) {
    let theme = frame.theme;
    let h = card_height(element);

    let card = RoundedRect::new(x, y, x + w, y + h, 6.0);
    scene.fill(Fill::NonZero, Affine::IDENTITY, theme.card.color(), None, &card);

    let accent = RoundedRect::new(x, y, x + ACCENT_WIDTH, y + h, 3.0);
    scene.fill(Fill::NonZero, Affine::IDENTITY, theme.accent(element).color(), None, &accent);

    let text_x = x + ACCENT_WIDTH + CARD_PADDING;
    let text_w = w - ACCENT_WIDTH - 2.0 * CARD_PADDING;
    let mut baseline = y + CARD_PADDING + CARD_TITLE_SIZE;

    let title = frame.text.fit(&element.title, CARD_TITLE_SIZE, text_w);
    frame
        .text
        .draw(scene, text_x, baseline, &title, theme.text_primary.color(), CARD_TITLE_SIZE);
    baseline += 8.0;

    for line in &element.lines {
        baseline += CARD_LINE_HEIGHT;
        let text = frame.text.fit(&line.text(), CARD_LINE_SIZE, text_w);
        frame
            .text
            .draw(scene, text_x, baseline, &text, theme.text_secondary.color(), CARD_LINE_SIZE);
    }
}

fn draw_circle(scene: &mut Scene, cx: f64, cy: f64, r: f64, color: Color) {
    let circle = Circle::new(Point::new(cx, cy), r);
    scene.fill(Fill::NonZero, Affine::IDENTITY, color, None, &circle);
}
