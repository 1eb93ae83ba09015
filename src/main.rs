//! queue-dashboard: live support-ticket queue dashboard
//!
//! A GPU-rendered dashboard that listens to a ticket queue server over
//! Socket.IO and redraws the ticket queue and agent roster on every pushed
//! snapshot.
//!
//! Uses vello/wgpu for rendering and tokio-tungstenite for the WebSocket
//! transport.

mod channel;
mod config;
mod dashboard;
mod logging;
mod protocol;
mod renderer;
mod socketio;
mod text;
mod theme;
mod view;
mod ws_client;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use vello::util::{RenderContext, RenderSurface};
use vello::{AaConfig, Renderer, RendererOptions, Scene};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window};

use vello::wgpu;

use channel::{PushChannel, ReplayChannel};
use config::DashboardConfig;
use renderer::{AGENT_CONTAINER, QUEUE_CONTAINER, SnapshotRenderer};
use text::TextPainter;
use theme::Theme;
use view::Panels;
use ws_client::ClientOptions;

/// Support ticket queue dashboard
#[derive(Parser, Debug)]
#[command(name = "queue-dashboard", version, about = "Live support ticket queue dashboard")]
struct Args {
    /// Socket.IO server base URL (e.g., http://localhost:5000)
    #[arg(short, long)]
    server: Option<String>,

    /// Name of the queue update event
    #[arg(short, long)]
    event: Option<String>,

    /// Config file (default: ~/.config/queue-dashboard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start in windowed mode instead of fullscreen
    #[arg(short, long)]
    windowed: bool,

    /// Play snapshots from a JSON Lines file instead of connecting
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Seconds between replayed snapshots
    #[arg(long, default_value_t = 2.0)]
    replay_interval: f64,
}

#[derive(Debug)]
enum RenderState {
    Active {
        surface: Box<RenderSurface<'static>>,
        valid_surface: bool,
        window: Arc<Window>,
    },
    Suspended(Option<Arc<Window>>),
}

struct App {
    context: RenderContext,
    renderers: Vec<Option<Renderer>>,
    state: RenderState,
    scene: Scene,
    channel: Box<dyn PushChannel>,
    snapshots: SnapshotRenderer<Panels>,
    theme: Theme,
    text: TextPainter,
    windowed: bool,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let RenderState::Suspended(cached_window) = &mut self.state else {
            return;
        };

        let window = match cached_window.take() {
            Some(window) => window,
            None => match create_window(event_loop, self.windowed) {
                Ok(window) => window,
                Err(e) => {
                    error!("Failed to create window: {:#}", e);
                    event_loop.exit();
                    return;
                }
            },
        };

        let size = window.inner_size();
        let surface_future = self.context.create_surface(
            window.clone(),
            size.width,
            size.height,
            wgpu::PresentMode::AutoVsync,
        );
        let surface = match pollster::block_on(surface_future) {
            Ok(surface) => surface,
            Err(e) => {
                error!("Failed to create surface: {}", e);
                event_loop.exit();
                return;
            }
        };

        self.renderers
            .resize_with(self.context.devices.len(), || None);
        if self.renderers[surface.dev_id].is_none() {
            match create_renderer(&self.context, &surface) {
                Ok(renderer) => self.renderers[surface.dev_id] = Some(renderer),
                Err(e) => {
                    error!("Failed to create renderer: {:#}", e);
                    event_loop.exit();
                    return;
                }
            }
        }

        self.state = RenderState::Active {
            surface: Box::new(surface),
            valid_surface: true,
            window,
        };
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let RenderState::Active { window, .. } = &self.state {
            self.state = RenderState::Suspended(Some(window.clone()));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let (surface, valid_surface, window) = match &mut self.state {
            RenderState::Active {
                surface,
                valid_surface,
                window,
            } if window.id() == window_id => (surface, valid_surface, window.clone()),
            _ => return,
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if size.width != 0 && size.height != 0 {
                    self.context
                        .resize_surface(surface, size.width, size.height);
                    *valid_surface = true;
                } else {
                    *valid_surface = false;
                }
            }

            WindowEvent::RedrawRequested => {
                if !*valid_surface {
                    return;
                }

                // Snapshot handlers run here, on the UI thread, before painting.
                self.channel.pump();

                self.scene.reset();

                let width = surface.config.width as f64;
                let height = surface.config.height as f64;

                {
                    let panels = self.snapshots.view();
                    let status = self.channel.status();
                    let frame = dashboard::Frame {
                        panels: &panels,
                        status: &status,
                        last_error: self.snapshots.last_error().map(|e| e.to_string()),
                        last_rendered_at: self.snapshots.last_rendered_at(),
                        theme: &self.theme,
                        text: &self.text,
                    };
                    dashboard::render_dashboard(&mut self.scene, width, height, &frame);
                }

                let device_handle = &self.context.devices[surface.dev_id];
                let Some(renderer) = self.renderers[surface.dev_id].as_mut() else {
                    return;
                };

                if let Err(e) = renderer.render_to_texture(
                    &device_handle.device,
                    &device_handle.queue,
                    &self.scene,
                    &surface.target_view,
                    &vello::RenderParams {
                        base_color: self.theme.background.color(),
                        width: surface.config.width,
                        height: surface.config.height,
                        antialiasing_method: AaConfig::Msaa16,
                    },
                ) {
                    error!("Failed to render to surface: {}", e);
                    return;
                }

                let surface_texture = match surface.surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(e) => {
                        warn!("Failed to get surface texture: {}", e);
                        window.request_redraw();
                        return;
                    }
                };

                let mut encoder =
                    device_handle
                        .device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("Surface Blit"),
                        });
                surface.blitter.copy(
                    &device_handle.device,
                    &mut encoder,
                    &surface.target_view,
                    &surface_texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                );
                device_handle.queue.submit([encoder.finish()]);
                surface_texture.present();
                let _ = device_handle.device.poll(wgpu::PollType::Poll);

                // Keep polling the channel every frame.
                window.request_redraw();
            }

            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let _log_guard = logging::init();
    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.server.url = server;
    }
    if let Some(event) = args.event {
        config.server.event = event;
    }
    if args.windowed {
        config.window.windowed = true;
    }

    println!("queue-dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Only the live connection needs a runtime; it must outlive the event loop.
    let mut runtime = None;
    let mut channel: Box<dyn PushChannel> = match &args.replay {
        Some(path) => {
            let interval = Duration::from_secs_f64(args.replay_interval.max(0.0));
            let replay = ReplayChannel::from_file(path, &config.server.event, interval)?;
            println!("Replaying {} snapshot(s) from {}", replay.remaining(), path.display());
            Box::new(replay)
        }
        None => {
            let endpoint = socketio::endpoint_url(&config.server.url, &config.server.path)?;
            println!("Connecting to {}", endpoint);

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create Tokio runtime")?;
            let socket = ws_client::spawn_client(
                &rt,
                ClientOptions::new(endpoint, &config.server.namespace, config.server.reconnect_delay()),
            );
            runtime = Some(rt);
            Box::new(socket)
        }
    };

    let mut snapshots = SnapshotRenderer::new(Panels::new(QUEUE_CONTAINER, AGENT_CONTAINER));
    snapshots.initialize(channel.as_mut(), &config.server.event)?;
    info!(event = %config.server.event, "Dashboard ready");

    let text = TextPainter::new(text::load_ui_font());
    if !text.has_font() {
        eprintln!("Note: No system font found (Helvetica/Arial/DejaVu Sans).");
        eprintln!("All text will use bitmap font fallback.");
    }

    let mut app = App {
        context: RenderContext::new(),
        renderers: vec![],
        state: RenderState::Suspended(None),
        scene: Scene::new(),
        channel,
        snapshots,
        theme: config.theme.clone(),
        text,
        windowed: config.window.windowed,
    };

    let event_loop = EventLoop::new()?;
    event_loop
        .run_app(&mut app)
        .context("Event loop failed")?;

    if let Some(rt) = runtime {
        rt.shutdown_timeout(Duration::from_secs(1));
    }

    Ok(())
}

fn create_window(event_loop: &ActiveEventLoop, windowed: bool) -> Result<Arc<Window>> {
    let mut attr = Window::default_attributes().with_title("queue-dashboard | Fila de chamados");

    if !windowed {
        attr = attr.with_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        attr = attr.with_inner_size(winit::dpi::LogicalSize::new(1280, 800));
    }

    Ok(Arc::new(event_loop.create_window(attr)?))
}

fn create_renderer(render_cx: &RenderContext, surface: &RenderSurface<'_>) -> Result<Renderer> {
    Renderer::new(
        &render_cx.devices[surface.dev_id].device,
        RendererOptions::default(),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))
    .context("Couldn't create renderer")
}
