//! Dashboard principal – App eframe/egui.

use crate::panels::{self, ControlRequest, Controls};
use egui::{Color32, RichText};
use egui_plot::{HLine, Legend, Line, LineStyle, Plot, PlotPoints};
use simtemp_core::attributes::{AttributeClient, PrivilegedBackend};
use simtemp_core::config::SimtempConfig;
use simtemp_core::live::{LiveSnapshot, LiveState};
use simtemp_core::poller::{PollerEvent, PollerHandle, spawn_poller};
use simtemp_core::{DeviceError, Session};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

struct Dialog {
    title: String,
    message: String,
    /// Fechar o diálogo encerra a aplicação.
    fatal: bool,
}

/// Estado do dashboard. A renderização só lê o [`LiveState`] por snapshot.
pub struct SimtempDashboard {
    config: SimtempConfig,
    attrs: AttributeClient<PrivilegedBackend>,

    // Dados
    state: LiveState,
    poller: Option<PollerHandle>,
    snapshot: LiveSnapshot,

    // Controles
    controls: Controls,
    applied_threshold_c: f64,
    stats: Option<String>,
    last_stats: Option<Instant>,

    // UI state
    dialog: Option<Dialog>,
}

impl SimtempDashboard {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: SimtempConfig,
        helper: Vec<String>,
        session: Result<Session, DeviceError>,
    ) -> Self {
        let attrs = AttributeClient::new(PrivilegedBackend::new(&config.device.sysfs_dir, helper));
        let state = LiveState::new(config.monitor.history_size);

        // Reflete a configuração atual do driver, se legível.
        let settings = attrs.read_settings();
        let threshold_mc = settings.threshold_mc.unwrap_or(config.gui.initial_threshold_mc);
        let controls = Controls::new(
            threshold_mc,
            settings.sampling_ms.unwrap_or(config.gui.initial_sampling_ms),
            settings.mode.unwrap_or_default(),
        );
        info!("Configuração inicial do driver: {settings:?}");

        let mut dialog = None;
        let poller = match session {
            Ok(session) => {
                match spawn_poller(session, state.clone(), config.monitor.poll_interval()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        dialog = Some(Dialog::fatal(format!("Falha ao iniciar a thread de polling: {e}")));
                        None
                    }
                }
            }
            Err(e) => {
                error!("{e}");
                dialog = Some(Dialog::fatal(e.to_string()));
                None
            }
        };

        Self {
            config,
            attrs,
            state,
            poller,
            snapshot: LiveSnapshot::default(),
            controls,
            applied_threshold_c: f64::from(threshold_mc) / 1000.0,
            stats: None,
            last_stats: None,
            dialog,
        }
    }

    /// Processa eventos pendentes da thread de polling.
    fn poll_events(&mut self) {
        let Some(poller) = &self.poller else {
            return;
        };
        while let Ok(event) = poller.events().try_recv() {
            match event {
                PollerEvent::Fatal(msg) => {
                    self.dialog = Some(Dialog::fatal(msg));
                }
                PollerEvent::Stopped(summary) => {
                    info!("Polling encerrado: {summary:?}");
                }
            }
        }
    }

    fn refresh_stats(&mut self) {
        let interval = Duration::from_millis(self.config.gui.stats_refresh_ms);
        if self.last_stats.is_some_and(|t| t.elapsed() < interval) {
            return;
        }
        self.last_stats = Some(Instant::now());
        self.stats = self.attrs.read_stats().ok();
    }

    /// Escritas falhas geram diálogo e a aplicação segue.
    fn apply(&mut self, request: ControlRequest) {
        let result = match request {
            ControlRequest::SetThreshold => {
                match panels::parse_threshold_c(&self.controls.threshold_c) {
                    Ok(mc) => self.attrs.set_threshold_mc(mc).map(|()| {
                        self.applied_threshold_c = f64::from(mc) / 1000.0;
                    }),
                    Err(msg) => return self.show_error("Input Error", msg),
                }
            }
            ControlRequest::SetSampling => match panels::parse_sampling_ms(&self.controls.sampling_ms) {
                Ok(ms) => self.attrs.set_sampling_ms(ms),
                Err(msg) => return self.show_error("Input Error", msg),
            },
            ControlRequest::SetMode(mode) => self.attrs.set_mode(mode),
        };

        if let Err(e) = result {
            warn!("Escrita de atributo falhou: {e}");
            self.show_error(
                "SysFS Write Error",
                format!("Falha ao escrever a configuração. O módulo está carregado?\n{e}"),
            );
        }
    }

    fn show_error(&mut self, title: &str, message: String) {
        self.dialog = Some(Dialog {
            title: title.into(),
            message,
            fatal: false,
        });
    }

    fn render_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &self.dialog else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new(dialog.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui: &mut egui::Ui| {
                ui.label(dialog.message.as_str());
                ui.add_space(6.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            if dialog.fatal {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
            self.dialog = None;
        }
    }

    /// Gráfico de temperatura com a linha do threshold.
    fn render_chart(&self, ui: &mut egui::Ui) {
        let points: PlotPoints = self.snapshot.points().into_iter().collect();
        let line = Line::new(points)
            .name("Temperature")
            .color(panels::TEMP_COLOR)
            .width(1.5);
        let threshold = HLine::new(self.applied_threshold_c)
            .name("Threshold")
            .color(panels::THRESHOLD_COLOR)
            .style(LineStyle::Dashed { length: 8.0 });

        let (lo, hi) = self
            .snapshot
            .temperature_range()
            .unwrap_or((30.0, 60.0));
        let lo = lo.min(self.applied_threshold_c) - 1.0;
        let hi = hi.max(self.applied_threshold_c) + 1.0;

        ui.label(RichText::new("Live Temperature Data").size(15.0).strong());
        Plot::new("temperature")
            .legend(Legend::default())
            .x_axis_label("Time (s)")
            .y_axis_label("Temperature (°C)")
            .include_y(lo)
            .include_y(hi)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(line);
                plot_ui.hline(threshold);
            });
    }
}

impl Dialog {
    fn fatal(message: String) -> Self {
        Self {
            title: "Fatal Error".into(),
            message,
            fatal: true,
        }
    }
}

impl eframe::App for SimtempDashboard {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ── Dados ──
        self.poll_events();
        self.snapshot = self.state.snapshot();
        self.refresh_stats();

        ctx.request_repaint_after(REPAINT_INTERVAL);

        // ── Atalhos de teclado ──
        ctx.input(|i: &egui::InputState| {
            if i.key_pressed(egui::Key::Q) || i.key_pressed(egui::Key::Escape) {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });

        // ── Painel de controle ──
        let status = self.snapshot.status;
        let mut request = None;
        egui::SidePanel::left("controls")
            .resizable(false)
            .min_width(220.0)
            .show(ctx, |ui: &mut egui::Ui| {
                request = panels::render_controls(ui, &mut self.controls, &status, self.stats.as_deref());
            });
        if let Some(request) = request {
            self.apply(request);
        }

        // ── Gráfico ──
        egui::CentralPanel::default().show(ctx, |ui: &mut egui::Ui| {
            self.render_chart(ui);
            ui.with_layout(egui::Layout::bottom_up(egui::Align::Center), |ui: &mut egui::Ui| {
                ui.label(
                    RichText::new(format!("{} amostras | [Q/Esc] Quit", self.snapshot.total))
                        .color(Color32::GRAY)
                        .monospace()
                        .size(10.0),
                );
            });
        });

        self.render_dialog(ctx);
    }
}

impl Drop for SimtempDashboard {
    fn drop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            info!("Parando thread de polling...");
            poller.stop();
        }
    }
}
