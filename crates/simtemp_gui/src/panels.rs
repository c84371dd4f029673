//! Painel de controle: status de alerta, threshold, período, modo e stats.

use egui::{Color32, RichText, Ui};
use simtemp_core::alerts::{AlertLevel, AlertStatus};
use simtemp_core::attributes::Mode;
use simtemp_core::protocol::format_millis;

pub const OK_COLOR: Color32 = Color32::from_rgb(0, 200, 110);
pub const ALERT_COLOR: Color32 = Color32::from_rgb(230, 50, 50);
pub const THRESHOLD_COLOR: Color32 = Color32::from_rgb(220, 60, 60);
pub const TEMP_COLOR: Color32 = Color32::from_rgb(31, 119, 180);
const DIM: Color32 = Color32::from_rgb(140, 140, 140);

/// Pedido gerado pelo painel; aplicado pelo dashboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRequest {
    SetThreshold,
    SetSampling,
    SetMode(Mode),
}

/// Campos editáveis do painel.
#[derive(Debug, Clone)]
pub struct Controls {
    pub threshold_c: String,
    pub sampling_ms: String,
    pub mode: Mode,
}

impl Controls {
    pub fn new(threshold_mc: i32, sampling_ms: u32, mode: Mode) -> Self {
        Self {
            threshold_c: format_millis(threshold_mc),
            sampling_ms: sampling_ms.to_string(),
            mode,
        }
    }
}

/// Converte o texto em °C para m°C.
pub fn parse_threshold_c(text: &str) -> Result<i32, String> {
    let celsius: f64 = text
        .trim()
        .parse()
        .map_err(|_| "Threshold deve ser um número.".to_string())?;
    let mc = (celsius * 1000.0).round();
    if !mc.is_finite() || mc < f64::from(i32::MIN) || mc > f64::from(i32::MAX) {
        return Err(format!("Threshold fora da faixa: {celsius}"));
    }
    Ok(mc as i32)
}

/// Período em ms, inteiro positivo.
pub fn parse_sampling_ms(text: &str) -> Result<u32, String> {
    match text.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err("Período deve ser um inteiro positivo.".to_string()),
        Ok(ms) => Ok(ms),
    }
}

fn alert_label(status: &AlertStatus) -> RichText {
    let color = match status.level {
        AlertLevel::Ok => OK_COLOR,
        AlertLevel::Alert => ALERT_COLOR,
    };
    RichText::new(status.level.label()).color(color).size(22.0).strong()
}

fn section(ui: &mut Ui, title: &str) {
    ui.add_space(10.0);
    ui.label(RichText::new(title).color(DIM).monospace());
}

/// Desenha o painel e devolve o pedido do operador, se houver.
pub fn render_controls(
    ui: &mut Ui,
    controls: &mut Controls,
    status: &AlertStatus,
    stats: Option<&str>,
) -> Option<ControlRequest> {
    let mut request = None;

    ui.vertical_centered(|ui: &mut Ui| {
        ui.label(RichText::new("Sensor Controls").size(16.0).strong());
    });

    section(ui, "ALERT STATUS:");
    ui.label(alert_label(status));
    if let Some(reading) = status.last_reading {
        ui.label(
            RichText::new(format!("{}°C", format_millis(reading.temp_mc)))
                .monospace()
                .size(14.0),
        );
    }

    section(ui, "Threshold (°C):");
    ui.horizontal(|ui: &mut Ui| {
        ui.add(egui::TextEdit::singleline(&mut controls.threshold_c).desired_width(80.0));
        if ui.button("Set Threshold").clicked() {
            request = Some(ControlRequest::SetThreshold);
        }
    });

    section(ui, "Sampling (ms):");
    ui.horizontal(|ui: &mut Ui| {
        ui.add(egui::TextEdit::singleline(&mut controls.sampling_ms).desired_width(80.0));
        if ui.button("Set Sampling").clicked() {
            request = Some(ControlRequest::SetSampling);
        }
    });

    section(ui, "Sensor Mode:");
    let before = controls.mode;
    egui::ComboBox::from_label("")
        .selected_text(controls.mode.as_str())
        .show_ui(ui, |ui: &mut Ui| {
            for mode in Mode::ALL {
                ui.selectable_value(&mut controls.mode, mode, mode.as_str());
            }
        });
    if controls.mode != before {
        request = Some(ControlRequest::SetMode(controls.mode));
    }

    section(ui, "Stats:");
    ui.label(
        RichText::new(stats.unwrap_or("indisponível"))
            .monospace()
            .size(11.0),
    );

    request
}
