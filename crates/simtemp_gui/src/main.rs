//! # simtemp-gui
//!
//! Painel de controle do sensor simulado com gráfico ao vivo via eframe/egui.
//!
//! Lê `/dev/simtemp` numa thread de polling e escreve os atributos do
//! driver através de um helper privilegiado (`sudo` por padrão) quando o
//! processo não roda como root.
//!
//! ## Atalhos
//! - `Q` / `Esc`: Sair

mod dashboard;
mod panels;

use dashboard::SimtempDashboard;
use simtemp_core::config::SimtempConfig;
use simtemp_core::{OpenMode, Session};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

/// Verifica se o processo roda como root.
fn is_admin() -> bool {
    // SAFETY: geteuid não tem pré-condições.
    unsafe { libc::geteuid() == 0 }
}

/// Carrega a configuração (criando o arquivo se ausente) e recusa valores
/// inválidos.
fn load_config(path: &Path) -> Result<SimtempConfig, Vec<String>> {
    let config = SimtempConfig::load(path);
    if !path.exists() {
        let _ = config.save(path);
    }
    let errors = config.validate();
    if errors.is_empty() { Ok(config) } else { Err(errors) }
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = SimtempConfig::default_path();
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                error!("{e}");
            }
            eprintln!("Configuração inválida em '{}': {}", config_path.display(), errors.join("; "));
            return ExitCode::FAILURE;
        }
    };

    // Como root, o helper é dispensável.
    let helper = if is_admin() {
        Vec::new()
    } else {
        info!(
            "Escritas de atributos via helper: {:?}",
            config.gui.privileged_helper
        );
        config.gui.privileged_helper.clone()
    };

    let session = Session::open(&config.device.path, OpenMode::NonBlocking);

    // ── Janela eframe ──
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Simtemp Sensor Control")
            .with_inner_size([900.0, 600.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "Simtemp Sensor Control",
        options,
        Box::new(move |cc| Ok(Box::new(SimtempDashboard::new(cc, config, helper, session)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Falha na janela: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_poll_interval_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\npoll_interval_ms = 0\n").unwrap();

        let errors = load_config(&path).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("poll_interval_ms")), "{errors:?}");
    }

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.monitor.poll_interval_ms, 50);
    }
}
