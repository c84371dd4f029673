//! # simtemp
//!
//! CLI do sensor de temperatura simulado: configura os atributos do driver,
//! lê estatísticas, monitora o stream de registros e roda o teste de
//! conformidade de alerta.
//!
//! ## Uso
//! ```bash
//! simtemp                                  # Monitor contínuo (Ctrl+C para sair)
//! simtemp --set-period 200 --set-mode ramp
//! simtemp --set-threshold -1500            # m°C, pode ser negativo
//! simtemp --read-stats
//! sudo simtemp --test                      # Teste de conformidade
//! ```

mod actions;

use actions::{Action, Outcome, Request, Runner};
use clap::Parser;
use simtemp_core::attributes::{AttributeClient, Mode, SysfsBackend};
use simtemp_core::{CancelToken, DeviceError, Error, SimtempConfig};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "simtemp", about = "CLI para o sensor de temperatura simulado (simtemp)")]
struct Cli {
    /// Período de amostragem em milissegundos
    #[arg(long, value_name = "MS")]
    set_period: Option<u32>,

    /// Threshold de alerta em mili-Celsius
    #[arg(long, value_name = "mC", allow_negative_numbers = true)]
    set_threshold: Option<i32>,

    /// Modo de simulação: normal | noisy | ramp
    #[arg(long, value_name = "MODE")]
    set_mode: Option<Mode>,

    /// Lê as estatísticas do device
    #[arg(long)]
    read_stats: bool,

    /// Roda o teste automático de alerta de threshold
    #[arg(long)]
    test: bool,

    /// Arquivo de configuração (padrão: config.toml ao lado do executável)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Caminho do character device
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Diretório dos atributos
    #[arg(long, value_name = "DIR")]
    sysfs_dir: Option<PathBuf>,
}

impl Cli {
    fn request(&self) -> Request {
        Request {
            set_period: self.set_period,
            set_threshold: self.set_threshold,
            set_mode: self.set_mode,
            read_stats: self.read_stats,
            test: self.test,
        }
    }
}

fn main() -> ExitCode {
    // ── Logging (stderr; stdout fica com as amostras) ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::TestFailed) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Erro: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome, Error> {
    // ── Carregar config ──
    let config_path = cli.config.clone().unwrap_or_else(SimtempConfig::default_path);
    let mut config = SimtempConfig::load(&config_path);
    if let Some(device) = &cli.device {
        config.device.path = device.clone();
    }
    if let Some(dir) = &cli.sysfs_dir {
        config.device.sysfs_dir = dir.clone();
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            warn!("{e}");
        }
        return Err(Error::Config(errors.join("; ")));
    }

    // O driver precisa estar carregado antes de qualquer ação.
    if !config.device.path.exists() {
        return Err(DeviceError::NotFound(config.device.path.clone()).into());
    }

    let actions = actions::plan(&cli.request());
    debug!("Ações: {actions:?}");

    let runner = Runner {
        attrs: AttributeClient::new(SysfsBackend::new(&config.device.sysfs_dir)),
        device: config.device.path.clone(),
        harness: config.harness.clone(),
        interrupt: CancelToken::new()?,
    };
    if actions.iter().any(|a| matches!(a, Action::Test | Action::Monitor)) {
        let token = runner.interrupt.clone();
        ctrlc::set_handler(move || token.cancel()).map_err(|e| Error::Io(std::io::Error::other(e)))?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = runner.execute(&actions, &mut out)?;
    out.flush()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_threshold_and_mode() {
        let cli = Cli::try_parse_from(["simtemp", "--set-threshold", "-1500", "--set-mode", "ramp"]).unwrap();
        let req = cli.request();
        assert_eq!(req.set_threshold, Some(-1500));
        assert_eq!(req.set_mode, Some(Mode::Ramp));
        assert!(!req.test);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["simtemp", "--set-mode", "turbo"]).is_err());
    }

    #[test]
    fn missing_device_is_reported_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "simtemp",
            "--set-period",
            "100",
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "--device",
            dir.path().join("simtemp").to_str().unwrap(),
            "--sysfs-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        assert!(matches!(run(&cli), Err(Error::Device(DeviceError::NotFound(_)))));
        assert!(!dir.path().join("sampling_ms").exists());
    }

    #[test]
    fn configures_through_sysfs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("simtemp");
        std::fs::write(&device, b"").unwrap();
        let cli = Cli::try_parse_from([
            "simtemp",
            "--set-threshold",
            "30000",
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "--device",
            device.to_str().unwrap(),
            "--sysfs-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        assert!(matches!(run(&cli), Ok(Outcome::Success)));
        let raw = std::fs::read_to_string(dir.path().join("threshold_mC")).unwrap();
        assert_eq!(raw, "30000");
    }
}
