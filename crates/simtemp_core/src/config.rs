//! Configuração unificada via TOML (`config.toml`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::attributes::{DEFAULT_SYSFS_DIR, Mode};
use crate::device::DEFAULT_DEVICE_PATH;

/// Onde o driver está exposto.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Character device com os registros binários
    pub path: PathBuf,
    /// Diretório dos atributos
    pub sysfs_dir: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            sysfs_dir: PathBuf::from(DEFAULT_SYSFS_DIR),
        }
    }
}

/// Monitor contínuo e task de polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Espera máxima por iteração da task de polling (ms)
    pub poll_interval_ms: u64,
    /// Amostras mantidas no anel do gráfico
    pub history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            history_size: 100,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Cenário do teste de conformidade.
///
/// Padrão: rampa começando em 25 °C, +0,5 °C por amostra a cada 200 ms,
/// cruza 30 °C na 11ª amostra (~2,2 s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    pub mode: Mode,
    /// Espera máxima pelo evento de alerta (ms)
    pub timeout_ms: u64,
    /// Amostras esperadas até o cruzamento
    pub expected_samples: usize,
    /// Limite de leituras na drenagem
    pub max_samples: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sampling_ms: 200,
            threshold_mc: 30_000,
            mode: Mode::Ramp,
            timeout_ms: 5_000,
            expected_samples: 11,
            max_samples: 20,
        }
    }
}

impl HarnessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Painel gráfico.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    /// Prefixo do comando de escrita privilegiada (vazio = sem elevação)
    pub privileged_helper: Vec<String>,
    /// Threshold exibido antes da primeira leitura do driver (m°C)
    pub initial_threshold_mc: i32,
    /// Período inicial exibido (ms)
    pub initial_sampling_ms: u32,
    /// Intervalo de atualização do `stats` (ms)
    pub stats_refresh_ms: u64,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            privileged_helper: vec!["sudo".into()],
            initial_threshold_mc: 45_000,
            initial_sampling_ms: 100,
            stats_refresh_ms: 500,
        }
    }
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimtempConfig {
    pub device: DeviceConfig,
    pub monitor: MonitorConfig,
    pub harness: HarnessConfig,
    pub gui: GuiConfig,
}

impl SimtempConfig {
    /// Carrega configuração de um arquivo TOML; na falta dele, padrões.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<SimtempConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        SimtempConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho padrão: `config.toml` ao lado do executável.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let h = &self.harness;

        if h.sampling_ms == 0 {
            errors.push("harness.sampling_ms deve ser positivo".into());
        }
        if h.timeout_ms == 0 {
            errors.push("harness.timeout_ms deve ser positivo".into());
        }
        if h.max_samples <= h.expected_samples {
            errors.push(format!(
                "harness.max_samples ({}) deve ser maior que expected_samples ({})",
                h.max_samples, h.expected_samples
            ));
        }
        let expected_ms = u64::from(h.sampling_ms) * h.expected_samples as u64;
        if h.timeout_ms <= expected_ms {
            errors.push(format!(
                "harness.timeout_ms ({}) não cobre o tempo esperado até o threshold ({} ms)",
                h.timeout_ms, expected_ms
            ));
        }
        if self.monitor.poll_interval_ms == 0 || self.monitor.poll_interval_ms > 1_000 {
            errors.push(format!(
                "monitor.poll_interval_ms inválido: {} (1–1000)",
                self.monitor.poll_interval_ms
            ));
        }
        if self.monitor.history_size == 0 {
            errors.push("monitor.history_size não pode ser 0".into());
        }
        if self.gui.initial_sampling_ms == 0 {
            errors.push("gui.initial_sampling_ms deve ser positivo".into());
        }
        if self.gui.stats_refresh_ms == 0 {
            errors.push("gui.stats_refresh_ms deve ser positivo".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimtempConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = SimtempConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: SimtempConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.harness, parsed.harness);
        assert_eq!(config.device.path, parsed.device.path);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[harness]
mode = "noisy"
timeout_ms = 8000
"#;
        let config: SimtempConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.harness.mode, Mode::Noisy);
        assert_eq!(config.harness.timeout_ms, 8000);
        // Outros campos devem ter valor padrão
        assert_eq!(config.harness.max_samples, 20);
        assert_eq!(config.device.path, PathBuf::from("/dev/simtemp"));
    }

    #[test]
    fn drain_bound_must_exceed_expected_samples() {
        let mut config = SimtempConfig::default();
        config.harness.max_samples = config.harness.expected_samples;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn timeout_must_cover_time_to_threshold() {
        let mut config = SimtempConfig::default();
        config.harness.timeout_ms = 1_000;
        assert!(config.validate()[0].contains("timeout_ms"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = SimtempConfig::default();
        config.monitor.poll_interval_ms = 0;
        config.gui.stats_refresh_ms = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors[0].contains("poll_interval_ms"));
        assert!(errors[1].contains("stats_refresh_ms"));
    }

    #[test]
    fn load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimtempConfig::load(&dir.path().join("nope.toml"));
        assert_eq!(config.harness, HarnessConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = SimtempConfig::default();
        config.gui.privileged_helper = vec!["pkexec".into()];
        config.save(&path).unwrap();
        assert_eq!(SimtempConfig::load(&path).gui.privileged_helper, vec!["pkexec"]);
    }
}
