//! Atributos de configuração do driver (`sampling_ms`, `threshold_mC`,
//! `mode`, `stats`).
//!
//! Os atributos pertencem ao driver: o cliente só lê e escreve texto através
//! de um [`AttributeBackend`]. Nenhuma escrita é repetida automaticamente.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Diretório padrão dos atributos do misc device.
pub const DEFAULT_SYSFS_DIR: &str = "/sys/class/misc/simtemp";

/// Erros do cliente de atributos.
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("Atributo desconhecido: '{0}'")]
    NotFound(String),

    #[error("Atributo '{0}' é somente leitura")]
    ReadOnly(Attribute),

    #[error("Valor inválido para '{attr}': {reason}")]
    InvalidValue { attr: Attribute, reason: String },

    #[error("Erro de I/O em '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Escrita privilegiada em '{}' falhou: {stderr}", path.display())]
    Privileged { path: PathBuf, stderr: String },
}

/// Nomes conhecidos de atributos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    SamplingMs,
    ThresholdMc,
    Mode,
    Stats,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::SamplingMs,
        Attribute::ThresholdMc,
        Attribute::Mode,
        Attribute::Stats,
    ];

    /// Nome do arquivo no diretório de atributos.
    pub fn name(self) -> &'static str {
        match self {
            Attribute::SamplingMs => "sampling_ms",
            Attribute::ThresholdMc => "threshold_mC",
            Attribute::Mode => "mode",
            Attribute::Stats => "stats",
        }
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Attribute::Stats)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| AttributeError::NotFound(s.to_string()))
    }
}

/// Modo de simulação do driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Noisy,
    Ramp,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Normal, Mode::Noisy, Mode::Ramp];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Noisy => "noisy",
            Mode::Ramp => "ramp",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("modo desconhecido '{s}' (normal|noisy|ramp)"))
    }
}

/// Backend de armazenamento chave/valor.
///
/// Recebe e devolve texto canônico; a validação de nomes e valores fica no
/// [`AttributeClient`].
pub trait AttributeBackend: Send + Sync {
    fn write(&self, attr: Attribute, value: &str) -> Result<(), AttributeError>;
    fn read(&self, attr: Attribute) -> Result<String, AttributeError>;
}

// ──────────────────────────────────────────────
// Backends
// ──────────────────────────────────────────────

/// Leitura e escrita direta nos arquivos do sysfs.
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    base: PathBuf,
}

impl SysfsBackend {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn path_of(&self, attr: Attribute) -> PathBuf {
        self.base.join(attr.name())
    }
}

impl Default for SysfsBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_DIR)
    }
}

fn read_trimmed(path: &Path) -> Result<String, AttributeError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| AttributeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

impl AttributeBackend for SysfsBackend {
    fn write(&self, attr: Attribute, value: &str) -> Result<(), AttributeError> {
        let path = self.path_of(attr);
        std::fs::write(&path, value).map_err(|source| AttributeError::Io { path, source })
    }

    fn read(&self, attr: Attribute) -> Result<String, AttributeError> {
        read_trimmed(&self.path_of(attr))
    }
}

/// Escreve através de um comando auxiliar com privilégio elevado
/// (por padrão `sudo sh -c 'printf "%s\n" "$1" > "$2"' sh <valor> <arquivo>`).
/// Valor e caminho vão como argumentos posicionais, nunca interpolados no
/// script. Leituras são diretas.
#[derive(Debug, Clone)]
pub struct PrivilegedBackend {
    sysfs: SysfsBackend,
    helper: Vec<String>,
}

const WRITE_SCRIPT: &str = r#"printf '%s\n' "$1" > "$2""#;

impl PrivilegedBackend {
    /// `helper` é o prefixo do comando (ex.: `["sudo"]`, `["pkexec"]`).
    /// Vazio executa o shell sem elevação.
    pub fn new(base: impl Into<PathBuf>, helper: Vec<String>) -> Self {
        Self {
            sysfs: SysfsBackend::new(base),
            helper,
        }
    }

    fn command_for(&self, path: &Path, value: &str) -> Command {
        let mut parts = self.helper.iter();
        let mut cmd = match parts.next() {
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.args(parts);
                cmd.arg("sh");
                cmd
            }
            None => Command::new("sh"),
        };
        cmd.arg("-c")
            .arg(WRITE_SCRIPT)
            .arg("sh")
            .arg(value)
            .arg(path);
        cmd
    }
}

impl AttributeBackend for PrivilegedBackend {
    fn write(&self, attr: Attribute, value: &str) -> Result<(), AttributeError> {
        let path = self.sysfs.path_of(attr);
        let output = self
            .command_for(&path, value)
            .output()
            .map_err(|source| AttributeError::Io {
                path: path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AttributeError::Privileged {
                path,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Escrita privilegiada: {} = {}", path.display(), value);
        Ok(())
    }

    fn read(&self, attr: Attribute) -> Result<String, AttributeError> {
        self.sysfs.read(attr)
    }
}

/// Armazenamento em memória (testes e simulação).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<Attribute, String>>,
    writes: Mutex<Vec<(Attribute, String)>>,
    fail_on: Mutex<Option<Attribute>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pré-carrega um valor (ex.: `stats`, que o cliente não pode escrever).
    pub fn with_value(self, attr: Attribute, value: impl Into<String>) -> Self {
        self.values.lock().insert(attr, value.into());
        self
    }

    /// Faz toda escrita em `attr` falhar com erro de I/O.
    pub fn fail_writes_to(&self, attr: Attribute) {
        *self.fail_on.lock() = Some(attr);
    }

    /// Histórico de escritas, em ordem.
    pub fn writes(&self) -> Vec<(Attribute, String)> {
        self.writes.lock().clone()
    }
}

impl AttributeBackend for MemoryBackend {
    fn write(&self, attr: Attribute, value: &str) -> Result<(), AttributeError> {
        if *self.fail_on.lock() == Some(attr) {
            return Err(AttributeError::Io {
                path: PathBuf::from(attr.name()),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        self.values.lock().insert(attr, value.to_string());
        self.writes.lock().push((attr, value.to_string()));
        Ok(())
    }

    fn read(&self, attr: Attribute) -> Result<String, AttributeError> {
        self.values
            .lock()
            .get(&attr)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| AttributeError::Io {
                path: PathBuf::from(attr.name()),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}

// ──────────────────────────────────────────────
// Cliente
// ──────────────────────────────────────────────

/// Valores dos atributos graváveis como lidos do driver.
/// Cada campo é opcional porque qualquer leitura pode falhar isoladamente.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    pub sampling_ms: Option<u32>,
    pub threshold_mc: Option<i32>,
    pub mode: Option<Mode>,
}

/// Cliente dos atributos do driver.
pub struct AttributeClient<B: AttributeBackend> {
    backend: B,
}

impl<B: AttributeBackend> AttributeClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Escreve `value` (já em forma textual) no atributo `name`.
    pub fn write_attribute(&self, name: &str, value: &str) -> Result<(), AttributeError> {
        let attr: Attribute = name.parse()?;
        if !attr.is_writable() {
            return Err(AttributeError::ReadOnly(attr));
        }
        self.backend.write(attr, value)?;
        info!("{attr} = {value}");
        Ok(())
    }

    /// Lê o atributo `name` (texto sem espaços nas pontas).
    pub fn read_attribute(&self, name: &str) -> Result<String, AttributeError> {
        let attr: Attribute = name.parse()?;
        self.backend.read(attr)
    }

    pub fn set_sampling_ms(&self, ms: u32) -> Result<(), AttributeError> {
        if ms == 0 {
            return Err(AttributeError::InvalidValue {
                attr: Attribute::SamplingMs,
                reason: "o período deve ser positivo".into(),
            });
        }
        self.write_attribute(Attribute::SamplingMs.name(), &ms.to_string())
    }

    pub fn set_threshold_mc(&self, mc: i32) -> Result<(), AttributeError> {
        self.write_attribute(Attribute::ThresholdMc.name(), &mc.to_string())
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), AttributeError> {
        self.write_attribute(Attribute::Mode.name(), mode.as_str())
    }

    pub fn read_stats(&self) -> Result<String, AttributeError> {
        self.backend.read(Attribute::Stats)
    }

    pub fn read_sampling_ms(&self) -> Result<u32, AttributeError> {
        self.read_parsed(Attribute::SamplingMs, |s| {
            s.parse::<u32>().map_err(|e| e.to_string())
        })
    }

    pub fn read_threshold_mc(&self) -> Result<i32, AttributeError> {
        self.read_parsed(Attribute::ThresholdMc, |s| {
            s.parse::<i32>().map_err(|e| e.to_string())
        })
    }

    pub fn read_mode(&self) -> Result<Mode, AttributeError> {
        self.read_parsed(Attribute::Mode, Mode::from_str)
    }

    /// Lê os três atributos graváveis; falhas viram `None` e são logadas.
    pub fn read_settings(&self) -> DeviceSettings {
        fn keep<T>(attr: Attribute, r: Result<T, AttributeError>) -> Option<T> {
            r.map_err(|e| debug!("Não foi possível ler {attr}: {e}")).ok()
        }
        DeviceSettings {
            sampling_ms: keep(Attribute::SamplingMs, self.read_sampling_ms()),
            threshold_mc: keep(Attribute::ThresholdMc, self.read_threshold_mc()),
            mode: keep(Attribute::Mode, self.read_mode()),
        }
    }

    fn read_parsed<T>(
        &self,
        attr: Attribute,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> Result<T, AttributeError> {
        let raw = self.backend.read(attr)?;
        parse(&raw).map_err(|reason| AttributeError::InvalidValue { attr, reason })
    }
}
