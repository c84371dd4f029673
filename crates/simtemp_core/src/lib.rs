//! # simtemp core
//!
//! Cliente userspace do sensor de temperatura simulado (`/dev/simtemp`):
//! decodificação dos registros binários, atributos de configuração,
//! leitura por prontidão (`poll(2)`), estado de alerta, monitor contínuo e
//! teste de conformidade.
//!
//! ## Módulos
//! - [`protocol`] – Codec do registro de 16 bytes
//! - [`attributes`] – Leitura/escrita dos atributos do driver
//! - [`device`] – Sessão do device, espera por prontidão, cancelamento
//! - [`alerts`] – Estado de alerta (último registro decide)
//! - [`monitor`] – Laço de monitoramento e sinks de amostras
//! - [`harness`] – Teste de conformidade com timeout
//! - [`live`] / [`poller`] – Estado compartilhado e task de polling da GUI
//! - [`config`] – Configuração via TOML

pub mod alerts;
pub mod attributes;
pub mod config;
pub mod device;
pub mod harness;
pub mod live;
pub mod monitor;
pub mod poller;
pub mod protocol;

#[cfg(test)]
pub(crate) mod sim;

// Re-exports convenientes
pub use alerts::{AlertLevel, AlertStatus, AlertTracker};
pub use attributes::{AttributeClient, AttributeError, Mode};
pub use config::SimtempConfig;
pub use device::{CancelToken, DeviceError, OpenMode, Session};
pub use harness::{ConformanceHarness, HarnessFailure, HarnessReport};
pub use protocol::{RECORD_SIZE, Record};

/// Erro agregado para as bordas (CLI/GUI).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Monitor(#[from] monitor::MonitorError),

    #[error("Configuração inválida: {0}")]
    Config(String),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}
