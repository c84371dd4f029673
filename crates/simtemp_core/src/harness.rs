//! Teste de conformidade: uma mudança de configuração precisa produzir um
//! alerta observável dentro de um tempo limitado.
//!
//! ```text
//! Configuring ─► Awaiting ─► Draining ─► Passed
//!      │             │           │
//!      └─────────────┴───────────┴─────► Failed
//! ```
//!
//! Nenhuma transição volta a um estado anterior, todo caminho termina e a
//! sessão é fechada exatamente uma vez.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::attributes::{Attribute, AttributeBackend, AttributeClient, AttributeError};
use crate::config::HarnessConfig;
use crate::device::{CancelToken, DeviceError, Interest, OpenMode, RawDevice, Readiness, Session};
use crate::protocol::{Record, format_millis};

/// Estados do teste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Configuring,
    Awaiting,
    Draining,
    Passed,
    Failed,
}

/// Motivo de falha. Timeout, cancelamento e drenagem esgotada são distintos.
#[derive(Debug, thiserror::Error)]
pub enum HarnessFailure {
    /// `applied` lista, em ordem, os atributos já gravados antes da falha.
    #[error("Falha ao configurar o device: {source}. {}", describe_applied(.applied))]
    Configuration {
        applied: Vec<(Attribute, String)>,
        #[source]
        source: AttributeError,
    },

    #[error("Falha ao abrir o device: {0}")]
    Open(#[source] DeviceError),

    #[error("Tempo esgotado ({0:?}) aguardando o alerta de threshold.")]
    Timeout(Duration),

    #[error("Teste cancelado pelo operador.")]
    Cancelled,

    #[error("Buffer esvaziado após {read} amostras sem a flag THRESHOLD_CROSSED.")]
    Drained { read: usize },

    #[error("Leitura curta do device ({0} bytes).")]
    ShortRead(usize),

    #[error("{0} amostras lidas mas a flag THRESHOLD_CROSSED nunca apareceu.")]
    Exhausted(usize),

    #[error("Erro de I/O no device: {0}")]
    Device(#[source] DeviceError),
}

fn describe_applied(applied: &[(Attribute, String)]) -> String {
    if applied.is_empty() {
        return "Nenhum atributo foi alterado.".into();
    }
    let list: Vec<String> = applied.iter().map(|(attr, value)| format!("{attr}={value}")).collect();
    format!("Atributos já aplicados: {}.", list.join(", "))
}

/// Resultado completo de uma execução.
#[derive(Debug)]
pub struct HarnessReport {
    /// Estados visitados, em ordem.
    pub trail: Vec<HarnessState>,
    /// Registro com a flag de threshold, ou o motivo da falha.
    pub outcome: Result<Record, HarnessFailure>,
    /// Registros completos lidos na drenagem.
    pub samples_read: usize,
    /// Se a sessão chegou a ser aberta e foi fechada por este teste.
    pub session_closed: bool,
}

impl HarnessReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn final_state(&self) -> HarnessState {
        self.trail.last().copied().unwrap_or(HarnessState::Configuring)
    }
}

impl fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(record) => write!(
                f,
                "Threshold alert received. Trigger found in sample (Temp: {}°C, Flags: 0x{:x}).",
                format_millis(record.temp_mc),
                record.flags
            ),
            Err(failure) => write!(f, "{failure}"),
        }
    }
}

struct Trail(Vec<HarnessState>);

impl Trail {
    fn enter(&mut self, state: HarnessState) {
        debug!("Harness: {:?} → {:?}", self.0.last(), state);
        self.0.push(state);
    }
}

/// Executor do teste de conformidade.
#[derive(Debug, Clone)]
pub struct ConformanceHarness {
    config: HarnessConfig,
}

impl ConformanceHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Linha exibida ao operador antes da configuração.
    pub fn banner(&self) -> String {
        format!(
            "Configuring device: period={}ms, threshold={:.1}°C, mode={}",
            self.config.sampling_ms,
            f64::from(self.config.threshold_mc) / 1000.0,
            self.config.mode
        )
    }

    /// Executa o procedimento completo.
    ///
    /// `open` recebe o modo de abertura e devolve a sessão; isso deixa o
    /// teste rodar tanto contra `/dev/simtemp` quanto contra um device
    /// simulado. `cancel` interrompe a espera pelo alerta.
    pub fn run<B, D, F>(
        &self,
        attrs: &AttributeClient<B>,
        open: F,
        cancel: Option<&CancelToken>,
    ) -> HarnessReport
    where
        B: AttributeBackend,
        D: RawDevice,
        F: FnOnce(OpenMode) -> Result<Session<D>, DeviceError>,
    {
        let mut trail = Trail(Vec::with_capacity(4));

        // 1. Configuring
        trail.enter(HarnessState::Configuring);
        if let Err(failure) = self.configure(attrs) {
            return self.finish(trail, Err(failure), 0, None::<Session<D>>);
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return self.finish(trail, Err(HarnessFailure::Cancelled), 0, None::<Session<D>>);
        }

        // 2. Open: não-bloqueante, para que buffer vazio apareça como
        // WouldBlock em vez de travar a drenagem.
        let mut session = match open(OpenMode::NonBlocking) {
            Ok(session) => session,
            Err(e) => {
                return self.finish(trail, Err(HarnessFailure::Open(e)), 0, None::<Session<D>>);
            }
        };

        // 3. Awaiting
        trail.enter(HarnessState::Awaiting);
        info!("Aguardando alerta de threshold (timeout {:?})...", self.config.timeout());
        if let Err(failure) = self.await_alert(&mut session, cancel) {
            return self.finish(trail, Err(failure), 0, Some(session));
        }

        // 4. Draining
        trail.enter(HarnessState::Draining);
        let (outcome, read) = self.drain(&mut session);
        self.finish(trail, outcome, read, Some(session))
    }

    /// Grava período, threshold e modo, nessa ordem. A primeira falha
    /// interrompe e leva junto a lista do que já foi aplicado.
    fn configure<B: AttributeBackend>(&self, attrs: &AttributeClient<B>) -> Result<(), HarnessFailure> {
        let c = &self.config;
        info!("{}", self.banner());

        let mut applied = Vec::with_capacity(3);
        let mut record = |attr: Attribute, value: String, result: Result<(), AttributeError>| match result {
            Ok(()) => {
                applied.push((attr, value));
                Ok(())
            }
            Err(source) => Err(HarnessFailure::Configuration {
                applied: std::mem::take(&mut applied),
                source,
            }),
        };
        record(Attribute::SamplingMs, c.sampling_ms.to_string(), attrs.set_sampling_ms(c.sampling_ms))?;
        record(Attribute::ThresholdMc, c.threshold_mc.to_string(), attrs.set_threshold_mc(c.threshold_mc))?;
        record(Attribute::Mode, c.mode.as_str().to_string(), attrs.set_mode(c.mode))
    }

    fn await_alert<D: RawDevice>(
        &self,
        session: &mut Session<D>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), HarnessFailure> {
        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match session
                .wait_readable(Some(remaining), Interest::ALERT, cancel)
                .map_err(HarnessFailure::Device)?
            {
                Readiness::Ready { alert: true, .. } => return Ok(()),
                Readiness::Cancelled => return Err(HarnessFailure::Cancelled),
                // Só POLLPRI foi pedido; qualquer outra prontidão consome o prazo.
                Readiness::Ready { alert: false, .. } if !remaining.is_zero() => continue,
                _ => return Err(HarnessFailure::Timeout(timeout)),
            }
        }
    }

    fn drain<D: RawDevice>(&self, session: &mut Session<D>) -> (Result<Record, HarnessFailure>, usize) {
        let mut read = 0;
        for _ in 0..self.config.max_samples {
            match session.read_record() {
                Ok(Some(record)) => {
                    read += 1;
                    if record.threshold_crossed() {
                        return (Ok(record), read);
                    }
                    debug!(
                        "Amostra intermediária: {}°C flags=0x{:x}",
                        format_millis(record.temp_mc),
                        record.flags
                    );
                }
                Ok(None) | Err(DeviceError::WouldBlock) => {
                    return (Err(HarnessFailure::Drained { read }), read);
                }
                Err(DeviceError::ShortRead(n)) => return (Err(HarnessFailure::ShortRead(n)), read),
                Err(e) => return (Err(HarnessFailure::Device(e)), read),
            }
        }
        (Err(HarnessFailure::Exhausted(self.config.max_samples)), read)
    }

    fn finish<D: RawDevice>(
        &self,
        mut trail: Trail,
        outcome: Result<Record, HarnessFailure>,
        samples_read: usize,
        session: Option<Session<D>>,
    ) -> HarnessReport {
        let session_closed = session.is_some_and(|mut s| s.close());
        match &outcome {
            Ok(record) => {
                trail.enter(HarnessState::Passed);
                info!("Teste aprovado: {}°C após {samples_read} amostras", format_millis(record.temp_mc));
            }
            Err(failure) => {
                trail.enter(HarnessState::Failed);
                warn!("Teste reprovado: {failure}");
            }
        }
        HarnessReport {
            trail: trail.0,
            outcome,
            samples_read,
            session_closed,
        }
    }
}
