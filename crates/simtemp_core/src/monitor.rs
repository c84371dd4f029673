//! Laço de monitoramento contínuo.
//!
//! A cada iteração: espera por dados ou alerta, drena todos os registros
//! completos disponíveis, alimenta o [`AlertTracker`] e entrega cada registro
//! a um [`SampleSink`]. Termina por cancelamento ou erro terminal do device.

use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::alerts::{AlertStatus, AlertTracker};
use crate::device::{CancelToken, DeviceError, Interest, RawDevice, Readiness, Session};
use crate::protocol::{Record, format_millis};

/// Sufixo das linhas de registros com o bit de threshold.
pub const ALERT_MARKER: &str = " | *** ALERT ***";

/// Pausa do monitor terminal quando o handle fica pronto sem render dados.
const IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Erros que encerram o monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Erro ao emitir amostra: {0}")]
    Output(#[source] io::Error),
}

/// Destino das amostras decodificadas.
pub trait SampleSink {
    fn on_sample(&mut self, record: &Record, status: &AlertStatus) -> io::Result<()>;
}

/// Uma linha por registro: instante UTC, temperatura e marcador de alerta.
pub fn format_line(record: &Record) -> String {
    let marker = if record.threshold_crossed() {
        ALERT_MARKER
    } else {
        ""
    };
    format!(
        "{} | Temp: {:>6}°C{marker}",
        record.utc_iso(),
        format_millis(record.temp_mc)
    )
}

/// Sink de texto (monitor do terminal).
pub struct LineSink<W: Write> {
    out: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SampleSink for LineSink<W> {
    fn on_sample(&mut self, record: &Record, _status: &AlertStatus) -> io::Result<()> {
        // Linha inteira numa única escrita: cancelamento nunca a corta ao meio.
        let line = format!("{}\n", format_line(record));
        self.out.write_all(line.as_bytes())?;
        self.out.flush()
    }
}

/// Por que o monitor parou sem erro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
}

/// Resumo de uma execução do monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub records: u64,
    pub alert_records: u64,
    pub short_reads: u64,
    pub malformed: u64,
    pub stop_reason: StopReason,
}

/// Configuração do laço.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monitor {
    wait: Option<Duration>,
}

impl Monitor {
    /// Espera indefinida por prontidão (terminal).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pausa após uma notificação que não rendeu nenhum registro.
    fn idle_backoff(&self) -> Duration {
        self.wait.unwrap_or(IDLE_BACKOFF)
    }

    /// Espera limitada a `interval` por iteração (task de polling da GUI).
    pub fn with_wait_interval(interval: Duration) -> Self {
        Self {
            wait: Some(interval),
        }
    }

    /// Executa até `cancel` ou um erro terminal. A sessão é sempre fechada
    /// antes de retornar.
    pub fn run<D: RawDevice, S: SampleSink>(
        &self,
        mut session: Session<D>,
        tracker: &mut AlertTracker,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<MonitorSummary, MonitorError> {
        let result = self.run_inner(&mut session, tracker, sink, cancel);
        session.close();
        match &result {
            Ok(summary) => info!(
                "Monitor encerrado: {} registros, {} com alerta",
                summary.records, summary.alert_records
            ),
            Err(e) => warn!("Monitor encerrado por erro: {e}"),
        }
        result
    }

    fn run_inner<D: RawDevice, S: SampleSink>(
        &self,
        session: &mut Session<D>,
        tracker: &mut AlertTracker,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<MonitorSummary, MonitorError> {
        let mut summary = MonitorSummary {
            records: 0,
            alert_records: 0,
            short_reads: 0,
            malformed: 0,
            stop_reason: StopReason::Cancelled,
        };

        loop {
            match session.wait_readable(self.wait, Interest::BOTH, Some(cancel))? {
                Readiness::Cancelled => return Ok(summary),
                Readiness::TimedOut => continue,
                Readiness::Ready { .. } => {}
            }

            // Drena o que estiver disponível nesta notificação.
            let before = summary.records;
            loop {
                if cancel.is_cancelled() {
                    return Ok(summary);
                }
                match session.read_record() {
                    Ok(Some(record)) => {
                        let status = tracker.observe(&record);
                        sink.on_sample(&record, &status)
                            .map_err(MonitorError::Output)?;
                        summary.records += 1;
                        if record.threshold_crossed() {
                            summary.alert_records += 1;
                        }
                    }
                    Ok(None) | Err(DeviceError::WouldBlock) => break,
                    Err(DeviceError::ShortRead(n)) => {
                        debug!("Leitura curta ({n} bytes), aguardando próxima notificação");
                        summary.short_reads += 1;
                        break;
                    }
                    Err(DeviceError::Malformed(msg)) => {
                        warn!("Registro malformado ignorado: {msg}");
                        summary.malformed += 1;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // Handle pronto mas sem registro (ex.: arquivo comum no fim):
            // espera o intervalo antes de consultar de novo.
            if summary.records == before {
                let pause = session.wait_readable(Some(self.idle_backoff()), Interest::NONE, Some(cancel))?;
                if pause == Readiness::Cancelled {
                    return Ok(summary);
                }
            }
        }
    }
}
