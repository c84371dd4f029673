//! Ações da CLI, avaliadas sempre na mesma ordem:
//! configurar → ler stats → teste (ou monitor, se nada mais foi pedido).

use std::io::Write;
use std::path::PathBuf;

use simtemp_core::attributes::{AttributeBackend, AttributeClient, Mode};
use simtemp_core::config::HarnessConfig;
use simtemp_core::monitor::{LineSink, Monitor};
use simtemp_core::{AlertTracker, CancelToken, ConformanceHarness, Error, OpenMode, Session};
use tracing::info;

/// Resultado final das ações (erros vêm por `Err`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    TestFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetPeriod(u32),
    SetThreshold(i32),
    SetMode(Mode),
    ReadStats,
    Test,
    Monitor,
}

/// O que foi pedido na linha de comando.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub set_period: Option<u32>,
    pub set_threshold: Option<i32>,
    pub set_mode: Option<Mode>,
    pub read_stats: bool,
    pub test: bool,
}

/// Monta a lista ordenada de ações.
pub fn plan(req: &Request) -> Vec<Action> {
    let mut actions = Vec::new();
    if let Some(ms) = req.set_period {
        actions.push(Action::SetPeriod(ms));
    }
    if let Some(mc) = req.set_threshold {
        actions.push(Action::SetThreshold(mc));
    }
    if let Some(mode) = req.set_mode {
        actions.push(Action::SetMode(mode));
    }
    if req.read_stats {
        actions.push(Action::ReadStats);
    }
    if req.test {
        actions.push(Action::Test);
    } else if actions.is_empty() {
        actions.push(Action::Monitor);
    }
    actions
}

/// Executor das ações contra um backend de atributos e um device.
pub struct Runner<B: AttributeBackend> {
    pub attrs: AttributeClient<B>,
    pub device: PathBuf,
    pub harness: HarnessConfig,
    /// Acionado pelo Ctrl+C; interrompe o monitor e o teste.
    pub interrupt: CancelToken,
}

impl<B: AttributeBackend> Runner<B> {
    /// Executa as ações em ordem. A primeira falha interrompe as seguintes.
    pub fn execute<W: Write>(&self, actions: &[Action], out: &mut W) -> Result<Outcome, Error> {
        for action in actions {
            match *action {
                Action::SetPeriod(ms) => {
                    self.attrs.set_sampling_ms(ms)?;
                    writeln!(out, "Período de amostragem definido: {ms} ms")?;
                }
                Action::SetThreshold(mc) => {
                    self.attrs.set_threshold_mc(mc)?;
                    writeln!(out, "Threshold definido: {mc} mC")?;
                }
                Action::SetMode(mode) => {
                    self.attrs.set_mode(mode)?;
                    writeln!(out, "Modo definido: '{mode}'")?;
                }
                Action::ReadStats => {
                    let stats = self.attrs.read_stats()?;
                    writeln!(out, "Device Stats: {stats}")?;
                }
                Action::Test => return Ok(self.run_test(out)?),
                Action::Monitor => {
                    self.run_monitor(out)?;
                }
            }
        }
        Ok(Outcome::Success)
    }

    fn run_test<W: Write>(&self, out: &mut W) -> std::io::Result<Outcome> {
        writeln!(out, "--- Running Test Mode ---")?;
        let harness = ConformanceHarness::new(self.harness.clone());
        writeln!(out, "{}", harness.banner())?;
        out.flush()?;
        let report = harness.run(
            &self.attrs,
            |mode| Session::open(&self.device, mode),
            Some(&self.interrupt),
        );

        if report.passed() {
            writeln!(out, "{report}")?;
            writeln!(out, "TEST PASSED")?;
            Ok(Outcome::Success)
        } else {
            eprintln!("TEST FAILED: {report}");
            Ok(Outcome::TestFailed)
        }
    }

    fn run_monitor<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        let session = Session::open(&self.device, OpenMode::NonBlocking)?;

        writeln!(out, "Monitoring {}... Press Ctrl+C to exit.", self.device.display())?;
        writeln!(out, "{}", "-".repeat(40))?;

        let mut tracker = AlertTracker::new();
        let mut sink = LineSink::new(&mut *out);
        let summary = Monitor::new().run(session, &mut tracker, &mut sink, &self.interrupt)?;
        info!(
            "{} registros, {} entradas em alerta",
            summary.records,
            tracker.alert_entries()
        );

        writeln!(out, "\nMonitoring stopped.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtemp_core::attributes::{Attribute, MemoryBackend};

    fn runner(backend: MemoryBackend) -> Runner<MemoryBackend> {
        Runner {
            attrs: AttributeClient::new(backend),
            device: PathBuf::from("/nonexistent/simtemp"),
            harness: HarnessConfig::default(),
            interrupt: CancelToken::new().unwrap(),
        }
    }

    #[test]
    fn no_flags_means_monitor() {
        assert_eq!(plan(&Request::default()), vec![Action::Monitor]);
    }

    #[test]
    fn fixed_order_configure_stats_test() {
        let req = Request {
            set_period: Some(100),
            set_threshold: Some(-500),
            set_mode: Some(Mode::Noisy),
            read_stats: true,
            test: true,
        };
        assert_eq!(
            plan(&req),
            vec![
                Action::SetPeriod(100),
                Action::SetThreshold(-500),
                Action::SetMode(Mode::Noisy),
                Action::ReadStats,
                Action::Test,
            ]
        );
    }

    #[test]
    fn configuration_alone_does_not_monitor() {
        let req = Request {
            set_mode: Some(Mode::Ramp),
            ..Default::default()
        };
        assert_eq!(plan(&req), vec![Action::SetMode(Mode::Ramp)]);
    }

    #[test]
    fn zero_threshold_is_still_applied() {
        let req = Request {
            set_threshold: Some(0),
            ..Default::default()
        };
        assert_eq!(plan(&req), vec![Action::SetThreshold(0)]);
    }

    #[test]
    fn executes_configuration_and_stats() {
        let backend = MemoryBackend::new().with_value(Attribute::Stats, "samples=10 alerts=2");
        let r = runner(backend);
        let mut out = Vec::new();
        let code = r
            .execute(
                &[Action::SetPeriod(250), Action::SetMode(Mode::Ramp), Action::ReadStats],
                &mut out,
            )
            .unwrap();

        assert_eq!(code, Outcome::Success);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("250 ms"));
        assert!(text.contains("Device Stats: samples=10 alerts=2"));
        assert_eq!(r.attrs.backend().writes().len(), 2);
    }

    #[test]
    fn failed_write_aborts_remaining_actions() {
        let backend = MemoryBackend::new();
        backend.fail_writes_to(Attribute::SamplingMs);
        let r = runner(backend);
        let result = r.execute(&[Action::SetPeriod(250), Action::SetMode(Mode::Ramp)], &mut Vec::new());

        assert!(matches!(result, Err(Error::Attribute(_))));
        assert!(r.attrs.backend().writes().is_empty());
    }

    #[test]
    fn test_against_missing_device_fails_with_status_one() {
        let r = runner(MemoryBackend::new());
        let mut out = Vec::new();
        let code = r.execute(&[Action::Test], &mut out).unwrap();
        assert_eq!(code, Outcome::TestFailed);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("--- Running Test Mode ---\n"));
        assert!(text.contains("Configuring device: period=200ms, threshold=30.0°C, mode=ramp"));
    }

    #[test]
    fn interrupted_test_fails_without_opening_the_device() {
        let r = runner(MemoryBackend::new());
        r.interrupt.cancel();
        let code = r.execute(&[Action::Test], &mut Vec::new()).unwrap();
        assert_eq!(code, Outcome::TestFailed);
        // A configuração foi aplicada antes do cancelamento ser observado.
        assert_eq!(r.attrs.backend().writes().len(), 3);
    }

    #[test]
    fn monitor_against_missing_device_is_not_found() {
        let r = runner(MemoryBackend::new());
        let result = r.execute(&[Action::Monitor], &mut Vec::new());
        assert!(matches!(
            result,
            Err(Error::Device(simtemp_core::DeviceError::NotFound(_)))
        ));
    }
}
