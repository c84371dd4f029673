//! Device simulado com relógio virtual, usado nos testes.
//!
//! Cada passo tem um instante de chegada. `wait` avança o relógio virtual
//! até o primeiro passo que satisfaz o interesse (ou até o timeout), então
//! cenários de segundos rodam sem dormir.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::attributes::Mode;
use crate::device::{CancelToken, Interest, RawDevice, Readiness};
use crate::protocol::{self, FLAG_NEW_SAMPLE, FLAG_THRESHOLD_CROSSED, Record};

/// O que uma leitura devolve quando não há nada pendente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRead {
    WouldBlock,
    Eof,
}

#[derive(Debug, Clone)]
pub enum SimStep {
    Record(Record),
    /// Bytes crus, entregues numa única leitura.
    Bytes(Vec<u8>),
    /// Falha de I/O na leitura.
    Error(io::ErrorKind),
    /// Evento de prioridade sem dados; a leitura o descarta.
    AlertSignal,
}

impl SimStep {
    fn is_alert(&self) -> bool {
        match self {
            SimStep::Record(r) => r.threshold_crossed(),
            SimStep::AlertSignal => true,
            _ => false,
        }
    }

    fn is_data(&self) -> bool {
        !matches!(self, SimStep::AlertSignal)
    }
}

/// Contador compartilhado que sobrevive ao device.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Parâmetros de uma rampa, como o modo `ramp` do driver.
#[derive(Debug, Clone, Copy)]
pub struct RampProfile {
    pub start_mc: i32,
    pub step_mc: i32,
    pub period: Duration,
    pub threshold_mc: i32,
    pub samples: usize,
}

impl RampProfile {
    /// Rampa de 25 °C subindo 0,5 °C por amostra.
    pub fn from_settings(period_ms: u32, threshold_mc: i32, mode: Mode, samples: usize) -> Self {
        Self {
            start_mc: 25_000,
            step_mc: if mode == Mode::Ramp { 500 } else { 0 },
            period: Duration::from_millis(u64::from(period_ms)),
            threshold_mc,
            samples,
        }
    }

    pub fn records(&self) -> Vec<(Duration, Record)> {
        (1..=self.samples)
            .map(|i| {
                let at = self.period * i as u32;
                let temp = self.start_mc + self.step_mc * (i as i32 - 1);
                let mut flags = FLAG_NEW_SAMPLE;
                if temp >= self.threshold_mc {
                    flags |= FLAG_THRESHOLD_CROSSED;
                }
                (at, Record::new(at.as_nanos() as u64, temp, flags))
            })
            .collect()
    }
}

pub struct SimDevice {
    now: Duration,
    pending: VecDeque<(Duration, SimStep)>,
    empty: EmptyRead,
    closes: Counter,
    reads: Counter,
}

impl SimDevice {
    pub fn new(empty: EmptyRead) -> Self {
        Self {
            now: Duration::ZERO,
            pending: VecDeque::new(),
            empty,
            closes: Counter::default(),
            reads: Counter::default(),
        }
    }

    /// Passos disponíveis imediatamente.
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = SimStep>) -> Self {
        let now = self.now;
        self.pending.extend(steps.into_iter().map(|s| (now, s)));
        self
    }

    /// Passos com instante de chegada (em ordem crescente).
    pub fn with_timed(mut self, steps: impl IntoIterator<Item = (Duration, SimStep)>) -> Self {
        self.pending.extend(steps);
        self
    }

    pub fn with_ramp(self, profile: RampProfile) -> Self {
        self.with_timed(
            profile
                .records()
                .into_iter()
                .map(|(at, r)| (at, SimStep::Record(r))),
        )
    }

    pub fn close_counter(&self) -> Counter {
        self.closes.clone()
    }

    pub fn read_counter(&self) -> Counter {
        self.reads.clone()
    }

    fn first_matching(&self, interest: Interest) -> Option<Duration> {
        self.pending
            .iter()
            .find(|(_, step)| (interest.data && step.is_data()) || (interest.alert && step.is_alert()))
            .map(|(at, _)| *at)
    }

    fn readiness_now(&self) -> Readiness {
        let arrived = self.pending.iter().take_while(|(at, _)| *at <= self.now);
        let (mut data, mut alert) = (false, false);
        for (_, step) in arrived {
            data |= step.is_data();
            alert |= step.is_alert();
        }
        Readiness::Ready { data, alert }
    }
}

impl RawDevice for SimDevice {
    fn wait(
        &mut self,
        interest: Interest,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> io::Result<Readiness> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Ok(Readiness::Cancelled);
        }
        let deadline = timeout.map(|t| self.now + t);

        match (self.first_matching(interest), deadline) {
            (Some(at), Some(deadline)) if at > deadline => {
                self.now = deadline;
            }
            (Some(at), _) => {
                self.now = self.now.max(at);
                return Ok(self.readiness_now());
            }
            (None, Some(deadline)) => {
                self.now = deadline;
            }
            (None, None) => {
                // Nada mais vai chegar: só o cancelamento encerra a espera.
                let Some(token) = cancel else {
                    return Err(io::Error::other("simulação sem eventos restantes"));
                };
                while !token.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                return Ok(Readiness::Cancelled);
            }
        }

        if cancel.is_some() {
            // Evita girar em laços com timeout curto e relógio virtual.
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(Readiness::TimedOut)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.bump();
        loop {
            match self.pending.front() {
                Some((at, _)) if *at <= self.now => {}
                _ => {
                    return match self.empty {
                        EmptyRead::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
                        EmptyRead::Eof => Ok(0),
                    };
                }
            }
            let Some((_, step)) = self.pending.pop_front() else {
                unreachable!("front() acabou de retornar Some");
            };
            let bytes = match step {
                SimStep::AlertSignal => continue,
                SimStep::Error(kind) => return Err(kind.into()),
                SimStep::Record(r) => protocol::encode_record(&r)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
                SimStep::Bytes(b) => b,
            };
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            return Ok(n);
        }
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.closes.bump();
    }
}
