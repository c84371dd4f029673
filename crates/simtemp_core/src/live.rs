//! Estado compartilhado entre a task de polling e a renderização.
//!
//! A task de polling escreve; a UI só lê cópias imutáveis
//! ([`LiveSnapshot`]). O lock é mantido apenas durante a cópia.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::alerts::AlertStatus;
use crate::monitor::SampleSink;
use crate::protocol::Record;

struct LiveInner {
    samples: VecDeque<Record>,
    capacity: usize,
    status: AlertStatus,
    total: u64,
    origin_ns: Option<u64>,
}

/// Anel das últimas N amostras + status de alerta corrente.
#[derive(Clone)]
pub struct LiveState {
    inner: Arc<Mutex<LiveInner>>,
}

/// Cópia imutável do estado.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSnapshot {
    pub samples: Vec<Record>,
    pub status: AlertStatus,
    pub total: u64,
    origin_ns: Option<u64>,
}

impl LiveState {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(LiveInner {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                status: AlertStatus::default(),
                total: 0,
                origin_ns: None,
            })),
        }
    }

    pub fn push(&self, record: &Record, status: &AlertStatus) {
        let mut inner = self.inner.lock();
        if inner.samples.len() >= inner.capacity {
            inner.samples.pop_front();
        }
        inner.samples.push_back(*record);
        inner.status = *status;
        inner.total += 1;
        inner.origin_ns.get_or_insert(record.timestamp_ns);
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let inner = self.inner.lock();
        LiveSnapshot {
            samples: inner.samples.iter().copied().collect(),
            status: inner.status,
            total: inner.total,
            origin_ns: inner.origin_ns,
        }
    }
}

impl SampleSink for LiveState {
    fn on_sample(&mut self, record: &Record, status: &AlertStatus) -> io::Result<()> {
        self.push(record, status);
        Ok(())
    }
}

impl LiveSnapshot {
    /// Pontos `[segundos desde a primeira amostra, °C]` para o gráfico.
    pub fn points(&self) -> Vec<[f64; 2]> {
        let origin = self.origin_ns.unwrap_or(0);
        self.samples
            .iter()
            .map(|r| {
                let secs = r.timestamp_ns.saturating_sub(origin) as f64 / 1e9;
                [secs, r.temperature_celsius()]
            })
            .collect()
    }

    /// Faixa de temperatura (°C) das amostras, se houver alguma.
    pub fn temperature_range(&self) -> Option<(f64, f64)> {
        self.samples.iter().map(Record::temperature_celsius).fold(None, |acc, t| {
            Some(match acc {
                None => (t, t),
                Some((lo, hi)) => (lo.min(t), hi.max(t)),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertLevel, AlertTracker};
    use crate::protocol::{FLAG_NEW_SAMPLE, FLAG_THRESHOLD_CROSSED};

    #[test]
    fn ring_keeps_most_recent() {
        let state = LiveState::new(3);
        let mut tracker = AlertTracker::new();
        for i in 0..5u64 {
            let r = Record::new(i * 1_000_000_000, 20_000 + i as i32, FLAG_NEW_SAMPLE);
            state.push(&r, &tracker.observe(&r));
        }
        let snap = state.snapshot();
        assert_eq!(snap.total, 5);
        let temps: Vec<_> = snap.samples.iter().map(|r| r.temp_mc).collect();
        assert_eq!(temps, vec![20_002, 20_003, 20_004]);
        // Tempo relativo à primeira amostra de todas, não à primeira do anel.
        assert_eq!(snap.points()[0], [2.0, 20.002]);
    }

    #[test]
    fn snapshot_is_detached_from_writer() {
        let state = LiveState::new(10);
        let r = Record::new(1, 31_000, FLAG_NEW_SAMPLE | FLAG_THRESHOLD_CROSSED);
        let status = AlertStatus::from_record(&r);
        state.push(&r, &status);
        let before = state.snapshot();

        let r2 = Record::new(2, 29_000, FLAG_NEW_SAMPLE);
        state.push(&r2, &AlertStatus::from_record(&r2));

        assert_eq!(before.status.level, AlertLevel::Alert);
        assert_eq!(before.samples.len(), 1);
        assert_eq!(state.snapshot().status.level, AlertLevel::Ok);
    }

    #[test]
    fn concurrent_writer_and_reader_never_tear() {
        let state = LiveState::new(50);
        let writer_state = state.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..2_000u64 {
                // Alerta exatamente nas amostras ímpares.
                let flags = if i % 2 == 1 {
                    FLAG_NEW_SAMPLE | FLAG_THRESHOLD_CROSSED
                } else {
                    FLAG_NEW_SAMPLE
                };
                let r = Record::new(i, i as i32, flags);
                writer_state.push(&r, &AlertStatus::from_record(&r));
            }
        });

        for _ in 0..500 {
            let snap = state.snapshot();
            if let Some(last) = snap.samples.last() {
                assert_eq!(snap.status.is_alert(), last.threshold_crossed());
                assert_eq!(snap.status.last_reading.unwrap().temp_mc, last.temp_mc);
            }
        }
        writer.join().unwrap();
        assert_eq!(state.snapshot().total, 2_000);
    }

    #[test]
    fn range_of_empty_snapshot() {
        assert_eq!(LiveState::new(4).snapshot().temperature_range(), None);
    }
}
