//! Estado de alerta – derivado apenas da flag do registro mais recente.
//!
//! Não há histerese, debounce nem contagem de cruzamentos consecutivos:
//! uma única amostra com o bit de threshold coloca o estado em `Alert` e a
//! próxima amostra sem o bit volta para `Ok`.

use serde::{Deserialize, Serialize};

use crate::protocol::Record;

/// Nível de alerta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertLevel {
    #[default]
    Ok,
    Alert,
}

impl AlertLevel {
    pub fn label(self) -> &'static str {
        match self {
            AlertLevel::Ok => "OK",
            AlertLevel::Alert => "ALERT",
        }
    }
}

/// Última leitura observada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp_ns: u64,
    pub temp_mc: i32,
}

/// Status corrente: nível + leitura do registro mais recente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub level: AlertLevel,
    /// `None` até o primeiro registro.
    pub last_reading: Option<Reading>,
}

impl AlertStatus {
    /// Status derivado de um único registro.
    pub fn from_record(record: &Record) -> Self {
        Self {
            level: if record.threshold_crossed() {
                AlertLevel::Alert
            } else {
                AlertLevel::Ok
            },
            last_reading: Some(Reading {
                timestamp_ns: record.timestamp_ns,
                temp_mc: record.temp_mc,
            }),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.level == AlertLevel::Alert
    }
}

/// Rastreador de alerta alimentado pelos registros em ordem.
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    status: AlertStatus,
    samples: u64,
    alert_entries: u64,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitui o status pelo derivado de `record`. O(1).
    pub fn observe(&mut self, record: &Record) -> AlertStatus {
        let next = AlertStatus::from_record(record);
        if next.is_alert() && !self.status.is_alert() {
            self.alert_entries += 1;
        }
        self.status = next;
        self.samples += 1;
        next
    }

    pub fn current(&self) -> AlertStatus {
        self.status
    }

    /// Registros observados até agora.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Quantas vezes o estado passou de `Ok` para `Alert`.
    pub fn alert_entries(&self) -> u64 {
        self.alert_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FLAG_NEW_SAMPLE, FLAG_THRESHOLD_CROSSED};
    use proptest::prelude::*;

    fn rec(ts: u64, temp: i32, crossed: bool) -> Record {
        let mut flags = FLAG_NEW_SAMPLE;
        if crossed {
            flags |= FLAG_THRESHOLD_CROSSED;
        }
        Record::new(ts, temp, flags)
    }

    #[test]
    fn starts_ok_without_reading() {
        let tracker = AlertTracker::new();
        assert_eq!(tracker.current().level, AlertLevel::Ok);
        assert_eq!(tracker.current().last_reading, None);
    }

    #[test]
    fn single_noisy_sample_flips_and_next_flips_back() {
        let mut tracker = AlertTracker::new();
        tracker.observe(&rec(1, 29_000, false));
        assert_eq!(tracker.observe(&rec(2, 31_000, true)).level, AlertLevel::Alert);
        assert_eq!(tracker.observe(&rec(3, 29_500, false)).level, AlertLevel::Ok);
        assert_eq!(tracker.alert_entries(), 1);
        assert_eq!(tracker.samples(), 3);
    }

    #[test]
    fn status_uses_flag_not_temperature() {
        let mut tracker = AlertTracker::new();
        // Temperatura alta sem o bit: o cliente não compara com o threshold.
        let status = tracker.observe(&rec(1, 90_000, false));
        assert_eq!(status.level, AlertLevel::Ok);
        assert_eq!(
            status.last_reading,
            Some(Reading {
                timestamp_ns: 1,
                temp_mc: 90_000
            })
        );
    }

    #[test]
    fn consecutive_alerts_count_one_entry() {
        let mut tracker = AlertTracker::new();
        for ts in 0..5 {
            tracker.observe(&rec(ts, 31_000, true));
        }
        assert_eq!(tracker.alert_entries(), 1);
        assert!(tracker.current().is_alert());
    }

    proptest! {
        #[test]
        fn last_record_decides(seq in proptest::collection::vec((any::<i32>(), any::<bool>()), 1..50)) {
            let mut tracker = AlertTracker::new();
            for (i, (temp, crossed)) in seq.iter().enumerate() {
                tracker.observe(&rec(i as u64, *temp, *crossed));
            }
            let (last_temp, last_crossed) = *seq.last().unwrap();
            let expected = if last_crossed { AlertLevel::Alert } else { AlertLevel::Ok };
            prop_assert_eq!(tracker.current().level, expected);
            prop_assert_eq!(tracker.current().last_reading.unwrap().temp_mc, last_temp);
        }
    }
}
