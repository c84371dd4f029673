//! Codec do registro binário emitido por `/dev/simtemp`.
//!
//! Formato do registro (little-endian, sem padding):
//!
//! ```text
//! ┌──────────────────┬─────────────┬───────────┐
//! │ timestamp_ns (8) │ temp_mC (4) │ flags (4) │
//! └──────────────────┴─────────────┴───────────┘
//! ```
//!
//! - `timestamp_ns`: nanossegundos desde a época, não-decrescente no stream
//! - `temp_mC`: mili-graus Celsius (com sinal)
//! - `flags`: bit 0 = amostra nova, bit 1 = threshold cruzado
//!
//! O bincode 1.x (codificação legada de inteiros fixos) produz exatamente
//! esse layout para [`Record`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Tamanho fixo de um registro no fio.
pub const RECORD_SIZE: usize = 16;

/// Bit 0: sempre presente em um registro válido.
pub const FLAG_NEW_SAMPLE: u32 = 1 << 0;

/// Bit 1: o driver comparou a amostra com o threshold e ela o cruzou.
pub const FLAG_THRESHOLD_CROSSED: u32 = 1 << 1;

/// Erros do codec.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Leitura curta ({0} bytes, esperado {RECORD_SIZE})")]
    ShortRead(usize),

    #[error("Registro malformado: {0}")]
    Malformed(String),
}

/// Um registro de telemetria decodificado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub timestamp_ns: u64,
    pub temp_mc: i32,
    pub flags: u32,
}

impl Record {
    pub fn new(timestamp_ns: u64, temp_mc: i32, flags: u32) -> Self {
        Self {
            timestamp_ns,
            temp_mc,
            flags,
        }
    }

    pub fn is_new_sample(&self) -> bool {
        self.flags & FLAG_NEW_SAMPLE != 0
    }

    pub fn threshold_crossed(&self) -> bool {
        self.flags & FLAG_THRESHOLD_CROSSED != 0
    }

    /// Temperatura em °C.
    pub fn temperature_celsius(&self) -> f64 {
        f64::from(self.temp_mc) / 1000.0
    }

    /// Instante UTC absoluto do timestamp.
    pub fn utc(&self) -> DateTime<Utc> {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nanos = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }

    /// Timestamp em ISO-8601 com milissegundos (`2025-10-01T12:00:00.200+00:00`).
    pub fn utc_iso(&self) -> String {
        self.utc().to_rfc3339_opts(SecondsFormat::Millis, false)
    }
}

/// Formata mili-graus como `25.400` (parte inteira e três casas decimais),
/// sem passar por ponto flutuante.
pub fn format_millis(value_mc: i32) -> String {
    let sign = if value_mc < 0 { "-" } else { "" };
    let abs = value_mc.unsigned_abs();
    format!("{sign}{}.{:03}", abs / 1000, abs % 1000)
}

/// Codifica um [`Record`] no layout do driver.
///
/// Usado apenas para montar expectativas em testes e simulações; o tráfego
/// real só vai do driver para o cliente.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, ProtocolError> {
    let bytes =
        bincode::serialize(record).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    debug_assert_eq!(bytes.len(), RECORD_SIZE);
    Ok(bytes)
}

/// Decodifica exatamente um registro.
///
/// Qualquer comprimento diferente de [`RECORD_SIZE`] falha com
/// [`ProtocolError::ShortRead`] sem resultado parcial.
pub fn decode_record(data: &[u8]) -> Result<Record, ProtocolError> {
    if data.len() != RECORD_SIZE {
        return Err(ProtocolError::ShortRead(data.len()));
    }
    bincode::deserialize(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
