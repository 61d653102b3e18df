//! Mode S demodulation pipeline
//!
//! dump1090-style decoding of a 2 MSPS IQ stream:
//! 1. Convert interleaved IQ bytes to magnitude via a lookup table
//! 2. Slide over the magnitude vector looking for the 8 µs preamble
//! 3. Slice 2 samples per bit into a 56/112-bit frame
//! 4. Validate the Mode S checksum, correcting bounded bit errors
//! 5. Emit decoded messages carrying the chunk receipt timestamp

mod crc;
mod detect;
mod icao;
mod mag;

pub use detect::{DemodStats, Demodulator};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Preamble length in microseconds.
pub const PREAMBLE_US: usize = 8;
/// Samples per microsecond at 2 MSPS.
pub const SAMPLES_PER_US: usize = 2;
pub const LONG_MSG_BITS: usize = 112;
pub const SHORT_MSG_BITS: usize = 56;
/// Samples spanned by a preamble plus the longest message.
pub const FULL_SAMPLES: usize = (PREAMBLE_US + LONG_MSG_BITS) * SAMPLES_PER_US;

/// Chunk-level demodulation failures. These stop the pipeline; everything
/// below chunk granularity (bad preambles, failed checksums) is silently
/// skipped by the scanner instead.
#[derive(Debug, Error)]
pub enum DemodError {
    #[error("IQ chunk is empty")]
    EmptyChunk,
    #[error("IQ chunk length {0} is odd, expected interleaved I/Q pairs")]
    OddChunk(usize),
}

/// One buffer of raw interleaved IQ samples plus its receipt time.
///
/// Bytes are offset-binary around 127, ordered `[I0, Q0, I1, Q1, ...]`.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    data: Vec<u8>,
    len: usize,
    pub received_at: DateTime<Utc>,
}

impl SampleChunk {
    /// `len` may be shorter than the buffer when a read came up short.
    pub fn new(data: Vec<u8>, len: usize) -> Self {
        Self {
            data,
            len,
            received_at: Utc::now(),
        }
    }

    /// The valid interleaved I/Q bytes.
    pub fn iq(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// A checksum-validated Mode S frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw payload: 7 bytes (56-bit) or 14 bytes (112-bit).
    pub data: Vec<u8>,
    /// Downlink format, top 5 bits of byte 0.
    pub df: u8,
    /// 24-bit ICAO address, present only for formats that carry it
    /// directly (DF 11/17).
    pub icao: Option<u32>,
    /// Receipt time of the chunk this frame was decoded from.
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}
