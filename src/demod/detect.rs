//! Preamble detection, bit slicing, and the per-chunk scan loop
//!
//! Mode S preamble at 2 MSPS (0.5 µs per sample): pulses at 0, 1, 3.5 and
//! 4.5 µs land on samples 0, 2, 7 and 9, with everything between them and
//! the 3 µs guard before the data low. Data bits are pulse-position
//! modulated, 2 samples per bit: high-low is 1, low-high is 0.
//!
//! The scanner slides one sample at a time. A position whose preamble
//! matched but whose frame failed validation gets exactly one second
//! attempt with phase correction applied before the scan moves on.

use tracing::trace;

use super::crc;
use super::icao::IcaoCache;
use super::mag;
use super::{
    DemodError, Message, SampleChunk, FULL_SAMPLES, LONG_MSG_BITS, PREAMBLE_US, SAMPLES_PER_US,
    SHORT_MSG_BITS,
};

const PREAMBLE_SAMPLES: usize = PREAMBLE_US * SAMPLES_PER_US;
const DATA_SAMPLES: usize = LONG_MSG_BITS * SAMPLES_PER_US;

/// Slicer marker for an unreadable bit (both samples equal).
const BIT_AMBIGUOUS: u8 = 2;

/// Slicer hysteresis: transitions weaker than this repeat the previous bit.
const WEAK_TRANSITION: i32 = 256;

/// Minimum mean magnitude swing over the data region. Candidates below this
/// are noise even if the checksum happens to pass; they are dropped without
/// a phase-corrected retry.
const MIN_SIGNAL_DELTA: i32 = 10 * 255;

/// Scan loop state at the current sample index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// Test the preamble correlation pattern, then slice.
    Normal,
    /// Preamble already matched here but the frame failed: re-slice the
    /// same position with phase correction, trusting the prior detection.
    Retry,
}

/// Running counters, logged periodically by the demod thread.
#[derive(Debug, Default)]
pub struct DemodStats {
    pub chunks: u64,
    pub samples: u64,
    pub preambles: u64,
    pub decoded: u64,
    pub short_frames: u64,
    pub long_frames: u64,
    pub single_bit_fixed: u64,
    pub two_bit_fixed: u64,
    pub ap_recovered: u64,
    pub weak_discarded: u64,
}

/// Mode S demodulator. Owns the ICAO cache and the per-candidate scratch
/// buffers; processes one chunk at a time.
pub struct Demodulator {
    icao_cache: IcaoCache,
    bits: [u8; LONG_MSG_BITS],
    /// Holds the original data-region samples while a phase-corrected
    /// attempt mutates the magnitude vector; restored after slicing.
    scratch: [u16; DATA_SAMPLES],
    pub stats: DemodStats,
}

impl Demodulator {
    pub fn new() -> Self {
        Self {
            icao_cache: IcaoCache::new(),
            bits: [0; LONG_MSG_BITS],
            scratch: [0; DATA_SAMPLES],
            stats: DemodStats::default(),
        }
    }

    /// Demodulate every Mode S frame in `chunk`, in preamble-offset order.
    pub fn process_chunk(&mut self, chunk: &SampleChunk) -> Result<Vec<Message>, DemodError> {
        let mut magnitudes = mag::magnitude_vector(chunk.iq())?;
        let messages = self.scan(&mut magnitudes, chunk);
        self.stats.chunks += 1;
        self.stats.samples += magnitudes.len() as u64;
        Ok(messages)
    }

    /// Mode A/C pulse-position decoding.
    // TODO: implement classic transponder pulse-position decoding.
    #[allow(dead_code)]
    pub fn detect_mode_ac(&mut self, _chunk: &SampleChunk) {}

    pub fn icao_cache_len(&self) -> usize {
        self.icao_cache.len()
    }

    fn scan(&mut self, mag: &mut [u16], chunk: &SampleChunk) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut mode = ScanMode::Normal;
        let mut j = 0usize;

        while j + FULL_SAMPLES < mag.len() {
            match mode {
                ScanMode::Normal => {
                    if !preamble_at(mag, j) {
                        j += 1;
                        continue;
                    }
                    self.stats.preambles += 1;
                }
                ScanMode::Retry => {
                    self.scratch
                        .copy_from_slice(&mag[j + PREAMBLE_SAMPLES..j + FULL_SAMPLES]);
                    if j > 0 && detect_out_of_phase(mag, j) > 0 {
                        apply_phase_correction(mag, j);
                    }
                }
            }

            let errors = self.slice_bits(mag, j);

            if mode == ScanMode::Retry {
                mag[j + PREAMBLE_SAMPLES..j + FULL_SAMPLES].copy_from_slice(&self.scratch);
            }

            let mut msg = [0u8; LONG_MSG_BITS / 8];
            for (i, byte) in msg.iter_mut().enumerate() {
                let b = &self.bits[i * 8..i * 8 + 8];
                *byte = b[0] << 7
                    | b[1] << 6
                    | b[2] << 5
                    | b[3] << 4
                    | b[4] << 3
                    | b[5] << 2
                    | b[6] << 1
                    | b[7];
            }

            let df = msg[0] >> 3;
            let bits = crc::message_bits(df);

            if signal_delta(mag, j, bits) < MIN_SIGNAL_DELTA {
                self.stats.weak_discarded += 1;
                mode = ScanMode::Normal;
                j += 1;
                continue;
            }

            if errors == 0 {
                if let Some(message) = self.validate(&msg[..bits / 8], df, bits, chunk) {
                    trace!("decoded DF{} at sample {}: {}", df, j, message.to_hex());
                    self.stats.decoded += 1;
                    if bits == LONG_MSG_BITS {
                        self.stats.long_frames += 1;
                    } else {
                        self.stats.short_frames += 1;
                    }
                    messages.push(message);

                    // Skip past the consumed frame.
                    j += (PREAMBLE_US + bits) * SAMPLES_PER_US + 1;
                    mode = ScanMode::Normal;
                    continue;
                }
            }

            match mode {
                // Revisit this position once with phase correction.
                ScanMode::Normal => mode = ScanMode::Retry,
                ScanMode::Retry => {
                    mode = ScanMode::Normal;
                    j += 1;
                }
            }
        }

        messages
    }

    /// Classify 112 bits at 2 samples per bit. Returns the count of
    /// ambiguous bits within the first 56, which is enough to reject a
    /// candidate of either length.
    fn slice_bits(&mut self, mag: &[u16], j: usize) -> usize {
        let data = &mag[j + PREAMBLE_SAMPLES..];
        let mut errors = 0;

        for i in 0..LONG_MSG_BITS {
            let low = data[2 * i] as i32;
            let high = data[2 * i + 1] as i32;
            let delta = (low - high).abs();

            self.bits[i] = if i > 0 && delta < WEAK_TRANSITION {
                self.bits[i - 1]
            } else if low == high {
                if i < SHORT_MSG_BITS {
                    errors += 1;
                }
                BIT_AMBIGUOUS
            } else if low > high {
                1
            } else {
                0
            };
        }

        errors
    }

    /// Checksum the candidate, attempting the repair path its format
    /// allows. Returns the message on any successful validation.
    fn validate(
        &mut self,
        payload: &[u8],
        df: u8,
        bits: usize,
        chunk: &SampleChunk,
    ) -> Option<Message> {
        let mut msg = payload.to_vec();
        let mut valid = crc::is_valid(&msg, bits);

        if !valid && crc::is_adsb(df) {
            if crc::fix_single_bit(&mut msg, bits).is_some() {
                valid = true;
                self.stats.single_bit_fixed += 1;
            } else if crc::fix_two_bits(&mut msg, bits).is_some() {
                valid = true;
                self.stats.two_bit_fixed += 1;
            }
        }

        if !valid && crc::is_downlink_request(df) {
            let addr = crc::recover_ap_address(&msg, bits);
            if self.icao_cache.contains(addr) {
                valid = true;
                self.stats.ap_recovered += 1;
            }
        }

        if !valid {
            return None;
        }

        let mut icao = None;
        if crc::is_adsb(df) {
            let addr = (msg[1] as u32) << 16 | (msg[2] as u32) << 8 | msg[3] as u32;
            self.icao_cache.insert(addr);
            icao = Some(addr);
        }

        Some(Message {
            data: msg,
            df,
            icao,
            received_at: chunk.received_at,
        })
    }
}

impl Default for Demodulator {
    fn default() -> Self {
        Self::new()
    }
}

/// 10-sample preamble correlation: peaks at 0, 2, 7, 9 with troughs
/// between, then a quiet guard before the first data bit.
fn preamble_at(mag: &[u16], j: usize) -> bool {
    if !(mag[j] > mag[j + 1]
        && mag[j + 1] < mag[j + 2]
        && mag[j + 2] > mag[j + 3]
        && mag[j + 3] < mag[j]
        && mag[j + 4] < mag[j]
        && mag[j + 5] < mag[j]
        && mag[j + 6] < mag[j]
        && mag[j + 7] > mag[j + 8]
        && mag[j + 8] < mag[j + 9]
        && mag[j + 9] > mag[j + 6])
    {
        return false;
    }

    // Noise reference derived from the four pulse peaks.
    let high =
        ((mag[j] as u32 + mag[j + 2] as u32 + mag[j + 7] as u32 + mag[j + 9] as u32) / 6) as u16;

    // The gap between the two pulse pairs must stay low...
    if mag[j + 4] >= high || mag[j + 5] >= high {
        return false;
    }

    // ...and so must the guard period before the data starts.
    mag[j + 11] < high && mag[j + 12] < high && mag[j + 13] < high && mag[j + 14] < high
}

/// Sign of the local-oscillator phase skew at a detected preamble, judged
/// from sample ratios around the pulse edges: +1 late arrival, -1 early,
/// 0 aligned. Callers must guarantee `j > 0`.
fn detect_out_of_phase(mag: &[u16], j: usize) -> i32 {
    if mag[j + 3] > mag[j + 2] / 3 {
        return 1;
    }
    if mag[j + 10] > mag[j + 9] / 3 {
        return 1;
    }
    if mag[j + 6] > mag[j + 7] / 3 {
        return -1;
    }
    if mag[j - 1] > mag[j + 1] / 3 {
        return -1;
    }
    0
}

/// Undo a late-arrival skew across the data region: the sample after a bit
/// that read high-low is boosted by 5/4, after low-high damped by 4/5.
fn apply_phase_correction(mag: &mut [u16], j: usize) {
    let mut i = PREAMBLE_SAMPLES;
    while i < (LONG_MSG_BITS - 1) * SAMPLES_PER_US {
        let scaled = if mag[j + i] > mag[j + i + 1] {
            mag[j + i + 2] as u32 * 5 / 4
        } else {
            mag[j + i + 2] as u32 * 4 / 5
        };
        mag[j + i + 2] = scaled.min(u16::MAX as u32) as u16;
        i += SAMPLES_PER_US;
    }
}

/// Mean absolute magnitude swing over the message's data region.
fn signal_delta(mag: &[u16], j: usize, bits: usize) -> i32 {
    let data = &mag[j + PREAMBLE_SAMPLES..];
    let mut delta = 0i32;
    for i in 0..bits {
        delta += (data[2 * i] as i32 - data[2 * i + 1] as i32).abs();
    }
    delta / (bits as i32 / 2)
}
