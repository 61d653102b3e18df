//! IQ sample sources
//!
//! Every source is a blocking reader pumped on a dedicated thread into a
//! bounded channel of [`SampleChunk`]s. The channel holds a single chunk,
//! so a slow demodulator backpressures the reader instead of piling up
//! stale samples.

mod file;
mod rtlsdr;
mod tcp;

pub use file::FileSource;
pub use rtlsdr::RtlSdrSource;
pub use tcp::TcpSource;

use std::io::Read;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info};

use crate::demod::SampleChunk;

/// Default chunk size in bytes (128K IQ pairs).
pub const DEFAULT_BUFF_LEN: usize = 16 * 16384;

/// A producer of raw interleaved IQ bytes.
pub trait ChunkSource: Send + 'static {
    /// Human-readable description for startup logging.
    fn label(&self) -> String;

    /// Read IQ bytes until EOF or the receiver goes away, sending one
    /// [`SampleChunk`] per read.
    fn run(self: Box<Self>, buff_len: usize, tx: Sender<SampleChunk>) -> Result<()>;
}

/// Start `source` on its own thread and return the chunk receiver.
pub fn spawn_source(
    source: Box<dyn ChunkSource>,
    buff_len: usize,
) -> Result<Receiver<SampleChunk>> {
    let (tx, rx) = bounded::<SampleChunk>(1);
    let label = source.label();
    info!("starting IQ source: {} ({} byte chunks)", label, buff_len);

    thread::Builder::new()
        .name("iq-source".to_string())
        .spawn(move || match source.run(buff_len, tx) {
            Ok(()) => info!("IQ source finished: {}", label),
            Err(e) => error!("IQ source failed: {}: {:#}", label, e),
        })
        .context("failed to spawn IQ source thread")?;

    Ok(rx)
}

/// Shared read loop: pull up to `buff_len` bytes at a time from `reader`
/// and forward each chunk. Returns on EOF or when the receiver is dropped.
fn pump(mut reader: impl Read, buff_len: usize, tx: &Sender<SampleChunk>) -> Result<()> {
    loop {
        let mut buf = vec![0u8; buff_len];
        let n = reader.read(&mut buf).context("IQ read failed")?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(SampleChunk::new(buf, n)).is_err() {
            // Demodulator side hung up.
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pump_chunks_and_reports_lengths() {
        let data: Vec<u8> = (0..10u8).collect();
        let (tx, rx) = bounded::<SampleChunk>(1);

        let handle = thread::spawn(move || pump(Cursor::new(data), 4, &tx));

        let lens: Vec<usize> = rx.iter().map(|c| c.iq().len()).collect();
        assert_eq!(lens, vec![4, 4, 2]);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_pump_preserves_bytes() {
        let data = vec![1u8, 2, 3, 4, 5, 6];
        let (tx, rx) = bounded::<SampleChunk>(1);

        let handle = thread::spawn(move || pump(Cursor::new(data), 1024, &tx));

        let chunk = rx.recv().unwrap();
        assert_eq!(chunk.iq(), &[1, 2, 3, 4, 5, 6]);
        assert!(rx.recv().is_err());
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_pump_stops_when_receiver_drops() {
        let data = vec![0u8; 1 << 20];
        let (tx, rx) = bounded::<SampleChunk>(1);

        let handle = thread::spawn(move || pump(Cursor::new(data), 16, &tx));

        let _ = rx.recv().unwrap();
        drop(rx);
        handle.join().unwrap().unwrap();
    }
}
