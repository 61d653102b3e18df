//! Mode S / ADS-B capture and demodulation
//!
//! Reads raw 2 MSPS IQ samples from an RTL-SDR (or a file or TCP replay),
//! demodulates Mode S frames with a dump1090-style decoder, prints them,
//! and serves them to TCP clients in AVR framing.

mod demod;
mod net;
mod source;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use demod::{Demodulator, Message, SampleChunk};
use source::{ChunkSource, FileSource, RtlSdrSource, TcpSource, DEFAULT_BUFF_LEN};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "modes-capture", version, about = "Mode S / ADS-B demodulator")]
struct Cli {
    /// Replay IQ samples from a recorded file instead of a live device
    #[arg(long)]
    ifile: Option<PathBuf>,

    /// Read IQ samples from a raw sample server (host:port)
    #[arg(long, conflicts_with = "ifile")]
    tcp_iq_server: Option<String>,

    /// Address to serve decoded messages on, AVR framing
    #[arg(long, default_value = "localhost:30001")]
    net_msg_addr: String,

    /// IQ chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_BUFF_LEN)]
    iq_buff_len: usize,

    /// RTL-SDR device index
    #[arg(long, default_value_t = 0)]
    device: u32,

    /// Path to the rtl_sdr executable
    #[arg(long, default_value = "rtl_sdr")]
    rtl_sdr_path: String,
}

impl Cli {
    fn source(&self) -> Box<dyn ChunkSource> {
        if let Some(path) = &self.ifile {
            Box::new(FileSource::new(path.clone()))
        } else if let Some(addr) = &self.tcp_iq_server {
            Box::new(TcpSource::new(addr.clone()))
        } else {
            Box::new(RtlSdrSource::new(self.device, self.rtl_sdr_path.clone()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    info!("===========================================");
    info!("  Mode S capture, 1090 MHz @ 2 MSPS");
    info!("===========================================");

    let chunk_rx = source::spawn_source(cli.source(), cli.iq_buff_len)?;
    let msg_rx = spawn_demod(chunk_rx)?;

    let (bcast_tx, _) = broadcast::channel::<Message>(64);
    let net_addr = cli.net_msg_addr.clone();
    let net_tx = bcast_tx.clone();
    let net_handle = tokio::spawn(async move {
        if let Err(e) = net::serve(&net_addr, net_tx).await {
            error!("message server failed: {:#}", e);
        }
    });

    loop {
        match msg_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(msg) => {
                let icao = msg
                    .icao
                    .map(|a| format!(" icao={:06x}", a))
                    .unwrap_or_default();
                // Age of the chunk this frame came from, a rough pipeline
                // latency indicator.
                let age_ms = (Utc::now() - msg.received_at).num_milliseconds();
                info!("DF{:02}{} *{}; +{}ms", msg.df, icao, msg.to_hex(), age_ms);

                // No listeners is fine; frames are still printed.
                let _ = bcast_tx.send(msg);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("demodulator finished, shutting down");
                break;
            }
        }
    }

    net_handle.abort();
    Ok(())
}

/// Run the demodulator on its own thread, one chunk at a time, with
/// periodic stats logging.
fn spawn_demod(chunk_rx: Receiver<SampleChunk>) -> Result<Receiver<Message>> {
    let (msg_tx, msg_rx) = bounded::<Message>(1);

    thread::Builder::new()
        .name("demod".to_string())
        .spawn(move || {
            let mut demod = Demodulator::new();
            let mut last_stats = Instant::now();

            for chunk in chunk_rx.iter() {
                let messages = match demod.process_chunk(&chunk) {
                    Ok(messages) => messages,
                    Err(e) => {
                        // A malformed chunk means the source is broken;
                        // stop the pipeline rather than resync mid-stream.
                        error!("malformed IQ chunk, stopping demodulation: {}", e);
                        return;
                    }
                };

                for msg in messages {
                    if msg_tx.send(msg).is_err() {
                        return;
                    }
                }

                if last_stats.elapsed() >= STATS_INTERVAL {
                    let s = &demod.stats;
                    info!(
                        "[demod] chunks={} samples={} preambles={} decoded={} (long={} short={}) \
                         fixed={}+{} ap={} weak={} cached_icao={}",
                        s.chunks,
                        s.samples,
                        s.preambles,
                        s.decoded,
                        s.long_frames,
                        s.short_frames,
                        s.single_bit_fixed,
                        s.two_bit_fixed,
                        s.ap_recovered,
                        s.weak_discarded,
                        demod.icao_cache_len()
                    );
                    last_stats = Instant::now();
                }
            }
        })
        .context("failed to spawn demod thread")?;

    Ok(msg_rx)
}
