//! Live capture via an rtl_sdr child process
//!
//! Spawns `rtl_sdr -d <device> -f 1090000000 -s 2000000 -` and pumps its
//! stdout. The tool's own chatter on stderr is forwarded to the log.

use std::io::BufRead;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::info;

use super::ChunkSource;
use crate::demod::SampleChunk;

/// 1090 MHz, the Mode S downlink frequency.
const CENTER_FREQ: u32 = 1_090_000_000;
/// 2 MSPS, required by the demodulator's bit timing.
const SAMPLE_RATE: u32 = 2_000_000;

pub struct RtlSdrSource {
    device_index: u32,
    rtl_sdr_path: String,
}

impl RtlSdrSource {
    pub fn new(device_index: u32, rtl_sdr_path: String) -> Self {
        Self {
            device_index,
            rtl_sdr_path,
        }
    }
}

impl ChunkSource for RtlSdrSource {
    fn label(&self) -> String {
        format!("rtl_sdr device {}", self.device_index)
    }

    fn run(self: Box<Self>, buff_len: usize, tx: Sender<SampleChunk>) -> Result<()> {
        let mut cmd = Command::new(&self.rtl_sdr_path);
        cmd.arg("-d")
            .arg(self.device_index.to_string())
            .arg("-f")
            .arg(CENTER_FREQ.to_string())
            .arg("-s")
            .arg(SAMPLE_RATE.to_string())
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!("executing: {:?}", cmd);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {}, is rtl-sdr installed?",
                self.rtl_sdr_path
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .context("failed to capture rtl_sdr stdout")?;

        if let Some(stderr) = child.stderr.take() {
            thread::Builder::new()
                .name("rtl-sdr-stderr".to_string())
                .spawn(move || {
                    let reader = std::io::BufReader::new(stderr);
                    for line in reader.lines().map_while(Result::ok) {
                        if !line.trim().is_empty() {
                            info!("[rtl_sdr] {}", line.trim());
                        }
                    }
                })
                .context("failed to spawn rtl_sdr stderr thread")?;
        }

        let result = super::pump(stdout, buff_len, &tx);
        let _ = child.kill();
        let _ = child.wait();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_missing_binary_is_an_error() {
        let (tx, _rx) = bounded(1);
        let source = Box::new(RtlSdrSource::new(0, "/nonexistent/rtl_sdr".to_string()));
        assert!(source.run(1024, tx).is_err());
    }
}
