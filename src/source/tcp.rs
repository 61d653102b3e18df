//! Raw IQ over TCP, for receivers that expose the sample stream on a
//! socket instead of a local device.

use std::net::TcpStream;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::info;

use super::ChunkSource;
use crate::demod::SampleChunk;

pub struct TcpSource {
    addr: String,
}

impl TcpSource {
    pub fn new(addr: String) -> Self {
        Self { addr }
    }
}

impl ChunkSource for TcpSource {
    fn label(&self) -> String {
        format!("tcp {}", self.addr)
    }

    fn run(self: Box<Self>, buff_len: usize, tx: Sender<SampleChunk>) -> Result<()> {
        let stream = TcpStream::connect(&self.addr)
            .with_context(|| format!("failed to connect to IQ server {}", self.addr))?;
        info!("connected to IQ server {}", self.addr);
        super::pump(stream, buff_len, &tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_streams_from_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&[1u8, 2, 3, 4]).unwrap();
        });

        let (tx, rx) = bounded(1);
        let source = Box::new(TcpSource::new(addr));
        let client = std::thread::spawn(move || source.run(1024, tx));

        let chunk = rx.recv().unwrap();
        assert_eq!(chunk.iq(), &[1, 2, 3, 4]);
        assert!(rx.recv().is_err());

        server.join().unwrap();
        client.join().unwrap().unwrap();
    }

    #[test]
    fn test_refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (tx, _rx) = bounded(1);
        let source = Box::new(TcpSource::new(addr));
        assert!(source.run(1024, tx).is_err());
    }
}
