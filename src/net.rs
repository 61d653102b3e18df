//! Raw message output over TCP
//!
//! Every decoded frame is fanned out to all connected clients in AVR
//! framing: `*<hex>;` terminated by a newline, the format readers like
//! the SBS tools expect on port 30001-style feeds. Clients that fall
//! behind the broadcast buffer miss messages rather than stalling the
//! pipeline.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::demod::Message;

/// One decoded frame in AVR wire framing.
pub fn avr_frame(msg: &Message) -> String {
    format!("*{};\n", msg.to_hex())
}

/// Bind `addr` and serve decoded messages to every client that connects.
pub async fn serve(addr: &str, tx: broadcast::Sender<Message>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind message output on {addr}"))?;
    info!("raw message output listening on {}", addr);
    accept_loop(listener, tx).await
}

async fn accept_loop(listener: TcpListener, tx: broadcast::Sender<Message>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed to accept message client")?;
        info!("message client connected: {}", peer);

        let rx = tx.subscribe();
        tokio::spawn(async move {
            serve_client(stream, rx).await;
            info!("message client disconnected: {}", peer);
        });
    }
}

async fn serve_client(mut stream: TcpStream, mut rx: broadcast::Receiver<Message>) {
    // Clients never send anything meaningful; the drain read exists to
    // notice a disconnect even when no messages are flowing.
    let mut drain = [0u8; 64];
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(msg) => {
                    if let Err(e) = stream.write_all(avr_frame(&msg).as_bytes()).await {
                        debug!("client write failed: {}", e);
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("slow message client skipped {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            read = stream.read(&mut drain) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn sample_message() -> Message {
        Message {
            data: hex::decode("8d4840d6202cc371c32ce0576098").unwrap(),
            df: 17,
            icao: Some(0x4840d6),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_avr_framing() {
        let msg = sample_message();
        assert_eq!(avr_frame(&msg), "*8d4840d6202cc371c32ce0576098;\n");
    }

    #[test]
    fn test_avr_framing_short_frame() {
        let msg = Message {
            data: vec![0x5d, 0x48, 0x40, 0xd6, 0x01, 0x02, 0x03],
            df: 11,
            icao: Some(0x4840d6),
            received_at: Utc::now(),
        };
        assert_eq!(avr_frame(&msg), "*5d4840d6010203;\n");
    }

    #[tokio::test]
    async fn test_idle_disconnect_drops_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = broadcast::channel::<Message>(16);

        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        let handle = tokio::spawn(serve_client(server_side, rx));

        // Hang up without ever receiving a message; the handler must
        // notice and finish on its own.
        drop(client);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("handler did not notice the disconnect")
            .unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_clients_receive_broadcast_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _keepalive) = broadcast::channel(16);
        tokio::spawn(accept_loop(listener, tx.clone()));

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Let the acceptor subscribe the client before publishing.
        tokio::time::sleep(Duration::from_millis(100)).await;

        tx.send(sample_message()).unwrap();

        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"*8d4840d6202cc371c32ce0576098;\n");
    }
}
