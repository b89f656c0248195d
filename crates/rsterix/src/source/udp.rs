/**
 * UDP datagram source.
 *
 * One task owns the socket for its whole life; reads are bounded by a
 * short timeout so that a shutdown signal is honoured within one timeout
 * period, whatever the traffic. Each datagram is handed on whole — the
 * payload framing is ASTERIX's own CAT/LEN structure, there is nothing
 * to reassemble at this layer.
 */
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures_util::pin_mut;
use futures_util::stream::{Stream, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Largest UDP payload we accept (65 535 − 8 − 20).
pub const MAX_DATAGRAM: usize = 65_507;

/// One received datagram, stamped on arrival.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub received: DateTime<Utc>,
    pub peer: SocketAddr,
}

/// Ingest counters, shared with the pipeline statistics endpoint.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub datagrams: AtomicU64,
    pub bytes: AtomicU64,
    pub receive_errors: AtomicU64,
}

/// Turn a bound socket into a stream of datagrams. The stream ends when
/// the shutdown flag flips.
pub fn datagrams(
    socket: UdpSocket,
    mut shutdown: watch::Receiver<bool>,
    timeout: Duration,
    stats: Arc<IngestStats>,
) -> impl Stream<Item = Datagram> {
    stream! {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            if *shutdown.borrow() {
                break;
            }
            match tokio::time::timeout(timeout, socket.recv_from(&mut buffer)).await {
                Ok(Ok((len, peer))) => {
                    stats.datagrams.fetch_add(1, Ordering::Relaxed);
                    stats.bytes.fetch_add(len as u64, Ordering::Relaxed);
                    yield Datagram {
                        data: buffer[..len].to_vec(),
                        received: Utc::now(),
                        peer,
                    };
                }
                Ok(Err(e)) => {
                    stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                    error!("error reading from socket: {e}");
                }
                // timeout: loop around and re-check the shutdown flag
                Err(_) => {}
            }
            if shutdown.has_changed().unwrap_or(false) && *shutdown.borrow_and_update() {
                break;
            }
        }
        debug!("ingest stream closed");
    }
}

/// Bind the socket and forward datagrams into the bounded plot queue
/// until shutdown. Backpressure from a full queue blocks this task, and
/// therefore the socket reads.
pub async fn receiver(
    address: &str,
    tx: mpsc::Sender<Datagram>,
    shutdown: watch::Receiver<bool>,
    timeout: Duration,
    stats: Arc<IngestStats>,
) -> io::Result<()> {
    let socket = UdpSocket::bind(address).await?;
    info!("listening for ASTERIX on udp://{address}");

    let datagram_stream = datagrams(socket, shutdown, timeout, stats);
    pin_mut!(datagram_stream);
    while let Some(datagram) = datagram_stream.next().await {
        if tx.send(datagram).await.is_err() {
            // consumer is gone, nothing left to feed
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagram_is_received_and_counted() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(IngestStats::default());

        let stream = datagrams(
            socket,
            shutdown_rx,
            Duration::from_millis(100),
            stats.clone(),
        );
        pin_mut!(stream);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[0x30, 0x00, 0x03], address).await.unwrap();

        let datagram = stream.next().await.unwrap();
        assert_eq!(datagram.data, vec![0x30, 0x00, 0x03]);
        assert_eq!(stats.datagrams.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream_within_one_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(IngestStats::default());

        let stream = datagrams(
            socket,
            shutdown_rx,
            Duration::from_millis(50),
            stats,
        );
        pin_mut!(stream);

        shutdown_tx.send(true).unwrap();
        let next = tokio::time::timeout(Duration::from_millis(500), stream.next()).await;
        assert!(matches!(next, Ok(None)));
    }
}
