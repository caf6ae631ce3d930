use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{trace, warn};

use crate::dns::DnsMessage;
use crate::error::{ForwarderError, Result};

/// Resolves a `host[:port]` spec (an IP literal or a hostname) to a
/// `SocketAddr`, defaulting the port when absent.
pub async fn resolve_upstream(spec: &str, default_port: u16) -> Result<SocketAddr> {
    let with_port = if spec.rsplit_once(':').is_some() {
        spec.to_string()
    } else {
        format!("{spec}:{default_port}")
    };

    tokio::net::lookup_host(&with_port)
        .await
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| ForwarderError::UpstreamUnreachable(spec.to_string()))
}

struct PendingTransaction {
    reply_tx: oneshot::Sender<DnsMessage>,
    generation: u64,
}

enum Command {
    Send {
        id: u16,
        encoded: Vec<u8>,
        target: SocketAddr,
        timeout: Duration,
        reply_tx: oneshot::Sender<DnsMessage>,
    },
    TransactionTimeout {
        id: u16,
        generation: u64,
    },
}

/// Owns one outbound UDP socket and multiplexes in-flight transactions.
///
/// A single actor task serializes both socket writes and the demux read
/// loop; callers submit `(message, done-channel)` requests and await either
/// the decoded reply or the request future failing (which the caller maps
/// to a timeout). This replaces a concurrent-map-plus-cancellation-token
/// design with one lineage of ownership per transaction.
#[derive(Clone)]
pub struct UpstreamExchange {
    command_tx: mpsc::Sender<Command>,
    listen_port: u16,
}

impl UpstreamExchange {
    pub async fn spawn(
        bind_addr: SocketAddr,
        listen_port: u16,
        shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let (command_tx, command_rx) = mpsc::channel(256);

        let actor_tx = command_tx.clone();
        tokio::spawn(Self::run(socket, command_rx, actor_tx, shutdown));

        Ok(Self {
            command_tx,
            listen_port,
        })
    }

    /// Sends `message` to `target`, returning the decoded upstream reply.
    ///
    /// If `target` is our own listener (loopback address, same port), fails
    /// synchronously with `InfiniteForwarding` and never touches the socket.
    /// On collision with an already in-flight transaction sharing the same
    /// 16-bit id, the existing transaction is cancelled (its caller sees its
    /// request future resolve to `Timeout`, never a cross-delivered reply).
    pub async fn send(
        &self,
        message: &DnsMessage,
        target: SocketAddr,
        timeout: Duration,
        mutate: bool,
    ) -> Result<DnsMessage> {
        if target.ip().is_loopback() && target.port() == self.listen_port {
            return Err(ForwarderError::InfiniteForwarding);
        }

        let encoded = if mutate {
            message.encode_mutated()
        } else {
            message.encode()
        };
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Send {
                id: message.header.id,
                encoded,
                target,
                timeout,
                reply_tx,
            })
            .await
            .map_err(|_| ForwarderError::Shutdown)?;

        reply_rx.await.map_err(|_| ForwarderError::Timeout)
    }

    async fn run(
        socket: Arc<UdpSocket>,
        mut commands: mpsc::Receiver<Command>,
        self_tx: mpsc::Sender<Command>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut pending: HashMap<u16, PendingTransaction> = HashMap::new();
        let mut recv_buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    break;
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Send { id, encoded, target, timeout, reply_tx }) => {
                            let generation = pending.get(&id).map_or(0, |t| t.generation + 1);
                            // Overwriting drops the old reply_tx, which cancels it.
                            pending.insert(id, PendingTransaction { reply_tx, generation });

                            if let Err(e) = socket.send_to(&encoded, target).await {
                                warn!(error = %e, "forwarder send failed");
                                pending.remove(&id);
                                continue;
                            }

                            let timeout_tx = self_tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(timeout).await;
                                let _ = timeout_tx.send(Command::TransactionTimeout { id, generation }).await;
                            });
                        }
                        Some(Command::TransactionTimeout { id, generation }) => {
                            if pending.get(&id).is_some_and(|t| t.generation == generation) {
                                warn!(txid = id, "upstream query timed out");
                                pending.remove(&id);
                            }
                        }
                        None => break,
                    }
                }
                received = socket.recv_from(&mut recv_buf) => {
                    match received {
                        Ok((n, _from)) if n >= 2 => {
                            let id = u16::from_be_bytes([recv_buf[0], recv_buf[1]]);
                            match pending.remove(&id) {
                                Some(transaction) => match DnsMessage::parse(&recv_buf[..n]) {
                                    Ok(msg) => {
                                        let _ = transaction.reply_tx.send(msg);
                                    }
                                    Err(e) => warn!(error = %e, "failed to parse upstream reply"),
                                },
                                None => trace!(txid = id, "reply for unknown or already-resolved transaction"),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "forwarder recv error"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Question, RecordClass, RecordType, ResourceRecord};
    use std::net::Ipv4Addr;

    async fn fake_upstream_echoing_a_record() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(query) = DnsMessage::parse(&buf[..n]) else {
                    continue;
                };
                let mut reply = query.reply(crate::dns::ResponseCode::NoError);
                reply.answers.push(ResourceRecord::new_a(
                    &reply.questions[0].name,
                    Ipv4Addr::new(5, 6, 7, 8),
                    60,
                ));
                let _ = socket.send_to(&reply.encode(), from).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn round_trip_through_fake_upstream() {
        let upstream = fake_upstream_echoing_a_record().await;
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let exchange = UpstreamExchange::spawn("127.0.0.1:0".parse().unwrap(), 53, shutdown_rx)
            .await
            .unwrap();

        let query = DnsMessage::new_query(
            42,
            Question::new("example.com", RecordType::A, RecordClass::In),
        );
        let reply = exchange
            .send(&query, upstream, Duration::from_secs(1), false)
            .await
            .unwrap();

        assert_eq!(reply.header.id, 42);
        assert_eq!(reply.answers.len(), 1);
    }

    #[tokio::test]
    async fn timeout_yields_timeout_error_with_no_reply() {
        // nothing listening on this address, so the request will never be answered
        let silent = "127.0.0.1:1".parse().unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let exchange = UpstreamExchange::spawn("127.0.0.1:0".parse().unwrap(), 53, shutdown_rx)
            .await
            .unwrap();

        let query = DnsMessage::new_query(
            7,
            Question::new("example.com", RecordType::A, RecordClass::In),
        );
        let result = exchange
            .send(&query, silent, Duration::from_millis(50), false)
            .await;
        assert!(matches!(result, Err(ForwarderError::Timeout)));
    }

    #[tokio::test]
    async fn infinite_forwarding_is_rejected_synchronously() {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let exchange = UpstreamExchange::spawn("127.0.0.1:0".parse().unwrap(), 53, shutdown_rx)
            .await
            .unwrap();

        let query = DnsMessage::new_query(
            1,
            Question::new("example.com", RecordType::A, RecordClass::In),
        );
        let result = exchange
            .send(
                &query,
                "127.0.0.1:53".parse().unwrap(),
                Duration::from_secs(1),
                false,
            )
            .await;
        assert!(matches!(result, Err(ForwarderError::InfiniteForwarding)));
    }
}
