use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::acl::Acl;
use crate::cache::ResponseCache;
use crate::dns::{DnsMessage, Question, RecordType, ResourceRecord, ResponseCode};
use crate::error::ForwarderError;
use crate::http_resolver::HttpResolver;
use crate::rules::{Defaults, RuleAction, RuleList};
use crate::upstream::{UpstreamExchange, resolve_upstream};

const SYNTHETIC_TTL: u32 = 600;

/// Owns one listening UDP endpoint and drives the per-query pipeline:
/// parse → ACL → cache lookup → rule engine → dispatch → reply → cache
/// insert. Shares `cache` and `rules` with its sibling Agents via the
/// Supervisor; owns its own forwarder socket (`exchange`) exclusively.
pub struct Agent {
    listen_socket: Arc<UdpSocket>,
    listen_port: u16,
    cache: Arc<ResponseCache>,
    rules: Arc<RwLock<Arc<RuleList>>>,
    acl: Arc<Acl>,
    exchange: UpstreamExchange,
    http_resolver: Arc<HttpResolver>,
    defaults: Defaults,
    cache_response: bool,
    cache_age: u32,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        listen_addr: SocketAddr,
        cache: Arc<ResponseCache>,
        rules: Arc<RwLock<Arc<RuleList>>>,
        acl: Arc<Acl>,
        http_resolver: Arc<HttpResolver>,
        defaults: Defaults,
        cache_response: bool,
        cache_age: u32,
        shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<Self> {
        let listen_socket = Arc::new(UdpSocket::bind(listen_addr).await?);
        let listen_port = listen_socket.local_addr()?.port();
        info!(addr = %listen_addr, "agent listening");

        let exchange =
            UpstreamExchange::spawn("0.0.0.0:0".parse().unwrap(), listen_port, shutdown).await?;

        Ok(Self {
            listen_socket,
            listen_port,
            cache,
            rules,
            acl,
            exchange,
            http_resolver,
            defaults,
            cache_response,
            cache_age,
        })
    }

    /// The address this agent is actually listening on (useful when bound
    /// to an ephemeral port).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listen_socket.local_addr()
    }

    /// Runs the receive loop until `shutdown` fires. Each datagram is
    /// handled on its own spawned task so one slow upstream never blocks
    /// other in-flight queries.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(port = self.listen_port, "agent shutting down");
                    break;
                }
                received = self.listen_socket.recv_from(&mut buf) => {
                    match received {
                        Ok((n, client_addr)) => {
                            let data = buf[..n].to_vec();
                            let agent = Arc::clone(&self);
                            tokio::spawn(async move {
                                agent.handle_datagram(data, client_addr).await;
                            });
                        }
                        Err(e) => warn!(error = %e, "listener recv error"),
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, data: Vec<u8>, client_addr: SocketAddr) {
        let message = match DnsMessage::parse(&data) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, client = %client_addr, "dropping unparsable query");
                return;
            }
        };

        let question = message.questions[0].clone();
        info!(
            client = %client_addr.ip(),
            qname = %question.name,
            txid = message.header.id,
            qtype = ?question.qtype,
            "query received"
        );

        if !self.acl.allows(client_addr.ip()) {
            warn!(client = %client_addr.ip(), "client not in networkWhitelist");
            let refusal = message.reply(ResponseCode::Refused);
            self.send_reply(&refusal, client_addr).await;
            return;
        }

        if self.cache_response {
            if let Some(mut cached) = self.cache.lookup(&question) {
                cached.header.id = message.header.id;
                cached.tsig = message.tsig.clone();
                info!(txid = message.header.id, "served from cache");
                self.send_reply(&cached, client_addr).await;
                return;
            }
        }

        let outcome = if question.qtype.is_a_or_aaaa() {
            let rules = Arc::clone(&self.rules.read());
            rules.resolve(&question, &self.defaults)
        } else {
            self.defaults.passthrough_outcome(&question)
        };

        let reply = match &outcome.action {
            RuleAction::Synthesize(ip) => Some(self.synthesize(&message, &question, *ip)),
            RuleAction::Redirect(name) if outcome.use_http && outcome.effective_type == RecordType::A => {
                self.resolve_via_http(&message, &question, name, &outcome)
                    .await
            }
            RuleAction::Redirect(name) => {
                self.resolve_via_upstream(&message, &question, name, &outcome)
                    .await
            }
            RuleAction::Passthrough if outcome.use_http && outcome.effective_type == RecordType::A => {
                self.resolve_via_http(&message, &question, &question.name, &outcome)
                    .await
            }
            RuleAction::Passthrough => {
                self.resolve_via_upstream(&message, &question, &question.name, &outcome)
                    .await
            }
        };

        if let Some(reply) = reply {
            self.send_reply(&reply, client_addr).await;
            if self.cache_response {
                self.cache.insert(&question, reply, self.cache_age);
            }
        }
    }

    fn synthesize(&self, original: &DnsMessage, question: &Question, ip: std::net::IpAddr) -> DnsMessage {
        let mut reply = original.reply(ResponseCode::NoError);
        let record = match ip {
            std::net::IpAddr::V4(v4) => ResourceRecord::new_a(&question.name, v4, SYNTHETIC_TTL),
            std::net::IpAddr::V6(v6) => ResourceRecord::new_aaaa(&question.name, v6, SYNTHETIC_TTL),
        };
        reply.answers.push(record);
        reply
    }

    async fn resolve_via_http(
        &self,
        original: &DnsMessage,
        question: &Question,
        lookup_name: &str,
        outcome: &crate::rules::RuleOutcome,
    ) -> Option<DnsMessage> {
        match self
            .http_resolver
            .resolve_a(&outcome.upstream, lookup_name, outcome.timeout)
            .await
        {
            Ok(mut records) => {
                for r in &mut records {
                    r.name = question.name.clone();
                }
                let response_code = if records.is_empty() {
                    ResponseCode::NameError
                } else {
                    ResponseCode::NoError
                };
                let mut reply = original.reply(response_code);
                reply.answers = records;
                Some(reply)
            }
            Err(e) => {
                warn!(error = %e, qname = %question.name, "http resolver failed");
                Some(original.reply(ResponseCode::ServerFailure))
            }
        }
    }

    async fn resolve_via_upstream(
        &self,
        original: &DnsMessage,
        question: &Question,
        forward_name: &str,
        outcome: &crate::rules::RuleOutcome,
    ) -> Option<DnsMessage> {
        let target = match resolve_upstream(&outcome.upstream, 53).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, upstream = %outcome.upstream, "could not resolve upstream host");
                return Some(original.reply(ResponseCode::ServerFailure));
            }
        };

        let forward_question = Question::new(forward_name, outcome.effective_type, question.qclass);
        let forward_query = DnsMessage::new_query(original.header.id, forward_question);

        match self
            .exchange
            .send(&forward_query, target, outcome.timeout, outcome.use_mutation)
            .await
        {
            Ok(upstream_reply) => {
                let mut reply = original.reply(upstream_reply.header.response_code);
                reply.answers = upstream_reply
                    .answers
                    .into_iter()
                    .map(|mut rr| {
                        rr.name = question.name.clone();
                        rr
                    })
                    .collect();
                Some(reply)
            }
            Err(ForwarderError::Timeout) => {
                // Preserved source behavior: the client gets nothing and
                // retries on its own DNS timeout.
                None
            }
            Err(ForwarderError::InfiniteForwarding) => {
                warn!(qname = %question.name, "refusing to forward query back to our own listener");
                Some(original.reply(ResponseCode::ServerFailure))
            }
            Err(e) => {
                warn!(error = %e, qname = %question.name, "upstream exchange failed");
                Some(original.reply(ResponseCode::ServerFailure))
            }
        }
    }

    async fn send_reply(&self, reply: &DnsMessage, client_addr: SocketAddr) {
        if let Err(e) = self
            .listen_socket
            .send_to(&reply.encode(), client_addr)
            .await
        {
            warn!(error = %e, client = %client_addr, "failed to send reply");
        }
    }
}
