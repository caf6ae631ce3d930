use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::warn;

use crate::dns::{RData, ResourceRecord};
use crate::error::{ForwarderError, Result};

/// DNSPod-style alternate A-record resolution: `GET http://<host>/d?dn=<name>&ttl=1`,
/// response body `"ip1;ip2;...,ttl"`. Only used for A queries; the core
/// silently ignores `useHttpQuery` for AAAA, matching the source.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Resolves `name` against `host` (the HTTP-mode upstream, typically
    /// `AppConfig.worldNameServer`). An empty body means `NXDOMAIN`
    /// (`Ok(vec![])`); a non-2xx status, network error, or unparsable body
    /// is `Err(ForwarderError::HttpResolve)`.
    pub async fn resolve_a(
        &self,
        host: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Vec<ResourceRecord>> {
        let url = format!("http://{host}/d?dn={name}&ttl=1");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ForwarderError::HttpResolve(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwarderError::HttpResolve(format!(
                "status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ForwarderError::HttpResolve(e.to_string()))?;
        let body = body.trim();

        if body.is_empty() {
            return Ok(Vec::new());
        }

        let (ips_part, ttl_part) = body
            .rsplit_once(',')
            .ok_or_else(|| ForwarderError::HttpResolve(format!("malformed body: {body}")))?;

        let ttl: u32 = ttl_part
            .trim()
            .parse()
            .map_err(|_| ForwarderError::HttpResolve(format!("malformed ttl: {ttl_part}")))?;

        let mut records = Vec::new();
        for ip_str in ips_part.split(';').filter(|s| !s.is_empty()) {
            let ip: Ipv4Addr = ip_str
                .trim()
                .parse()
                .map_err(|_| ForwarderError::HttpResolve(format!("malformed ip: {ip_str}")))?;
            records.push(ResourceRecord {
                name: name.to_ascii_lowercase(),
                rclass: crate::dns::RecordClass::In,
                ttl,
                rdata: RData::A(ip),
            });
        }

        if records.is_empty() {
            warn!(body = %body, "http resolver returned no parsable addresses");
        }

        Ok(records)
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn malformed_body_without_comma_is_an_error() {
        let body = "1.2.3.4;5.6.7.8";
        assert!(body.rsplit_once(',').is_none());
    }

    /// Spawns a bare-bones HTTP/1.1 server that replies to every request
    /// with a fixed status and body, closing the connection afterward.
    async fn serve_once(status_line: &'static str, body: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        addr
    }

    #[tokio::test]
    async fn resolve_a_parses_semicolon_separated_ips_and_trailing_ttl() {
        let addr = serve_once("HTTP/1.1 200 OK", "1.2.3.4;5.6.7.8,60").await;
        let resolver = HttpResolver::new();
        let records = resolver
            .resolve_a(&addr.to_string(), "example.com", Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "example.com");
        assert_eq!(records[0].ttl, 60);
        assert!(matches!(records[0].rdata, RData::A(ip) if ip == Ipv4Addr::new(1, 2, 3, 4)));
        assert!(matches!(records[1].rdata, RData::A(ip) if ip == Ipv4Addr::new(5, 6, 7, 8)));
    }

    #[tokio::test]
    async fn resolve_a_treats_an_empty_body_as_nxdomain() {
        let addr = serve_once("HTTP/1.1 200 OK", "").await;
        let resolver = HttpResolver::new();
        let records = resolver
            .resolve_a(&addr.to_string(), "nowhere.example", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn resolve_a_errors_on_a_non_success_status() {
        let addr = serve_once("HTTP/1.1 500 Internal Server Error", "").await;
        let resolver = HttpResolver::new();
        let result = resolver
            .resolve_a(&addr.to_string(), "example.com", Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(ForwarderError::HttpResolve(_))));
    }
}
