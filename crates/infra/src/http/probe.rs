use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use scrapeshield_core::{ProbeResult, ProxyProbe};
use scrapeshield_domain::{Proxy, ScrapeShieldError};
use tracing::debug;

use crate::errors::InfraError;

const DEFAULT_USER_AGENT: &str = concat!("scrapeshield-probe/", env!("CARGO_PKG_VERSION"));

/// Health probe that fetches the test URL through the proxy under test.
///
/// A fresh client is built per probe so connection pools never leak traffic
/// between proxies.
#[derive(Debug, Clone)]
pub struct ReqwestProxyProbe {
    user_agent: String,
}

impl Default for ReqwestProxyProbe {
    fn default() -> Self {
        Self { user_agent: DEFAULT_USER_AGENT.to_string() }
    }
}

impl ReqwestProxyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client_for(&self, proxy: &Proxy, timeout: Duration) -> Result<ReqwestClient, ScrapeShieldError> {
        let route = reqwest::Proxy::all(proxy_url(proxy)).map_err(InfraError::from)?;
        let client = ReqwestClient::builder()
            .proxy(route)
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(InfraError::from)?;
        Ok(client)
    }
}

#[async_trait]
impl ProxyProbe for ReqwestProxyProbe {
    async fn probe(&self, proxy: &Proxy, test_url: &str, timeout: Duration) -> ProbeResult {
        let client = match self.client_for(proxy, timeout) {
            Ok(client) => client,
            Err(err) => return ProbeResult::failure(err.to_string()),
        };

        let started = Instant::now();
        let outcome = client.get(test_url).send().await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(response) if response.status().is_success() => {
                debug!(proxy_id = %proxy.id, elapsed_ms = elapsed.as_millis() as u64, "Probe passed");
                ProbeResult::success(elapsed)
            }
            Ok(response) => {
                let status = response.status();
                debug!(proxy_id = %proxy.id, %status, "Probe rejected by upstream");
                ProbeResult::failure(format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown status")
                ))
            }
            Err(err) => {
                let mapped = ScrapeShieldError::from(InfraError::from(err));
                debug!(proxy_id = %proxy.id, error = %mapped, "Probe failed");
                ProbeResult::failure(mapped.to_string())
            }
        }
    }
}

/// Proxy URL with a scheme; bare `host:port` entries take their type's scheme.
fn proxy_url(proxy: &Proxy) -> String {
    if proxy.url.contains("://") {
        proxy.url.clone()
    } else {
        format!("{}://{}", proxy.proxy_type.as_str(), proxy.url)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use scrapeshield_domain::ProxyType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Plain HTTP proxy stand-in answering every request with `status_line`.
    async fn fake_proxy(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response =
                        format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    #[test]
    fn bare_address_takes_type_scheme() {
        let proxy = Proxy::new("p", "10.0.0.1:1080").with_type(ProxyType::Socks5);
        assert_eq!(proxy_url(&proxy), "socks5://10.0.0.1:1080");

        let explicit = Proxy::new("p", "http://10.0.0.1:8080").with_type(ProxyType::Socks5);
        assert_eq!(proxy_url(&explicit), "http://10.0.0.1:8080");
    }

    /// Validates `ReqwestProxyProbe::probe` behavior for the healthy proxy
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a 200 through the proxy is a pass with no error.
    #[tokio::test]
    async fn test_probe_passes_through_healthy_proxy() {
        let addr = fake_proxy("HTTP/1.1 200 OK").await;
        let proxy = Proxy::new("p-ok", format!("http://{addr}"));

        let result = ReqwestProxyProbe::new()
            .probe(&proxy, "http://probe.scrapeshield.invalid/ip", Duration::from_secs(5))
            .await;

        assert!(result.ok, "{:?}", result.error);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_fails_on_upstream_status() {
        let addr = fake_proxy("HTTP/1.1 407 Proxy Authentication Required").await;
        let proxy = Proxy::new("p-auth", format!("http://{addr}"));

        let result = ReqwestProxyProbe::new()
            .probe(&proxy, "http://probe.scrapeshield.invalid/ip", Duration::from_secs(5))
            .await;

        assert!(!result.ok);
        assert!(result.error.unwrap().contains("407"));
    }

    #[tokio::test]
    async fn test_probe_fails_on_unreachable_proxy() {
        let proxy = Proxy::new("p-dead", "http://127.0.0.1:1");

        let result = ReqwestProxyProbe::new()
            .probe(&proxy, "http://probe.scrapeshield.invalid/ip", Duration::from_secs(2))
            .await;

        assert!(!result.ok);
        assert_eq!(result.response_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_probe_reports_malformed_proxy_url() {
        let proxy = Proxy::new("p-bad", "http://[::1");

        let result = ReqwestProxyProbe::new()
            .probe(&proxy, "http://probe.scrapeshield.invalid/ip", Duration::from_secs(1))
            .await;

        assert!(!result.ok);
        assert!(result.error.is_some());
    }
}
