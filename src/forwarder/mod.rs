//! EventForwarder - Downstream Relay
//!
//! ## Responsibilities
//!
//! - Deliver the original event XML to the configured destination
//! - TCP: write, half-close, wait for the peer to close; retried with a fixed delay
//! - HTTP: one POST to `/events`; a failed attempt is final
//!
//! Only TCP delivery retries. HTTP delivery makes exactly one attempt.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config_store::{ForwardProtocol, ForwardingPolicy};
use crate::error::{Error, Result};

/// Delay between TCP attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of one forwarding call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingResult {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ForwardingResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Relay capability used by the dispatch orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRelay: Send + Sync {
    /// Forward `raw_xml` according to a policy snapshot
    async fn forward(&self, raw_xml: &str, policy: &ForwardingPolicy) -> ForwardingResult;
}

/// TCP/HTTP relay
pub struct EventForwarder {
    client: reqwest::Client,
    retry_delay: Duration,
}

impl EventForwarder {
    /// Create new EventForwarder
    pub fn new() -> Result<Self> {
        Self::with_retry_delay(DEFAULT_RETRY_DELAY)
    }

    /// Create with a custom delay between TCP attempts
    pub fn with_retry_delay(retry_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_delay,
        })
    }

    async fn forward_via_tcp(&self, raw_xml: &str, policy: &ForwardingPolicy) -> ForwardingResult {
        let addr = format!("{}:{}", policy.destination_host, policy.destination_port);
        let timeout = Duration::from_millis(policy.timeout);
        let max_attempts = policy.retry_attempts.max(1);

        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match tokio::time::timeout(timeout, tcp_attempt(&addr, raw_xml)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(
                        destination = %addr,
                        attempt = attempt,
                        response_bytes = response.len(),
                        "Event forwarded over TCP"
                    );
                    if !response.is_empty() {
                        tracing::debug!(
                            response = %String::from_utf8_lossy(&response),
                            "Forwarding response"
                        );
                    }
                    return ForwardingResult::ok("Event forwarded successfully");
                }
                Ok(Err(e)) => {
                    last_error = format!(
                        "Forwarding failed after {} attempts: {}",
                        attempt, e
                    );
                    if attempt < max_attempts {
                        tracing::warn!(
                            destination = %addr,
                            error = %e,
                            "Forwarding error, retrying... ({}/{})",
                            attempt,
                            max_attempts
                        );
                    }
                }
                Err(_) => {
                    last_error = format!("Forwarding timeout after {} attempts", attempt);
                    if attempt < max_attempts {
                        tracing::warn!(
                            destination = %addr,
                            timeout_ms = policy.timeout,
                            "Forwarding timeout, retrying... ({}/{})",
                            attempt,
                            max_attempts
                        );
                    }
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        ForwardingResult::failed(last_error)
    }

    async fn forward_via_http(&self, raw_xml: &str, policy: &ForwardingPolicy) -> ForwardingResult {
        let url = format!(
            "http://{}:{}/events",
            policy.destination_host, policy.destination_port
        );

        let result = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .timeout(Duration::from_millis(policy.timeout))
            .body(raw_xml.to_string())
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return ForwardingResult::failed("HTTP forwarding timeout");
            }
            Err(e) => {
                return ForwardingResult::failed(format!("HTTP forwarding error: {}", e));
            }
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return ForwardingResult::failed("HTTP forwarding timeout");
            }
            Err(e) => {
                return ForwardingResult::failed(format!("HTTP forwarding error: {}", e));
            }
        };
        let message = format!("HTTP {}: {}", status.as_u16(), body);

        tracing::debug!(url = %url, status = status.as_u16(), "HTTP forwarding response");

        if status.is_success() {
            ForwardingResult::ok(message)
        } else {
            ForwardingResult {
                success: false,
                message: Some(message),
                error: Some(format!("HTTP forwarding rejected with status {}", status.as_u16())),
            }
        }
    }
}

#[async_trait]
impl EventRelay for EventForwarder {
    async fn forward(&self, raw_xml: &str, policy: &ForwardingPolicy) -> ForwardingResult {
        if !policy.enabled {
            return ForwardingResult::ok("Forwarding disabled");
        }

        match policy.protocol {
            ForwardProtocol::Tcp => self.forward_via_tcp(raw_xml, policy).await,
            ForwardProtocol::Http => self.forward_via_http(raw_xml, policy).await,
        }
    }
}

/// One TCP delivery: connect, write, half-close, read until the peer closes
async fn tcp_attempt(addr: &str, raw_xml: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(raw_xml.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}
