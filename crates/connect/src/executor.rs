//! Rate-limited, signed, retried REST dispatch.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use hermes_core::VenueId;

use crate::backoff::BackoffConfig;
use crate::error::{ConnectError, TransportError};
use crate::rate_limit::RateLimiter;
use crate::request::RequestDescriptor;
use crate::sign::RequestSigner;
use crate::transport::{HttpResponse, HttpTransport};

/// Retry policy for transient dispatch failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Turns a logical request into a signed, rate-limited HTTP call.
///
/// `execute` suspends at the rate limiter, signs with a fresh nonce per
/// attempt, and retries transient failures with exponential backoff.
/// Dropping the returned future before dispatch consumes no token;
/// after dispatch the token is spent and the in-flight request is not
/// aborted.
pub struct RequestExecutor {
    venue: VenueId,
    signer: Arc<RequestSigner>,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(
        venue: VenueId,
        signer: Arc<RequestSigner>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
    ) -> Self {
        RequestExecutor {
            venue,
            signer,
            limiter,
            transport,
            retry,
        }
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Execute and deserialize the response body as JSON
    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, ConnectError> {
        let response = self.execute_raw(descriptor).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| ConnectError::Protocol(format!("response decode failed: {e}")))
    }

    /// Execute and return the raw response. Callers decode venue-shaped
    /// payloads themselves.
    pub async fn execute_raw(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<HttpResponse, ConnectError> {
        let mut attempt: u32 = 0;
        loop {
            // Every attempt, retries included, consumes one token
            self.limiter.acquire(&self.venue).await;
            let signed = self.signer.sign(descriptor)?;

            match self.transport.send(&signed).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 429 => {
                    // The venue throttled us anyway: back off harder
                    if attempt + 1 >= self.retry.max_attempts {
                        return Err(ConnectError::RateLimited);
                    }
                    let delay = self.retry.backoff.delay(attempt) * 4;
                    tracing::warn!(
                        venue = %self.venue,
                        attempt,
                        "venue returned 429, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    return Err(ConnectError::Api {
                        status: response.status,
                        body: String::from_utf8_lossy(&response.body).into_owned(),
                    });
                }
                Err(e) if is_transient(&e) => {
                    if attempt + 1 >= self.retry.max_attempts {
                        return Err(ConnectError::Network(e.to_string()));
                    }
                    let delay = self.retry.backoff.delay(attempt);
                    tracing::debug!(
                        venue = %self.venue,
                        attempt,
                        "transport error ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }
}

fn is_transient(e: &TransportError) -> bool {
    matches!(
        e,
        TransportError::Timeout | TransportError::Connection(_)
    )
}
