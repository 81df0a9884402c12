use std::time::Duration;

use hyper::{Body, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::Transport;

/// Retry policy for services that may be asleep when first contacted.
///
/// After failed attempt `k` (0-based) the request is retried after
/// `backoff * (k + 1)`, at most `retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Send each request exactly once.
    pub fn none() -> Self {
        RetryPolicy {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.saturating_add(1))
    }
}

/// Gateway errors returned while a sleeping host spins up.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Send a request, retrying transport errors and gateway statuses.
///
/// `make_request` is called once per attempt since a request body can only
/// be sent once. When retries run out the last response is returned as-is,
/// or the last transport error propagated.
pub async fn send_with_retry<F>(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    mut make_request: F,
) -> Result<Response<Body>>
where
    F: FnMut() -> Result<Request<Body>> + Send,
{
    let mut attempt = 0u32;
    loop {
        let req = make_request()?;
        let target = format!("{} {}", req.method(), req.uri());
        log::debug!("{} (attempt {})", target, attempt + 1);

        match transport.send(req).await {
            Ok(res) if is_retryable(res.status()) && attempt < policy.retries => {
                log::warn!("{} returned {}, retrying", target, res.status());
            }
            Ok(res) => return Ok(res),
            Err(err) if attempt < policy.retries => {
                log::warn!("{} failed: {}, retrying", target, err);
            }
            Err(err) => return Err(err),
        }

        tokio::time::sleep(policy.delay(attempt)).await;
        attempt += 1;
    }
}
