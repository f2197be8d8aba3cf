//! Exponential back-off for transient marketplace API failures.

use std::future::Future;
use std::time::Duration;

use crate::error::MarketplaceError;

const MAX_DELAY_SECS: u64 = 60;

/// Returns `true` for errors worth retrying: network failures, HTTP 429 and
/// HTTP 5xx. Everything else (404, other 4xx, bad JSON, bad input) is final.
pub(crate) fn is_retriable(err: &MarketplaceError) -> bool {
    match err {
        MarketplaceError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        MarketplaceError::RateLimited { .. } => true,
        MarketplaceError::UnexpectedStatus { status, .. } => *status >= 500,
        MarketplaceError::Deserialize { .. }
        | MarketplaceError::NotFound { .. }
        | MarketplaceError::UnsupportedPlatform(_)
        | MarketplaceError::InvalidUrl { .. }
        | MarketplaceError::Normalization { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// The wait before retry `n` is `backoff_base_secs * 2^(n-1)` seconds with
/// ±25 % jitter, capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, MarketplaceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketplaceError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_secs.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped_ms = computed.min(MAX_DELAY_SECS) * 1_000;
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped_ms as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient marketplace error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_retriable() {
        assert!(is_retriable(&MarketplaceError::RateLimited {
            retry_after_secs: 1
        }));
        assert!(is_retriable(&MarketplaceError::UnexpectedStatus {
            status: 503,
            url: "https://api.mercadolibre.com/items/MLB1".to_owned(),
        }));
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!is_retriable(&MarketplaceError::UnexpectedStatus {
            status: 403,
            url: "https://api.mercadolibre.com/items/MLB1".to_owned(),
        }));
        assert!(!is_retriable(&MarketplaceError::NotFound {
            url: "https://api.mercadolibre.com/items/MLB1".to_owned(),
        }));
        let source = serde_json::from_str::<()>("invalid").unwrap_err();
        assert!(!is_retriable(&MarketplaceError::Deserialize {
            context: "test".to_owned(),
            source,
        }));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(MarketplaceError::RateLimited {
                        retry_after_secs: 0,
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(MarketplaceError::UnexpectedStatus {
                    status: 502,
                    url: "u".to_owned(),
                })
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(MarketplaceError::UnexpectedStatus { status: 502, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 try + 2 retries");
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(MarketplaceError::NotFound { url: "u".to_owned() })
            }
        })
        .await;
        assert!(matches!(result, Err(MarketplaceError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
