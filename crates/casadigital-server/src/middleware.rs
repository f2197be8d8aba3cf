//! Request id, API-key auth and per-caller rate limiting for the API.
//!
//! Rejections use the same `{error, meta}` envelope as handler errors and
//! carry the request id assigned by [`request_id`], which therefore has to
//! be the outermost of these layers.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use casadigital_core::AppConfig;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const API_KEYS_VAR: &str = "CASADIGITAL_API_KEYS";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Windows are pruned once this many callers are tracked.
const MAX_TRACKED_CALLERS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// API keys accepted as bearer tokens on protected routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
}

impl AuthState {
    /// Reads `CASADIGITAL_API_KEYS` (comma-separated).
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    pub(crate) fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let api_keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if api_keys.is_empty() {
            if !is_development {
                anyhow::bail!("{API_KEYS_VAR} is required outside development");
            }
            tracing::warn!("{API_KEYS_VAR} not set; API key auth disabled in development");
        }

        Ok(Self {
            api_keys: Arc::new(api_keys),
        })
    }

    /// Accepts every request.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(HashSet::new()),
        }
    }

    fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| self.api_keys.contains(token))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by caller: the bearer token when one is sent,
/// else the first `x-forwarded-for` address.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: u32,
    window: Duration,
    callers: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            callers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Counts one request for `caller`. Returns the time left in the window
    /// when the caller is over the limit.
    async fn check(&self, caller: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut callers = self.callers.lock().await;

        if callers.len() >= MAX_TRACKED_CALLERS {
            callers.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let window = callers.entry(caller.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.duration_since(window.started_at) >= self.window {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(window.started_at)));
        }
        window.count += 1;
        Ok(())
    }
}

/// Propagates `x-request-id` or assigns a fresh `UUIDv4`, exposing it to
/// handlers as [`RequestId`] and echoing it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() || auth.accepts(req.headers()) {
        return next.run(req).await;
    }

    tracing::debug!(path = %req.uri().path(), "rejected request without a valid API key");
    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

pub async fn enforce_rate_limit(
    State(limiter): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = caller_key(req.headers());
    match limiter.check(&caller).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
            let mut res = ApiError::new(
                request_id_of(&req),
                "rate_limited",
                format!(
                    "rate limit of {} requests per {}s exceeded",
                    limiter.max_requests,
                    limiter.window.as_secs()
                ),
            )
            .into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
            res
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn caller_key(headers: &HeaderMap) -> String {
    if let Some(token) = bearer_token(headers) {
        return format!("key:{token}");
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| "anonymous".to_string(), |ip| format!("ip:{ip}"))
}
