use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::extractor::client_identity;

/// Sliding-window request limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_requests,
            Duration::from_secs(config.rate_limit_window_seconds),
        )
    }

    /// Record a request for `client` and report whether it is within the limit.
    /// Rejected requests are not recorded.
    pub async fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let log = requests.entry(client.to_string()).or_default();

        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.limit {
            return false;
        }

        log.push_back(now);
        true
    }

    /// Drop clients whose whole window has expired.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, log| {
            log.back()
                .is_some_and(|&latest| now.duration_since(latest) < self.window)
        });
        before - requests.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.requests.lock().await.len()
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_identity(request.headers());

    if !limiter.check(&client).await {
        warn!("Rate limit exceeded for client {}", client);
        return Err(AppError::RateLimited(
            "Too many requests. Please try again later.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
