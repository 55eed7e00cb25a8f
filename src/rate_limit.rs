//! Per-client request throttling.
//!
//! Each client IP gets a budget of `max_requests` per `window_secs`,
//! refilled continuously.  Health and metrics endpoints are exempt.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::errors::ApiError;
use crate::AppState;

/// Keyed limiter shared by all requests.
pub type ClientRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Paths that are never throttled.
const EXEMPT_PATHS: &[&str] = &["/health", "/metrics"];

/// Build the limiter described by `config`, or `None` when disabled.
pub fn build_limiter(config: &RateLimitConfig) -> Option<Arc<ClientRateLimiter>> {
    if !config.enabled {
        return None;
    }
    let max = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_secs(config.window_secs.max(1));
    let period = (window / max.get()).max(Duration::from_nanos(1));
    let quota = Quota::with_period(period)?.allow_burst(max);
    Some(Arc::new(RateLimiter::keyed(quota)))
}

/// Drop per-client state that has fully refilled. Returns the number of
/// clients still tracked.
pub fn prune(limiter: &ClientRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Prune `limiter` every `every` for as long as the runtime lives.
pub fn spawn_pruner(limiter: Arc<ClientRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let tracked = prune(&limiter);
            debug!(tracked, "Pruned rate limiter state");
        }
    })
}

/// Client address from the connection, or the unspecified address when
/// the server was not started with connect info.
fn client_ip(req: &Request<Body>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting clients over budget with 429.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if !EXEMPT_PATHS.contains(&req.uri().path()) {
            let ip = client_ip(&req);
            if limiter.check_key(&ip).is_err() {
                warn!(ip = %ip, "Rate limit exceeded");
                return Err(ApiError::TooManyRequests);
            }
        }
    }
    Ok(next.run(req).await)
}
