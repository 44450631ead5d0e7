//! Per-IP rate limiting over fixed time windows.
//!
//! Each (scope, client IP) pair gets a counter that resets when its
//! window rolls over: 5 creates / 10 min, 10 deletes / 10 min, and a
//! global 100 writes / 15 min (reads and health checks are exempt).
//!
//! # Memory safety
//!
//! Tracked windows are capped (default: 100,000) and a background task
//! sweeps expired entries, so an attacker spraying unique IPs cannot
//! exhaust memory.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use urumi_core::config::RateLimitConfig;

use crate::error::ApiError;

/// Rate limit scopes, each with its own window and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    CreateStore,
    DeleteStore,
    GlobalWrite,
}

/// Fixed window counter.
struct Window {
    started: Instant,
    count: u32,
}

/// Client IP resolved for the current request; inserted into request
/// extensions by the middleware so handlers can audit and rate-limit.
#[derive(Clone, Debug)]
pub struct ClientIp(pub String);

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for forwarded-header extraction.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            Self::None
        } else if proxies.len() == 1 && proxies[0] == "*" {
            Self::All
        } else {
            let entries: Vec<TrustedEntry> = proxies
                .iter()
                .filter_map(|p| {
                    if p.contains('/') {
                        match p.parse::<IpNet>() {
                            Ok(net) => Some(TrustedEntry::Cidr(net)),
                            Err(e) => {
                                tracing::warn!("Invalid CIDR in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    } else {
                        match p.parse::<IpAddr>() {
                            Ok(ip) => Some(TrustedEntry::Ip(ip)),
                            Err(e) => {
                                tracing::warn!("Invalid IP in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    }
                })
                .collect();
            Self::List(entries)
        }
    }

    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => {
                let ip: IpAddr = match connection_ip.parse() {
                    Ok(ip) => ip,
                    Err(_) => return false,
                };
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }
        }
    }
}

struct RateLimitInner {
    windows: DashMap<(RateScope, String), Window>,
    config: RateLimitConfig,
    trusted_proxies: TrustedProxies,
}

/// Rate limiter state shared across requests. IP extraction stays
/// available even when limiting is disabled.
#[derive(Clone)]
pub struct RateLimitState {
    trusted_proxies_when_disabled: Arc<TrustedProxies>,
    inner: Option<Arc<RateLimitInner>>,
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        let trusted_proxies = TrustedProxies::from_config(&config.trusted_proxies);
        let inner = config.enabled.then(|| {
            Arc::new(RateLimitInner {
                windows: DashMap::new(),
                config: config.clone(),
                trusted_proxies: trusted_proxies.clone(),
            })
        });
        Self {
            trusted_proxies_when_disabled: Arc::new(trusted_proxies),
            inner,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    fn scope_quota(config: &RateLimitConfig, scope: RateScope) -> (u32, Duration) {
        match scope {
            RateScope::CreateStore => (
                config.create_limit,
                Duration::from_secs(config.create_window_secs),
            ),
            RateScope::DeleteStore => (
                config.delete_limit,
                Duration::from_secs(config.delete_window_secs),
            ),
            RateScope::GlobalWrite => (
                config.global_write_limit,
                Duration::from_secs(config.global_write_window_secs),
            ),
        }
    }

    /// Count one request for (scope, ip) against its fixed window.
    pub fn check(&self, scope: RateScope, ip: &str) -> Result<(), ApiError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let (limit, window) = Self::scope_quota(&inner.config, scope);
        let now = Instant::now();

        // Capacity is checked before taking the entry lock; len() under an
        // entry lock can deadlock in DashMap.
        let at_capacity = inner.windows.len() >= inner.config.max_entries as usize;

        match inner.windows.entry((scope, ip.to_string())) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                if now.duration_since(state.started) >= window {
                    state.started = now;
                    state.count = 1;
                    return Ok(());
                }
                if state.count >= limit {
                    let elapsed = now.duration_since(state.started);
                    let retry_after = window.saturating_sub(elapsed).as_secs() + 1;
                    return Err(ApiError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                }
                state.count += 1;
                Ok(())
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    tracing::warn!(
                        max_entries = inner.config.max_entries,
                        "Rate limiter at capacity, rejecting new client"
                    );
                    return Err(ApiError::RateLimited {
                        retry_after_secs: 60,
                    });
                }
                entry.insert(Window {
                    started: now,
                    count: 1,
                });
                Ok(())
            }
        }
    }

    /// Sweep windows that have been closed for a full period. Returns the
    /// number of entries evicted.
    pub fn cleanup(&self) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let now = Instant::now();
        let mut evicted = 0;
        let stale: Vec<(RateScope, String)> = inner
            .windows
            .iter()
            .filter(|entry| {
                let window = Self::scope_quota(&inner.config, entry.key().0).1;
                now.duration_since(entry.value().started) >= window * 2
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            let window = Self::scope_quota(&inner.config, key.0).1;
            if inner
                .windows
                .remove_if(&key, |_, state| {
                    now.duration_since(state.started) >= window * 2
                })
                .is_some()
            {
                evicted += 1;
            }
        }
        evicted
    }

    /// Current number of tracked windows.
    pub fn entry_count(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.windows.len())
            .unwrap_or(0)
    }

    fn trusted_proxies(&self) -> &TrustedProxies {
        match &self.inner {
            Some(inner) => &inner.trusted_proxies,
            None => &self.trusted_proxies_when_disabled,
        }
    }
}

/// Extract the client IP: the first X-Forwarded-For hop when the peer is
/// a trusted proxy, otherwise the connection address.
fn extract_ip(req: &Request<Body>, state: &RateLimitState) -> String {
    let connection_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let trust_headers = match (&connection_ip, state.trusted_proxies()) {
        (Some(conn_ip), proxies) => proxies.is_trusted(conn_ip),
        (None, TrustedProxies::All) => true,
        (None, _) => false,
    };

    if trust_headers
        && let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_hop) = value.split(',').next()
    {
        return first_hop.trim().to_string();
    }

    connection_ip.unwrap_or_else(|| "unknown".to_string())
}

/// Whether this request counts against the global write window.
fn is_limited_write(method: &Method, path: &str) -> bool {
    method != Method::GET && !path.starts_with("/health")
}

/// Resolve the client IP for every request and enforce the global write
/// window on mutating endpoints. The resolved [`ClientIp`] extension is
/// what handlers use for audit entries and per-endpoint limits.
pub async fn client_ip_middleware(
    State(rate_limit): State<RateLimitState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_ip(&req, &rate_limit);
    req.extensions_mut().insert(ClientIp(ip.clone()));

    if is_limited_write(req.method(), req.uri().path())
        && let Err(err) = rate_limit.check(RateScope::GlobalWrite, &ip)
    {
        return err.into_response();
    }

    next.run(req).await
}

/// Spawn a background task that periodically sweeps expired windows.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::debug!(evicted, "Rate limiter sweep evicted stale windows");
            }
        }
    })
}
