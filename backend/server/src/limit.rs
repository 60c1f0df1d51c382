//! # Rate Limiting
//!
//! Sliding window per client IP, one independent window per surface.
//!
//! - General: every request, static files included
//! - Votes: `POST /api/votes` on top of the general window
//! - Sync: `POST /api/sync` on top of the general window
//!
//! Rejected requests get a 429 straight away. Nothing is queued or delayed.
//! The client IP is the peer address, forwarded headers are not trusted.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, warn};

use crate::{
    config::{RateLimits, Window},
    error::AppError,
};

pub struct SlidingWindow {
    hits: DashMap<IpAddr, Vec<Instant>>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindow {
    pub fn new(limit: Window) -> Self {
        Self {
            hits: DashMap::new(),
            window: limit.window,
            max_requests: limit.max_requests,
        }
    }

    /// Records a hit for `client` unless it is already at the cap.
    pub fn check_and_record(&self, client: IpAddr) -> bool {
        self.check_and_record_at(client, Instant::now())
    }

    fn check_and_record_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut hits = self.hits.entry(client).or_default();

        hits.retain(|&hit| now.duration_since(hit) < self.window);

        if hits.len() >= self.max_requests {
            return false;
        }

        hits.push(now);
        true
    }

    /// Forgets clients with no hits left inside the window.
    pub fn cleanup(&self) {
        let now = Instant::now();

        self.hits.retain(|_, hits| {
            hits.retain(|&hit| now.duration_since(hit) < self.window);
            !hits.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }
}

#[derive(Clone)]
pub struct Limiters {
    pub general: Arc<SlidingWindow>,
    pub votes: Arc<SlidingWindow>,
    pub sync: Arc<SlidingWindow>,
}

impl Limiters {
    pub fn new(limits: &RateLimits) -> Self {
        Self {
            general: Arc::new(SlidingWindow::new(limits.general)),
            votes: Arc::new(SlidingWindow::new(limits.votes)),
            sync: Arc::new(SlidingWindow::new(limits.sync)),
        }
    }

    pub fn cleanup(&self) {
        self.general.cleanup();
        self.votes.cleanup();
        self.sync.cleanup();
    }

    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let limiters = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                ticker.tick().await;
                limiters.cleanup();
                debug!(
                    "Rate limiter tracking {} clients",
                    limiters.general.tracked_clients()
                );
            }
        })
    }
}

pub async fn limit(
    State(limiter): State<Arc<SlidingWindow>>,
    ConnectInfo(address): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !limiter.check_and_record(address.ip()) {
        warn!(
            "Rate limited {} on {} {}",
            address.ip(),
            request.method(),
            request.uri().path()
        );
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
