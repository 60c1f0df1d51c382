//! # Access Log
//!
//! One JSON line per request in `<log_dir>/access.log`.
//!
//! Requests only push into an in-memory buffer. Whoever owns the log decides when
//! it hits disk: [`AccessLog::spawn_flusher`] on an interval, or [`AccessLog::flush`]
//! directly (shutdown, tests).
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{OpenOptions, create_dir_all},
    io::AsyncWriteExt,
    sync::Mutex,
    task::JoinHandle,
    time::interval,
};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

#[derive(Clone, Default)]
pub struct AccessLog {
    inner: Arc<Mutex<AccessLogInner>>,
}

#[derive(Default)]
struct AccessLogInner {
    buffer: Vec<AccessEvent>,
    path: Option<PathBuf>,
}

impl AccessLog {
    /// Buffers without a file until [`AccessLog::init_file`] is called; flushes discard.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }

        info!("Access log at {}", path.display());
        self.inner.lock().await.path = Some(path);

        Ok(())
    }

    pub async fn record(&self, event: AccessEvent) {
        self.inner.lock().await.buffer.push(event);
    }

    pub async fn pending(&self) -> usize {
        self.inner.lock().await.buffer.len()
    }

    /// Appends everything buffered so far and returns how many events were written.
    ///
    /// On a failed write the events go back to the front of the buffer for the next flush.
    pub async fn flush(&self) -> std::io::Result<usize> {
        let (events, path) = {
            let mut inner = self.inner.lock().await;
            (std::mem::take(&mut inner.buffer), inner.path.clone())
        };

        if events.is_empty() {
            return Ok(0);
        }

        let Some(path) = path else {
            debug!("No access log file, dropping {} events", events.len());
            return Ok(0);
        };

        let mut lines = String::new();
        for event in &events {
            match serde_json::to_string(event) {
                Ok(line) => {
                    lines.push_str(&line);
                    lines.push('\n');
                }
                Err(e) => error!("Failed to serialize access event: {e}"),
            }
        }

        let written = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(lines.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(events.len()),
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.buffer.splice(0..0, events);
                Err(e)
            }
        }
    }

    pub fn spawn_flusher(&self, every: Duration) -> JoinHandle<()> {
        let log = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                ticker.tick().await;

                if let Err(e) = log.flush().await {
                    error!("Failed to flush access log: {e}");
                }
            }
        })
    }
}

pub async fn log_requests(State(log): State<AccessLog>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip().to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    debug!("{method} {path} -> {status}");

    log.record(AccessEvent {
        timestamp: Utc::now(),
        method,
        path,
        status,
        latency_ms: started.elapsed().as_millis() as u64,
        client,
    })
    .await;

    response
}
