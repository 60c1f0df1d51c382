//! Backend for a GitHub commit leaderboard.
//!
//! Mirrors one repository's commits (or pull requests) to local JSON files, lets anyone
//! upvote an item once, and serves the items ranked by upvotes.
//!
//!
//!
//! # Endpoints
//!
//! | Route | Does |
//! |---|---|
//! | `GET /api/commits?search=` | ranked commits |
//! | `GET /api/pulls?search=` | ranked pull requests |
//! | `POST /api/votes` | `{itemId, voterId}`, one vote per pair |
//! | `GET /api/votes/{voterId}` | item ids this voter upvoted |
//! | `POST /api/sync` | `{token, kind?}`, replaces the mirrored snapshot |
//! | `GET /auth/github?code=` | relays an OAuth code to GitHub for a token |
//! | `GET /health` | liveness |
//! | anything else | static files from `PUBLIC_DIR` |
//!
//! Errors are always `{"error": "..."}`.
//!
//!
//!
//! # Request Pipeline
//!
//! Outermost first.
//!
//! - Security headers and CORS
//! - Access log, buffered and flushed to `LOG_DIR/access.log` on a timer
//! - General rate limit per client IP
//! - Route specific rate limit (votes, sync)
//! - Handler
//!
//!
//!
//! # Notes
//!
//! ## Tokens
//! The GitHub token used for syncing comes in with each sync request and is never
//! written anywhere. OAuth client credentials come from the environment or
//! `/run/secrets`.
//!
//! ## Voter ids
//! Voter ids are whatever the client sends. Nothing stops a determined client from
//! voting many times under different ids, the rate limits only slow it down.
//!
//!
//!
//! # Setup
//!
//! Run locally.
//! ```sh
//! REPO_OWNER=rust-lang REPO_NAME=rustlings RUST_LOG=info cargo run -p server
//! ```
//!
//! Trigger a sync.
//! ```sh
//! curl -X POST localhost:3000/api/sync -H 'content-type: application/json' -d "{\"token\": \"$GITHUB_TOKEN\"}"
//! ```
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{CONTENT_TYPE, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
    },
    middleware::from_fn_with_state,
    routing::{get, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod access_log;
pub mod config;
pub mod error;
pub mod limit;
pub mod oauth;
pub mod routes;
pub mod state;

use access_log::log_requests;
use config::Config;
use limit::limit;
use routes::{
    commits_handler, health_handler, oauth_handler, pulls_handler, sync_handler, voter_handler,
    votes_handler,
};
use state::State;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    let flusher = state.access_log.spawn_flusher(state.config.log_flush);
    let janitor = state.limiters.spawn_janitor(JANITOR_INTERVAL);

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutting down...");

    flusher.abort();
    janitor.abort();
    state.access_log.flush().await?;

    Ok(())
}

pub fn router(state: Arc<State>) -> Router {
    let limiters = &state.limiters;

    Router::new()
        .route("/auth/github", get(oauth_handler))
        .route("/api/commits", get(commits_handler))
        .route("/api/pulls", get(pulls_handler))
        .route(
            "/api/votes",
            post(votes_handler).layer(from_fn_with_state(limiters.votes.clone(), limit)),
        )
        .route("/api/votes/{voter_id}", get(voter_handler))
        .route(
            "/api/sync",
            post(sync_handler).layer(from_fn_with_state(limiters.sync.clone(), limit)),
        )
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(&state.config.public_dir))
        .layer(from_fn_with_state(limiters.general.clone(), limit))
        .layer(from_fn_with_state(state.access_log.clone(), log_requests))
        .layer(cors(&state.config.allowed_origin))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state.clone())
}

fn cors(allowed_origin: &str) -> CorsLayer {
    let origin = match allowed_origin {
        "*" => AllowOrigin::any(),
        origin => match HeaderValue::from_str(origin) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(e) => {
                warn!("Invalid ALLOWED_ORIGIN {origin}: {e}, allowing any");
                AllowOrigin::any()
            }
        },
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
