use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State, rejection::JsonRejection},
};
use board::{CollectionKind, RankedItem};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{error::AppError, state};

type AppState = State<Arc<state::State>>;

#[derive(Deserialize)]
pub struct SearchQuery {
    search: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    item_id: Option<String>,
    voter_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct SyncRequest {
    token: Option<String>,
    #[serde(default)]
    kind: CollectionKind,
}

#[derive(Deserialize)]
pub struct CodeQuery {
    code: Option<String>,
}

pub async fn commits_handler(
    State(state): AppState,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RankedItem>>, AppError> {
    list(&state, CollectionKind::Commits, query).await
}

pub async fn pulls_handler(
    State(state): AppState,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RankedItem>>, AppError> {
    list(&state, CollectionKind::Pulls, query).await
}

async fn list(
    state: &state::State,
    kind: CollectionKind,
    query: SearchQuery,
) -> Result<Json<Vec<RankedItem>>, AppError> {
    let ranked = state.ranking.list(kind, query.search.as_deref()).await?;

    Ok(Json(ranked))
}

pub async fn votes_handler(
    State(state): AppState,
    ConnectInfo(address): ConnectInfo<SocketAddr>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    state
        .ledger
        .record(
            payload.item_id.as_deref().unwrap_or_default(),
            payload.voter_id.as_deref().unwrap_or_default(),
            Some(address.ip().to_string()),
        )
        .await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn voter_handler(
    State(state): AppState,
    Path(voter_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.ledger.voted_items(&voter_id).await?))
}

/// An empty body, with or without a JSON content type, is a request without a token.
pub async fn sync_handler(
    State(state): AppState,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = if body.trim_ascii().is_empty() {
        SyncRequest::default()
    } else {
        serde_json::from_slice::<SyncRequest>(&body)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid sync payload: {e}")))?
    };

    let token = payload
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)?;

    let count = state.orchestrator.sync_all(payload.kind, token).await?;

    Ok(Json(json!({ "success": true, "count": count })))
}

pub async fn oauth_handler(
    State(state): AppState,
    Query(query): Query<CodeQuery>,
) -> Result<Json<Value>, AppError> {
    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing code".to_string()))?;

    info!("Relaying OAuth code");
    let token = state.oauth.exchange(&code).await?;

    Ok(Json(token))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
