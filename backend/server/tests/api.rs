use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::connect_info::MockConnectInfo,
    http::{HeaderMap, Request, StatusCode, header::CONTENT_TYPE},
};
use board::CorruptPolicy;
use http_body_util::BodyExt;
use mirror::UpstreamConfig;
use serde_json::{Value, json};
use server::{
    config::{Config, OAuthConfig, RateLimits, Window},
    router,
    state::State,
};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

struct TestApp {
    _dir: TempDir,
    state: Arc<State>,
    router: Router,
    upstream: MockServer,
}

async fn spawn_app(limits: RateLimits) -> TestApp {
    let upstream = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let public_dir = dir.path().join("public");
    std::fs::create_dir_all(&public_dir).unwrap();
    std::fs::write(public_dir.join("index.html"), "<h1>Commit Leaderboard</h1>").unwrap();

    let mut upstream_config = UpstreamConfig::new("o", "r");
    upstream_config.api_url = upstream.uri();
    upstream_config.timeout = Duration::from_secs(5);

    let config = Config {
        port: 0,
        data_dir: dir.path().join("data"),
        public_dir,
        log_dir: dir.path().join("logs"),
        log_flush: Duration::from_secs(60),
        corrupt_policy: CorruptPolicy::Reseed,
        allowed_origin: "*".to_string(),
        upstream: upstream_config,
        oauth: OAuthConfig {
            token_url: format!("{}/login/oauth/access_token", upstream.uri()),
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
        },
        limits,
    };

    let state = State::new(config).await.unwrap();
    let router = router(state.clone()).layer(MockConnectInfo(SocketAddr::from((
        [127, 0, 0, 1],
        40000,
    ))));

    TestApp {
        _dir: dir,
        state,
        router,
        upstream,
    }
}

fn generous() -> RateLimits {
    let window = Window {
        window: Duration::from_secs(60),
        max_requests: 1000,
    };

    RateLimits {
        general: window,
        votes: window,
        sync: window,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, headers, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = self.send(request).await;

        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post(&self, uri: &str, payload: Value) -> (StatusCode, Value) {
        self.post_raw(uri, payload.to_string()).await
    }

    async fn post_raw(&self, uri: &str, payload: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap();
        let (status, _, body) = self.send(request).await;

        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn mount_commits(&self, commits: Value) {
        Mock::given(method("GET"))
            .and(path("/repos/o/r/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(commits))
            .mount(&self.upstream)
            .await;
    }
}

fn commit(sha: &str, name: &str, message: &str) -> Value {
    json!({
        "sha": sha,
        "html_url": format!("https://github.com/o/r/commit/{sha}"),
        "commit": {
            "message": message,
            "author": { "name": name, "date": "2024-03-01T10:00:00Z" },
            "committer": { "name": name, "date": "2024-03-01T10:00:00Z" }
        }
    })
}

fn ids(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_empty_leaderboard() {
    let app = spawn_app(generous()).await;

    let (status, body) = app.get("/api/commits").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_vote_once_per_voter() {
    let app = spawn_app(generous()).await;

    let (status, body) = app
        .post("/api/votes", json!({ "itemId": "1", "voterId": "u1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = app
        .post("/api/votes", json!({ "itemId": "1", "voterId": "u1" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Already voted for this item" }));

    let (status, body) = app.get("/api/votes/u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["1"]));
}

#[tokio::test]
async fn test_vote_requires_fields() {
    let app = spawn_app(generous()).await;

    let (status, body) = app.post("/api/votes", json!({ "itemId": "1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing voterId" }));

    let (status, body) = app.post_raw("/api/votes", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_sync_requires_token() {
    let app = spawn_app(generous()).await;

    let (status, body) = app.post("/api/sync", json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.post("/api/sync", json!({ "token": "  " })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_without_body_is_unauthorized() {
    let app = spawn_app(generous()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/sync")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "GitHub token is required" }));

    let (status, _) = app.post_raw("/api/sync", String::new()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post_raw("/api/sync", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_then_rank() {
    let app = spawn_app(generous()).await;
    app.mount_commits(json!([
        commit("aaa", "alice", "Add alpha feature"),
        commit("bbb", "bob", "Fix beta crash"),
        commit("bot", "github-actions[bot]", "Update lockfile"),
        commit("mmm", "carol", "Merge pull request #9"),
    ]))
    .await;

    let (status, body) = app.post("/api/sync", json!({ "token": "gh" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "count": 2 }));

    app.post("/api/votes", json!({ "itemId": "bbb", "voterId": "u1" }))
        .await;

    let (_, body) = app.get("/api/commits").await;
    assert_eq!(ids(&body), vec!["bbb", "aaa"]);
    assert_eq!(body[0]["upvotes"], json!(1));
    assert_eq!(body[1]["upvotes"], json!(0));
    assert_eq!(body[0]["author"], json!("bob"));

    let (_, body) = app.get("/api/commits?search=ALPHA").await;
    assert_eq!(ids(&body), vec!["aaa"]);

    let (_, body) = app.get("/api/commits?search=").await;
    assert_eq!(ids(&body).len(), 2);
}

#[tokio::test]
async fn test_failed_sync_keeps_previous_snapshot() {
    let app = spawn_app(generous()).await;
    app.mount_commits(json!([commit("aaa", "alice", "Keep me")]))
        .await;
    app.post("/api/sync", json!({ "token": "gh" })).await;

    app.upstream.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })))
        .mount(&app.upstream)
        .await;

    let (status, body) = app.post("/api/sync", json!({ "token": "expired" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "Failed to sync with GitHub: Upstream returned 401: Bad credentials" })
    );

    let (_, body) = app.get("/api/commits").await;
    assert_eq!(ids(&body), vec!["aaa"]);
}

#[tokio::test]
async fn test_sync_pulls() {
    let app = spawn_app(generous()).await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls"))
        .and(query_param("state", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "number": 77,
            "title": "Speed up ranking",
            "body": "Uses a hash map for counts",
            "user": { "login": "dana" },
            "state": "closed",
            "created_at": "2024-04-01T09:00:00Z",
            "merged_at": "2024-04-02T09:00:00Z",
            "html_url": "https://github.com/o/r/pull/77"
        }])))
        .mount(&app.upstream)
        .await;

    let (status, body) = app
        .post("/api/sync", json!({ "token": "gh", "kind": "pulls" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));

    let (_, body) = app.get("/api/pulls?search=hash%20map").await;
    assert_eq!(ids(&body), vec!["77"]);
    assert_eq!(body[0]["merged"], json!(true));
    assert_eq!(body[0]["state"], json!("closed"));

    let (_, body) = app.get("/api/commits").await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_vote_rate_limit() {
    let mut limits = generous();
    limits.votes = Window {
        window: Duration::from_secs(60),
        max_requests: 2,
    };
    let app = spawn_app(limits).await;

    for item in ["1", "2"] {
        let (status, _) = app
            .post("/api/votes", json!({ "itemId": item, "voterId": "u1" }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .post("/api/votes", json!({ "itemId": "3", "voterId": "u1" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({ "error": "Too many requests, please try again later" })
    );

    let (status, _) = app.get("/api/commits").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_general_rate_limit() {
    let mut limits = generous();
    limits.general = Window {
        window: Duration::from_secs(60),
        max_requests: 1,
    };
    let app = spawn_app(limits).await;

    assert_eq!(app.get("/health").await.0, StatusCode::OK);
    assert_eq!(app.get("/health").await.0, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_oauth_relay() {
    let app = spawn_app(generous()).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_abc",
            "token_type": "bearer",
            "scope": "read:user"
        })))
        .mount(&app.upstream)
        .await;

    let (status, body) = app.get("/auth/github").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing code" }));

    let (status, body) = app.get("/auth/github?code=xyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_token"], json!("gho_abc"));
}

#[tokio::test]
async fn test_static_index_with_security_headers() {
    let app = spawn_app(generous()).await;

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, headers, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("Commit Leaderboard"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_requests_reach_access_log() {
    let app = spawn_app(generous()).await;

    app.get("/health").await;
    app.get("/api/commits").await;

    assert_eq!(app.state.access_log.pending().await, 2);
    assert_eq!(app.state.access_log.flush().await.unwrap(), 2);

    let log = std::fs::read_to_string(app.state.config.log_dir.join("access.log")).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("\"/api/commits\""));
}
