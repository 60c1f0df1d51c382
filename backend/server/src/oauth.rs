use std::time::Duration;

use reqwest::{Client, header::ACCEPT};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{config::OAuthConfig, error::AppError};

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

/// Trades an OAuth `code` for an access token on the client's behalf.
///
/// GitHub answers a bad code with 200 and an `error` field, which becomes
/// [`AppError::OAuthRejected`].
pub struct OAuthRelay {
    client: Client,
    config: OAuthConfig,
}

impl OAuthRelay {
    pub fn new(config: OAuthConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        if config.client_secret.is_none() {
            warn!("GITHUB_CLIENT_SECRET missing, /auth/github will fail");
        }

        Ok(Self { client, config })
    }

    pub async fn exchange(&self, code: &str) -> Result<Value, AppError> {
        let Some(client_secret) = self.config.client_secret.as_deref() else {
            return Err(AppError::OAuthFailed("OAuth is not configured".to_string()));
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json")
            .json(&ExchangeRequest {
                client_id: &self.config.client_id,
                client_secret,
                code,
            })
            .send()
            .await
            .map_err(|e| {
                warn!("OAuth request failed: {e}");
                AppError::OAuthFailed("GitHub unreachable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::OAuthFailed(format!("GitHub returned {status}")));
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!("Unreadable OAuth response: {e}");
            AppError::OAuthFailed("Unreadable response".to_string())
        })?;

        if let Some(error) = body.get("error") {
            let reason = body
                .get("error_description")
                .or(Some(error))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");

            return Err(AppError::OAuthRejected(reason.to_string()));
        }

        info!("Exchanged OAuth code");
        Ok(body)
    }
}
