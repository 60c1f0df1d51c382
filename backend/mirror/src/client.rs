use std::time::Duration;

use board::{CanonicalItem, CollectionKind};
use reqwest::{Client, Response, Url, header};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    models::{
        ACCEPT, DEFAULT_API_URL, DEFAULT_EXCLUDED_AUTHOR, DEFAULT_EXCLUDED_PREFIX,
        DEFAULT_MAX_PAGES, ErrorBody, PAGE_SIZE, RawCommit, RawPull, USER_AGENT,
    },
    utils::{next_link, normalize_commits, normalize_pulls},
};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream still advertised more pages after {max_pages} pages")]
    PageLimitExceeded { max_pages: u32 },

    #[error("Upstream pointed the next page at another origin: {0}")]
    ForeignNextLink(String),
}

/// Where to mirror from and what to leave out.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    /// Commits authored under this name are skipped.
    pub excluded_author: String,
    /// Commits whose message starts with this are skipped. Empty disables the filter.
    pub excluded_prefix: String,
    pub max_pages: u32,
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            excluded_author: DEFAULT_EXCLUDED_AUTHOR.to_string(),
            excluded_prefix: DEFAULT_EXCLUDED_PREFIX.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct GithubClient {
    client: Client,
    config: UpstreamConfig,
}

impl GithubClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn first_page_url(&self, kind: CollectionKind) -> String {
        let base = format!(
            "{}/repos/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo
        );

        match kind {
            CollectionKind::Commits => format!("{base}/commits?per_page={PAGE_SIZE}"),
            CollectionKind::Pulls => format!("{base}/pulls?state=all&per_page={PAGE_SIZE}"),
        }
    }

    pub async fn fetch_all(
        &self,
        kind: CollectionKind,
        token: &str,
    ) -> Result<Vec<CanonicalItem>, FetchError> {
        self.fetch_all_with(kind, token, |_, _| {}).await
    }

    /// Walks every page of `kind`, following `rel="next"` until it disappears.
    ///
    /// `on_page` gets the page number and the running item count after each page.
    /// Any failed page discards everything fetched so far.
    pub async fn fetch_all_with<F>(
        &self,
        kind: CollectionKind,
        token: &str,
        mut on_page: F,
    ) -> Result<Vec<CanonicalItem>, FetchError>
    where
        F: FnMut(u32, usize),
    {
        let mut items = Vec::new();
        let mut url = self.first_page_url(kind);
        let mut page = 0;

        loop {
            page += 1;
            debug!("Fetching {kind} page {page}: {url}");

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .header(header::ACCEPT, ACCEPT)
                .send()
                .await?;

            let response = check_status(response).await?;
            let next = next_link(response.headers());

            let normalized = match kind {
                CollectionKind::Commits => normalize_commits(
                    response.json::<Vec<RawCommit>>().await?,
                    &self.config.excluded_author,
                    &self.config.excluded_prefix,
                ),
                CollectionKind::Pulls => normalize_pulls(response.json::<Vec<RawPull>>().await?),
            };

            items.extend(normalized);
            on_page(page, items.len());

            match next {
                Some(next) if !same_origin(&next, &self.config.api_url) => {
                    warn!("Not following {kind} next page off the API origin: {next}");
                    return Err(FetchError::ForeignNextLink(next));
                }
                Some(_) if page >= self.config.max_pages => {
                    warn!("Giving up on {kind} after {page} pages");
                    return Err(FetchError::PageLimitExceeded {
                        max_pages: self.config.max_pages,
                    });
                }
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(items)
    }
}

/// The token only ever goes to the configured API's scheme, host and port.
fn same_origin(url: &str, api_url: &str) -> bool {
    match (Url::parse(url), Url::parse(api_url)) {
        (Ok(url), Ok(api_url)) => url.origin() == api_url.origin(),
        _ => false,
    }
}

async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|error| error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    warn!("Upstream returned {status}: {message}");

    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    })
}
