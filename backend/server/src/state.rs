use std::sync::Arc;

use anyhow::Context;
use board::{JsonStore, RankingView, VoteLedger};
use mirror::{GithubClient, Orchestrator};

use super::{access_log::AccessLog, config::Config, limit::Limiters, oauth::OAuthRelay};

pub struct State {
    pub config: Config,
    pub ledger: VoteLedger,
    pub ranking: RankingView,
    pub orchestrator: Orchestrator,
    pub oauth: OAuthRelay,
    pub access_log: AccessLog,
    pub limiters: Limiters,
}

impl State {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(
            JsonStore::open(&config.data_dir, config.corrupt_policy)
                .await
                .context("Failed to open data directory")?,
        );

        let github = Arc::new(
            GithubClient::new(config.upstream.clone()).context("Failed to build GitHub client")?,
        );
        let oauth = OAuthRelay::new(config.oauth.clone(), config.upstream.timeout)
            .context("Failed to build OAuth client")?;

        let access_log = AccessLog::new();
        access_log
            .init_file(config.log_dir.join("access.log"))
            .await
            .context("Failed to open access log")?;

        Ok(Arc::new(Self {
            ledger: VoteLedger::new(store.clone()),
            ranking: RankingView::new(store.clone()),
            orchestrator: Orchestrator::new(github, store),
            oauth,
            access_log,
            limiters: Limiters::new(&config.limits),
            config,
        }))
    }
}
