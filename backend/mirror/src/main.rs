use std::{path::PathBuf, sync::Arc, time::Duration};

use board::{CollectionKind, CorruptPolicy, JsonStore};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mirror::{
    GithubClient, Orchestrator, UpstreamConfig,
    models::{DEFAULT_API_URL, DEFAULT_EXCLUDED_AUTHOR, DEFAULT_EXCLUDED_PREFIX, DEFAULT_MAX_PAGES},
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "REPO_OWNER")]
    owner: String,

    #[arg(long, env = "REPO_NAME")]
    repo: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// commits or pulls
    #[arg(long, default_value = "commits")]
    kind: CollectionKind,

    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "EXCLUDED_AUTHOR", default_value = DEFAULT_EXCLUDED_AUTHOR)]
    excluded_author: String,

    #[arg(long, env = "EXCLUDED_PREFIX", default_value = DEFAULT_EXCLUDED_PREFIX)]
    excluded_prefix: String,

    #[arg(long, env = "MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: u32,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, env = "CORRUPT_POLICY", default_value = "reseed")]
    corrupt_policy: CorruptPolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let config = UpstreamConfig {
        api_url: args.api_url,
        owner: args.owner,
        repo: args.repo,
        excluded_author: args.excluded_author,
        excluded_prefix: args.excluded_prefix,
        max_pages: args.max_pages,
        timeout: Duration::from_secs(args.timeout_secs),
    };

    let store = Arc::new(JsonStore::open(&args.data_dir, args.corrupt_policy).await?);
    let github = Arc::new(GithubClient::new(config)?);
    let orchestrator = Orchestrator::new(github, store.clone());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {msg}",
    )?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Fetching {}", args.kind));

    let count = orchestrator
        .sync_all_with(args.kind, &args.token, |page, total| {
            pb.set_message(format!("Fetched page {page} ({total} {})", args.kind));
        })
        .await;

    let count = match count {
        Ok(count) => count,
        Err(e) => {
            pb.abandon_with_message("Sync failed");
            return Err(e.into());
        }
    };

    pb.finish_with_message("Done");

    println!("Synced {count} {} into {}", args.kind, store.path(args.kind.items_key()).display());

    Ok(())
}
