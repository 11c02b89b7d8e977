//! relay-run - Forward new X posts into Telegram forum topics
//!
//! Meant to be run from cron: each invocation polls (by default) one account,
//! forwards its unseen posts and exits.

use clap::Parser;
use librelaycast::error::ConfigError;
use librelaycast::sink::TelegramSink;
use librelaycast::source::{FetchSettings, Fetcher, XClient};
use librelaycast::{
    logging, Config, Credentials, FileStore, Relay, Result, RunLock, RunOptions, StateStore,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "relay-run")]
#[command(version)]
#[command(about = "Forward new X posts into Telegram forum topics")]
#[command(long_about = "\
relay-run - Forward new X posts into Telegram forum topics

DESCRIPTION:
    Polls the X API for recent posts from the configured accounts and
    sends every post not forwarded before into the account's topic of a
    Telegram supergroup. Forwarded post ids are recorded in the state
    directory so each post is delivered once.

    To stay within API quotas each run polls a single account, rotating
    through the configured accounts one run at a time.

USAGE:
    # One rotation step (typical cron entry)
    relay-run

    # Poll every account now
    relay-run --all

    # Record posts as forwarded without sending anything
    relay-run --dry-run

CONFIGURATION:
    Configuration file: ~/.config/relaycast/config.toml
    (override with RELAYCAST_CONFIG)

    [telegram]
    group_id = \"-1001234567890\"

    [[accounts]]
    handle = \"oraichain\"
    topic_id = \"12\"

    Credentials are read from the environment or a .env file:
    TELEGRAM_BOT_TOKEN, X_API_KEY, X_API_SECRET, X_ACCESS_TOKEN,
    X_ACCESS_SECRET

    Overlapping invocations are single-flight: a run that finds the
    previous one still holding the state lock logs it and exits 0.

EXIT CODES:
    0 - Run completed or skipped (per-post failures are logged, not fatal)
    1 - State directory or HTTP client could not be set up
    2 - Configuration error
")]
struct Cli {
    /// Poll every configured account instead of the next one in rotation
    #[arg(long)]
    all: bool,

    /// Do all bookkeeping but do not send anything to Telegram
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();
    logging::init_default();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Everything required is checked before the first network call
    let config = Config::load()?;
    let Credentials { telegram_token, x } = Credentials::from_env()?;
    let group_id = config
        .group_id()
        .ok_or_else(|| ConfigError::MissingField("telegram.group_id".to_string()))?
        .to_string();

    let state_dir = config.state_dir()?;
    let Some(_lock) = RunLock::try_acquire(&state_dir)? else {
        warn!(
            "Previous run still active (lock {} held), skipping this run",
            state_dir.join(RunLock::FILE_NAME).display()
        );
        return Ok(());
    };
    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(&state_dir));

    let fetcher = Fetcher::new(
        XClient::new(&config.x.api_base, x, config.x.timeout())?,
        store.clone(),
        FetchSettings::from(&config.x),
    );
    let sink = TelegramSink::new(
        &config.telegram.api_base,
        telegram_token,
        group_id,
        config.telegram.timeout(),
    )?;
    let relay = Relay::new(config.accounts.clone(), store, Box::new(fetcher), Box::new(sink));

    let options = RunOptions {
        force_all: cli.all,
        dry_run: cli.dry_run,
    };
    info!(
        "relay-run starting ({} accounts, state in {})",
        relay.accounts().len(),
        state_dir.display()
    );

    let report = relay.run(options).await;

    info!(
        processed = report.processed_count,
        failed = report.failed_count,
        polled = ?report.polled,
        "relay-run finished"
    );
    Ok(())
}
