//! relay-check - Verify X and Telegram credentials
//!
//! Run once after setting up the configuration and the credential variables,
//! before scheduling `relay-run`.

use anyhow::Result;
use clap::Parser;
use librelaycast::sink::TelegramSink;
use librelaycast::source::XClient;
use librelaycast::{logging, Config, Credentials, RelayError};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "relay-check")]
#[command(version)]
#[command(about = "Verify X and Telegram credentials")]
#[command(long_about = "\
relay-check - Verify X and Telegram credentials

DESCRIPTION:
    Loads the relaycast configuration and credentials, then makes one
    authenticated call to each API:

    X:        GET /2/users/me (prints the authenticated username)
    Telegram: getMe (prints the bot name)

    Nothing is posted and no state is touched.

EXIT CODES:
    0 - Both APIs accepted the credentials
    1 - At least one API check failed
    2 - Configuration error
")]
struct Cli {}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();

    let _ = dotenvy::dotenv();
    logging::init_default();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<RelayError>()
                .map(RelayError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

/// Returns whether both checks passed
async fn run() -> Result<bool> {
    let config = Config::load()?;
    let Credentials { telegram_token, x } = Credentials::from_env()?;
    let group_id = config.group_id().unwrap_or_default().to_string();

    let mut all_ok = true;

    let x_client = XClient::new(&config.x.api_base, x, config.x.timeout())?;
    match x_client.me().await {
        Ok(user) => println!("✓ X: authenticated as @{} ({})", user.username, user.id),
        Err(e) => {
            println!("✗ X: {}", e);
            all_ok = false;
        }
    }

    let telegram = TelegramSink::new(
        &config.telegram.api_base,
        telegram_token,
        group_id,
        config.telegram.timeout(),
    )?;
    match telegram.get_me().await {
        Ok(bot) => {
            let username = bot
                .username
                .map(|name| format!(" (@{})", name))
                .unwrap_or_default();
            println!("✓ Telegram: bot {}{}", bot.first_name, username);
        }
        Err(e) => {
            println!("✗ Telegram: {}", e);
            all_ok = false;
        }
    }

    if all_ok {
        println!("\nAll checks passed, {} accounts configured", config.accounts.len());
    }
    Ok(all_ok)
}
