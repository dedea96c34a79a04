//! opening-drill: Lichess bot for practising openings.
//!
//! # Usage
//!
//! ```bash
//! # Optional
//! export BOT_USERNAME=opening_bot    # Bot account name
//! export BOT_OPENINGS=openings.csv   # Opening table
//! export BOT_MAX_GAMES=8             # Max concurrent games
//! export BOT_RETRY_ATTEMPTS=4        # Retry budget for Lichess/explorer calls
//! export RUST_LOG=info
//!
//! cargo run --release -- lip_xxxxx
//! ```

use dotenv::dotenv;
use log::info;
use std::sync::Arc;

use opening_drill::explorer::ExplorerClient;
use opening_drill::lichess::api::LicheszterApi;
use opening_drill::lichess::{BotConfig, LichessBot};
use opening_drill::opening::OpeningBook;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let token = match std::env::args().nth(1) {
        Some(token) if !token.is_empty() => token,
        _ => {
            eprintln!("Usage: opening-drill <lichess-api-token>");
            eprintln!("Get a token at: https://lichess.org/account/oauth/token");
            std::process::exit(1);
        }
    };

    let config = BotConfig::from_env(token);

    let openings = match OpeningBook::load(&config.openings_path) {
        Ok(openings) => openings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Config: username={}, openings={} ({}), threshold={}, max_games={}",
        config.bot_username,
        config.openings_path.display(),
        openings.len(),
        config.move_threshold,
        config.max_concurrent_games
    );

    let api = Arc::new(LicheszterApi::new(config.token.clone()));
    let stats = Arc::new(ExplorerClient::new(
        config.explorer_url.clone(),
        config.token.clone(),
    ));
    let bot = LichessBot::new(config, api, stats, Arc::new(openings));

    info!("Connecting to Lichess...");
    match bot.run().await {
        Ok(()) => info!("Bot shut down cleanly."),
        Err(e) => {
            eprintln!("Bot error: {}", e);
            std::process::exit(1);
        }
    }
}
