//! Lichess Bot integration module.
//!
//! # Architecture
//!
//! ```text
//! Lichess API (NDJSON stream)
//!     ↕ licheszter client (api.rs)
//! LichessBot::run()
//!     ├── Challenge → accept/decline (challenge.rs rules)
//!     │       └── registry: color, rematch, opening for the game id
//!     ├── GameStart → spawn game_manager::play_game()
//!     │       ├── OpeningBook   (book moves, favorites)
//!     │       ├── ExplorerClient (crowd statistics)
//!     │       └── resign + rematch when out of moves
//!     ├── GameFinish → forget the task handle
//!     └── ChallengeCanceled → drop pending context
//! ```

pub mod api;
pub mod challenge;
pub mod game_manager;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::explorer::{MoveStatistics, DEFAULT_EXPLORER_URL};
use crate::opening::OpeningBook;
use crate::retry::RetryPolicy;
use crate::strategy::MOVE_THRESHOLD;
use crate::BoxError;
use api::{IncomingEvent, LichessApi};
use challenge::{ChallengeConfig, ChallengeInfo};
use game_manager::{GameSession, SessionSettings};
use registry::ContextRegistry;

/// Configuration for the Lichess bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Lichess API token.
    pub token: String,
    /// Bot's username on Lichess.
    pub bot_username: String,
    /// CSV file with the opening table.
    pub openings_path: PathBuf,
    /// Opening explorer endpoint.
    pub explorer_url: String,
    /// Share of a position's games a continuation needs to be played.
    pub move_threshold: f64,
    /// Maximum concurrent games.
    pub max_concurrent_games: usize,
    /// Backoff for outbound calls and stream reconnects.
    pub retry: RetryPolicy,
    /// Challenge acceptance rules.
    pub challenge: ChallengeConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            bot_username: "opening_bot".to_string(),
            openings_path: PathBuf::from("openings.csv"),
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            move_threshold: MOVE_THRESHOLD,
            max_concurrent_games: 8,
            retry: RetryPolicy::default(),
            challenge: ChallengeConfig::default(),
        }
    }
}

impl BotConfig {
    /// Create config from environment variables, with the token given on
    /// the command line.
    pub fn from_env(token: String) -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: env_parse("BOT_RETRY_ATTEMPTS", defaults.retry.max_attempts).max(1),
            base_delay: Duration::from_millis(env_parse(
                "BOT_RETRY_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
            ..defaults.retry
        };

        Self {
            token,
            bot_username: std::env::var("BOT_USERNAME").unwrap_or(defaults.bot_username),
            openings_path: std::env::var("BOT_OPENINGS")
                .map(PathBuf::from)
                .unwrap_or(defaults.openings_path),
            explorer_url: std::env::var("BOT_EXPLORER_URL").unwrap_or(defaults.explorer_url),
            move_threshold: env_parse("BOT_MOVE_THRESHOLD", defaults.move_threshold),
            max_concurrent_games: env_parse("BOT_MAX_GAMES", defaults.max_concurrent_games),
            retry,
            challenge: ChallengeConfig::from_env(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            bot_username: self.bot_username.clone(),
            move_threshold: self.move_threshold,
            retry: self.retry,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// The main Lichess bot.
///
/// Owns the API client, hands challenge context over to game sessions
/// and keeps track of the running ones.
pub struct LichessBot {
    api: Arc<dyn LichessApi>,
    stats: Arc<dyn MoveStatistics>,
    openings: Arc<OpeningBook>,
    config: BotConfig,
    registry: ContextRegistry,
    active_games: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl LichessBot {
    pub fn new(
        config: BotConfig,
        api: Arc<dyn LichessApi>,
        stats: Arc<dyn MoveStatistics>,
        openings: Arc<OpeningBook>,
    ) -> Self {
        Self {
            api,
            stats,
            openings,
            config,
            registry: ContextRegistry::new(),
            active_games: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the bot event loop. This is the main entry point.
    ///
    /// Reconnects the event stream with backoff; returns an error once
    /// the retry budget is spent without receiving any event.
    pub async fn run(&self) -> Result<(), BoxError> {
        info!(
            "Starting opening bot as {} ({} openings, max_games={})",
            self.config.bot_username,
            self.openings.len(),
            self.config.max_concurrent_games
        );

        let retry = self.config.retry;
        let mut failures: u32 = 0;

        loop {
            match self.api.stream_events().await {
                Ok(mut stream) => {
                    info!("Event stream connected. Waiting for events...");
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(event) => {
                                failures = 0;
                                self.handle_event(event).await;
                            }
                            Err(e) => {
                                warn!("Event stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("Failed to stream events: {}", e),
            }

            failures += 1;
            if failures >= retry.max_attempts {
                return Err(format!("Event stream lost after {} attempts", failures).into());
            }
            let delay = retry.delay_for(failures);
            info!("Reconnecting event stream in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Dispatch one account event.
    pub async fn handle_event(&self, event: IncomingEvent) {
        match event {
            IncomingEvent::Challenge(challenge) => self.on_challenge(challenge).await,

            IncomingEvent::GameStart { id } => self.on_game_start(&id).await,

            IncomingEvent::GameFinish { id } => {
                info!("[{}] Game finished", id);
                // The session winds down on its own once its stream closes.
                self.active_games.lock().await.remove(&id);
            }

            IncomingEvent::ChallengeGone { id } => {
                if self.registry.take(&id).await.is_some() {
                    debug!("[{}] Challenge withdrawn, context dropped", id);
                }
            }

            IncomingEvent::Other => {}
        }
    }

    async fn on_challenge(&self, challenge: ChallengeInfo) {
        info!(
            "[{}] Challenge from {} ({}, {})",
            challenge.id,
            challenge.challenger.as_deref().unwrap_or("unknown"),
            challenge.variant,
            challenge.color
        );

        let own = challenge::is_own_challenge(&challenge, &self.config.bot_username);

        if !challenge::should_accept(&challenge, &self.config.challenge) {
            if own {
                warn!("[{}] Own challenge does not match rules", challenge.id);
            } else {
                info!("[{}] Declining: does not match rules", challenge.id);
                self.decline(&challenge.id).await;
            }
            return;
        }

        if !own {
            let active_count = self.active_count().await;
            if active_count >= self.config.max_concurrent_games {
                info!(
                    "[{}] Declining: at max concurrent games ({}/{})",
                    challenge.id, active_count, self.config.max_concurrent_games
                );
                self.decline(&challenge.id).await;
                return;
            }
        }

        let pending = challenge::pending_game(&challenge, &self.config.bot_username, |user| {
            self.openings.favorite(user)
        });
        let Some(pending) = pending else {
            warn!("[{}] Challenge without opponent, declining", challenge.id);
            if !own {
                self.decline(&challenge.id).await;
            }
            return;
        };

        if own {
            info!(
                "[{}] Rematch offered to {} as {}",
                challenge.id, pending.rematch.username, pending.color
            );
        } else {
            info!("[{}] Accepting challenge, playing {}", challenge.id, pending.color);
            if let Err(e) = self.api.accept_challenge(&challenge.id).await {
                error!("[{}] Failed to accept: {}", challenge.id, e);
                return;
            }
        }

        self.registry.insert(&challenge.id, pending).await;
    }

    async fn on_game_start(&self, game_id: &str) {
        info!("[{}] Game started", game_id);

        let mut games = self.active_games.lock().await;
        games.retain(|_, handle| !handle.is_finished());
        if games.contains_key(game_id) {
            warn!("[{}] Session already running", game_id);
            return;
        }

        let Some(pending) = self.registry.take(game_id).await else {
            warn!("[{}] No challenge context for game, not playing it", game_id);
            return;
        };

        let session = GameSession::new(
            game_id,
            pending,
            Arc::clone(&self.api),
            Arc::clone(&self.stats),
            Arc::clone(&self.openings),
            self.config.session_settings(),
        );

        let game_id_str = game_id.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = game_manager::play_game(session).await {
                error!("[{}] Game error: {}", game_id_str, e);
            }
        });

        games.insert(game_id.to_string(), handle);
    }

    async fn decline(&self, challenge_id: &str) {
        if let Err(e) = self.api.decline_challenge(challenge_id).await {
            warn!("[{}] Failed to decline: {}", challenge_id, e);
        }
    }

    async fn active_count(&self) -> usize {
        let mut games = self.active_games.lock().await;
        games.retain(|_, handle| !handle.is_finished());
        games.len()
    }
}
