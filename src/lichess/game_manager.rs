//! Per-game session.
//!
//! Each active game runs in its own tokio task. The session:
//! - Asks the opponent for an opening name unless one is already known
//! - Plays the opening's moves while the book lasts
//! - Falls back to popular explorer continuations afterwards
//! - Resigns and re-challenges the opponent when the explorer runs dry
//!
//! Turn-taking is driven by a half-move counter (`ply`). A negative value
//! means the session is still waiting for an opening name; game states
//! that arrive during that time are held back and the latest one is
//! replayed once the opening is settled.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio_stream::StreamExt;

use super::api::{GameEvent, LichessApi};
use super::challenge::{Color, PendingGame, Rematch};
use crate::explorer::MoveStatistics;
use crate::opening::OpeningBook;
use crate::retry::RetryPolicy;
use crate::strategy::{choose_move, MoveChoice, MOVE_THRESHOLD};
use crate::BoxError;

const AWAITING_OPENING: i32 = -2;

const INTRO: [&str; 4] = [
    "Please provide correct name of opening from lichess database! For example:",
    "Italian Game: Deutz Gambit",
    "or",
    "Sicilian Defense: Hyperaccelerated Dragon",
];

/// Tunables shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub bot_username: String,
    pub move_threshold: f64,
    pub retry: RetryPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bot_username: "opening_bot".to_string(),
            move_threshold: MOVE_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

/// Whether the session should keep reading its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    GameOver,
}

pub struct GameSession {
    game_id: String,
    api: Arc<dyn LichessApi>,
    stats: Arc<dyn MoveStatistics>,
    openings: Arc<OpeningBook>,
    settings: SessionSettings,
    color: Color,
    rematch: Rematch,
    opening: Option<Vec<String>>,
    ply: i32,
    cached_state: Option<Vec<String>>,
    introduced: bool,
    rng: StdRng,
}

impl GameSession {
    pub fn new(
        game_id: &str,
        pending: PendingGame,
        api: Arc<dyn LichessApi>,
        stats: Arc<dyn MoveStatistics>,
        openings: Arc<OpeningBook>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            game_id: game_id.to_string(),
            api,
            stats,
            openings,
            settings,
            color: pending.color,
            rematch: pending.rematch,
            opening: pending.opening,
            ply: AWAITING_OPENING,
            cached_state: None,
            introduced: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source used to pick among explorer moves.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn ply(&self) -> i32 {
        self.ply
    }

    pub fn opening(&self) -> Option<&[String]> {
        self.opening.as_deref()
    }

    pub async fn handle_event(&mut self, event: GameEvent) -> Result<Flow, BoxError> {
        match event {
            GameEvent::Full { moves, status } => {
                if is_finished(&status) {
                    info!("[{}] Game already over: {}", self.game_id, status);
                    return Ok(Flow::GameOver);
                }
                self.on_game_full(moves).await?;
            }
            GameEvent::State { moves, status } => {
                if is_finished(&status) {
                    info!("[{}] Game ended: {}", self.game_id, status);
                    return Ok(Flow::GameOver);
                }
                self.on_game_state(moves).await?;
            }
            GameEvent::Chat { username, text } => self.on_chat(&username, &text).await?,
        }
        Ok(Flow::Continue)
    }

    async fn on_game_full(&mut self, moves: Vec<String>) -> Result<(), BoxError> {
        if self.ply >= 0 {
            info!(
                "[{}] Reconnected after {} moves, resuming",
                self.game_id,
                moves.len()
            );
            self.ply = moves.len() as i32;
            return self.on_game_state(moves).await;
        }

        // Moves already on the board are held like any early game state.
        if !moves.is_empty() {
            self.cached_state = Some(moves);
        }

        if !self.introduced {
            info!(
                "[{}] Playing {} against {} (opening {})",
                self.game_id,
                self.color,
                self.rematch.username,
                if self.opening.is_some() { "known" } else { "pending" }
            );
            for line in INTRO {
                self.say(line).await?;
            }
            self.introduced = true;
            if self.opening.is_some() {
                self.begin().await?;
            }
        }
        Ok(())
    }

    async fn on_game_state(&mut self, moves: Vec<String>) -> Result<(), BoxError> {
        if self.ply < 0 {
            debug!("[{}] Holding game state until an opening is chosen", self.game_id);
            self.cached_state = Some(moves);
            return Ok(());
        }
        if self.color.owns_ply(self.ply) {
            self.select_move(&moves).await?;
        }
        self.ply += 1;
        Ok(())
    }

    async fn on_chat(&mut self, username: &str, text: &str) -> Result<(), BoxError> {
        if self.ply >= 0 || username.eq_ignore_ascii_case(&self.settings.bot_username) {
            return Ok(());
        }

        if self.opening.is_none() {
            let moves = self.openings.lookup(text.trim());
            if moves.is_empty() {
                info!("[{}] Unknown opening '{}'", self.game_id, text);
                self.say("Opening not found!").await?;
            } else {
                info!("[{}] Drilling '{}' ({} moves)", self.game_id, text, moves.len());
                self.say("Opening found!").await?;
            }
            self.openings.set_favorite(&self.rematch.username, moves.clone());
            self.opening = Some(moves);
        }

        self.begin().await
    }

    /// Leave the waiting state: move now as white, or catch up as black.
    async fn begin(&mut self) -> Result<(), BoxError> {
        match self.color {
            Color::White => {
                self.ply = 0;
                self.select_move(&[]).await?;
                self.ply += 1;
            }
            Color::Black => {
                self.ply = 1;
                if let Some(moves) = self.cached_state.take() {
                    self.on_game_state(moves).await?;
                }
            }
        }
        Ok(())
    }

    async fn select_move(&mut self, history: &[String]) -> Result<(), BoxError> {
        let source = Arc::clone(&self.stats);
        let stats = self
            .settings
            .retry
            .run("Explorer query", || source.position_stats(history))
            .await?;

        if let Some(opening) = &stats.opening {
            self.say(&opening.name).await?;
        }

        let choice = choose_move(
            self.opening.as_deref(),
            self.ply as usize,
            &stats,
            self.settings.move_threshold,
            &mut self.rng,
        );

        match choice {
            MoveChoice::Book(uci) => {
                info!("[{}] Book move {} at ply {}", self.game_id, uci, self.ply);
                self.play(&uci).await
            }
            MoveChoice::Explorer { uci, games } => {
                info!("[{}] Explorer move {} ({} games)", self.game_id, uci, games);
                self.say(&format!("Choosing out of {} games!", games)).await?;
                self.play(&uci).await
            }
            MoveChoice::Exhausted => {
                info!("[{}] Out of moves, resigning", self.game_id);
                self.say("Out of moves!").await?;
                self.resign_and_rematch().await
            }
        }
    }

    async fn resign_and_rematch(&self) -> Result<(), BoxError> {
        let api = Arc::clone(&self.api);
        let game_id = self.game_id.as_str();
        self.settings
            .retry
            .run("Resign", || api.resign(game_id))
            .await?;

        let rematch = &self.rematch;
        self.settings
            .retry
            .run("Rematch challenge", || api.create_challenge(rematch))
            .await?;
        info!(
            "[{}] Challenged {} again as {}",
            self.game_id, rematch.username, rematch.color
        );
        Ok(())
    }

    async fn play(&self, uci: &str) -> Result<(), BoxError> {
        let api = Arc::clone(&self.api);
        let game_id = self.game_id.as_str();
        self.settings
            .retry
            .run("Move", || api.make_move(game_id, uci))
            .await
    }

    async fn say(&self, text: &str) -> Result<(), BoxError> {
        let api = Arc::clone(&self.api);
        let game_id = self.game_id.as_str();
        self.settings
            .retry
            .run("Chat", || api.post_message(game_id, text))
            .await
    }

    /// Read one connection of the game stream until the game ends or the
    /// connection fails. `failures` is reset whenever an event is handled.
    async fn run_stream(&mut self, failures: &mut u32) -> Result<(), BoxError> {
        let mut stream = self.api.stream_game(&self.game_id).await?;
        while let Some(event) = stream.next().await {
            if self.handle_event(event?).await? == Flow::GameOver {
                return Ok(());
            }
            *failures = 0;
        }
        debug!("[{}] Game stream closed", self.game_id);
        Ok(())
    }
}

fn is_finished(status: &str) -> bool {
    !matches!(status, "created" | "started")
}

/// Play a single game on Lichess.
///
/// Reconnects the game stream with backoff when it fails, and gives up
/// once the retry budget is spent without any event getting through.
pub async fn play_game(mut session: GameSession) -> Result<(), BoxError> {
    let retry = session.settings.retry;
    let mut failures = 0;

    loop {
        match session.run_stream(&mut failures).await {
            Ok(()) => {
                info!("[{}] Session finished", session.game_id);
                return Ok(());
            }
            Err(e) => {
                failures += 1;
                if failures >= retry.max_attempts {
                    return Err(format!(
                        "Game {} abandoned after {} failures: {}",
                        session.game_id, failures, e
                    )
                    .into());
                }
                let delay = retry.delay_for(failures);
                warn!(
                    "[{}] Session error ({}/{}): {}. Reconnecting in {:?}",
                    session.game_id, failures, retry.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
