//! In-memory stand-ins for Lichess and the explorer used by the tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::api::{EventStream, GameEvent, IncomingEvent, LichessApi};
use super::challenge::Rematch;
use crate::explorer::{Counts, ExplorerMove, ExplorerOpening, MoveStatistics, PositionStats};
use crate::BoxError;

/// Outbound command observed by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Accept(String),
    Decline(String),
    Message(String, String),
    Move(String, String),
    Resign(String),
    Challenge(Rematch),
}

/// Scripted stream item; errors are kept as text so scripts can be built up front.
pub type Scripted<T> = Result<T, String>;

#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    incoming: Mutex<VecDeque<Vec<Scripted<IncomingEvent>>>>,
    games: Mutex<VecDeque<Vec<Scripted<GameEvent>>>>,
    failing_moves: AtomicU32,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events one connection to the account stream delivers.
    pub fn script_events(&self, events: Vec<Scripted<IncomingEvent>>) {
        self.incoming.lock().unwrap().push_back(events);
    }

    /// Queue the events one connection to a game stream delivers.
    pub fn script_game(&self, events: Vec<Scripted<GameEvent>>) {
        self.games.lock().unwrap().push_back(events);
    }

    /// Make the next `n` move submissions fail.
    pub fn fail_moves(&self, n: u32) {
        self.failing_moves.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn moves(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Move(_, uci) => Some(uci),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn into_stream<T: Send + 'static>(script: Option<Vec<Scripted<T>>>) -> Result<EventStream<T>, BoxError> {
    let script = script.ok_or("no scripted connection left")?;
    let items: Vec<Result<T, BoxError>> = script
        .into_iter()
        .map(|item| item.map_err(BoxError::from))
        .collect();
    Ok(Box::pin(tokio_stream::iter(items)))
}

#[async_trait]
impl LichessApi for RecordingApi {
    async fn stream_events(&self) -> Result<EventStream<IncomingEvent>, BoxError> {
        into_stream(self.incoming.lock().unwrap().pop_front())
    }

    async fn stream_game(&self, _game_id: &str) -> Result<EventStream<GameEvent>, BoxError> {
        into_stream(self.games.lock().unwrap().pop_front())
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BoxError> {
        self.record(Call::Accept(challenge_id.to_string()));
        Ok(())
    }

    async fn decline_challenge(&self, challenge_id: &str) -> Result<(), BoxError> {
        self.record(Call::Decline(challenge_id.to_string()));
        Ok(())
    }

    async fn post_message(&self, game_id: &str, text: &str) -> Result<(), BoxError> {
        self.record(Call::Message(game_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BoxError> {
        let failing = self.failing_moves.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_moves.store(failing - 1, Ordering::SeqCst);
            return Err("502 Bad Gateway".into());
        }
        self.record(Call::Move(game_id.to_string(), uci.to_string()));
        Ok(())
    }

    async fn resign(&self, game_id: &str) -> Result<(), BoxError> {
        self.record(Call::Resign(game_id.to_string()));
        Ok(())
    }

    async fn create_challenge(&self, rematch: &Rematch) -> Result<(), BoxError> {
        self.record(Call::Challenge(rematch.clone()));
        Ok(())
    }
}

/// Explorer answers keyed by the comma-joined history.
#[derive(Default)]
pub struct CannedStats {
    answers: HashMap<String, PositionStats>,
    queries: Mutex<Vec<Vec<String>>>,
}

impl CannedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `history` with the given continuations and their game counts.
    pub fn with(mut self, history: &[&str], moves: &[(&str, u64)], opening: Option<&str>) -> Self {
        let moves: Vec<ExplorerMove> = moves
            .iter()
            .map(|(uci, games)| ExplorerMove {
                uci: uci.to_string(),
                san: String::new(),
                counts: Counts { white: *games, draws: 0, black: 0 },
            })
            .collect();
        let total = moves.iter().map(|m| m.counts.total()).sum();
        self.answers.insert(
            history.join(","),
            PositionStats {
                counts: Counts { white: total, draws: 0, black: 0 },
                moves,
                opening: opening.map(|name| ExplorerOpening {
                    eco: String::new(),
                    name: name.to_string(),
                }),
            },
        );
        self
    }

    pub fn queries(&self) -> Vec<Vec<String>> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MoveStatistics for CannedStats {
    async fn position_stats(&self, history: &[String]) -> Result<PositionStats, BoxError> {
        self.queries.lock().unwrap().push(history.to_vec());
        Ok(self.answers.get(&history.join(",")).cloned().unwrap_or_default())
    }
}

pub fn line(moves: &[&str]) -> Vec<String> {
    moves.iter().map(|m| m.to_string()).collect()
}
