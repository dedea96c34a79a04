//! The slice of the Lichess Bot API the bot uses, and its `licheszter`
//! implementation.
//!
//! Streams are pumped from a dedicated task into a channel so the rest of
//! the bot only sees the crate's own event types.

use async_trait::async_trait;
use licheszter::client::Licheszter;
use licheszter::models::board::{BoardState, Event};
use log::debug;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::challenge::{ChallengeInfo, Rematch};
use crate::BoxError;

/// A stream of events, each of which may be a transport error.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, BoxError>> + Send>>;

const STREAM_BUFFER: usize = 32;

/// Event on the account-wide stream.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    Challenge(ChallengeInfo),
    /// Cancelled by the challenger or declined by the opponent.
    ChallengeGone { id: String },
    GameStart { id: String },
    GameFinish { id: String },
    Other,
}

/// Event on a single game's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// First message of every game stream: the full game so far.
    Full { moves: Vec<String>, status: String },
    State { moves: Vec<String>, status: String },
    Chat { username: String, text: String },
}

/// Split a Lichess move string (`"e2e4 e7e5"`) into moves.
pub fn parse_moves(moves: &str) -> Vec<String> {
    moves.split_whitespace().map(str::to_string).collect()
}

/// Commands and streams of the Lichess Bot API.
#[async_trait]
pub trait LichessApi: Send + Sync {
    async fn stream_events(&self) -> Result<EventStream<IncomingEvent>, BoxError>;
    async fn stream_game(&self, game_id: &str) -> Result<EventStream<GameEvent>, BoxError>;
    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BoxError>;
    async fn decline_challenge(&self, challenge_id: &str) -> Result<(), BoxError>;
    async fn post_message(&self, game_id: &str, text: &str) -> Result<(), BoxError>;
    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BoxError>;
    async fn resign(&self, game_id: &str) -> Result<(), BoxError>;
    async fn create_challenge(&self, rematch: &Rematch) -> Result<(), BoxError>;
}

/// [`LichessApi`] backed by the `licheszter` client.
pub struct LicheszterApi {
    token: String,
    client: Licheszter,
}

impl LicheszterApi {
    pub fn new(token: String) -> Self {
        let client = Licheszter::new(token.clone());
        Self { token, client }
    }
}

fn transport_error<E: std::fmt::Debug>(context: &str, e: E) -> BoxError {
    format!("{}: {:?}", context, e).into()
}

impl From<Event> for IncomingEvent {
    fn from(event: Event) -> Self {
        match event {
            Event::Challenge { challenge, .. } => IncomingEvent::Challenge(ChallengeInfo {
                id: challenge.id,
                variant: challenge.variant.key,
                color: challenge.color,
                challenger: challenge.challenger.map(|u| u.username.to_lowercase()),
                dest_user: challenge.dest_user.map(|u| u.username.to_lowercase()),
            }),
            Event::ChallengeCanceled { challenge } | Event::ChallengeDeclined { challenge } => {
                IncomingEvent::ChallengeGone { id: challenge.id }
            }
            Event::GameStart { game } => IncomingEvent::GameStart { id: game.id },
            Event::GameFinish { game } => IncomingEvent::GameFinish { id: game.id },
            other => {
                debug!("Unhandled event: {:?}", other);
                IncomingEvent::Other
            }
        }
    }
}

impl From<BoardState> for GameEvent {
    fn from(state: BoardState) -> Self {
        match state {
            BoardState::GameFull(full) => GameEvent::Full {
                moves: parse_moves(&full.state.moves),
                status: full.state.status,
            },
            BoardState::GameState(state) => GameEvent::State {
                moves: parse_moves(&state.moves),
                status: state.status,
            },
            BoardState::ChatLine(line) => GameEvent::Chat {
                username: line.username,
                text: line.text,
            },
        }
    }
}

#[async_trait]
impl LichessApi for LicheszterApi {
    async fn stream_events(&self) -> Result<EventStream<IncomingEvent>, BoxError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = Licheszter::new(self.token.clone());

        tokio::spawn(async move {
            let mut stream = match client.stream_events().await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(transport_error("Failed to stream events", e))).await;
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                let item = item
                    .map(IncomingEvent::from)
                    .map_err(|e| transport_error("Event stream error", e));
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn stream_game(&self, game_id: &str) -> Result<EventStream<GameEvent>, BoxError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = Licheszter::new(self.token.clone());
        let game_id = game_id.to_string();

        tokio::spawn(async move {
            let mut stream = match client.stream_game_state(&game_id).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(transport_error("Failed to stream game", e))).await;
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                let item = item
                    .map(GameEvent::from)
                    .map_err(|e| transport_error("Game stream error", e));
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BoxError> {
        self.client
            .challenge_accept(challenge_id)
            .await
            .map_err(|e| transport_error("Accept failed", e))
    }

    async fn decline_challenge(&self, challenge_id: &str) -> Result<(), BoxError> {
        self.client
            .challenge_decline(challenge_id, None)
            .await
            .map_err(|e| transport_error("Decline failed", e))
    }

    async fn post_message(&self, game_id: &str, text: &str) -> Result<(), BoxError> {
        self.client
            .write_to_chat(game_id, "player", text)
            .await
            .map_err(|e| transport_error("Chat failed", e))
    }

    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BoxError> {
        self.client
            .make_move(game_id, uci, false)
            .await
            .map_err(|e| transport_error("Move failed", e))
    }

    async fn resign(&self, game_id: &str) -> Result<(), BoxError> {
        self.client
            .resign_game(game_id)
            .await
            .map_err(|e| transport_error("Resign failed", e))
    }

    async fn create_challenge(&self, rematch: &Rematch) -> Result<(), BoxError> {
        let rated = rematch.rated.to_string();
        let form = vec![
            ("rated", rated.as_str()),
            ("color", rematch.color.as_str()),
            ("variant", rematch.variant.as_str()),
        ];
        self.client
            .challenge_create(&rematch.username, Some(&form))
            .await
            .map(|_| ())
            .map_err(|e| transport_error("Challenge failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moves() {
        assert_eq!(parse_moves("e2e4 e7e5  g1f3"), vec!["e2e4", "e7e5", "g1f3"]);
        assert!(parse_moves("").is_empty());
    }
}
