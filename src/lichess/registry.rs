//! Pending challenge contexts, keyed by game id.
//!
//! A challenge and the game it becomes arrive as separate events; the
//! registry carries the bot's color, the rematch parameters and the
//! chosen opening from one to the other. Each entry is handed out at most
//! once and removed when taken, or when the challenge goes away.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::challenge::PendingGame;

#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    pending: Arc<Mutex<HashMap<String, PendingGame>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, game_id: &str, pending: PendingGame) {
        self.pending.lock().await.insert(game_id.to_string(), pending);
    }

    /// Remove and return the context for `game_id`.
    pub async fn take(&self, game_id: &str) -> Option<PendingGame> {
        self.pending.lock().await.remove(game_id)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lichess::challenge::{Color, Rematch};

    fn pending() -> PendingGame {
        PendingGame {
            color: Color::White,
            rematch: Rematch::casual("alice", Color::White),
            opening: None,
        }
    }

    #[tokio::test]
    async fn test_take_consumes_entry() {
        let registry = ContextRegistry::new();
        registry.insert("game1", pending()).await;
        assert_eq!(registry.len().await, 1);

        assert_eq!(registry.take("game1").await, Some(pending()));
        assert_eq!(registry.take("game1").await, None);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let registry = ContextRegistry::new();
        let other = registry.clone();
        registry.insert("game1", pending()).await;
        assert!(other.take("game1").await.is_some());
    }
}
