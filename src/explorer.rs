//! Lichess opening explorer client.
//!
//! Given the moves played so far, the explorer reports how often each
//! continuation was played in the Lichess database, together with the
//! win/draw/loss totals of the position and the name of the opening the
//! position belongs to (when it has one).

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::BoxError;

pub const DEFAULT_EXPLORER_URL: &str = "https://explorer.lichess.ovh/lichess";

/// Aggregate results for a position or for a single continuation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Counts {
    #[serde(default)]
    pub white: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default)]
    pub black: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.white + self.draws + self.black
    }
}

/// One candidate continuation from the queried position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExplorerMove {
    pub uci: String,
    #[serde(default)]
    pub san: String,
    #[serde(flatten)]
    pub counts: Counts,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExplorerOpening {
    #[serde(default)]
    pub eco: String,
    pub name: String,
}

/// Explorer answer for one position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PositionStats {
    #[serde(flatten)]
    pub counts: Counts,
    #[serde(default)]
    pub moves: Vec<ExplorerMove>,
    #[serde(default)]
    pub opening: Option<ExplorerOpening>,
}

/// Source of crowd statistics for a move history.
#[async_trait]
pub trait MoveStatistics: Send + Sync {
    async fn position_stats(&self, history: &[String]) -> Result<PositionStats, BoxError>;
}

/// HTTP client for the opening explorer.
pub struct ExplorerClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl ExplorerClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl MoveStatistics for ExplorerClient {
    async fn position_stats(&self, history: &[String]) -> Result<PositionStats, BoxError> {
        let play = history.join(",");
        debug!("Explorer query: play={}", play);

        let stats = self
            .http
            .get(&self.url)
            .bearer_auth(&self.token)
            .query(&[("variant", "standard"), ("play", play.as_str())])
            .send()
            .await
            .map_err(|e| format!("Explorer request failed: {}", e))?
            .error_for_status()
            .map_err(|e| format!("Explorer returned error: {}", e))?
            .json::<PositionStats>()
            .await
            .map_err(|e| format!("Explorer response decode failed: {}", e))?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "white": 1212,
        "draws": 160,
        "black": 1100,
        "moves": [
            {"uci": "g1f3", "san": "Nf3", "averageRating": 1650, "white": 1000, "draws": 120, "black": 900, "game": null},
            {"uci": "f1c4", "san": "Bc4", "averageRating": 1590, "white": 200, "draws": 38, "black": 190, "game": null},
            {"uci": "d2d4", "san": "d4", "averageRating": 1600, "white": 12, "draws": 2, "black": 10, "game": null}
        ],
        "topGames": [],
        "opening": {"eco": "C20", "name": "King's Pawn Game"}
    }"#;

    #[test]
    fn test_decode_explorer_response() {
        let stats: PositionStats = serde_json::from_str(RESPONSE).unwrap();
        assert_eq!(stats.counts.total(), 2472);
        assert_eq!(stats.moves.len(), 3);
        assert_eq!(stats.moves[1].uci, "f1c4");
        assert_eq!(stats.moves[1].counts.total(), 428);
        assert_eq!(
            stats.opening.map(|o| o.name),
            Some("King's Pawn Game".to_string())
        );
    }

    #[test]
    fn test_decode_without_opening() {
        let stats: PositionStats =
            serde_json::from_str(r#"{"white": 0, "draws": 0, "black": 0, "moves": [], "opening": null}"#)
                .unwrap();
        assert_eq!(stats.counts.total(), 0);
        assert!(stats.moves.is_empty());
        assert!(stats.opening.is_none());
    }
}
