//! Move choice: book first, then popular explorer continuations.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::explorer::PositionStats;

/// Share of the position's games a continuation needs to be considered.
pub const MOVE_THRESHOLD: f64 = 0.05;

/// Outcome of choosing a move for the current position.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveChoice {
    /// Next move of the drilled opening.
    Book(String),
    /// Random pick among the continuations that cleared the threshold.
    Explorer {
        uci: String,
        /// Games behind the threshold, i.e. `threshold / ratio`.
        games: u64,
    },
    /// Nothing left to play.
    Exhausted,
}

/// Book move at `index`, if the book reaches that far.
pub fn book_move(book: Option<&[String]>, index: usize) -> Option<&str> {
    book.and_then(|moves| moves.get(index)).map(String::as_str)
}

/// Minimum game count a continuation needs.
pub fn threshold(stats: &PositionStats, ratio: f64) -> f64 {
    stats.counts.total() as f64 * ratio
}

/// Continuations played in at least `threshold` games.
pub fn candidates(stats: &PositionStats, threshold: f64) -> Vec<&str> {
    stats
        .moves
        .iter()
        .filter(|m| m.counts.total() as f64 >= threshold)
        .map(|m| m.uci.as_str())
        .collect()
}

/// Pick the move for half-move `index` given the drilled opening and the
/// explorer answer for the current position.
pub fn choose_move<R: Rng + ?Sized>(
    book: Option<&[String]>,
    index: usize,
    stats: &PositionStats,
    ratio: f64,
    rng: &mut R,
) -> MoveChoice {
    if let Some(uci) = book_move(book, index) {
        return MoveChoice::Book(uci.to_string());
    }

    let threshold = threshold(stats, ratio);
    match candidates(stats, threshold).choose(rng) {
        Some(uci) => MoveChoice::Explorer {
            uci: uci.to_string(),
            games: (threshold / ratio).round() as u64,
        },
        None => MoveChoice::Exhausted,
    }
}
