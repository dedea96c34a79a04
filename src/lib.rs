//! Opening drill bot for Lichess.
//!
//! Accepts challenges, asks the opponent for an opening name, plays that
//! opening's moves from memory and, once the book runs out, picks moves
//! from the Lichess opening explorer. When the explorer has nothing left
//! to offer the bot resigns and challenges the same user again.

pub mod explorer;
pub mod lichess;
pub mod opening;
pub mod retry;
pub mod strategy;

/// Error type shared by every fallible async operation in the crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
