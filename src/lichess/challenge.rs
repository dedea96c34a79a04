//! Challenge acceptance rules and the context a challenge leaves behind
//! for the game it turns into.

use log::debug;
use std::fmt;

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Parse a Lichess color key. `random` and unknown keys give `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "white" => Some(Color::White),
            "black" => Some(Color::Black),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Whether this side owns half-move `ply` (0-based, white moves first).
    pub fn owns_ply(self, ply: i32) -> bool {
        match self {
            Color::White => ply % 2 == 0,
            Color::Black => ply % 2 == 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a Lichess challenge the bot cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInfo {
    pub id: String,
    /// Variant key, e.g. `standard`.
    pub variant: String,
    /// Color requested by the challenger: `white`, `black` or `random`.
    pub color: String,
    /// Lowercased challenger username.
    pub challenger: Option<String>,
    /// Lowercased username of the challenged player.
    pub dest_user: Option<String>,
}

/// Parameters for challenging the same opponent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rematch {
    pub username: String,
    pub rated: bool,
    /// Color the bot plays.
    pub color: Color,
    pub variant: String,
}

impl Rematch {
    pub fn casual(username: impl Into<String>, color: Color) -> Self {
        Self {
            username: username.into(),
            rated: false,
            color,
            variant: "standard".to_string(),
        }
    }
}

/// Everything a game session needs to know that only the challenge carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGame {
    pub color: Color,
    pub rematch: Rematch,
    /// Opening chosen ahead of time, if the opponent already has a favorite.
    pub opening: Option<Vec<String>>,
}

/// Configuration for which challenges to accept.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Accepted variants (empty = accept all).
    pub accepted_variants: Vec<String>,
    /// Blocked usernames (lowercase).
    pub blocked_users: Vec<String>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            accepted_variants: vec!["standard".to_string()],
            blocked_users: Vec::new(),
        }
    }
}

impl ChallengeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let variants = std::env::var("BOT_VARIANTS")
            .unwrap_or_else(|_| "standard".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let blocked = std::env::var("BOT_BLOCKED_USERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            accepted_variants: variants,
            blocked_users: blocked,
        }
    }
}

/// Decide whether a challenge can be played.
///
/// 1. Challenger must not be blocked
/// 2. Variant must be accepted
/// 3. Color must be explicit, since the rematch replays the same color
pub fn should_accept(challenge: &ChallengeInfo, config: &ChallengeConfig) -> bool {
    if let Some(ref challenger) = challenge.challenger {
        if config.blocked_users.contains(challenger) {
            debug!("Declining: user {} is blocked", challenger);
            return false;
        }
    }

    if !config.accepted_variants.is_empty() {
        let variant = challenge.variant.to_lowercase();
        if !config.accepted_variants.contains(&variant) {
            debug!("Declining: variant {} not accepted", variant);
            return false;
        }
    }

    if Color::from_key(&challenge.color).is_none() {
        debug!("Declining: color {} is not explicit", challenge.color);
        return false;
    }

    true
}

/// Context for a challenge that passed [`should_accept`].
///
/// When the bot issued the challenge itself (a rematch), it plays the
/// requested color and the opening is the destination user's favorite,
/// looked up through `favorite`. Otherwise the bot plays the opposite of
/// what the challenger asked for and waits for an opening name in chat.
pub fn pending_game<F>(
    challenge: &ChallengeInfo,
    bot_username: &str,
    favorite: F,
) -> Option<PendingGame>
where
    F: FnOnce(&str) -> Option<Vec<String>>,
{
    let requested = Color::from_key(&challenge.color)?;

    if is_own_challenge(challenge, bot_username) {
        let opponent = challenge.dest_user.clone()?;
        let opening = favorite(&opponent);
        Some(PendingGame {
            color: requested,
            rematch: Rematch::casual(opponent, requested),
            opening,
        })
    } else {
        let opponent = challenge.challenger.clone()?;
        let color = requested.opposite();
        Some(PendingGame {
            color,
            rematch: Rematch::casual(opponent, color),
            opening: None,
        })
    }
}

/// Whether the bot itself issued this challenge.
pub fn is_own_challenge(challenge: &ChallengeInfo, bot_username: &str) -> bool {
    challenge
        .challenger
        .as_deref()
        .map_or(false, |c| c.eq_ignore_ascii_case(bot_username))
}
