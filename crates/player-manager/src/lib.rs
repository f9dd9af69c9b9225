use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod backend;
pub use backend::*;
mod handle;
pub use handle::*;
mod manager;
pub use manager::*;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("source is not playable: {0}")]
    InvalidSource(String),
    #[error("backend failed to open player: {0}")]
    BackendFailed(String),
    #[error("player pool exhausted ({0} live players)")]
    PoolExhausted(usize),
    #[error("invalid manager config: {0}")]
    InvalidConfig(&'static str),
}

/// Key for one playback resource. Owners derive it from their content id so
/// repeated requests for the same content coalesce onto one player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contention rank for a player. `Current` means "visible right now" and wins
/// pool arbitration against everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerPriority {
    Background,
    Nearby,
    Current,
}

/// One acquisition request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSpec {
    pub player_id: PlayerId,
    pub source_url: String,
    pub priority: PlayerPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlayerEvent {
    Acquired {
        id: PlayerId,
        priority: PlayerPriority,
    },
    AcquireFailed {
        id: PlayerId,
        error: String,
    },
    Released {
        id: PlayerId,
    },
    PausedAll {
        except: Option<PlayerId>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Upper bound on simultaneously open players.
    pub max_players: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { max_players: 4 }
    }
}
