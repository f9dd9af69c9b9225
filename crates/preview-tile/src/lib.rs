use std::fmt;

use serde::{Deserialize, Serialize};

use player_manager::PlayerId;

mod fallback;
pub use fallback::*;
mod tile;
pub use tile::*;
mod strip;
pub use strip::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One item a tile can display: an id plus optional video and thumbnail
/// sources. Items without a video never trigger an acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ContentId::new(id),
            video_url: None,
            thumbnail_url: None,
        }
    }

    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Player key used at the manager; one per content item.
    pub fn player_id(&self) -> PlayerId {
        PlayerId::new(format!("preview_{}", self.id))
    }

    pub fn playable_source(&self) -> Option<&str> {
        self.video_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}
