use serde::{Deserialize, Serialize};

/// What the rendering layer should draw for a tile right now. Pure data; the
/// actual thumbnail renderer lives with the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FallbackView {
    /// A live player is attached; draw its output.
    Live,
    Thumbnail { url: String },
    /// Thumbnail plus an error glyph and short message.
    ThumbnailWithError { url: String, message: String },
    Placeholder,
    PlaceholderWithError { message: String },
}

impl FallbackView {
    pub fn is_live(&self) -> bool {
        matches!(self, FallbackView::Live)
    }

    pub fn shows_error(&self) -> bool {
        matches!(
            self,
            FallbackView::ThumbnailWithError { .. } | FallbackView::PlaceholderWithError { .. }
        )
    }
}
