use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use player_manager::{AcquireReply, PlayerHandle, PlayerManager, PlayerPriority, PlayerSpec};

use crate::{ContentId, ContentItem, FallbackView};

/// Lifecycle of one preview tile. A player handle is held only in `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    Idle,
    Acquiring,
    Active,
    Failed,
}

/// Emitted on every state transition; the rendering layer subscribes and
/// redraws on receipt instead of hooking framework rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEvent {
    pub content_id: ContentId,
    pub from: TileState,
    pub to: TileState,
}

/// Decides when to acquire and when to release a preview player as the
/// owning list flips the tile's activation signal and eventually tears the
/// tile down. The tile never mutates the signal, it only reacts to
/// transitions; the manager owns the player itself.
pub struct PreviewTile {
    content: ContentItem,
    manager: PlayerManager,
    state: TileState,
    handle: Option<PlayerHandle>,
    mounted: bool,
    active: bool,
    /// Bumped per acquisition attempt; replies carrying an older token are
    /// stale and must release instead of adopting.
    epoch: u64,
    /// Liveness flag for the in-flight request, cleared on deactivation so
    /// the manager worker discards a completion we no longer want.
    wanted: Option<Arc<AtomicBool>>,
    reply_tx: Sender<AcquireReply>,
    reply_rx: Receiver<AcquireReply>,
    last_error: Option<String>,
    subscribers: Vec<Sender<TileEvent>>,
}

impl PreviewTile {
    pub fn new(content: ContentItem, manager: PlayerManager) -> Self {
        let (reply_tx, reply_rx) = unbounded();
        Self {
            content,
            manager,
            state: TileState::Idle,
            handle: None,
            mounted: true,
            active: false,
            epoch: 0,
            wanted: None,
            reply_tx,
            reply_rx,
            last_error: None,
            subscribers: Vec::new(),
        }
    }

    pub fn content(&self) -> &ContentItem {
        &self.content
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The held player handle, present only while `Active`.
    pub fn current_handle(&self) -> Option<&PlayerHandle> {
        self.handle.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn subscribe(&mut self) -> Receiver<TileEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// React to the externally owned activation signal; no-op unless the
    /// value actually changed.
    pub fn set_active(&mut self, active: bool) {
        if active == self.active {
            return;
        }
        if active {
            self.on_activate();
        } else {
            self.on_deactivate();
        }
    }

    /// Activation edge. Skips silently when there is no playable source, and
    /// keeps at most one outstanding acquisition: re-entrant calls while
    /// `Acquiring` or `Active` do nothing.
    pub fn on_activate(&mut self) {
        self.active = true;
        if !self.mounted {
            return;
        }
        if matches!(self.state, TileState::Acquiring | TileState::Active) {
            return;
        }
        let Some(source) = self.content.playable_source() else {
            debug!(
                target = "preview",
                content = %self.content.id,
                "no playable source, skipping acquisition"
            );
            return;
        };

        self.epoch += 1;
        let wanted = Arc::new(AtomicBool::new(true));
        self.wanted = Some(Arc::clone(&wanted));
        self.last_error = None;

        let spec = PlayerSpec {
            player_id: self.content.player_id(),
            source_url: source.to_string(),
            priority: PlayerPriority::Current,
        };
        info!(
            target = "preview",
            content = %self.content.id,
            "requesting preview player"
        );
        self.transition(TileState::Acquiring);
        self.manager
            .acquire_async(spec, self.epoch, wanted, self.reply_tx.clone());
    }

    /// Deactivation edge. Idempotent: from `Idle` this changes nothing.
    /// Otherwise the wanted flag is cleared first, then the player id is
    /// released synchronously; that ordering guarantees an in-flight worker
    /// either sees the cleared flag or registers before our release removes
    /// the entry again.
    pub fn on_deactivate(&mut self) {
        self.active = false;
        if let Some(wanted) = self.wanted.take() {
            wanted.store(false, Ordering::Relaxed);
        }
        if self.state == TileState::Idle {
            return;
        }

        self.handle = None;
        self.manager.release(&self.content.player_id());
        self.last_error = None;
        self.transition(TileState::Idle);
    }

    /// Must run before the tile ceases to exist, regardless of the current
    /// activation signal. Also wired into `Drop` as a leak backstop.
    pub fn on_destroy(&mut self) {
        if !self.mounted {
            return;
        }
        self.on_deactivate();
        self.mounted = false;
        debug!(target = "preview", content = %self.content.id, "tile destroyed");
    }

    /// Drain acquisition completions. Called by the owner once per tick.
    pub fn poll(&mut self) {
        while let Ok(reply) = self.reply_rx.try_recv() {
            self.handle_reply(reply);
        }
    }

    fn handle_reply(&mut self, reply: AcquireReply) {
        match reply {
            AcquireReply::Ready { token, handle } => {
                let live = self.mounted
                    && self.active
                    && self.state == TileState::Acquiring
                    && token == self.epoch;
                if !live {
                    debug!(
                        target = "preview",
                        content = %self.content.id,
                        "discarding stale player completion"
                    );
                    // Release only if this exact instance is still registered;
                    // releasing by id alone could tear down a newer player
                    // acquired under the same content id.
                    if handle.is_live() {
                        self.manager.release(handle.id());
                    }
                    // A reply from an old epoch says nothing about the
                    // current acquisition; only a current-epoch orphan may
                    // reset the state.
                    if self.state == TileState::Acquiring && token == self.epoch {
                        self.transition(TileState::Idle);
                    }
                    return;
                }

                // Exclusive playback, then preview semantics: loop, muted.
                self.manager.pause_all_except(Some(handle.id()));
                handle.set_looping(true);
                handle.set_volume(0.0);
                handle.play();

                info!(
                    target = "preview",
                    content = %self.content.id,
                    "preview playing"
                );
                self.wanted = None;
                self.handle = Some(handle);
                self.transition(TileState::Active);
            }
            AcquireReply::Failed { token, error } => {
                if token != self.epoch || self.state != TileState::Acquiring {
                    debug!(
                        target = "preview",
                        content = %self.content.id,
                        "ignoring stale acquisition failure"
                    );
                    return;
                }
                warn!(
                    target = "preview",
                    content = %self.content.id,
                    error = %error,
                    "preview acquisition failed"
                );
                self.wanted = None;
                self.last_error = Some(error.to_string());
                self.transition(TileState::Failed);
            }
            AcquireReply::Stale { .. } => {
                // The worker already discarded the player; nothing is held.
                debug!(
                    target = "preview",
                    content = %self.content.id,
                    "acquisition discarded before completion"
                );
            }
        }
    }

    /// What to draw right now: live output while `Active`, otherwise the
    /// static thumbnail, with an error indicator after a failed acquisition.
    pub fn fallback_view(&self) -> FallbackView {
        if self.state == TileState::Active && self.handle.is_some() {
            return FallbackView::Live;
        }
        let error = if self.state == TileState::Failed {
            Some(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| "preview unavailable".to_string()),
            )
        } else {
            None
        };
        match (self.content.thumbnail_url.clone(), error) {
            (Some(url), Some(message)) => FallbackView::ThumbnailWithError { url, message },
            (Some(url), None) => FallbackView::Thumbnail { url },
            (None, Some(message)) => FallbackView::PlaceholderWithError { message },
            (None, None) => FallbackView::Placeholder,
        }
    }

    fn transition(&mut self, to: TileState) {
        let from = std::mem::replace(&mut self.state, to);
        if from == to {
            return;
        }
        let event = TileEvent {
            content_id: self.content.id.clone(),
            from,
            to,
        };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for PreviewTile {
    fn drop(&mut self) {
        self.on_destroy();
    }
}
