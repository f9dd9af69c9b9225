use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{PlayerId, PlayerInstance};

/// Cloneable capability over one registered player. The registry holds the
/// only strong reference, so a handle outliving its release degrades to a
/// no-op rather than resurrecting the player.
#[derive(Clone)]
pub struct PlayerHandle {
    id: PlayerId,
    instance: Weak<Mutex<Box<dyn PlayerInstance>>>,
}

impl PlayerHandle {
    pub(crate) fn new(id: PlayerId, instance: &Arc<Mutex<Box<dyn PlayerInstance>>>) -> Self {
        Self {
            id,
            instance: Arc::downgrade(instance),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    /// False once the player behind this handle has been released.
    pub fn is_live(&self) -> bool {
        self.instance.strong_count() > 0
    }

    pub fn play(&self) {
        if let Some(instance) = self.instance.upgrade() {
            instance.lock().play();
        }
    }

    pub fn pause(&self) {
        if let Some(instance) = self.instance.upgrade() {
            instance.lock().pause();
        }
    }

    pub fn set_looping(&self, looping: bool) {
        if let Some(instance) = self.instance.upgrade() {
            instance.lock().set_looping(looping);
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(instance) = self.instance.upgrade() {
            instance.lock().set_volume(volume);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.instance
            .upgrade()
            .map(|instance| instance.lock().is_playing())
            .unwrap_or(false)
    }
}

impl fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}
