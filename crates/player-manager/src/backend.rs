use crate::{PlayerError, PlayerSpec};

/// Playback controls for one open player. Implementations wrap whatever
/// decoder or platform player the host application uses; dropping the
/// instance tears the underlying resource down.
pub trait PlayerInstance: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_looping(&mut self, looping: bool);
    fn set_volume(&mut self, volume: f32);
    fn is_playing(&self) -> bool;
}

/// Factory for playback resources. `open` may block (probe, buffer, attach a
/// decode session) and is always called from a manager worker thread, never
/// from the caller's thread.
pub trait PlayerBackend: Send + Sync {
    fn open(&self, spec: &PlayerSpec) -> Result<Box<dyn PlayerInstance>, PlayerError>;
}
