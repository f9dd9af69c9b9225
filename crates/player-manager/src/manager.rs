use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    ManagerConfig, PlayerBackend, PlayerError, PlayerEvent, PlayerHandle, PlayerId, PlayerInstance,
    PlayerPriority, PlayerSpec,
};

/// Completion of an asynchronous acquisition. `token` echoes the caller's
/// correlation token so late replies can be told apart from current ones.
#[derive(Debug)]
pub enum AcquireReply {
    Ready {
        token: u64,
        handle: PlayerHandle,
    },
    Failed {
        token: u64,
        error: PlayerError,
    },
    /// The request's `wanted` flag was cleared before completion; any opened
    /// player was discarded without ever being registered.
    Stale {
        token: u64,
    },
}

struct PlayerRecord {
    instance: Arc<Mutex<Box<dyn PlayerInstance>>>,
    priority: PlayerPriority,
    seq: u64,
}

struct State {
    next_seq: u64,
    players: HashMap<PlayerId, PlayerRecord>,
}

/// Registry and arbiter for playback resources. At most one live player per
/// id; at most `max_players` live players overall; a newly acquired player
/// may evict a strictly lower priority one when the pool is full.
#[derive(Clone)]
pub struct PlayerManager {
    backend: Arc<dyn PlayerBackend>,
    inner: Arc<Mutex<State>>,
    subscribers: Arc<Mutex<Vec<Sender<PlayerEvent>>>>,
    max_players: usize,
}

impl PlayerManager {
    pub fn new(backend: Arc<dyn PlayerBackend>, config: ManagerConfig) -> Result<Self, PlayerError> {
        if config.max_players == 0 {
            return Err(PlayerError::InvalidConfig("max_players must be > 0"));
        }

        let manager = Self {
            backend,
            inner: Arc::new(Mutex::new(State {
                next_seq: 1,
                players: HashMap::new(),
            })),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            max_players: config.max_players,
        };

        info!(
            target = "player",
            max_players = manager.max_players,
            "player manager initialized"
        );

        Ok(manager)
    }

    /// Open a player on a worker thread and deliver the outcome through
    /// `reply`. The worker checks `wanted` at completion time: once the flag
    /// is cleared the opened player is dropped on the spot and never enters
    /// the registry, so callers that lose interest mid-flight cannot leak.
    pub fn acquire_async(
        &self,
        spec: PlayerSpec,
        token: u64,
        wanted: Arc<AtomicBool>,
        reply: Sender<AcquireReply>,
    ) {
        let manager = self.clone();
        thread::Builder::new()
            .name(format!("player-open-{}", spec.player_id))
            .spawn(move || {
                let outcome = manager.run_open(spec, token, wanted);
                let _ = reply.send(outcome);
            })
            .expect("failed to spawn player open thread");
    }

    fn run_open(&self, spec: PlayerSpec, token: u64, wanted: Arc<AtomicBool>) -> AcquireReply {
        if spec.source_url.trim().is_empty() {
            let error = PlayerError::InvalidSource(spec.source_url.clone());
            warn!(
                target = "player",
                id = %spec.player_id,
                "refusing to open player without a source"
            );
            self.emit(PlayerEvent::AcquireFailed {
                id: spec.player_id.clone(),
                error: error.to_string(),
            });
            return AcquireReply::Failed { token, error };
        }

        if !wanted.load(Ordering::Relaxed) {
            debug!(
                target = "player",
                id = %spec.player_id,
                "acquisition no longer wanted, skipping open"
            );
            return AcquireReply::Stale { token };
        }

        match self.backend.open(&spec) {
            Ok(instance) => match self.register(&spec, instance, &wanted) {
                Ok(Some(handle)) => {
                    info!(
                        target = "player",
                        id = %spec.player_id,
                        priority = ?spec.priority,
                        "player acquired"
                    );
                    self.emit(PlayerEvent::Acquired {
                        id: spec.player_id.clone(),
                        priority: spec.priority,
                    });
                    AcquireReply::Ready { token, handle }
                }
                Ok(None) => {
                    debug!(
                        target = "player",
                        id = %spec.player_id,
                        "discarding player opened for a stale request"
                    );
                    AcquireReply::Stale { token }
                }
                Err(error) => {
                    warn!(
                        target = "player",
                        id = %spec.player_id,
                        error = %error,
                        "player registration refused"
                    );
                    self.emit(PlayerEvent::AcquireFailed {
                        id: spec.player_id.clone(),
                        error: error.to_string(),
                    });
                    AcquireReply::Failed { token, error }
                }
            },
            Err(error) => {
                error!(
                    target = "player",
                    id = %spec.player_id,
                    error = %error,
                    "backend failed to open player"
                );
                self.emit(PlayerEvent::AcquireFailed {
                    id: spec.player_id.clone(),
                    error: error.to_string(),
                });
                AcquireReply::Failed { token, error }
            }
        }
    }

    /// Insert the freshly opened player, honoring the pool cap. Returns
    /// `Ok(None)` when `wanted` was cleared before insertion; the re-check
    /// happens under the registry lock so a clear-then-release sequence on
    /// the caller side can never interleave into a leaked registration.
    fn register(
        &self,
        spec: &PlayerSpec,
        instance: Box<dyn PlayerInstance>,
        wanted: &AtomicBool,
    ) -> Result<Option<PlayerHandle>, PlayerError> {
        let handle;
        let replaced;
        let mut evicted = None;
        {
            let mut inner = self.inner.lock();
            if !wanted.load(Ordering::Relaxed) {
                return Ok(None);
            }

            // Re-acquiring an id replaces the previous player outright.
            replaced = inner.players.remove(&spec.player_id).map(|r| r.instance);

            if replaced.is_none() && inner.players.len() >= self.max_players {
                let victim = inner
                    .players
                    .iter()
                    .filter(|(_, record)| record.priority < spec.priority)
                    .min_by_key(|(_, record)| (record.priority, record.seq))
                    .map(|(id, _)| id.clone());
                match victim {
                    Some(id) => {
                        if let Some(record) = inner.players.remove(&id) {
                            evicted = Some((id, record.instance));
                        }
                    }
                    None => return Err(PlayerError::PoolExhausted(inner.players.len())),
                }
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            let shared = Arc::new(Mutex::new(instance));
            handle = PlayerHandle::new(spec.player_id.clone(), &shared);
            inner.players.insert(
                spec.player_id.clone(),
                PlayerRecord {
                    instance: shared,
                    priority: spec.priority,
                    seq,
                },
            );
        }

        if let Some(instance) = replaced {
            instance.lock().pause();
            debug!(
                target = "player",
                id = %spec.player_id,
                "replaced previously registered player"
            );
            self.emit(PlayerEvent::Released {
                id: spec.player_id.clone(),
            });
        }
        if let Some((id, instance)) = evicted {
            instance.lock().pause();
            info!(
                target = "player",
                id = %id,
                "evicted lower priority player to stay under pool cap"
            );
            self.emit(PlayerEvent::Released { id });
        }

        Ok(Some(handle))
    }

    /// Remove and tear down one player. Releasing an id that is not live is
    /// a no-op.
    pub fn release(&self, id: &PlayerId) {
        let removed = { self.inner.lock().players.remove(id) };
        match removed {
            Some(record) => {
                record.instance.lock().pause();
                info!(target = "player", id = %id, "player released");
                self.emit(PlayerEvent::Released { id: id.clone() });
            }
            None => {
                debug!(target = "player", id = %id, "release ignored, player not live");
            }
        }
    }

    /// Pause every live player except `keep`. This is the single-active
    /// arbitration point: tiles never talk to their siblings, they ask the
    /// manager to quiesce everyone else. Safe to call concurrently.
    pub fn pause_all_except(&self, keep: Option<&PlayerId>) {
        let others: Vec<(PlayerId, Arc<Mutex<Box<dyn PlayerInstance>>>)> = {
            let inner = self.inner.lock();
            inner
                .players
                .iter()
                .filter(|&(id, _)| Some(id) != keep)
                .map(|(id, record)| (id.clone(), Arc::clone(&record.instance)))
                .collect()
        };
        for (id, instance) in others {
            instance.lock().pause();
            debug!(target = "player", id = %id, "paused for exclusive playback");
        }
        self.emit(PlayerEvent::PausedAll {
            except: keep.cloned(),
        });
    }

    pub fn pause_all(&self) {
        self.pause_all_except(None);
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().players.len()
    }

    pub fn is_live(&self, id: &PlayerId) -> bool {
        self.inner.lock().players.contains_key(id)
    }

    fn emit(&self, event: PlayerEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TestInstance {
        label: String,
        playing: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl PlayerInstance for TestInstance {
        fn play(&mut self) {
            self.playing = true;
            self.log.lock().push(format!("play {}", self.label));
        }

        fn pause(&mut self) {
            self.playing = false;
            self.log.lock().push(format!("pause {}", self.label));
        }

        fn set_looping(&mut self, looping: bool) {
            self.log.lock().push(format!("loop {} {}", self.label, looping));
        }

        fn set_volume(&mut self, volume: f32) {
            self.log.lock().push(format!("volume {} {}", self.label, volume));
        }

        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    impl Drop for TestInstance {
        fn drop(&mut self) {
            self.log.lock().push(format!("close {}", self.label));
        }
    }

    struct TestBackend {
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl PlayerBackend for TestBackend {
        fn open(&self, spec: &PlayerSpec) -> Result<Box<dyn PlayerInstance>, PlayerError> {
            self.log.lock().push(format!("open {}", spec.player_id));
            if self.fail {
                return Err(PlayerError::BackendFailed("scripted failure".into()));
            }
            Ok(Box::new(TestInstance {
                label: spec.player_id.to_string(),
                playing: false,
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn manager(max_players: usize, fail: bool) -> (PlayerManager, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(TestBackend {
            log: Arc::clone(&log),
            fail,
        });
        let manager = PlayerManager::new(backend, ManagerConfig { max_players }).unwrap();
        (manager, log)
    }

    fn acquire(
        manager: &PlayerManager,
        id: &str,
        priority: PlayerPriority,
        wanted: bool,
    ) -> AcquireReply {
        let (tx, rx) = unbounded();
        manager.acquire_async(
            PlayerSpec {
                player_id: PlayerId::new(id),
                source_url: format!("https://cdn.test/{id}.mp4"),
                priority,
            },
            7,
            Arc::new(AtomicBool::new(wanted)),
            tx,
        );
        rx.recv_timeout(Duration::from_secs(2)).expect("acquire reply")
    }

    #[test]
    fn acquire_registers_player() {
        let (manager, _log) = manager(4, false);
        let events = manager.subscribe();

        let reply = acquire(&manager, "preview_a", PlayerPriority::Current, true);
        let handle = match reply {
            AcquireReply::Ready { handle, token } => {
                assert_eq!(token, 7);
                handle
            }
            other => panic!("expected ready, got {other:?}"),
        };

        assert_eq!(handle.id(), &PlayerId::new("preview_a"));
        assert!(handle.is_live());
        assert_eq!(manager.live_count(), 1);
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            PlayerEvent::Acquired { .. }
        ));
    }

    #[test]
    fn backend_failure_registers_nothing() {
        let (manager, log) = manager(4, true);

        let reply = acquire(&manager, "preview_a", PlayerPriority::Current, true);
        assert!(matches!(
            reply,
            AcquireReply::Failed {
                error: PlayerError::BackendFailed(_),
                ..
            }
        ));
        assert_eq!(manager.live_count(), 0);
        assert_eq!(log.lock().as_slice(), ["open preview_a"]);
    }

    #[test]
    fn empty_source_is_rejected_before_open() {
        let (manager, log) = manager(4, false);
        let (tx, rx) = unbounded();
        manager.acquire_async(
            PlayerSpec {
                player_id: PlayerId::new("preview_a"),
                source_url: "  ".into(),
                priority: PlayerPriority::Current,
            },
            1,
            Arc::new(AtomicBool::new(true)),
            tx,
        );
        let reply = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            reply,
            AcquireReply::Failed {
                error: PlayerError::InvalidSource(_),
                ..
            }
        ));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn unwanted_completion_is_never_registered() {
        let (manager, log) = manager(4, false);

        let reply = acquire(&manager, "preview_a", PlayerPriority::Current, false);
        assert!(matches!(reply, AcquireReply::Stale { token: 7 }));
        assert_eq!(manager.live_count(), 0);
        // The flag was already cleared when the worker started, so the open
        // itself is skipped.
        assert!(log.lock().is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let (manager, log) = manager(4, false);
        let id = PlayerId::new("preview_a");

        let _ = acquire(&manager, "preview_a", PlayerPriority::Current, true);
        manager.release(&id);
        manager.release(&id);

        assert_eq!(manager.live_count(), 0);
        assert!(!manager.is_live(&id));
        let entries = log.lock();
        assert_eq!(
            entries.iter().filter(|e| e.starts_with("close")).count(),
            1
        );
    }

    #[test]
    fn pause_all_except_quiesces_siblings() {
        let (manager, _log) = manager(4, false);

        let a = match acquire(&manager, "preview_a", PlayerPriority::Current, true) {
            AcquireReply::Ready { handle, .. } => handle,
            other => panic!("expected ready, got {other:?}"),
        };
        let b = match acquire(&manager, "preview_b", PlayerPriority::Current, true) {
            AcquireReply::Ready { handle, .. } => handle,
            other => panic!("expected ready, got {other:?}"),
        };
        a.play();
        b.play();

        manager.pause_all_except(Some(a.id()));

        assert!(a.is_playing());
        assert!(!b.is_playing());
    }

    #[test]
    fn full_pool_evicts_lowest_priority_oldest() {
        let (manager, _log) = manager(2, false);
        let first = PlayerId::new("preview_a");

        let _ = acquire(&manager, "preview_a", PlayerPriority::Background, true);
        let _ = acquire(&manager, "preview_b", PlayerPriority::Nearby, true);
        let reply = acquire(&manager, "preview_c", PlayerPriority::Current, true);

        assert!(matches!(reply, AcquireReply::Ready { .. }));
        assert_eq!(manager.live_count(), 2);
        assert!(!manager.is_live(&first));
        assert!(manager.is_live(&PlayerId::new("preview_b")));
        assert!(manager.is_live(&PlayerId::new("preview_c")));
    }

    #[test]
    fn full_pool_without_evictable_player_fails() {
        let (manager, _log) = manager(1, false);

        let _ = acquire(&manager, "preview_a", PlayerPriority::Current, true);
        let reply = acquire(&manager, "preview_b", PlayerPriority::Current, true);

        assert!(matches!(
            reply,
            AcquireReply::Failed {
                error: PlayerError::PoolExhausted(1),
                ..
            }
        ));
        assert!(manager.is_live(&PlayerId::new("preview_a")));
    }

    #[test]
    fn stale_handle_operations_are_noops() {
        let (manager, log) = manager(4, false);
        let handle = match acquire(&manager, "preview_a", PlayerPriority::Current, true) {
            AcquireReply::Ready { handle, .. } => handle,
            other => panic!("expected ready, got {other:?}"),
        };

        manager.release(handle.id());
        assert!(!handle.is_live());

        let before = log.lock().len();
        handle.play();
        handle.set_volume(0.0);
        assert!(!handle.is_playing());
        assert_eq!(log.lock().len(), before);
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(TestBackend { log, fail: false });
        assert!(matches!(
            PlayerManager::new(backend, ManagerConfig { max_players: 0 }),
            Err(PlayerError::InvalidConfig(_))
        ));
    }
}
