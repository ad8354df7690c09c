//! Replay scheduler - holds the decoded frames and emits them in order.
//!
//! Two mutually exclusive modes:
//! - **Free-run**: one background tokio task sleeps each frame's recorded
//!   delay, then delivers it. Subscribers run on that task.
//! - **Clocked**: the scheduler registers on a [`TickSource`]; each tick
//!   delivers the next frame on the ticking thread. No task is spawned.
//!
//! Every `start` bumps a generation counter. Work left over from an earlier
//! cycle (a task that has not yet observed cancellation, a stale tick
//! handler) compares generations and does nothing.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use kinlog_core::CompositeFrame;
use log::{debug, info};
use serde::Serialize;
use strum::Display;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::ticker::TickSource;
use crate::error::{Error, Result};

/// Callback invoked with every delivered frame
pub type FrameCallback = Arc<dyn Fn(&Arc<CompositeFrame>) + Send + Sync + 'static>;

/// Identifies a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// How playback is paced
#[derive(Clone)]
pub enum PlaybackMode {
    /// Sleep the recorded delay before each frame
    FreeRun,
    /// One frame per tick of an external source, recorded delays ignored
    Clocked(Arc<dyn TickSource>),
}

impl std::fmt::Debug for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMode::FreeRun => write!(f, "FreeRun"),
            PlaybackMode::Clocked(_) => write!(f, "Clocked"),
        }
    }
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Running,
    Finished,
}

/// State shared with the playback task and tick handlers
struct Shared {
    subscribers: RwLock<Vec<(SubscriptionId, FrameCallback)>>,
    next_subscription: AtomicU64,
    state: Mutex<PlaybackState>,
    generation: AtomicU64,
    delivered: AtomicUsize,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Open a new playback cycle
    fn begin(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.delivered.store(0, Ordering::SeqCst);
        *state = PlaybackState::Running;
        generation
    }

    /// Mark the cycle finished, unless a newer cycle has started
    fn finish(&self, generation: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_current(generation) && *state == PlaybackState::Running {
            *state = PlaybackState::Finished;
            info!(
                "Playback finished after {} frames",
                self.delivered.load(Ordering::SeqCst)
            );
        }
    }

    /// Invalidate the running cycle
    fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if *state == PlaybackState::Running {
            *state = PlaybackState::Finished;
        }
    }

    fn deliver(&self, generation: u64, frame: &Arc<CompositeFrame>) {
        if !self.is_current(generation) {
            return;
        }
        // Snapshot so callbacks may subscribe or unsubscribe
        let subscribers: Vec<FrameCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(frame);
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

enum Launch {
    FreeRun(Handle),
    Clocked(Arc<dyn TickSource>),
}

enum ActiveRun {
    FreeRun(CancellationToken),
    Clocked(Arc<dyn TickSource>),
}

/// Ordered frame buffer plus playback driver
pub struct ReplayScheduler {
    frames: Arc<[Arc<CompositeFrame>]>,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveRun>>,
}

impl ReplayScheduler {
    pub fn new(frames: Vec<CompositeFrame>) -> Self {
        let frames: Arc<[Arc<CompositeFrame>]> = frames.into_iter().map(Arc::new).collect();
        Self {
            frames,
            shared: Arc::new(Shared {
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
                state: Mutex::new(PlaybackState::Idle),
                generation: AtomicU64::new(0),
                delivered: AtomicUsize::new(0),
            }),
            active: Mutex::new(None),
        }
    }

    pub fn frames(&self) -> &[Arc<CompositeFrame>] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlaybackState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == PlaybackState::Finished
    }

    /// Frames delivered in the current cycle
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Sum of the recorded delays, i.e. free-run playback length
    pub fn duration_ms(&self) -> i64 {
        self.frames
            .iter()
            .fold(0i64, |acc, f| acc.saturating_add(f.timestamp_ms.max(0)))
    }

    /// Register a callback. Callbacks run in registration order.
    pub fn subscribe(&self, callback: FrameCallback) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Start playback from the first frame.
    ///
    /// Any earlier activity is stopped first, so calling `start` again
    /// restarts playback. Free-run needs to be called from within a tokio
    /// runtime.
    pub fn start(&self, mode: PlaybackMode) -> Result<()> {
        // Resolve the runtime before touching any state
        let launch = match mode {
            PlaybackMode::FreeRun => Launch::FreeRun(Handle::try_current().map_err(|_| {
                Error::InvalidState("free-run playback needs a tokio runtime")
            })?),
            PlaybackMode::Clocked(ticks) => Launch::Clocked(ticks),
        };

        self.stop();
        let generation = self.shared.begin();

        let run = match launch {
            Launch::FreeRun(runtime) => {
                debug!("Free-run playback starting ({} frames)", self.frames.len());
                let token = CancellationToken::new();
                runtime.spawn(free_run(
                    Arc::clone(&self.frames),
                    Arc::clone(&self.shared),
                    generation,
                    token.clone(),
                ));
                ActiveRun::FreeRun(token)
            }
            Launch::Clocked(ticks) => {
                debug!("Clocked playback starting ({} frames)", self.frames.len());
                if self.frames.is_empty() {
                    self.shared.finish(generation);
                } else {
                    ticks.start(clocked_handler(
                        Arc::clone(&self.frames),
                        Arc::clone(&self.shared),
                        generation,
                        Arc::downgrade(&ticks),
                    ));
                }
                ActiveRun::Clocked(ticks)
            }
        };

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(run);
        Ok(())
    }

    /// Cancel playback. Safe to call when idle or already finished.
    pub fn stop(&self) {
        let run = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(run) = run else {
            return;
        };

        self.shared.cancel();
        match run {
            ActiveRun::FreeRun(token) => token.cancel(),
            ActiveRun::Clocked(ticks) => ticks.stop(),
        }
        debug!("Playback stopped after {} frames", self.delivered());
    }
}

impl Drop for ReplayScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn free_run(
    frames: Arc<[Arc<CompositeFrame>]>,
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
) {
    for frame in frames.iter() {
        // Negative deltas play immediately
        let delay = Duration::from_millis(frame.timestamp_ms.max(0) as u64);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            break;
        }
        shared.deliver(generation, frame);
    }
    shared.finish(generation);
}

fn clocked_handler(
    frames: Arc<[Arc<CompositeFrame>]>,
    shared: Arc<Shared>,
    generation: u64,
    ticks: Weak<dyn TickSource>,
) -> Box<dyn FnMut() + Send + 'static> {
    let mut cursor = 0usize;
    Box::new(move || {
        if !shared.is_current(generation) {
            return;
        }
        if let Some(frame) = frames.get(cursor) {
            cursor += 1;
            shared.deliver(generation, frame);
        }
        if cursor >= frames.len() {
            shared.finish(generation);
            if let Some(ticks) = ticks.upgrade() {
                ticks.stop();
            }
        }
    })
}
