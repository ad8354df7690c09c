//! Tick sources for clocked playback.
//!
//! Clocked playback never sleeps on its own. It registers a handler with a
//! [`TickSource`] and advances one frame per tick, on whatever thread the
//! source ticks from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::ReplayOptions;

/// Callback invoked on every tick
pub type TickHandler = Box<dyn FnMut() + Send + 'static>;

/// An externally driven recurring tick
pub trait TickSource: Send + Sync {
    /// Register `handler` and begin ticking. Replaces any previous handler.
    fn start(&self, handler: TickHandler);

    /// Stop ticking and drop the handler. Safe to call from inside the
    /// handler and when already stopped.
    fn stop(&self);
}

// =============================================================================
// ManualTicker
// =============================================================================

/// Tick source driven by explicit [`ManualTicker::tick`] calls.
///
/// Suits callers that already own a frame loop (a UI timer, a render loop)
/// and want playback to advance in step with it. Ticks from several threads
/// are serialized, never dropped. A handler must not call `tick` itself.
#[derive(Default)]
pub struct ManualTicker {
    /// Held for the duration of one tick
    turn: Mutex<()>,
    /// Registration generation plus handler. The handler is taken out while
    /// it runs so that it may call `stop` without deadlocking.
    slot: Mutex<Option<(u64, TickHandler)>>,
    generation: AtomicU64,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick. Returns `false` when no handler is registered.
    pub fn tick(&self) -> bool {
        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some((generation, mut handler)) = taken else {
            return false;
        };

        handler();

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() && self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some((generation, handler));
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl TickSource for ManualTicker {
    fn start(&self, handler: TickHandler) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((generation, handler));
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

// =============================================================================
// IntervalTicker
// =============================================================================

/// Tick source backed by a tokio interval.
///
/// Ticks run on the given runtime. The first tick fires one period after
/// `start`. Periods shorter than a millisecond are raised to one.
pub struct IntervalTicker {
    runtime: Handle,
    period: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl IntervalTicker {
    pub fn new(runtime: Handle, period: Duration) -> Self {
        Self {
            runtime,
            period: period.max(MIN_PERIOD),
            running: Mutex::new(None),
        }
    }

    pub fn from_options(runtime: Handle, options: &ReplayOptions) -> Self {
        Self::new(runtime, options.tick_interval())
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for IntervalTicker {
    fn start(&self, mut handler: TickHandler) {
        let token = CancellationToken::new();
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let period = self.period;
        debug!("Interval ticker started ({:?})", period);
        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        handler();
                    }
                }
            }
        });
    }

    fn stop(&self) {
        if let Some(token) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
            debug!("Interval ticker stopped");
        }
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
