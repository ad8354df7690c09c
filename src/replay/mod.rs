//! Replay of trimodal recordings.
//!
//! A [`ReplaySession`] decodes a whole recording into composite frames and
//! hands them to a [`ReplayScheduler`], which emits them either at the
//! recorded pace ([`PlaybackMode::FreeRun`]) or one per external tick
//! ([`PlaybackMode::Clocked`]).
//!
//! ```text
//!  byte source ──► ReplaySession::open ──► Vec<CompositeFrame>
//!                                                │
//!                      ReplayScheduler ◄─────────┘
//!                   (tokio task or TickSource)
//!                            │
//!                            ▼ one marshal hop
//!                      Dispatcher ──► on_frame_ready subscribers
//! ```

pub mod scheduler;
pub mod session;
pub mod ticker;

pub use scheduler::{FrameCallback, PlaybackMode, PlaybackState, ReplayScheduler, SubscriptionId};
pub use session::{ReplaySession, ReplayStatus};
pub use ticker::{IntervalTicker, ManualTicker, TickHandler, TickSource};
