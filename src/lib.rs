//! # Kinlog
//!
//! Capture and replay of trimodal sensor streams: color images, depth images
//! and skeleton tracking, multiplexed into one append-only binary log.
//!
//! ## Architecture
//!
//! The wire format lives in [`kinlog_core`], which is pure encoding with no
//! threads. This crate adds the runtime: a thread-safe capture session and a
//! replay session driven by [`tokio`] or by an external tick source.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         kinlog                           │
//! │  ┌────────────────┐              ┌─────────────────────┐ │
//! │  │ CaptureSession │              │ ReplaySession       │ │
//! │  │ (Mutex<sink>)  │              │ (eager decode)      │ │
//! │  └───────┬────────┘              └──────────┬──────────┘ │
//! │          │                                  ▼            │
//! │          │                       ┌─────────────────────┐ │
//! │          │                       │ ReplayScheduler     │ │
//! │          │                       │ free-run / clocked  │ │
//! │          │                       └──────────┬──────────┘ │
//! │          │                                  ▼            │
//! │          │                       ┌─────────────────────┐ │
//! │          │                       │ Dispatcher          │ │
//! │          │                       └─────────────────────┘ │
//! └──────────┼──────────────────────────────────▲────────────┘
//!            ▼                                  │
//!       kinlog-core codec ── byte sink / source ┘
//! ```
//!
//! ## Key Components
//!
//! - [`CaptureSession`] - Records live frames with per-stream timing
//! - [`ReplaySession`] - Validates, decodes and plays back a recording
//! - [`replay::ReplayScheduler`] - Ordered buffer with timed emission
//! - [`dispatch::Dispatcher`] - Execution context for subscriber callbacks
//! - [`config`] - Capture and replay options

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod replay;

pub use kinlog_core;

pub use capture::{CaptureSession, CaptureStats};
pub use config::{CaptureOptions, ReplayOptions};
pub use dispatch::{dispatch_queue, DispatchQueue, Dispatcher, QueueDispatcher};
pub use error::{Error, Result};
pub use kinlog_core::{
    ColorFrame, CompositeFrame, DepthFrame, Modalities, Modality, SkeletonFrame,
};
pub use replay::{PlaybackMode, PlaybackState, ReplaySession, ReplayStatus};
