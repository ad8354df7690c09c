//! Replay session - opens a trimodal recording and plays it back onto a
//! caller-chosen execution context.
//!
//! The whole source is decoded up front into composite frames; the source
//! itself is not kept. Frames delivered by the scheduler are posted to the
//! session's [`Dispatcher`], and only there are subscribers invoked.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use kinlog_core::{
    CaptureHeader, ColorRecord, CompositeFrame, DepthRecord, MalformedRecord, Modalities,
    RecordReader, SkeletonRecord,
};
use log::{debug, info, warn};
use serde::Serialize;

use super::scheduler::{FrameCallback, PlaybackMode, PlaybackState, ReplayScheduler};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};

/// Serializable snapshot of a replay session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStatus {
    pub state: PlaybackState,
    pub started: bool,
    pub disposed: bool,
    pub frame_count: usize,
    pub delivered: usize,
    /// Sum of the recorded frame delays
    pub duration_ms: i64,
}

struct Control {
    started: bool,
    /// `None` once disposed
    scheduler: Option<Arc<ReplayScheduler>>,
}

/// Playback of one trimodal recording
pub struct ReplaySession {
    header: CaptureHeader,
    control: Mutex<Control>,
    subscribers: Arc<RwLock<Vec<FrameCallback>>>,
    disposed: Arc<AtomicBool>,
}

impl ReplaySession {
    /// Read and decode a whole recording.
    ///
    /// Fails with [`Error::IncompleteRecording`] unless the header declares
    /// exactly color, depth and skeleton, and with [`Error::MalformedRecord`]
    /// on the first record that does not decode. Subscribers will run on
    /// `dispatcher`.
    pub fn open<R: Read>(mut source: R, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        drop(source);

        let mut reader = RecordReader::new(&data);
        let header = CaptureHeader::read(&mut reader).map_err(|e| malformed(&reader, e))?;

        if header.modalities != Modalities::ALL {
            warn!(
                "Recording declares {:?}, composite replay needs all streams",
                header.modalities
            );
            return Err(Error::IncompleteRecording(header.modalities));
        }

        let frames = CompositeFrame::read_all(&mut reader).map_err(|e| malformed(&reader, e))?;
        info!(
            "Replay session opened: {} frames from {} bytes",
            frames.len(),
            data.len()
        );

        let scheduler = Arc::new(ReplayScheduler::new(frames));
        let subscribers: Arc<RwLock<Vec<FrameCallback>>> = Arc::new(RwLock::new(Vec::new()));
        let disposed = Arc::new(AtomicBool::new(false));

        {
            let subscribers = Arc::clone(&subscribers);
            let disposed = Arc::clone(&disposed);
            scheduler.subscribe(Arc::new(move |frame: &Arc<CompositeFrame>| {
                let frame = Arc::clone(frame);
                let subscribers = Arc::clone(&subscribers);
                let disposed = Arc::clone(&disposed);
                dispatcher.dispatch(Box::new(move || {
                    if disposed.load(Ordering::SeqCst) {
                        return;
                    }
                    let callbacks: Vec<FrameCallback> = subscribers
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    for callback in callbacks {
                        callback(&frame);
                    }
                }));
            }));
        }

        Ok(Self {
            header,
            control: Mutex::new(Control {
                started: false,
                scheduler: Some(scheduler),
            }),
            subscribers,
            disposed,
        })
    }

    /// Open a recording file
    pub fn open_path<P: AsRef<Path>>(path: P, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening recording {}", path.display());
        let file = File::open(path)?;
        Self::open(BufReader::new(file), dispatcher)
    }

    // =========================================================================
    // Header
    // =========================================================================

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Opaque depth-to-color calibration blob
    pub fn calibration(&self) -> &[u8] {
        &self.header.calibration
    }

    pub fn color_focal_length(&self) -> f32 {
        self.header.color_focal_length
    }

    pub fn depth_focal_length(&self) -> f32 {
        self.header.depth_focal_length
    }

    // =========================================================================
    // Frame access
    // =========================================================================

    /// Number of decoded frames, zero after dispose
    pub fn frame_count(&self) -> usize {
        self.scheduler().map(|s| s.frame_count()).unwrap_or(0)
    }

    pub fn frame_at(&self, index: usize) -> Option<Arc<CompositeFrame>> {
        self.scheduler()?.frames().get(index).cloned()
    }

    pub fn color_frame(&self, index: usize) -> Option<Arc<ColorRecord>> {
        self.frame_at(index)?.color.clone()
    }

    pub fn depth_frame(&self, index: usize) -> Option<Arc<DepthRecord>> {
        self.frame_at(index)?.depth.clone()
    }

    pub fn skeleton_frame(&self, index: usize) -> Option<Arc<SkeletonRecord>> {
        self.frame_at(index)?.skeleton.clone()
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Register a frame callback. It runs on the session's dispatcher.
    pub fn on_frame_ready<F>(&self, callback: F)
    where
        F: Fn(&Arc<CompositeFrame>) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Begin playback from the first frame
    pub fn start(&self, mode: PlaybackMode) -> Result<()> {
        let mut control = self.control();
        let scheduler = control
            .scheduler
            .clone()
            .ok_or(Error::InvalidState("replay session has been disposed"))?;
        if control.started {
            return Err(Error::AlreadyStarted);
        }
        scheduler.start(mode)?;
        control.started = true;
        Ok(())
    }

    /// Halt playback. A later `start` replays from the beginning.
    pub fn stop(&self) {
        let mut control = self.control();
        if let Some(scheduler) = &control.scheduler {
            scheduler.stop();
        }
        control.started = false;
    }

    /// `true` from `start` until `stop`, including after playback ran out
    pub fn is_started(&self) -> bool {
        self.control().started
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler().is_some_and(|s| s.is_finished())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ReplayStatus {
        let control = self.control();
        let scheduler = control.scheduler.as_ref();
        ReplayStatus {
            state: scheduler.map_or(PlaybackState::Idle, |s| s.state()),
            started: control.started,
            disposed: self.is_disposed(),
            frame_count: scheduler.map_or(0, |s| s.frame_count()),
            delivered: scheduler.map_or(0, |s| s.delivered()),
            duration_ms: scheduler.map_or(0, |s| s.duration_ms()),
        }
    }

    /// Stop playback and release the decoded frames. Safe to repeat.
    pub fn dispose(&self) {
        let scheduler = {
            let mut control = self.control();
            control.started = false;
            control.scheduler.take()
        };
        let Some(scheduler) = scheduler else {
            return;
        };

        self.disposed.store(true, Ordering::SeqCst);
        scheduler.stop();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Replay session disposed ({} frames released)", scheduler.frame_count());
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheduler(&self) -> Option<Arc<ReplayScheduler>> {
        self.control().scheduler.clone()
    }
}

impl Drop for ReplaySession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn malformed(reader: &RecordReader<'_>, source: MalformedRecord) -> Error {
    Error::MalformedRecord {
        offset: reader.position(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch_queue;
    use crate::replay::ticker::ManualTicker;
    use kinlog_core::codec::{encode_color, encode_depth, encode_skeleton};
    use kinlog_core::{ColorFrame, DepthFrame, SkeletonFrame};
    use std::time::Duration;

    fn recording(modalities: Modalities, groups: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        CaptureHeader {
            calibration: vec![7; 5],
            color_focal_length: 525.0,
            depth_focal_length: 285.6,
            modalities,
        }
        .write(&mut buf)
        .unwrap();
        for n in 0..groups {
            let skeleton = SkeletonFrame {
                frame_number: n,
                ..Default::default()
            };
            let depth = DepthFrame {
                width: 1,
                height: 1,
                bytes_per_pixel: 2,
                frame_number: n,
                pixels: vec![n as u16],
                ..Default::default()
            };
            let color = ColorFrame {
                width: 1,
                height: 1,
                bytes_per_pixel: 4,
                frame_number: n,
                pixels: vec![n as u8; 4],
                ..Default::default()
            };
            encode_skeleton(&mut buf, &skeleton, 0).unwrap();
            encode_depth(&mut buf, &depth, 10 * n as i64).unwrap();
            encode_color(&mut buf, &color, 0).unwrap();
        }
        buf
    }

    fn open(bytes: &[u8]) -> (ReplaySession, crate::dispatch::DispatchQueue) {
        let (dispatcher, queue) = dispatch_queue();
        let session = ReplaySession::open(bytes, Arc::new(dispatcher)).unwrap();
        (session, queue)
    }

    #[test]
    fn test_open_decodes_groups() {
        let (session, _queue) = open(&recording(Modalities::ALL, 3));
        assert_eq!(session.frame_count(), 3);
        assert_eq!(session.calibration(), &[7; 5]);
        assert_eq!(session.color_focal_length(), 525.0);
        assert_eq!(session.depth_focal_length(), 285.6);

        let frame = session.frame_at(2).unwrap();
        assert!(frame.is_complete());
        assert_eq!(frame.timestamp_ms, 20);
        assert_eq!(frame.frame_number, 2);
        assert_eq!(session.color_frame(1).unwrap().frame.pixels, vec![1; 4]);
        assert_eq!(session.depth_frame(1).unwrap().frame.pixels, vec![1]);
        assert_eq!(session.skeleton_frame(0).unwrap().frame.frame_number, 0);
        assert!(session.frame_at(3).is_none());
        assert!(session.color_frame(99).is_none());
    }

    #[test]
    fn test_open_rejects_partial_recording() {
        let (dispatcher, _queue) = dispatch_queue();
        let bytes = recording(Modalities::COLOR | Modalities::DEPTH, 0);
        match ReplaySession::open(bytes.as_slice(), Arc::new(dispatcher)) {
            Err(Error::IncompleteRecording(mask)) => {
                assert_eq!(mask, Modalities::COLOR | Modalities::DEPTH)
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_open_rejects_truncated_recording() {
        let bytes = recording(Modalities::ALL, 2);
        let (dispatcher, _queue) = dispatch_queue();
        let result = ReplaySession::open(&bytes[..bytes.len() - 2], Arc::new(dispatcher));
        assert!(matches!(
            result,
            Err(Error::MalformedRecord {
                source: MalformedRecord::LengthOverrun { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_open_rejects_unknown_tag() {
        let mut bytes = recording(Modalities::ALL, 1);
        let offset = bytes.len();
        bytes.extend_from_slice(&3i32.to_le_bytes());
        let (dispatcher, _queue) = dispatch_queue();
        match ReplaySession::open(bytes.as_slice(), Arc::new(dispatcher)) {
            Err(Error::MalformedRecord { offset: at, source }) => {
                assert_eq!(source, MalformedRecord::UnknownTag(3));
                assert_eq!(at, offset + 4);
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_clocked_delivery_goes_through_dispatcher() {
        let (session, queue) = open(&recording(Modalities::ALL, 2));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        session.on_frame_ready(move |frame| s.lock().unwrap().push(frame.frame_number));

        let ticker = Arc::new(ManualTicker::new());
        session
            .start(PlaybackMode::Clocked(ticker.clone()))
            .unwrap();
        ticker.tick();
        ticker.tick();
        ticker.tick();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(queue.run_pending(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert!(session.is_finished());
        assert!(session.is_started());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (session, _queue) = open(&recording(Modalities::ALL, 2));
        let ticker = Arc::new(ManualTicker::new());
        session
            .start(PlaybackMode::Clocked(ticker.clone()))
            .unwrap();
        assert!(matches!(
            session.start(PlaybackMode::Clocked(ticker.clone())),
            Err(Error::AlreadyStarted)
        ));

        session.stop();
        assert!(!session.is_started());
        session
            .start(PlaybackMode::Clocked(ticker.clone()))
            .unwrap();
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (session, queue) = open(&recording(Modalities::ALL, 2));
        let seen = Arc::new(Mutex::new(0));
        let s = Arc::clone(&seen);
        session.on_frame_ready(move |_| *s.lock().unwrap() += 1);

        let ticker = Arc::new(ManualTicker::new());
        session
            .start(PlaybackMode::Clocked(ticker.clone()))
            .unwrap();
        ticker.tick();

        session.dispose();
        session.dispose();
        assert!(session.is_disposed());
        assert!(!ticker.is_running());
        assert_eq!(session.frame_count(), 0);
        assert!(session.frame_at(0).is_none());

        // Delivery queued before dispose is dropped
        queue.run_pending();
        assert_eq!(*seen.lock().unwrap(), 0);

        assert!(matches!(
            session.start(PlaybackMode::Clocked(ticker)),
            Err(Error::InvalidState(_))
        ));
        assert!(!session.status().started);
    }

    #[test]
    fn test_status_json() {
        let (session, _queue) = open(&recording(Modalities::ALL, 3));
        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["frameCount"], 3);
        assert_eq!(json["durationMs"], 30);
        assert_eq!(json["delivered"], 0);
    }

    #[test]
    fn test_status_with_huge_delays() {
        let mut bytes = Vec::new();
        CaptureHeader {
            calibration: Vec::new(),
            color_focal_length: 1.0,
            depth_focal_length: 1.0,
            modalities: Modalities::ALL,
        }
        .write(&mut bytes)
        .unwrap();
        for n in 0..2 {
            encode_depth(
                &mut bytes,
                &DepthFrame {
                    frame_number: n,
                    ..Default::default()
                },
                i64::MAX,
            )
            .unwrap();
            encode_color(&mut bytes, &ColorFrame::default(), 0).unwrap();
        }

        let (session, _queue) = open(&bytes);
        assert_eq!(session.frame_count(), 2);
        let status = session.status();
        assert_eq!(status.duration_ms, i64::MAX);
        assert_eq!(status.state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_free_run_through_session() {
        let (session, queue) = open(&recording(Modalities::ALL, 3));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        session.on_frame_ready(move |frame| s.lock().unwrap().push(frame.frame_number));

        session.start(PlaybackMode::FreeRun).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(session.is_finished());

        queue.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
