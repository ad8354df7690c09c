//! Capture session - writes live frames from up to three sensors into one
//! recording.
//!
//! Frames arrive from independent producers. Every record call takes the
//! session lock for the whole precondition check plus encode-and-write, so
//! records never interleave and the file order is the lock acquisition order.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kinlog_core::codec::{encode_color, encode_depth, encode_skeleton};
use kinlog_core::{CaptureHeader, ColorFrame, DepthFrame, Modalities, Modality, SkeletonFrame};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::CaptureOptions;
use crate::error::{Error, Result};

/// Counters for an open or closed capture session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub started_at: DateTime<Utc>,
    pub color_records: u64,
    pub depth_records: u64,
    pub skeleton_records: u64,
    /// Header plus records
    pub bytes_written: u64,
    pub flushes: u64,
    pub last_flush: DateTime<Utc>,
}

impl CaptureStats {
    fn new(started_at: DateTime<Utc>, header_size: usize) -> Self {
        Self {
            started_at,
            color_records: 0,
            depth_records: 0,
            skeleton_records: 0,
            bytes_written: header_size as u64,
            flushes: 0,
            last_flush: started_at,
        }
    }

    pub fn records(&self) -> u64 {
        self.color_records + self.depth_records + self.skeleton_records
    }
}

/// Reference times of the previous record, per modality
#[derive(Debug, Clone, Copy)]
struct ModalityClocks {
    color: DateTime<Utc>,
    depth: DateTime<Utc>,
    skeleton: DateTime<Utc>,
}

impl ModalityClocks {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            color: start,
            depth: start,
            skeleton: start,
        }
    }

    fn reference_mut(&mut self, modality: Modality) -> &mut DateTime<Utc> {
        match modality {
            Modality::Color => &mut self.color,
            Modality::Depth => &mut self.depth,
            Modality::Skeleton => &mut self.skeleton,
        }
    }
}

struct CaptureState<W> {
    /// `None` once the session is closed
    sink: Option<W>,
    /// Set when a record was cut short by a sink error
    failed: bool,
    clocks: ModalityClocks,
    stats: CaptureStats,
}

/// A recording in progress.
///
/// The session is `Sync` for any `Send` sink, so producers can share it
/// behind an `Arc` and call the record methods concurrently.
pub struct CaptureSession<W: Write> {
    modalities: Modalities,
    flush_interval: chrono::Duration,
    state: Mutex<CaptureState<W>>,
}

impl<W: Write> CaptureSession<W> {
    /// Start a recording now
    pub fn open(
        options: &CaptureOptions,
        calibration: &[u8],
        color_focal_length: f32,
        depth_focal_length: f32,
        sink: W,
    ) -> Result<Self> {
        Self::open_at(
            options,
            calibration,
            color_focal_length,
            depth_focal_length,
            sink,
            Utc::now(),
        )
    }

    /// Start a recording with an explicit start time.
    ///
    /// The start time is the reference for the first record of every
    /// modality and for the flush clock.
    pub fn open_at(
        options: &CaptureOptions,
        calibration: &[u8],
        color_focal_length: f32,
        depth_focal_length: f32,
        mut sink: W,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let header = CaptureHeader {
            calibration: calibration.to_vec(),
            color_focal_length,
            depth_focal_length,
            modalities: options.modalities,
        };
        header.write(&mut sink)?;

        info!(
            "Capture session opened: modalities {:?}, {} byte calibration",
            options.modalities,
            calibration.len()
        );

        Ok(Self {
            modalities: options.modalities,
            flush_interval: options.flush_interval(),
            state: Mutex::new(CaptureState {
                sink: Some(sink),
                failed: false,
                clocks: ModalityClocks::new(started_at),
                stats: CaptureStats::new(started_at, header.size()),
            }),
        })
    }

    /// Streams this session accepts
    pub fn modalities(&self) -> Modalities {
        self.modalities
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.sink.is_none()).unwrap_or(true)
    }

    /// `true` once a write error has left a partial record in the sink.
    /// A failed session rejects further records but can still be closed.
    pub fn is_failed(&self) -> bool {
        self.lock().map(|s| s.failed).unwrap_or(true)
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> Result<CaptureStats> {
        Ok(self.lock()?.stats.clone())
    }

    /// Record a color frame captured at `at`
    pub fn record_color(&self, frame: &ColorFrame, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        self.check(&state, Modality::Color)?;
        self.write_record(&mut state, Modality::Color, at, |w, elapsed| {
            encode_color(w, frame, elapsed)
        })?;
        self.maybe_flush(&mut state, at)
    }

    /// Record a depth frame captured at `at`
    pub fn record_depth(&self, frame: &DepthFrame, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        self.check(&state, Modality::Depth)?;
        self.write_record(&mut state, Modality::Depth, at, |w, elapsed| {
            encode_depth(w, frame, elapsed)
        })?;
        self.maybe_flush(&mut state, at)
    }

    /// Record a skeleton frame captured at `at`
    pub fn record_skeleton(&self, frame: &SkeletonFrame, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        self.check(&state, Modality::Skeleton)?;
        self.write_record(&mut state, Modality::Skeleton, at, |w, elapsed| {
            encode_skeleton(w, frame, elapsed)
        })?;
        self.maybe_flush(&mut state, at)
    }

    /// Record frames from all streams as one group.
    ///
    /// Present frames are written skeleton, depth, color without releasing
    /// the lock, which is the group layout composite replay reads back.
    /// Every precondition is checked before the first byte is written.
    pub fn record_all(
        &self,
        skeleton: Option<&SkeletonFrame>,
        depth: Option<&DepthFrame>,
        color: Option<&ColorFrame>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        if skeleton.is_some() {
            self.check(&state, Modality::Skeleton)?;
        }
        if depth.is_some() {
            self.check(&state, Modality::Depth)?;
        }
        if color.is_some() {
            self.check(&state, Modality::Color)?;
        }
        Self::check_writable(&state)?;

        if let Some(frame) = skeleton {
            self.write_record(&mut state, Modality::Skeleton, at, |w, elapsed| {
                encode_skeleton(w, frame, elapsed)
            })?;
        }
        if let Some(frame) = depth {
            self.write_record(&mut state, Modality::Depth, at, |w, elapsed| {
                encode_depth(w, frame, elapsed)
            })?;
        }
        if let Some(frame) = color {
            self.write_record(&mut state, Modality::Color, at, |w, elapsed| {
                encode_color(w, frame, elapsed)
            })?;
        }
        self.maybe_flush(&mut state, at)
    }

    /// Flush and release the sink.
    ///
    /// Closing twice is an error. The sink is handed back to the caller.
    pub fn close(&self) -> Result<W> {
        let mut state = self.lock()?;
        let mut sink = state
            .sink
            .take()
            .ok_or(Error::InvalidState("capture session already closed"))?;
        sink.flush()?;

        info!(
            "Capture session closed: {} records, {} bytes",
            state.stats.records(),
            state.stats.bytes_written
        );
        Ok(sink)
    }

    fn lock(&self) -> Result<MutexGuard<'_, CaptureState<W>>> {
        self.state
            .lock()
            .map_err(|_| Error::InvalidState("capture session poisoned by a failed writer"))
    }

    fn check_writable(state: &CaptureState<W>) -> Result<()> {
        if state.sink.is_none() {
            return Err(Error::InvalidState("capture session is closed"));
        }
        if state.failed {
            return Err(Error::InvalidState("capture session failed on an earlier write"));
        }
        Ok(())
    }

    fn check(&self, state: &CaptureState<W>, modality: Modality) -> Result<()> {
        Self::check_writable(state)?;
        if !self.modalities.allows(modality) {
            return Err(Error::UnsupportedModality(modality));
        }
        Ok(())
    }

    fn write_record<F>(
        &self,
        state: &mut CaptureState<W>,
        modality: Modality,
        at: DateTime<Utc>,
        encode: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut W, i64) -> std::io::Result<usize>,
    {
        let sink = state
            .sink
            .as_mut()
            .ok_or(Error::InvalidState("capture session is closed"))?;

        let reference = state.clocks.reference_mut(modality);
        // Negative deltas (clock adjustments) are stored as-is
        let elapsed_ms = (at - *reference).num_milliseconds();

        let written = match encode(sink, elapsed_ms) {
            Ok(written) => written,
            Err(e) => {
                // Bytes already handed to the sink cannot be taken back
                state.failed = true;
                warn!("Capture write of {} record failed, session halted: {}", modality, e);
                return Err(e.into());
            }
        };
        *reference = at;

        let stats = &mut state.stats;
        stats.bytes_written += written as u64;
        match modality {
            Modality::Color => stats.color_records += 1,
            Modality::Depth => stats.depth_records += 1,
            Modality::Skeleton => stats.skeleton_records += 1,
        }
        Ok(())
    }

    fn maybe_flush(&self, state: &mut CaptureState<W>, at: DateTime<Utc>) -> Result<()> {
        if at - state.stats.last_flush <= self.flush_interval {
            return Ok(());
        }
        if let Some(sink) = state.sink.as_mut() {
            sink.flush()?;
            state.stats.last_flush = at;
            state.stats.flushes += 1;
            debug!(
                "Capture flushed after {} records ({} bytes)",
                state.stats.records(),
                state.stats.bytes_written
            );
        }
        Ok(())
    }
}

impl<W: Write> Drop for CaptureSession<W> {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sink) = state.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!("Failed to flush unclosed capture session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use kinlog_core::{FrameRecord, RecordReader};
    use std::io;
    use std::sync::Arc;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn color(n: i32) -> ColorFrame {
        ColorFrame {
            width: 2,
            height: 2,
            bytes_per_pixel: 4,
            frame_number: n,
            pixels: vec![n as u8; 16],
            ..Default::default()
        }
    }

    fn depth(n: i32) -> DepthFrame {
        DepthFrame {
            width: 2,
            height: 2,
            bytes_per_pixel: 2,
            frame_number: n,
            pixels: vec![n as u16; 4],
            ..Default::default()
        }
    }

    fn skeleton(n: i32) -> SkeletonFrame {
        SkeletonFrame {
            frame_number: n,
            floor_clip_plane: [0.0, 1.0, 0.0, 1.1],
            ..Default::default()
        }
    }

    fn open(modalities: Modalities) -> CaptureSession<Vec<u8>> {
        CaptureSession::open_at(
            &CaptureOptions::with_modalities(modalities),
            &[1, 2, 3],
            500.0,
            280.0,
            Vec::new(),
            t0(),
        )
        .unwrap()
    }

    fn records(bytes: &[u8]) -> Vec<FrameRecord> {
        let mut reader = RecordReader::new(bytes);
        let header = CaptureHeader::read(&mut reader).unwrap();
        assert_eq!(header.calibration, vec![1, 2, 3]);
        let mut out = Vec::new();
        while !reader.is_exhausted() {
            out.push(kinlog_core::codec::decode_record(&mut reader).unwrap());
        }
        out
    }

    /// Sink that counts flushes
    #[derive(Default)]
    struct CountingSink {
        bytes: Vec<u8>,
        flushes: usize,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_elapsed_is_per_modality() {
        let session = open(Modalities::ALL);
        session
            .record_color(&color(1), t0() + Duration::milliseconds(30))
            .unwrap();
        session
            .record_depth(&depth(1), t0() + Duration::milliseconds(40))
            .unwrap();
        session
            .record_color(&color(2), t0() + Duration::milliseconds(65))
            .unwrap();
        session
            .record_depth(&depth(2), t0() + Duration::milliseconds(35))
            .unwrap();

        let bytes = session.close().unwrap();
        let elapsed: Vec<(_, i64)> = records(&bytes)
            .iter()
            .map(|r| (r.modality(), r.elapsed_ms()))
            .collect();
        assert_eq!(
            elapsed,
            vec![
                (Modality::Color, 30),
                (Modality::Depth, 40),
                (Modality::Color, 35),
                (Modality::Depth, -5),
            ]
        );
    }

    #[test]
    fn test_unsupported_modality_writes_nothing() {
        let session = open(Modalities::COLOR | Modalities::DEPTH);
        let before = session.stats().unwrap().bytes_written;

        let err = session.record_skeleton(&skeleton(1), t0()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedModality(Modality::Skeleton)));

        let err = session
            .record_all(Some(&skeleton(1)), Some(&depth(1)), Some(&color(1)), t0())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedModality(Modality::Skeleton)));

        assert_eq!(session.stats().unwrap().bytes_written, before);
        let bytes = session.close().unwrap();
        assert_eq!(bytes.len() as u64, before);
    }

    #[test]
    fn test_close_lifecycle() {
        let session = open(Modalities::ALL);
        assert!(!session.is_closed());
        session.close().unwrap();
        assert!(session.is_closed());

        assert!(matches!(
            session.record_color(&color(1), t0()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            session.record_all(None, Some(&depth(1)), None, t0()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(session.close(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_closed_check_precedes_modality_check() {
        let session = open(Modalities::COLOR);
        session.close().unwrap();
        assert!(matches!(
            session.record_depth(&depth(1), t0()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_record_all_group_order() {
        let session = open(Modalities::ALL);
        for n in 0..3 {
            session
                .record_all(
                    Some(&skeleton(n)),
                    Some(&depth(n)),
                    Some(&color(n)),
                    t0() + Duration::milliseconds(33 * (n as i64 + 1)),
                )
                .unwrap();
        }
        let stats = session.stats().unwrap();
        assert_eq!(stats.records(), 9);

        let bytes = session.close().unwrap();
        let order: Vec<Modality> = records(&bytes).iter().map(|r| r.modality()).collect();
        assert_eq!(
            order,
            [Modality::Skeleton, Modality::Depth, Modality::Color].repeat(3)
        );
        assert_eq!(stats.bytes_written, bytes.len() as u64);
    }

    #[test]
    fn test_flush_interval() {
        let session = CaptureSession::open_at(
            &CaptureOptions::default(),
            &[],
            0.0,
            0.0,
            CountingSink::default(),
            t0(),
        )
        .unwrap();

        // Within the interval: no flush
        session
            .record_depth(&depth(1), t0() + Duration::seconds(30))
            .unwrap();
        session
            .record_depth(&depth(2), t0() + Duration::seconds(60))
            .unwrap();
        assert_eq!(session.stats().unwrap().flushes, 0);

        // Past the interval: flush and reset the clock
        session
            .record_depth(&depth(3), t0() + Duration::seconds(61))
            .unwrap();
        let stats = session.stats().unwrap();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.last_flush, t0() + Duration::seconds(61));

        session
            .record_depth(&depth(4), t0() + Duration::seconds(100))
            .unwrap();
        assert_eq!(session.stats().unwrap().flushes, 1);

        let sink = session.close().unwrap();
        // One periodic flush plus the close flush
        assert_eq!(sink.flushes, 2);
    }

    /// Sink that accepts `limit` bytes and then fails
    struct ShortSink {
        bytes: Vec<u8>,
        limit: usize,
    }

    impl Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit.saturating_sub(self.bytes.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = room.min(buf.len());
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_error_halts_session() {
        let header_len = 4 + 3 + 4 + 4 + 4;
        let sink = ShortSink {
            bytes: Vec::new(),
            limit: header_len + 10,
        };
        let session = CaptureSession::open_at(
            &CaptureOptions::default(),
            &[1, 2, 3],
            500.0,
            280.0,
            sink,
            t0(),
        )
        .unwrap();
        assert!(!session.is_failed());

        let at = t0() + Duration::milliseconds(30);
        assert!(matches!(
            session.record_color(&color(0), at),
            Err(Error::Io(_))
        ));
        assert!(session.is_failed());
        assert!(!session.is_closed());

        // Nothing more is appended after the partial record
        assert!(matches!(
            session.record_color(&color(1), at),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            session.record_depth(&depth(1), at),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            session.record_all(Some(&skeleton(1)), None, None, at),
            Err(Error::InvalidState(_))
        ));

        let stats = session.stats().unwrap();
        assert_eq!(stats.records(), 0);
        assert_eq!(stats.bytes_written, header_len as u64);

        let sink = session.close().unwrap();
        assert_eq!(sink.bytes.len(), header_len + 10);
    }

    #[test]
    fn test_concurrent_producers_do_not_interleave() {
        let session = Arc::new(open(Modalities::ALL));
        let per_thread = 50;

        let handles: Vec<_> = (0..3)
            .map(|kind| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    for n in 0..per_thread {
                        let at = t0() + Duration::milliseconds(n as i64);
                        match kind {
                            0 => session.record_color(&color(n), at).unwrap(),
                            1 => session.record_depth(&depth(n), at).unwrap(),
                            _ => session.record_skeleton(&skeleton(n), at).unwrap(),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bytes = session.close().unwrap();
        let records = records(&bytes);
        assert_eq!(records.len(), 3 * per_thread as usize);

        // Each producer's records appear in its own call order
        for modality in [Modality::Color, Modality::Depth, Modality::Skeleton] {
            let numbers: Vec<i32> = records
                .iter()
                .filter(|r| r.modality() == modality)
                .map(|r| r.frame_number())
                .collect();
            assert_eq!(numbers, (0..per_thread).collect::<Vec<_>>());
        }
    }
}
