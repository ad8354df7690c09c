//! Frame and record types for the three modalities.
//!
//! A *frame* is what a sensor hands to the capture side. A *record* is a frame
//! as it was stored: the frame plus the elapsed milliseconds since the
//! previous record of the same modality.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::modality::Modality;

// =============================================================================
// Frames
// =============================================================================

/// A color image frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorFrame {
    /// Sensor pixel format, kept as an opaque integer
    pub format: i32,
    pub width: i32,
    pub height: i32,
    pub bytes_per_pixel: i32,
    /// Sensor sequence number
    pub frame_number: i32,
    pub pixels: Vec<u8>,
}

/// A depth image frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepthFrame {
    pub bytes_per_pixel: i32,
    /// Sensor depth format, kept as an opaque integer
    pub format: i32,
    pub width: i32,
    pub height: i32,
    pub frame_number: i32,
    /// Raw 16-bit depth values, row major
    pub pixels: Vec<u16>,
}

/// A skeleton tracking frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonFrame {
    /// Sensor tracking mode, kept as an opaque integer
    pub tracking_mode: i32,
    /// Floor plane coefficients (A, B, C, D)
    pub floor_clip_plane: [f32; 4],
    pub frame_number: i32,
    pub bodies: Vec<Body>,
}

// =============================================================================
// Skeleton payload
// =============================================================================

/// A point in sensor space, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SkeletonPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Tracked joints, in sensor order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum JointType {
    HipCenter,
    Spine,
    ShoulderCenter,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
}

/// One joint of a tracked body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub joint_type: JointType,
    pub position: SkeletonPoint,
    /// Per-joint tracking confidence, opaque sensor value
    pub tracking_state: i32,
}

/// One tracked body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    pub tracking_id: i32,
    /// Body tracking state, opaque sensor value
    pub tracking_state: i32,
    pub position: SkeletonPoint,
    pub joints: Vec<Joint>,
}

impl Body {
    /// Look up a joint by type
    pub fn joint(&self, joint_type: JointType) -> Option<&Joint> {
        self.joints.iter().find(|j| j.joint_type == joint_type)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A stored color frame
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRecord {
    /// Milliseconds since the previous color record
    pub elapsed_ms: i64,
    pub frame: ColorFrame,
}

/// A stored depth frame
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRecord {
    /// Milliseconds since the previous depth record
    pub elapsed_ms: i64,
    pub frame: DepthFrame,
}

/// A stored skeleton frame
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonRecord {
    /// Milliseconds since the previous skeleton record
    pub elapsed_ms: i64,
    pub frame: SkeletonFrame,
}

/// Any single record read from a recording
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRecord {
    Color(ColorRecord),
    Depth(DepthRecord),
    Skeleton(SkeletonRecord),
}

impl FrameRecord {
    pub fn modality(&self) -> Modality {
        match self {
            FrameRecord::Color(_) => Modality::Color,
            FrameRecord::Depth(_) => Modality::Depth,
            FrameRecord::Skeleton(_) => Modality::Skeleton,
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        match self {
            FrameRecord::Color(r) => r.elapsed_ms,
            FrameRecord::Depth(r) => r.elapsed_ms,
            FrameRecord::Skeleton(r) => r.elapsed_ms,
        }
    }

    pub fn frame_number(&self) -> i32 {
        match self {
            FrameRecord::Color(r) => r.frame.frame_number,
            FrameRecord::Depth(r) => r.frame.frame_number,
            FrameRecord::Skeleton(r) => r.frame.frame_number,
        }
    }
}
