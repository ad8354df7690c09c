//! # Kinlog Core
//!
//! Wire format for trimodal sensor recordings: color images, depth images
//! and skeleton tracking frames multiplexed into one append-only log.
//!
//! This crate contains pure encoding and decoding with **no threads and no
//! async**. Capture sessions and replay scheduling live in the `kinlog`
//! crate, which builds on these types.
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Header                   │  calibration blob, focal lengths, modality mask
//! ├──────────────────────────┤
//! │ Record                   │  tag + elapsed ms + fixed fields + payload
//! │ Record                   │
//! │ ...                      │  until end of file, no index, no footer
//! └──────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`header`] - Recording header ([`CaptureHeader`])
//! - [`codec`] - Per-modality record encoding and decoding
//! - [`composite`] - Grouping of skeleton/depth/color records ([`CompositeFrame`])
//! - [`reader`] - Bounds-checked cursor used by every decoder
//!
//! ## Example: Writing and Reading a Record
//!
//! ```rust
//! use kinlog_core::codec::{decode_record, encode_color};
//! use kinlog_core::{ColorFrame, FrameRecord, RecordReader};
//!
//! let frame = ColorFrame {
//!     width: 2,
//!     height: 1,
//!     bytes_per_pixel: 4,
//!     pixels: vec![0xFF; 8],
//!     ..Default::default()
//! };
//!
//! let mut buf = Vec::new();
//! encode_color(&mut buf, &frame, 33).unwrap();
//!
//! match decode_record(&mut RecordReader::new(&buf)).unwrap() {
//!     FrameRecord::Color(record) => assert_eq!(record.frame, frame),
//!     _ => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod composite;
pub mod error;
pub mod header;
pub mod modality;
pub mod reader;
pub mod record;

// Re-export commonly used types
pub use composite::CompositeFrame;
pub use error::MalformedRecord;
pub use header::CaptureHeader;
pub use modality::{Modalities, Modality};
pub use reader::RecordReader;
pub use record::{
    Body, ColorFrame, ColorRecord, DepthFrame, DepthRecord, FrameRecord, Joint, JointType,
    SkeletonFrame, SkeletonPoint, SkeletonRecord,
};
