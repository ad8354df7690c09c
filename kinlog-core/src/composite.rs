//! Composite (all-streams) frames.
//!
//! A composite frame is one group of records written together by the
//! capture side, in the fixed order skeleton, depth, color. Color closes the
//! group. Groups that are reordered or repeat a modality are not detected and
//! desynchronize the rest of the file.

use std::sync::Arc;

use crate::codec::{decode_color, decode_depth, decode_skeleton, read_tag};
use crate::error::MalformedRecord;
use crate::modality::Modality;
use crate::reader::RecordReader;
use crate::record::{ColorRecord, DepthRecord, SkeletonRecord};

/// Maximum number of sub-records in one group
pub const MAX_GROUP_RECORDS: usize = 3;

/// One synchronized bundle of up to one record per modality.
///
/// Records are reference counted so replay consumers can hold on to a single
/// stream without copying pixel data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeFrame {
    /// Elapsed milliseconds of the depth record, 0 if there is none
    pub timestamp_ms: i64,
    /// Frame number of the depth record, 0 if there is none
    pub frame_number: i32,
    pub color: Option<Arc<ColorRecord>>,
    pub depth: Option<Arc<DepthRecord>>,
    pub skeleton: Option<Arc<SkeletonRecord>>,
}

impl CompositeFrame {
    /// Read one group.
    ///
    /// Reads at most three tagged records. A skeleton or depth record fills
    /// its slot (depth also sets the composite timestamp and frame number),
    /// a color record fills its slot and ends the group.
    pub fn read(reader: &mut RecordReader<'_>) -> Result<Self, MalformedRecord> {
        let mut composite = CompositeFrame::default();

        for _ in 0..MAX_GROUP_RECORDS {
            match read_tag(reader)? {
                Modality::Skeleton => {
                    composite.skeleton = Some(Arc::new(decode_skeleton(reader)?));
                }
                Modality::Depth => {
                    let depth = decode_depth(reader)?;
                    composite.timestamp_ms = depth.elapsed_ms;
                    composite.frame_number = depth.frame.frame_number;
                    composite.depth = Some(Arc::new(depth));
                }
                Modality::Color => {
                    composite.color = Some(Arc::new(decode_color(reader)?));
                    break;
                }
            }
        }

        Ok(composite)
    }

    /// Read groups until the input is exhausted.
    ///
    /// Any decode error fails the whole read.
    pub fn read_all(reader: &mut RecordReader<'_>) -> Result<Vec<Self>, MalformedRecord> {
        let mut frames = Vec::new();
        while !reader.is_exhausted() {
            frames.push(Self::read(reader)?);
        }
        Ok(frames)
    }

    /// All three modalities present
    pub fn is_complete(&self) -> bool {
        self.color.is_some() && self.depth.is_some() && self.skeleton.is_some()
    }
}
