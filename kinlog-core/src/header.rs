//! Recording header.
//!
//! ```text
//! int32        calibration length
//! byte[len]    calibration blob (opaque color-to-depth mapping parameters)
//! float32      color focal length
//! float32      depth focal length
//! int32        enabled modalities mask
//! ```

use std::io::{self, Write};

use crate::error::MalformedRecord;
use crate::modality::Modalities;
use crate::reader::RecordReader;

/// File header, written once at the start of a recording
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureHeader {
    /// Calibration parameters, never interpreted here
    pub calibration: Vec<u8>,
    pub color_focal_length: f32,
    pub depth_focal_length: f32,
    /// Modalities the capture session accepted
    pub modalities: Modalities,
}

impl CaptureHeader {
    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        4 + self.calibration.len() + 4 + 4 + 4
    }

    /// Write header to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let len = i32::try_from(self.calibration.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "calibration blob too large")
        })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&self.calibration)?;
        writer.write_all(&self.color_focal_length.to_le_bytes())?;
        writer.write_all(&self.depth_focal_length.to_le_bytes())?;
        writer.write_all(&self.modalities.bits().to_le_bytes())
    }

    /// Read header from the start of a recording.
    ///
    /// Unknown mask bits are retained so callers can reject them.
    pub fn read(reader: &mut RecordReader<'_>) -> Result<Self, MalformedRecord> {
        let len = reader.read_len("calibration", 1)?;
        let calibration = reader.take(len)?.to_vec();
        let color_focal_length = reader.read_f32()?;
        let depth_focal_length = reader.read_f32()?;
        let modalities = Modalities::from_bits_retain(reader.read_i32()?);

        Ok(Self {
            calibration,
            color_focal_length,
            depth_focal_length,
            modalities,
        })
    }
}
