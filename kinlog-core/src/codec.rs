//! Record encoding and decoding.
//!
//! Every record starts with its modality tag and the elapsed milliseconds
//! since the previous record of the same modality:
//!
//! ```text
//! Color:    tag(i32) elapsed(i64) bpp(i32) format(i32) width(i32) height(i32)
//!           frame_number(i32) byte_len(i32) bytes[byte_len]
//! Depth:    tag(i32) elapsed(i64) bpp(i32) format(i32) width(i32) height(i32)
//!           frame_number(i32) count(i32) u16[count]
//! Skeleton: tag(i32) elapsed(i64) tracking_mode(i32) floor_plane(4 x f32)
//!           frame_number(i32) byte_len(i32) bincode(Vec<Body>)[byte_len]
//! ```
//!
//! All values are little-endian. Encoders write straight into the sink and
//! return the number of bytes written.

use std::io::{self, Write};

use crate::error::MalformedRecord;
use crate::modality::Modality;
use crate::reader::RecordReader;
use crate::record::{
    Body, ColorFrame, ColorRecord, DepthFrame, DepthRecord, FrameRecord, SkeletonFrame,
    SkeletonRecord,
};

/// Tag plus elapsed timestamp
pub const RECORD_PREFIX_SIZE: usize = 4 + 8;

/// Depth values converted per write call
const DEPTH_CHUNK: usize = 2048;

fn len_field(len: usize, field: &str) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} too large for record: {} elements", field, len),
        )
    })
}

fn write_prefix<W: Write>(writer: &mut W, modality: Modality, elapsed_ms: i64) -> io::Result<()> {
    writer.write_all(&modality.tag().to_le_bytes())?;
    writer.write_all(&elapsed_ms.to_le_bytes())
}

fn write_i32s<W: Write>(writer: &mut W, values: &[i32]) -> io::Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

// =============================================================================
// Encoding
// =============================================================================

/// Write a color record
pub fn encode_color<W: Write>(
    writer: &mut W,
    frame: &ColorFrame,
    elapsed_ms: i64,
) -> io::Result<usize> {
    let len = len_field(frame.pixels.len(), "color pixels")?;

    write_prefix(writer, Modality::Color, elapsed_ms)?;
    write_i32s(
        writer,
        &[
            frame.bytes_per_pixel,
            frame.format,
            frame.width,
            frame.height,
            frame.frame_number,
            len,
        ],
    )?;
    writer.write_all(&frame.pixels)?;

    Ok(RECORD_PREFIX_SIZE + 6 * 4 + frame.pixels.len())
}

/// Write a depth record
pub fn encode_depth<W: Write>(
    writer: &mut W,
    frame: &DepthFrame,
    elapsed_ms: i64,
) -> io::Result<usize> {
    let count = len_field(frame.pixels.len(), "depth pixels")?;

    write_prefix(writer, Modality::Depth, elapsed_ms)?;
    write_i32s(
        writer,
        &[
            frame.bytes_per_pixel,
            frame.format,
            frame.width,
            frame.height,
            frame.frame_number,
            count,
        ],
    )?;

    let mut buf = [0u8; DEPTH_CHUNK * 2];
    for chunk in frame.pixels.chunks(DEPTH_CHUNK) {
        for (dst, value) in buf.chunks_exact_mut(2).zip(chunk) {
            dst.copy_from_slice(&value.to_le_bytes());
        }
        writer.write_all(&buf[..chunk.len() * 2])?;
    }

    Ok(RECORD_PREFIX_SIZE + 6 * 4 + frame.pixels.len() * 2)
}

/// Write a skeleton record
pub fn encode_skeleton<W: Write>(
    writer: &mut W,
    frame: &SkeletonFrame,
    elapsed_ms: i64,
) -> io::Result<usize> {
    let payload_len = bincode::serialized_size(&frame.bodies)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
        as usize;
    let len = len_field(payload_len, "skeleton payload")?;

    write_prefix(writer, Modality::Skeleton, elapsed_ms)?;
    writer.write_all(&frame.tracking_mode.to_le_bytes())?;
    for coefficient in frame.floor_clip_plane {
        writer.write_all(&coefficient.to_le_bytes())?;
    }
    writer.write_all(&frame.frame_number.to_le_bytes())?;
    writer.write_all(&len.to_le_bytes())?;
    bincode::serialize_into(&mut *writer, &frame.bodies).map_err(|e| match *e {
        bincode::ErrorKind::Io(io) => io,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    })?;

    Ok(RECORD_PREFIX_SIZE + 4 + 16 + 4 + 4 + payload_len)
}

/// Write any record
pub fn encode_record<W: Write>(writer: &mut W, record: &FrameRecord) -> io::Result<usize> {
    match record {
        FrameRecord::Color(r) => encode_color(writer, &r.frame, r.elapsed_ms),
        FrameRecord::Depth(r) => encode_depth(writer, &r.frame, r.elapsed_ms),
        FrameRecord::Skeleton(r) => encode_skeleton(writer, &r.frame, r.elapsed_ms),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Read the next modality tag
pub fn read_tag(reader: &mut RecordReader<'_>) -> Result<Modality, MalformedRecord> {
    Modality::from_tag(reader.read_i32()?)
}

/// Read one tagged record
pub fn decode_record(reader: &mut RecordReader<'_>) -> Result<FrameRecord, MalformedRecord> {
    match read_tag(reader)? {
        Modality::Color => decode_color(reader).map(FrameRecord::Color),
        Modality::Depth => decode_depth(reader).map(FrameRecord::Depth),
        Modality::Skeleton => decode_skeleton(reader).map(FrameRecord::Skeleton),
    }
}

/// Read a color record body (the tag has already been consumed)
pub fn decode_color(reader: &mut RecordReader<'_>) -> Result<ColorRecord, MalformedRecord> {
    let elapsed_ms = reader.read_i64()?;
    let bytes_per_pixel = reader.read_i32()?;
    let format = reader.read_i32()?;
    let width = reader.read_i32()?;
    let height = reader.read_i32()?;
    let frame_number = reader.read_i32()?;
    let len = reader.read_len("color pixels", 1)?;
    let pixels = reader.take(len)?.to_vec();

    Ok(ColorRecord {
        elapsed_ms,
        frame: ColorFrame {
            format,
            width,
            height,
            bytes_per_pixel,
            frame_number,
            pixels,
        },
    })
}

/// Read a depth record body (the tag has already been consumed)
pub fn decode_depth(reader: &mut RecordReader<'_>) -> Result<DepthRecord, MalformedRecord> {
    let elapsed_ms = reader.read_i64()?;
    let bytes_per_pixel = reader.read_i32()?;
    let format = reader.read_i32()?;
    let width = reader.read_i32()?;
    let height = reader.read_i32()?;
    let frame_number = reader.read_i32()?;
    let count = reader.read_len("depth pixels", 2)?;
    let pixels = reader
        .take(count * 2)?
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();

    Ok(DepthRecord {
        elapsed_ms,
        frame: DepthFrame {
            bytes_per_pixel,
            format,
            width,
            height,
            frame_number,
            pixels,
        },
    })
}

/// Read a skeleton record body (the tag has already been consumed)
pub fn decode_skeleton(reader: &mut RecordReader<'_>) -> Result<SkeletonRecord, MalformedRecord> {
    let elapsed_ms = reader.read_i64()?;
    let tracking_mode = reader.read_i32()?;
    let mut floor_clip_plane = [0f32; 4];
    for coefficient in floor_clip_plane.iter_mut() {
        *coefficient = reader.read_f32()?;
    }
    let frame_number = reader.read_i32()?;
    let len = reader.read_len("skeleton payload", 1)?;
    let bodies: Vec<Body> = bincode::deserialize(reader.take(len)?)?;

    Ok(SkeletonRecord {
        elapsed_ms,
        frame: SkeletonFrame {
            tracking_mode,
            floor_clip_plane,
            frame_number,
            bodies,
        },
    })
}
