//! Bounds-checked little-endian reader over an in-memory recording

use crate::error::MalformedRecord;

/// Cursor over recording bytes.
///
/// Every read is checked against the remaining input so that a declared
/// length can never run past the end of the data.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the input
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], MalformedRecord> {
        if len > self.remaining() {
            return Err(MalformedRecord::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MalformedRecord> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    pub fn read_i32(&mut self) -> Result<i32, MalformedRecord> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, MalformedRecord> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, MalformedRecord> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Read an `i32` length field and check that `len * element_size` bytes
    /// are still available.
    pub fn read_len(
        &mut self,
        field: &'static str,
        element_size: usize,
    ) -> Result<usize, MalformedRecord> {
        let raw = self.read_i32()?;
        if raw < 0 {
            return Err(MalformedRecord::NegativeLength(raw));
        }
        let len = raw as usize;
        let declared = len.saturating_mul(element_size);
        if declared > self.remaining() {
            return Err(MalformedRecord::LengthOverrun {
                field,
                declared,
                remaining: self.remaining(),
            });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.extend_from_slice(&(-3i64).to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());

        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.read_i32().unwrap(), 7);
        assert_eq!(reader.read_i64().unwrap(), -3);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert!(reader.is_exhausted());
        assert_eq!(reader.position(), 16);
    }

    #[test]
    fn test_truncated_read() {
        let mut reader = RecordReader::new(&[1, 2, 3]);
        assert_eq!(
            reader.read_i32(),
            Err(MalformedRecord::Truncated {
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_length_checks() {
        let mut bytes = 10i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(
            reader.read_len("pixels", 1),
            Err(MalformedRecord::LengthOverrun {
                field: "pixels",
                declared: 10,
                remaining: 8
            })
        );

        let bytes = (-1i32).to_le_bytes();
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(
            reader.read_len("pixels", 1),
            Err(MalformedRecord::NegativeLength(-1))
        );

        let mut bytes = 4i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut reader = RecordReader::new(&bytes);
        assert_eq!(reader.read_len("depth", 2), Ok(4));
    }
}
