//! Bounds-checked reads over a blob.
//!
//! Every accessor validates that the requested range lies inside the blob and
//! reports a [`ResarcError::CorruptBlob`] with context otherwise. Nothing here
//! panics on malformed input.

use crate::errors::{ResarcError, Result};
use crate::header::HEADER_LEN;

/// Read-only view of a blob's bytes, `[0, file_size)`.
#[derive(Debug, Clone, Copy)]
pub struct BlobReader<'a> {
    bytes: &'a [u8],
}

impl<'a> BlobReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Ensures `offset..offset + len` lies inside the blob.
    pub fn check_range(&self, offset: usize, len: usize, what: &str) -> Result<()> {
        let end = offset.checked_add(len).ok_or_else(|| {
            ResarcError::corrupt(format!("{what}: range {offset}+{len} overflows"))
        })?;
        if end > self.bytes.len() {
            return Err(ResarcError::corrupt(format!(
                "{what}: range {offset}..{end} is outside blob size {}",
                self.bytes.len()
            )));
        }
        Ok(())
    }

    pub fn u32_at(&self, offset: usize, what: &str) -> Result<u32> {
        self.check_range(offset, 4, what)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        Ok(u32::from_le_bytes(word))
    }

    pub fn i32_at(&self, offset: usize, what: &str) -> Result<i32> {
        self.u32_at(offset, what).map(|v| v as i32)
    }

    /// Reads a `u32` count field and converts it to `usize`, rejecting values
    /// above `max`.
    pub fn count_at(&self, offset: usize, max: usize, what: &str) -> Result<usize> {
        let count = self.u32_at(offset, what)? as usize;
        if count > max {
            return Err(ResarcError::corrupt(format!(
                "{what}: count {count} exceeds limit {max}"
            )));
        }
        Ok(count)
    }

    /// Reads an offset field at `field`.
    ///
    /// `0` encodes "absent" and yields `None`. Any other value must point to a
    /// 4-byte aligned position past the header and inside the blob.
    pub fn offset_at(&self, field: usize, what: &str) -> Result<Option<usize>> {
        let target = self.u32_at(field, what)? as usize;
        if target == 0 {
            return Ok(None);
        }
        if target < HEADER_LEN {
            return Err(ResarcError::corrupt(format!(
                "{what}: offset {target} points into the header"
            )));
        }
        if target >= self.bytes.len() {
            return Err(ResarcError::corrupt(format!(
                "{what}: offset {target} is outside blob size {}",
                self.bytes.len()
            )));
        }
        if target % 4 != 0 {
            return Err(ResarcError::corrupt(format!(
                "{what}: offset {target} is not 4-byte aligned"
            )));
        }
        Ok(Some(target))
    }

    /// Like [`offset_at`](Self::offset_at), but absence is an error.
    pub fn required_offset_at(&self, field: usize, what: &str) -> Result<usize> {
        self.offset_at(field, what)?
            .ok_or_else(|| ResarcError::corrupt(format!("{what}: required offset is null")))
    }

    /// Reads a length-prefixed byte string at `offset`.
    pub fn bytes_at(&self, offset: usize, what: &str) -> Result<&'a [u8]> {
        let len = self.u32_at(offset, what)? as usize;
        let start = offset + 4;
        self.check_range(start, len, what)?;
        Ok(&self.bytes[start..start + len])
    }

    /// Reads a length-prefixed UTF-8 string at `offset`.
    pub fn str_at(&self, offset: usize, what: &str) -> Result<&'a str> {
        let raw = self.bytes_at(offset, what)?;
        std::str::from_utf8(raw)
            .map_err(|e| ResarcError::corrupt(format!("{what}: invalid UTF-8 ({e})")))
    }

    /// Follows the offset stored at `field` and reads the string it points to.
    pub fn str_ref_at(&self, field: usize, what: &str) -> Result<&'a str> {
        let target = self.required_offset_at(field, what)?;
        self.str_at(target, what)
    }

    /// Reads `count` consecutive `u32` words starting at `offset`.
    pub fn u32_array(&self, offset: usize, count: usize, what: &str) -> Result<Vec<u32>> {
        let len = count.checked_mul(4).ok_or_else(|| {
            ResarcError::corrupt(format!("{what}: array length {count} overflows"))
        })?;
        self.check_range(offset, len, what)?;
        Ok(self.bytes[offset..offset + len]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    pub fn i32_array(&self, offset: usize, count: usize, what: &str) -> Result<Vec<i32>> {
        Ok(self
            .u32_array(offset, count, what)?
            .into_iter()
            .map(|v| v as i32)
            .collect())
    }

    /// Reads an array of `count` record offsets starting at `offset`.
    /// Every entry must be a valid, non-null offset.
    pub fn offset_array(&self, offset: usize, count: usize, what: &str) -> Result<Vec<usize>> {
        let len = count.checked_mul(4).ok_or_else(|| {
            ResarcError::corrupt(format!("{what}: array length {count} overflows"))
        })?;
        self.check_range(offset, len, what)?;
        (0..count)
            .map(|i| self.required_offset_at(offset + i * 4, what))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        for w in words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    #[test]
    fn reads_words_little_endian() {
        let bytes = blob(&[0x0403_0201]);
        let r = BlobReader::new(&bytes);
        assert_eq!(r.u32_at(HEADER_LEN, "word").unwrap(), 0x0403_0201);
        assert_eq!(bytes[HEADER_LEN], 1);
    }

    #[test]
    fn null_offset_is_absent() {
        let bytes = blob(&[0]);
        let r = BlobReader::new(&bytes);
        assert_eq!(r.offset_at(HEADER_LEN, "ptr").unwrap(), None);
        assert!(r.required_offset_at(HEADER_LEN, "ptr").is_err());
    }

    #[test]
    fn offset_outside_blob_is_corrupt() {
        let bytes = blob(&[4096]);
        let r = BlobReader::new(&bytes);
        let err = r.offset_at(HEADER_LEN, "ptr").unwrap_err();
        assert!(matches!(err, ResarcError::CorruptBlob(_)));
    }

    #[test]
    fn offset_into_header_is_corrupt() {
        let bytes = blob(&[8]);
        let r = BlobReader::new(&bytes);
        assert!(r.offset_at(HEADER_LEN, "ptr").is_err());
    }

    #[test]
    fn misaligned_offset_is_corrupt() {
        let bytes = blob(&[HEADER_LEN as u32 + 2, 0]);
        let r = BlobReader::new(&bytes);
        assert!(r.offset_at(HEADER_LEN, "ptr").is_err());
    }

    #[test]
    fn string_length_past_end_is_corrupt() {
        let bytes = blob(&[100]);
        let r = BlobReader::new(&bytes);
        assert!(r.str_at(HEADER_LEN, "name").is_err());
    }

    #[test]
    fn huge_array_count_does_not_overflow() {
        let bytes = blob(&[1, 2]);
        let r = BlobReader::new(&bytes);
        assert!(r.u32_array(HEADER_LEN, usize::MAX / 2, "keys").is_err());
    }

    #[test]
    fn count_limit_is_enforced() {
        let bytes = blob(&[10]);
        let r = BlobReader::new(&bytes);
        assert_eq!(r.count_at(HEADER_LEN, 10, "n").unwrap(), 10);
        assert!(r.count_at(HEADER_LEN, 9, "n").is_err());
    }
}
