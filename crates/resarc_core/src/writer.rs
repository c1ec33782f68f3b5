//! Blob writer used by the offline build path.
//!
//! Records are appended 4-byte aligned. A record that refers to children is
//! reserved first, the children are appended after it, and the parent's offset
//! fields are patched once the child offsets are known. Strings are pooled so
//! identical names share storage.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{ResarcError, Result};
use crate::header::{BlobHeader, HEADER_LEN};

pub struct BlobWriter {
    buf: Vec<u8>,
    strings: FxHashMap<String, u32>,
}

impl Default for BlobWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobWriter {
    /// Starts a blob with a zeroed header placeholder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; HEADER_LEN],
            strings: FxHashMap::default(),
        }
    }

    /// Current end of the blob, which is where the next record lands.
    #[inline]
    #[must_use]
    pub fn position(&self) -> u32 {
        self.buf.len() as u32
    }

    fn align(&mut self) {
        let pad = (4 - self.buf.len() % 4) % 4;
        self.buf.resize(self.buf.len() + pad, 0);
    }

    /// Appends a zeroed record of `words` words and returns its offset.
    pub fn reserve(&mut self, words: usize) -> u32 {
        self.align();
        let offset = self.position();
        self.buf.resize(self.buf.len() + words * 4, 0);
        offset
    }

    /// Overwrites the word at `offset`.
    ///
    /// # Panics
    /// If `offset` was not returned by this writer.
    pub fn patch_u32(&mut self, offset: u32, value: u32) {
        let at = offset as usize;
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_i32(&mut self, offset: u32, value: i32) {
        self.patch_u32(offset, value as u32);
    }

    /// Appends `words` and returns the offset of the first one.
    pub fn push_u32_slice(&mut self, words: &[u32]) -> u32 {
        self.align();
        let offset = self.position();
        for w in words {
            self.buf.extend_from_slice(&w.to_le_bytes());
        }
        offset
    }

    pub fn push_i32_slice(&mut self, values: &[i32]) -> u32 {
        self.align();
        let offset = self.position();
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        offset
    }

    /// Appends a length-prefixed byte string.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> u32 {
        self.align();
        let offset = self.position();
        self.buf
            .extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        offset
    }

    /// Appends a length-prefixed UTF-8 string, reusing an earlier copy of the
    /// same text when there is one.
    pub fn push_str(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.strings.get(s) {
            return offset;
        }
        let offset = self.push_bytes(s.as_bytes());
        self.strings.insert(s.to_owned(), offset);
        offset
    }

    /// Writes the header and returns the finished blob.
    pub fn finish(mut self, root_offset: u32, pointer_width: u8) -> Result<Vec<u8>> {
        self.align();
        let file_size = u32::try_from(self.buf.len()).map_err(|_| {
            ResarcError::build(format!(
                "blob size {} does not fit a 32-bit offset",
                self.buf.len()
            ))
        })?;
        let checksum = xxh3_64(&self.buf[HEADER_LEN..]);
        let header = BlobHeader::new(file_size, root_offset, pointer_width, checksum);
        self.buf[..HEADER_LEN].copy_from_slice(&header.to_bytes());
        log::trace!("blob finished: {file_size} bytes, root at {root_offset}");
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BlobReader;
    use crate::settings::FixupLimits;

    #[test]
    fn strings_are_pooled() {
        let mut w = BlobWriter::new();
        let a = w.push_str("albedo");
        let b = w.push_str("normal");
        let c = w.push_str("albedo");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn records_stay_aligned_after_odd_strings() {
        let mut w = BlobWriter::new();
        w.push_str("odd");
        let rec = w.reserve(2);
        assert_eq!(rec % 4, 0);
    }

    #[test]
    fn finished_blob_passes_header_validation() {
        let mut w = BlobWriter::new();
        let root = w.reserve(1);
        let name = w.push_str("root");
        w.patch_u32(root, name);
        let bytes = w.finish(root, 8).unwrap();

        let header = BlobHeader::validate(&bytes, &FixupLimits::default()).unwrap();
        assert_eq!(header.file_size as usize, bytes.len());

        let r = BlobReader::new(&bytes);
        assert_eq!(r.str_ref_at(root as usize, "name").unwrap(), "root");
    }
}
