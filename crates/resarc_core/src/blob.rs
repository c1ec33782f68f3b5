//! Relocatable Blob
//!
//! A blob stores every intra-blob reference as a byte offset relative to its
//! base, so the same byte sequence is valid wherever it is loaded. Fixup is an
//! explicit two-phase load: the bytes are validated once and parsed into an
//! arena of plain structs whose cross-references are indices, never raw
//! pointers. The bytes themselves are never rewritten.
//!
//! # Lifecycle
//!
//! ```text
//!   new(bytes) ──fixup()──▶ fixed up (root arena available)
//!        ▲                        │
//!        └────────unfixup()───────┘
//! ```
//!
//! - `fixup` on a fixed-up blob returns the existing root.
//! - `unfixup` on a relocatable blob does nothing.
//! - `unfixup` followed by `fixup` rebuilds a root equal to the previous one,
//!   since the bytes were left untouched.

use std::io::Read;
use std::sync::Arc;

use crate::errors::Result;
use crate::header::BlobHeader;
use crate::reader::BlobReader;
use crate::settings::FixupLimits;

/// The record a blob's `root_offset` points at.
pub trait BlobRoot: Sized {
    /// Parses the root record and everything reachable from it.
    fn parse(reader: &BlobReader<'_>, root_offset: usize, limits: &FixupLimits) -> Result<Self>;
}

/// Owns blob bytes and, once fixed up, the parsed root arena.
pub struct RelocatableBlob<R> {
    bytes: Vec<u8>,
    limits: FixupLimits,
    root: Option<Arc<R>>,
}

impl<R: BlobRoot> RelocatableBlob<R> {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self::with_limits(bytes, FixupLimits::default())
    }

    #[must_use]
    pub fn with_limits(bytes: Vec<u8>, limits: FixupLimits) -> Self {
        Self {
            bytes,
            limits,
            root: None,
        }
    }

    /// Reads the whole of `source` into a new, relocatable blob.
    pub fn from_reader(mut source: impl Read, limits: FixupLimits) -> Result<Self> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        Ok(Self::with_limits(bytes, limits))
    }

    /// Validates the blob and resolves every offset into the root arena.
    ///
    /// Calling this on a fixed-up blob is a no-op that returns the same root.
    pub fn fixup(&mut self) -> Result<Arc<R>> {
        if let Some(root) = &self.root {
            return Ok(Arc::clone(root));
        }

        let header = BlobHeader::validate(&self.bytes, &self.limits)?;
        let reader = BlobReader::new(&self.bytes[..header.file_size as usize]);
        let root = Arc::new(R::parse(
            &reader,
            header.root_offset as usize,
            &self.limits,
        )?);

        log::debug!(
            "blob fixed up: {} bytes, root at {}, built for {}-byte pointers",
            header.file_size,
            header.root_offset,
            header.pointer_width
        );

        self.root = Some(Arc::clone(&root));
        Ok(root)
    }

    /// Drops the parsed arena so the blob is relocatable again.
    ///
    /// Runtime objects that still hold the root keep it alive; the blob only
    /// forgets it.
    pub fn unfixup(&mut self) {
        if self.root.take().is_some() {
            log::debug!("blob unfixed ({} bytes)", self.bytes.len());
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fixed_up(&self) -> bool {
        self.root.is_some()
    }

    /// The parsed root, if the blob is fixed up.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&Arc<R>> {
        self.root.as_ref()
    }

    /// The stored bytes, valid for persisting in either state.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reads the header without fixing up.
    pub fn header(&self) -> Result<BlobHeader> {
        BlobHeader::read(&self.bytes)
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResarcError;
    use crate::writer::BlobWriter;

    #[derive(Debug, PartialEq)]
    struct Named {
        name: String,
        values: Vec<u32>,
    }

    impl BlobRoot for Named {
        fn parse(reader: &BlobReader<'_>, root: usize, _: &FixupLimits) -> Result<Self> {
            let name = reader.str_ref_at(root, "name")?.to_owned();
            let count = reader.count_at(root + 4, 16, "value count")?;
            let values_at = reader.required_offset_at(root + 8, "values")?;
            let values = reader.u32_array(values_at, count, "values")?;
            Ok(Self { name, values })
        }
    }

    fn build() -> Vec<u8> {
        let mut w = BlobWriter::new();
        let root = w.reserve(3);
        let name = w.push_str("root");
        let values = w.push_u32_slice(&[7, 8, 9]);
        w.patch_u32(root, name);
        w.patch_u32(root + 4, 3);
        w.patch_u32(root + 8, values);
        w.finish(root, 8).unwrap()
    }

    #[test]
    fn fixup_parses_root() {
        let mut blob = RelocatableBlob::<Named>::new(build());
        let root = blob.fixup().unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.values, vec![7, 8, 9]);
    }

    #[test]
    fn second_fixup_is_noop() {
        let mut blob = RelocatableBlob::<Named>::new(build());
        let first = blob.fixup().unwrap();
        let second = blob.fixup().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unfixup_then_fixup_restores_state() {
        let bytes = build();
        let mut blob = RelocatableBlob::<Named>::new(bytes.clone());
        let first = blob.fixup().unwrap();

        blob.unfixup();
        blob.unfixup();
        assert!(!blob.is_fixed_up());
        assert_eq!(blob.as_bytes(), &bytes[..]);

        let again = blob.fixup().unwrap();
        assert_eq!(*first, *again);
    }

    #[test]
    fn out_of_range_offset_is_corrupt() {
        let mut bytes = build();
        // values offset lives at root + 8 (root is the first record after the header)
        let field = 32 + 8;
        bytes[field..field + 4].copy_from_slice(&4096u32.to_le_bytes());
        let relaxed = FixupLimits {
            verify_checksum: false,
            ..Default::default()
        };
        let mut blob = RelocatableBlob::<Named>::with_limits(bytes, relaxed);
        assert!(matches!(blob.fixup(), Err(ResarcError::CorruptBlob(_))));
        assert!(!blob.is_fixed_up());
    }

    #[test]
    fn from_reader_loads_bytes() {
        let bytes = build();
        let mut blob =
            RelocatableBlob::<Named>::from_reader(&bytes[..], FixupLimits::default()).unwrap();
        assert_eq!(blob.fixup().unwrap().values.len(), 3);
    }
}
