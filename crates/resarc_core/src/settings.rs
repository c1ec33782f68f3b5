//! Fixup Limits
//!
//! Upper bounds applied while walking a blob. Blobs come from an offline build
//! tool but are still treated as untrusted: every count read from the blob is
//! checked against these limits before anything is allocated for it.
//!
//! ```rust,ignore
//! use resarc_core::FixupLimits;
//!
//! let limits = FixupLimits {
//!     max_programs: 4096,
//!     ..Default::default()
//! };
//! let mut blob = ShaderArchiveBlob::with_limits(bytes, limits);
//! ```

use serde::{Deserialize, Serialize};

/// Bounds enforced by [`RelocatableBlob::fixup`](crate::blob::RelocatableBlob::fixup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixupLimits {
    /// Maximum number of shading models in one archive.
    pub max_shading_models: usize,
    /// Maximum number of options per key segment.
    pub max_options: usize,
    /// Maximum number of choices per option.
    pub max_choices: usize,
    /// Maximum number of programs per shading model.
    pub max_programs: usize,
    /// Maximum full key length, in 32-bit words.
    pub max_key_words: usize,
    /// Maximum number of entries in any single name dictionary.
    pub max_dictionary_entries: usize,
    /// Verify the xxh3 payload checksum stored in the header.
    pub verify_checksum: bool,
}

impl Default for FixupLimits {
    fn default() -> Self {
        Self {
            max_shading_models: 4096,
            max_options: 256,
            max_choices: 4096,
            max_programs: 1 << 20,
            max_key_words: 64,
            max_dictionary_entries: 1 << 16,
            verify_checksum: true,
        }
    }
}

impl FixupLimits {
    /// Limits that only guard against arithmetic overflow.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_shading_models: usize::MAX,
            max_options: usize::MAX,
            max_choices: usize::MAX,
            max_programs: usize::MAX,
            max_key_words: usize::MAX,
            max_dictionary_entries: usize::MAX,
            verify_checksum: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let limits: FixupLimits = serde_json::from_str(r#"{ "max_programs": 12 }"#).unwrap();
        assert_eq!(limits.max_programs, 12);
        assert_eq!(limits.max_options, FixupLimits::default().max_options);
        assert!(limits.verify_checksum);
    }
}
