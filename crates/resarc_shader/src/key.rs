//! Variation Keys
//!
//! A [`VariationKey`] identifies one program of a shading model. It is a
//! sequence of 32-bit words split into a static segment followed by a dynamic
//! segment; every option owns a bit field inside one word of its segment.
//!
//! Keys compare lexicographically word by word, which is the order the variant
//! table is sorted in. Because the static words come first, all rows sharing a
//! static prefix are contiguous.
//!
//! # Invalid keys
//!
//! Writing `u32::MAX` into every word of a segment marks it invalid. The top bit
//! of the last word of each segment ([`RESERVED_KEY_BIT`]) is never assigned to
//! an option, so an invalid segment can never collide with a stored key.

use smallvec::SmallVec;

use crate::option::OptionKind;

/// Bit reserved in the last word of each segment.
pub const RESERVED_KEY_BIT: u32 = 1 << 31;

/// Bit-packed static and dynamic option choices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariationKey {
    words: SmallVec<[u32; 8]>,
    static_len: usize,
}

impl VariationKey {
    /// An all-zero key with the given segment lengths.
    #[must_use]
    pub fn new(static_len: usize, dynamic_len: usize) -> Self {
        Self {
            words: SmallVec::from_elem(0, static_len + dynamic_len),
            static_len,
        }
    }

    /// Wraps existing words; the first `static_len` belong to the static segment.
    ///
    /// # Panics
    /// If `static_len > words.len()`.
    #[must_use]
    pub fn from_words(words: &[u32], static_len: usize) -> Self {
        assert!(
            static_len <= words.len(),
            "static length {static_len} exceeds key length {}",
            words.len()
        );
        Self {
            words: SmallVec::from_slice(words),
            static_len,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn static_len(&self) -> usize {
        self.static_len
    }

    #[inline]
    #[must_use]
    pub fn dynamic_len(&self) -> usize {
        self.words.len() - self.static_len
    }

    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    #[must_use]
    pub fn static_words(&self) -> &[u32] {
        &self.words[..self.static_len]
    }

    #[inline]
    #[must_use]
    pub fn dynamic_words(&self) -> &[u32] {
        &self.words[self.static_len..]
    }

    #[inline]
    pub fn static_words_mut(&mut self) -> &mut [u32] {
        &mut self.words[..self.static_len]
    }

    #[inline]
    pub fn dynamic_words_mut(&mut self) -> &mut [u32] {
        &mut self.words[self.static_len..]
    }

    /// The segment options of `kind` are packed into.
    #[inline]
    #[must_use]
    pub fn segment(&self, kind: OptionKind) -> &[u32] {
        match kind {
            OptionKind::Static => self.static_words(),
            OptionKind::Dynamic => self.dynamic_words(),
        }
    }

    #[inline]
    pub fn segment_mut(&mut self, kind: OptionKind) -> &mut [u32] {
        match kind {
            OptionKind::Static => self.static_words_mut(),
            OptionKind::Dynamic => self.dynamic_words_mut(),
        }
    }

    pub fn write_invalid_static_key(&mut self) {
        self.static_words_mut().fill(u32::MAX);
    }

    pub fn write_invalid_dynamic_key(&mut self) {
        self.dynamic_words_mut().fill(u32::MAX);
    }

    /// True when the static segment holds the invalid pattern.
    #[must_use]
    pub fn is_invalid_static_key(&self) -> bool {
        is_invalid_segment(self.static_words())
    }

    /// True when the dynamic segment holds the invalid pattern.
    #[must_use]
    pub fn is_invalid_dynamic_key(&self) -> bool {
        is_invalid_segment(self.dynamic_words())
    }
}

/// A segment is invalid when it is non-empty and every word is all ones.
#[must_use]
pub fn is_invalid_segment(words: &[u32]) -> bool {
    !words.is_empty() && words.iter().all(|&w| w == u32::MAX)
}

/// True when the reserved bit of the segment's last word is clear.
#[must_use]
pub fn reserved_bit_clear(words: &[u32]) -> bool {
    words.last().is_none_or(|&w| w & RESERVED_KEY_BIT == 0)
}
