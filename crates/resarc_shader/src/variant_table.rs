//! Shader Variant Table
//!
//! Maps full variation keys to program indices. Rows are stored sorted by key
//! (static words first, then dynamic words) and keys are unique, so lookups are
//! binary searches:
//!
//! - [`find_program_index`](ShaderVariantTable::find_program_index): exact match
//!   on the full key.
//! - [`find_program_range`](ShaderVariantTable::find_program_range): the
//!   contiguous rows sharing a static prefix.
//! - [`find_program_index_in_range`](ShaderVariantTable::find_program_index_in_range):
//!   exact match on the dynamic suffix inside such a range.
//!
//! The two-step form lets a caller resolve static options once per material
//! and then switch dynamic options with a search over a handful of rows.
//!
//! # Blob Layout
//!
//! ```text
//! 0   u32 row_count
//! 4   u32 static_len
//! 8   u32 dynamic_len
//! 12  u32 default_program
//! 16  u32 keys_offset              // row_count × (static_len + dynamic_len) words
//! 20  u32 program_indices_offset   // row_count words
//! ```

use std::cmp::Ordering;

use resarc_core::{BlobReader, BlobWriter, FixupLimits, ResarcError, Result};

use crate::key::{VariationKey, reserved_bit_clear};
use crate::option::ResShaderOption;

const TABLE_RECORD_WORDS: usize = 6;

/// Half-open row range `[begin, end)` of a variant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramRange {
    pub begin: usize,
    pub end: usize,
}

impl ProgramRange {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, row: usize) -> bool {
        (self.begin..self.end).contains(&row)
    }
}

/// Sorted `(key, program_index)` rows of one shading model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderVariantTable {
    static_len: usize,
    dynamic_len: usize,
    /// Row-major key words.
    keys: Vec<u32>,
    program_indices: Vec<u32>,
    /// Inverse of `program_indices`.
    rows_by_program: Vec<u32>,
    default_program: u32,
}

// First index in `lo..hi` where `pred` turns false; `pred` must be monotone.
fn partition_point(mut lo: usize, mut hi: usize, pred: impl Fn(usize) -> bool) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

impl ShaderVariantTable {
    /// Builds a table from rows already sorted by key, then validates it.
    pub(crate) fn from_sorted_rows(
        static_len: usize,
        dynamic_len: usize,
        rows: &[(Vec<u32>, u32)],
        default_program: u32,
    ) -> std::result::Result<Self, String> {
        let mut keys = Vec::with_capacity(rows.len() * (static_len + dynamic_len));
        let mut program_indices = Vec::with_capacity(rows.len());
        for (key, program) in rows {
            keys.extend_from_slice(key);
            program_indices.push(*program);
        }
        Self::assemble(static_len, dynamic_len, keys, program_indices, default_program)
    }

    fn assemble(
        static_len: usize,
        dynamic_len: usize,
        keys: Vec<u32>,
        program_indices: Vec<u32>,
        default_program: u32,
    ) -> std::result::Result<Self, String> {
        let row_count = program_indices.len();
        let key_len = static_len + dynamic_len;

        if static_len == 0 || dynamic_len == 0 {
            return Err(format!(
                "key segments must be non-empty (static {static_len}, dynamic {dynamic_len})"
            ));
        }
        if row_count == 0 {
            return Err("variant table has no rows".to_owned());
        }
        if keys.len() != row_count * key_len {
            return Err(format!(
                "variant table has {} key words for {row_count} rows of {key_len}",
                keys.len()
            ));
        }
        if default_program as usize >= row_count {
            return Err(format!(
                "default program {default_program} >= program count {row_count}"
            ));
        }

        let mut rows_by_program = vec![u32::MAX; row_count];
        for (row, &program) in program_indices.iter().enumerate() {
            match rows_by_program.get_mut(program as usize) {
                Some(slot) if *slot == u32::MAX => *slot = row as u32,
                _ => {
                    return Err(format!(
                        "row {row} maps to invalid or repeated program {program}"
                    ));
                }
            }
        }

        let table = Self {
            static_len,
            dynamic_len,
            keys,
            program_indices,
            rows_by_program,
            default_program,
        };

        for row in 0..row_count {
            let key = table.row_key(row);
            if !reserved_bit_clear(&key[..static_len]) || !reserved_bit_clear(&key[static_len..]) {
                return Err(format!("row {row} key sets a reserved bit"));
            }
            if row > 0 {
                match table.row_key(row - 1).cmp(key) {
                    Ordering::Less => {}
                    Ordering::Equal => return Err(format!("duplicate variant key at row {row}")),
                    Ordering::Greater => return Err(format!("variant table unsorted at row {row}")),
                }
            }
        }

        Ok(table)
    }

    /// Checks every row's key against the options that own its bits: no bit
    /// outside an option field, and every encoded choice in range.
    pub(crate) fn check_options(
        &self,
        static_options: &[ResShaderOption],
        dynamic_options: &[ResShaderOption],
    ) -> std::result::Result<(), String> {
        let static_masks = segment_masks(static_options, self.static_len);
        let dynamic_masks = segment_masks(dynamic_options, self.dynamic_len);

        for row in 0..self.len() {
            let key = self.row_key(row);
            let (static_words, dynamic_words) = key.split_at(self.static_len);
            for (words, masks, options) in [
                (static_words, &static_masks, static_options),
                (dynamic_words, &dynamic_masks, dynamic_options),
            ] {
                if let Some(i) = (0..words.len()).find(|&i| words[i] & !masks[i] != 0) {
                    return Err(format!("row {row} sets bits outside any option in word {i}"));
                }
                if let Some(option) = options
                    .iter()
                    .find(|o| o.read_choice_words(words) >= o.choice_count())
                {
                    return Err(format!(
                        "row {row} encodes an out-of-range choice for option {:?}",
                        option.name()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Number of rows, which equals the number of programs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.program_indices.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.program_indices.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn static_len(&self) -> usize {
        self.static_len
    }

    #[inline]
    #[must_use]
    pub fn dynamic_len(&self) -> usize {
        self.dynamic_len
    }

    #[inline]
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.static_len + self.dynamic_len
    }

    #[inline]
    #[must_use]
    pub fn default_program_index(&self) -> usize {
        self.default_program as usize
    }

    #[inline]
    fn row_key(&self, row: usize) -> &[u32] {
        let len = self.key_len();
        &self.keys[row * len..(row + 1) * len]
    }

    /// Key words and program index of `row`.
    pub fn row(&self, row: usize) -> Result<(&[u32], usize)> {
        ResarcError::check_index("variant table row", row, self.len())?;
        Ok((self.row_key(row), self.program_indices[row] as usize))
    }

    /// Key words of `program_index`.
    pub fn program_key_words(&self, program_index: usize) -> Result<&[u32]> {
        ResarcError::check_index("program index", program_index, self.len())?;
        Ok(self.row_key(self.rows_by_program[program_index] as usize))
    }

    pub fn key_of_program(&self, program_index: usize) -> Result<VariationKey> {
        let words = self.program_key_words(program_index)?;
        Ok(VariationKey::from_words(words, self.static_len))
    }

    /// Exact lookup of a full key.
    #[must_use]
    pub fn find_program_index(&self, key: &VariationKey) -> Option<usize> {
        if key.static_len() != self.static_len || key.dynamic_len() != self.dynamic_len {
            log::trace!(
                "key shape {}+{} does not match table {}+{}",
                key.static_len(),
                key.dynamic_len(),
                self.static_len,
                self.dynamic_len
            );
            return None;
        }
        let words = key.words();
        let row = partition_point(0, self.len(), |r| self.row_key(r) < words);
        (row < self.len() && self.row_key(row) == words)
            .then(|| self.program_indices[row] as usize)
    }

    /// Rows whose static prefix equals `static_words`, or `None` if there are none.
    #[must_use]
    pub fn find_program_range(&self, static_words: &[u32]) -> Option<ProgramRange> {
        if static_words.len() != self.static_len {
            return None;
        }
        let prefix = |r: usize| &self.row_key(r)[..self.static_len];
        let begin = partition_point(0, self.len(), |r| prefix(r) < static_words);
        let end = partition_point(begin, self.len(), |r| prefix(r) <= static_words);
        let range = ProgramRange { begin, end };
        (!range.is_empty()).then_some(range)
    }

    /// Exact lookup of `dynamic_words` among the rows of `range`.
    #[must_use]
    pub fn find_program_index_in_range(
        &self,
        range: ProgramRange,
        dynamic_words: &[u32],
    ) -> Option<usize> {
        if dynamic_words.len() != self.dynamic_len {
            return None;
        }
        let end = range.end.min(self.len());
        let suffix = |r: usize| &self.row_key(r)[self.static_len..];
        let row = partition_point(range.begin, end, |r| suffix(r) < dynamic_words);
        (row < end && suffix(row) == dynamic_words).then(|| self.program_indices[row] as usize)
    }

    pub(crate) fn parse(
        reader: &BlobReader<'_>,
        offset: usize,
        limits: &FixupLimits,
    ) -> Result<Self> {
        reader.check_range(offset, TABLE_RECORD_WORDS * 4, "variant table")?;
        let row_count = reader.count_at(offset, limits.max_programs, "variant row count")?;
        let static_len = reader.count_at(offset + 4, limits.max_key_words, "static key length")?;
        let dynamic_len =
            reader.count_at(offset + 8, limits.max_key_words, "dynamic key length")?;
        if static_len + dynamic_len > limits.max_key_words {
            return Err(ResarcError::corrupt(format!(
                "key length {} exceeds limit {}",
                static_len + dynamic_len,
                limits.max_key_words
            )));
        }
        let default_program = reader.u32_at(offset + 12, "default program")?;
        let keys_at = reader.required_offset_at(offset + 16, "variant keys")?;
        let programs_at = reader.required_offset_at(offset + 20, "variant program indices")?;

        let key_words = row_count
            .checked_mul(static_len + dynamic_len)
            .ok_or_else(|| ResarcError::corrupt("variant key array size overflows"))?;
        let keys = reader.u32_array(keys_at, key_words, "variant keys")?;
        let program_indices = reader.u32_array(programs_at, row_count, "variant program indices")?;

        Self::assemble(static_len, dynamic_len, keys, program_indices, default_program)
            .map_err(ResarcError::corrupt)
    }

    pub(crate) fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(TABLE_RECORD_WORDS);
        let keys = writer.push_u32_slice(&self.keys);
        let programs = writer.push_u32_slice(&self.program_indices);
        writer.patch_u32(record, self.len() as u32);
        writer.patch_u32(record + 4, self.static_len as u32);
        writer.patch_u32(record + 8, self.dynamic_len as u32);
        writer.patch_u32(record + 12, self.default_program);
        writer.patch_u32(record + 16, keys);
        writer.patch_u32(record + 20, programs);
        record
    }
}

fn segment_masks(options: &[ResShaderOption], segment_len: usize) -> Vec<u32> {
    let mut masks = vec![0u32; segment_len];
    for option in options {
        if let Some(mask) = masks.get_mut(option.key_word()) {
            *mask |= option.bit_mask();
        }
    }
    masks
}
