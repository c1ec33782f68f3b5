//! Shader Options
//!
//! An option is one axis of variation, such as `"lighting"` with choices
//! `["off", "vertex", "pixel"]`. Static options select between separately
//! compiled programs; dynamic options are resolved inside a program through a
//! selector value in the option uniform block.
//!
//! Each option owns the bit field `[bit_offset, bit_offset + bit_width)` of word
//! `key_word` of its key segment and encodes the choice index there.
//!
//! # Blob Layout
//!
//! ```text
//! 0   u32 name_offset
//! 4   u32 choice_dictionary_offset
//! 8   u32 default_choice
//! 12  u32 kind | bit_offset << 8 | bit_width << 16
//! 16  u32 key_word
//! 20  u32 branch_offset             // u32::MAX when absent
//! ```

use resarc_core::{BlobReader, BlobWriter, FixupLimits, NameDictionary, ResarcError, Result};

use crate::key::{RESERVED_KEY_BIT, VariationKey};

pub(crate) const OPTION_RECORD_WORDS: usize = 6;
const NO_BRANCH_OFFSET: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Static,
    Dynamic,
}

impl OptionKind {
    const fn tag(self) -> u32 {
        match self {
            Self::Static => 0,
            Self::Dynamic => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

/// Where an option lives inside its key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub key_word: u32,
    pub bit_offset: u32,
    pub bit_width: u32,
}

impl BitField {
    /// Mask of the field inside its word.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> u32 {
        if self.bit_width >= 32 {
            u32::MAX
        } else {
            ((1u32 << self.bit_width) - 1) << self.bit_offset
        }
    }
}

/// Parsed option record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResShaderOption {
    name: Box<str>,
    kind: OptionKind,
    choices: NameDictionary,
    default_choice: u32,
    field: BitField,
    branch_offset: Option<u32>,
}

impl ResShaderOption {
    pub(crate) fn new(
        name: &str,
        kind: OptionKind,
        choices: NameDictionary,
        default_choice: u32,
        field: BitField,
        branch_offset: Option<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            choices,
            default_choice,
            field,
            branch_offset,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    #[inline]
    #[must_use]
    pub fn choices(&self) -> &NameDictionary {
        &self.choices
    }

    #[must_use]
    pub fn find_choice_index(&self, name: &str) -> Option<usize> {
        self.choices.find_index(name)
    }

    pub fn choice_name(&self, index: usize) -> Result<&str> {
        self.choices.try_key(index)
    }

    #[inline]
    #[must_use]
    pub fn default_choice(&self) -> usize {
        self.default_choice as usize
    }

    #[inline]
    #[must_use]
    pub fn bit_field(&self) -> BitField {
        self.field
    }

    #[inline]
    #[must_use]
    pub fn key_word(&self) -> usize {
        self.field.key_word as usize
    }

    #[inline]
    #[must_use]
    pub fn bit_mask(&self) -> u32 {
        self.field.mask()
    }

    /// Byte offset of this option's selector in the option uniform block.
    /// Only dynamic options carry one.
    #[inline]
    #[must_use]
    pub fn branch_offset(&self) -> Option<u32> {
        self.branch_offset
    }

    /// Encodes `choice` into the option's segment of `key`.
    pub fn write_choice(&self, key: &mut VariationKey, choice: usize) -> Result<()> {
        self.write_choice_words(key.segment_mut(self.kind), choice)
    }

    /// Segment-level form of [`write_choice`](Self::write_choice).
    pub fn write_choice_words(&self, segment: &mut [u32], choice: usize) -> Result<()> {
        if choice >= self.choice_count() {
            return Err(ResarcError::out_of_range(
                format!("choice of option {:?}", self.name),
                choice,
                self.choice_count(),
            ));
        }
        let Some(word) = segment.get_mut(self.key_word()) else {
            return Err(ResarcError::out_of_range(
                format!("key word of option {:?}", self.name),
                self.key_word(),
                segment.len(),
            ));
        };
        let mask = self.field.mask();
        *word = (*word & !mask) | (((choice as u32) << self.field.bit_offset) & mask);
        Ok(())
    }

    /// Decodes this option's choice from `key`.
    ///
    /// # Panics
    /// If `key` is shorter than this option's shading model requires.
    #[must_use]
    pub fn read_choice(&self, key: &VariationKey) -> usize {
        self.read_choice_words(key.segment(self.kind))
    }

    #[must_use]
    pub fn read_choice_words(&self, segment: &[u32]) -> usize {
        ((segment[self.key_word()] & self.bit_mask()) >> self.field.bit_offset) as usize
    }

    /// Encodes the default choice.
    pub fn write_default(&self, key: &mut VariationKey) -> Result<()> {
        self.write_choice(key, self.default_choice())
    }

    /// Checks the record's internal consistency for a segment of `segment_len`
    /// words. Returns a description of the first problem found.
    pub(crate) fn check_layout(&self, segment_len: usize) -> std::result::Result<(), String> {
        let BitField {
            key_word,
            bit_offset,
            bit_width,
        } = self.field;
        let name = &self.name;

        if self.choices.is_empty() {
            return Err(format!("option {name:?} has no choices"));
        }
        if self.default_choice() >= self.choice_count() {
            return Err(format!(
                "option {name:?} default choice {} >= choice count {}",
                self.default_choice,
                self.choice_count()
            ));
        }
        if bit_width == 0 || bit_offset + bit_width > 32 {
            return Err(format!(
                "option {name:?} bit field {bit_offset}+{bit_width} does not fit a word"
            ));
        }
        if self.choice_count() as u64 > 1u64 << bit_width {
            return Err(format!(
                "option {name:?} has {} choices but only {bit_width} bits",
                self.choice_count()
            ));
        }
        if key_word as usize >= segment_len {
            return Err(format!(
                "option {name:?} key word {key_word} outside {} segment of {segment_len} words",
                self.kind.as_str()
            ));
        }
        if key_word as usize == segment_len - 1 && self.bit_mask() & RESERVED_KEY_BIT != 0 {
            return Err(format!("option {name:?} claims the reserved key bit"));
        }
        match (self.kind, self.branch_offset) {
            (OptionKind::Static, Some(_)) => {
                return Err(format!("static option {name:?} has a branch offset"));
            }
            (OptionKind::Dynamic, Some(offset)) if offset % 4 != 0 => {
                return Err(format!(
                    "option {name:?} branch offset {offset} is not word aligned"
                ));
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn parse(
        reader: &BlobReader<'_>,
        offset: usize,
        kind: OptionKind,
        segment_len: usize,
        limits: &FixupLimits,
    ) -> Result<Self> {
        reader.check_range(offset, OPTION_RECORD_WORDS * 4, "option record")?;
        let name = reader.str_ref_at(offset, "option name")?;
        let dict_at = reader.required_offset_at(offset + 4, "option choices")?;
        let choices = NameDictionary::read(
            reader,
            dict_at,
            limits.max_choices.min(limits.max_dictionary_entries),
        )?;
        let default_choice = reader.u32_at(offset + 8, "option default")?;
        let packed = reader.u32_at(offset + 12, "option bit field")?;
        let key_word = reader.u32_at(offset + 16, "option key word")?;
        let branch = reader.u32_at(offset + 20, "option branch offset")?;

        let tag = packed & 0xff;
        if tag != kind.tag() {
            return Err(ResarcError::corrupt(format!(
                "option {name:?} has kind tag {tag}, expected {} ({})",
                kind.tag(),
                kind.as_str()
            )));
        }

        let option = Self {
            name: name.into(),
            kind,
            choices,
            default_choice,
            field: BitField {
                key_word,
                bit_offset: (packed >> 8) & 0xff,
                bit_width: (packed >> 16) & 0xff,
            },
            branch_offset: (branch != NO_BRANCH_OFFSET).then_some(branch),
        };
        option
            .check_layout(segment_len)
            .map_err(ResarcError::corrupt)?;
        Ok(option)
    }

    pub(crate) fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(OPTION_RECORD_WORDS);
        let name = writer.push_str(&self.name);
        let choices = self.choices.write(writer);
        let packed =
            self.kind.tag() | (self.field.bit_offset << 8) | (self.field.bit_width << 16);

        writer.patch_u32(record, name);
        writer.patch_u32(record + 4, choices);
        writer.patch_u32(record + 8, self.default_choice);
        writer.patch_u32(record + 12, packed);
        writer.patch_u32(record + 16, self.field.key_word);
        writer.patch_u32(record + 20, self.branch_offset.unwrap_or(NO_BRANCH_OFFSET));
        record
    }
}

/// Rejects options in one segment whose bit fields overlap.
pub(crate) fn check_disjoint(options: &[ResShaderOption]) -> std::result::Result<(), String> {
    for (i, a) in options.iter().enumerate() {
        for b in &options[i + 1..] {
            if a.key_word() == b.key_word() && a.bit_mask() & b.bit_mask() != 0 {
                return Err(format!(
                    "options {:?} and {:?} overlap in key word {}",
                    a.name,
                    b.name,
                    a.key_word()
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resarc_core::HEADER_LEN;

    fn lighting() -> ResShaderOption {
        ResShaderOption::new(
            "lighting",
            OptionKind::Static,
            NameDictionary::from_names(["off", "vertex", "pixel"]).unwrap(),
            2,
            BitField {
                key_word: 0,
                bit_offset: 4,
                bit_width: 2,
            },
            None,
        )
    }

    #[test]
    fn write_then_read_choice() {
        let option = lighting();
        let mut key = VariationKey::new(1, 1);
        key.static_words_mut()[0] = 0b1100_1111;
        option.write_choice(&mut key, 1).unwrap();
        assert_eq!(option.read_choice(&key), 1);
        // bits outside the field are preserved
        assert_eq!(key.static_words()[0], 0b1101_1111);
        assert_eq!(key.dynamic_words(), &[0]);
    }

    #[test]
    fn choice_out_of_range_is_rejected() {
        let option = lighting();
        let mut key = VariationKey::new(1, 0);
        assert!(matches!(
            option.write_choice(&mut key, 3),
            Err(ResarcError::OutOfRange { index: 3, count: 3, .. })
        ));
        assert_eq!(key.static_words(), &[0]);
    }

    #[test]
    fn default_is_written() {
        let option = lighting();
        let mut key = VariationKey::new(1, 0);
        option.write_default(&mut key).unwrap();
        assert_eq!(option.read_choice(&key), 2);
    }

    #[test]
    fn choices_resolve_by_name() {
        let option = lighting();
        assert_eq!(option.find_choice_index("vertex"), Some(1));
        assert_eq!(option.find_choice_index("Vertex"), None);
        assert_eq!(option.choice_name(2).unwrap(), "pixel");
        assert!(option.choice_name(3).is_err());
    }

    #[test]
    fn layout_rejects_too_many_choices() {
        let option = ResShaderOption::new(
            "x",
            OptionKind::Static,
            NameDictionary::from_names(["a", "b", "c"]).unwrap(),
            0,
            BitField {
                key_word: 0,
                bit_offset: 0,
                bit_width: 1,
            },
            None,
        );
        assert!(option.check_layout(1).is_err());
    }

    #[test]
    fn layout_rejects_reserved_bit() {
        let option = ResShaderOption::new(
            "x",
            OptionKind::Dynamic,
            NameDictionary::from_names(["a", "b"]).unwrap(),
            0,
            BitField {
                key_word: 0,
                bit_offset: 31,
                bit_width: 1,
            },
            None,
        );
        assert!(option.check_layout(1).unwrap_err().contains("reserved"));
        // fine when another word follows
        assert!(option.check_layout(2).is_ok());
    }

    #[test]
    fn overlapping_fields_are_detected() {
        let a = lighting();
        let b = ResShaderOption::new(
            "shadows",
            OptionKind::Static,
            NameDictionary::from_names(["off", "on"]).unwrap(),
            0,
            BitField {
                key_word: 0,
                bit_offset: 5,
                bit_width: 1,
            },
            None,
        );
        assert!(check_disjoint(&[a, b]).is_err());
    }

    #[test]
    fn record_roundtrips_through_blob() {
        let option = ResShaderOption::new(
            "fog",
            OptionKind::Dynamic,
            NameDictionary::from_names(["off", "linear", "exp"]).unwrap(),
            1,
            BitField {
                key_word: 0,
                bit_offset: 0,
                bit_width: 2,
            },
            Some(8),
        );
        let mut w = BlobWriter::new();
        let at = option.write(&mut w);
        let bytes = w.finish(at, 8).unwrap();
        let reader = BlobReader::new(&bytes);

        let parsed = ResShaderOption::parse(
            &reader,
            at as usize,
            OptionKind::Dynamic,
            1,
            &FixupLimits::default(),
        )
        .unwrap();
        assert_eq!(parsed, option);
        assert_eq!(parsed.branch_offset(), Some(8));

        assert!(
            ResShaderOption::parse(&reader, at as usize, OptionKind::Static, 1, &FixupLimits::default())
                .is_err()
        );
        assert!(at as usize >= HEADER_LEN);
    }
}
