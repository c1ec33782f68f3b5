//! Name Dictionary
//!
//! An immutable, sorted index from names to slot indices within a resource
//! array. Entries are ordered byte-wise (case-sensitive, not locale-aware), so
//! lookups are a binary search. Indices are assigned once at build time and are
//! stable for the lifetime of the dictionary, which makes them suitable for
//! caching and O(1) repeat access.
//!
//! # Blob Layout
//!
//! ```text
//! u32 count
//! count × { u32 name_offset, u32 index }   // sorted by name
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let dict = NameDictionary::from_names(["alpha", "gamma", "beta"])?;
//! assert_eq!(dict.find_index("beta"), Some(2));
//! assert_eq!(dict.key(2), "beta");
//! ```

use std::cmp::Ordering;

use crate::errors::{ResarcError, Result};
use crate::reader::BlobReader;
use crate::writer::BlobWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DictEntry {
    name: Box<str>,
    index: u32,
}

/// Sorted name → index map with O(1) reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameDictionary {
    /// Sorted by `name` bytes.
    entries: Vec<DictEntry>,
    /// `index` → position in `entries`.
    by_index: Vec<u32>,
}

impl NameDictionary {
    /// Builds a dictionary whose indices follow the iteration order of `names`.
    ///
    /// Duplicate names are rejected.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<DictEntry> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| DictEntry {
                name: name.into().into_boxed_str(),
                index: index as u32,
            })
            .collect();
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(ResarcError::build(format!(
                "duplicate dictionary name {:?}",
                pair[0].name
            )));
        }

        Ok(Self::from_sorted(entries))
    }

    fn from_sorted(entries: Vec<DictEntry>) -> Self {
        let mut by_index = vec![0u32; entries.len()];
        for (pos, entry) in entries.iter().enumerate() {
            by_index[entry.index as usize] = pos as u32;
        }
        Self { entries, by_index }
    }

    /// Binary search for `name`.
    #[must_use]
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|pos| self.entries[pos].index as usize)
    }

    /// Reverse lookup.
    ///
    /// # Panics
    /// If `index` is not in `0..len()`.
    #[must_use]
    pub fn key(&self, index: usize) -> &str {
        assert!(
            index < self.by_index.len(),
            "dictionary index {index} out of range (count {})",
            self.by_index.len()
        );
        &self.entries[self.by_index[index] as usize].name
    }

    /// Reverse lookup that reports an [`OutOfRange`](ResarcError::OutOfRange)
    /// instead of panicking.
    pub fn try_key(&self, index: usize) -> Result<&str> {
        ResarcError::check_index("dictionary key", index, self.by_index.len())?;
        Ok(self.key(index))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, index)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.entries.iter().map(|e| (&*e.name, e.index as usize))
    }

    /// Names in index order.
    pub fn names_by_index(&self) -> impl Iterator<Item = &str> + '_ {
        self.by_index
            .iter()
            .map(|&pos| &*self.entries[pos as usize].name)
    }

    /// Parses a dictionary record at `offset`, checking sort order, uniqueness
    /// of names and that indices form a permutation of `0..count`.
    pub fn read(reader: &BlobReader<'_>, offset: usize, max_entries: usize) -> Result<Self> {
        let count = reader.count_at(offset, max_entries, "dictionary count")?;
        reader.check_range(offset + 4, count * 8, "dictionary entries")?;

        let mut entries: Vec<DictEntry> = Vec::with_capacity(count);
        let mut seen = vec![false; count];
        for i in 0..count {
            let field = offset + 4 + i * 8;
            let name = reader.str_ref_at(field, "dictionary name")?;
            let index = reader.u32_at(field + 4, "dictionary index")? as usize;

            if index >= count || std::mem::replace(&mut seen[index], true) {
                return Err(ResarcError::corrupt(format!(
                    "dictionary entry {name:?} has invalid or repeated index {index}"
                )));
            }
            if let Some(prev) = entries.last() {
                match prev.name.as_bytes().cmp(name.as_bytes()) {
                    Ordering::Less => {}
                    Ordering::Equal => {
                        return Err(ResarcError::corrupt(format!(
                            "duplicate dictionary name {name:?}"
                        )));
                    }
                    Ordering::Greater => {
                        return Err(ResarcError::corrupt(format!(
                            "dictionary not sorted at {name:?}"
                        )));
                    }
                }
            }
            entries.push(DictEntry {
                name: name.into(),
                index: index as u32,
            });
        }

        Ok(Self::from_sorted(entries))
    }

    /// Appends this dictionary to `writer` and returns its offset.
    pub fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(1 + self.entries.len() * 2);
        writer.patch_u32(record, self.entries.len() as u32);
        for (i, entry) in self.entries.iter().enumerate() {
            let field = record + 4 + (i as u32) * 8;
            let name = writer.push_str(&entry.name);
            writer.patch_u32(field, name);
            writer.patch_u32(field + 4, entry.index);
        }
        record
    }
}
