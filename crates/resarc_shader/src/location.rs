//! Resource Location Tables
//!
//! A program binds samplers, images, uniform blocks and storage blocks by
//! per-stage location. Each kind gets a [`LocationTable`]: a dense
//! `element × stage` grid of `i32`, where [`INVALID_LOCATION`] marks an element
//! a stage does not use. Element indices are the indices of the shading model's
//! reflection dictionaries.
//!
//! # Blob Layout
//!
//! ```text
//! 0   u32 stage_count                  // == STAGE_COUNT
//! 4   u32 sampler_count
//! 8   u32 image_count
//! 12  u32 uniform_block_count
//! 16  u32 storage_block_count
//! 20  i32 values[...]                  // each table in that order, row-major
//! ```

use resarc_core::{BlobReader, BlobWriter, ResarcError, Result};

use crate::stage::{INVALID_LOCATION, ResourceKind, STAGE_COUNT, ShaderStage};

const LOCATIONS_HEADER_WORDS: usize = 5;

/// Per-stage locations of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationTable {
    values: Vec<i32>,
}

impl LocationTable {
    /// A table of `element_count` elements with every location invalid.
    #[must_use]
    pub fn new(element_count: usize) -> Self {
        Self {
            values: vec![INVALID_LOCATION; element_count * STAGE_COUNT],
        }
    }

    /// Wraps row-major values; the length must be a multiple of [`STAGE_COUNT`].
    pub fn from_values(values: Vec<i32>) -> Result<Self> {
        if values.len() % STAGE_COUNT != 0 {
            return Err(ResarcError::build(format!(
                "location table of {} values is not a multiple of {STAGE_COUNT} stages",
                values.len()
            )));
        }
        Ok(Self { values })
    }

    #[inline]
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.values.len() / STAGE_COUNT
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Position of `(element, stage)` in [`values`](Self::values).
    pub fn flat_index(&self, element: usize, stage: ShaderStage) -> Result<usize> {
        ResarcError::check_index("location element", element, self.element_count())?;
        Ok(element * STAGE_COUNT + stage.index())
    }

    pub fn location(&self, element: usize, stage: ShaderStage) -> Result<i32> {
        let i = self.flat_index(element, stage)?;
        Ok(self.values[i])
    }

    pub fn set_location(&mut self, element: usize, stage: ShaderStage, location: i32) -> Result<()> {
        let i = self.flat_index(element, stage)?;
        self.values[i] = location;
        Ok(())
    }

    /// True when any stage references `element`.
    #[must_use]
    pub fn is_used(&self, element: usize) -> bool {
        self.values
            .chunks_exact(STAGE_COUNT)
            .nth(element)
            .is_some_and(|row| row.iter().any(|&v| v != INVALID_LOCATION))
    }
}

/// Location tables of every resource kind for one program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramLocations {
    pub samplers: LocationTable,
    pub images: LocationTable,
    pub uniform_blocks: LocationTable,
    pub storage_blocks: LocationTable,
}

impl ProgramLocations {
    /// All-invalid tables shaped for the given element counts, in
    /// [`ResourceKind::ALL`] order.
    #[must_use]
    pub fn invalid(counts: [usize; 4]) -> Self {
        Self {
            samplers: LocationTable::new(counts[0]),
            images: LocationTable::new(counts[1]),
            uniform_blocks: LocationTable::new(counts[2]),
            storage_blocks: LocationTable::new(counts[3]),
        }
    }

    #[must_use]
    pub fn table(&self, kind: ResourceKind) -> &LocationTable {
        match kind {
            ResourceKind::Sampler => &self.samplers,
            ResourceKind::Image => &self.images,
            ResourceKind::UniformBlock => &self.uniform_blocks,
            ResourceKind::StorageBlock => &self.storage_blocks,
        }
    }

    pub fn table_mut(&mut self, kind: ResourceKind) -> &mut LocationTable {
        match kind {
            ResourceKind::Sampler => &mut self.samplers,
            ResourceKind::Image => &mut self.images,
            ResourceKind::UniformBlock => &mut self.uniform_blocks,
            ResourceKind::StorageBlock => &mut self.storage_blocks,
        }
    }

    /// Element counts in [`ResourceKind::ALL`] order.
    #[must_use]
    pub fn counts(&self) -> [usize; 4] {
        ResourceKind::ALL.map(|kind| self.table(kind).element_count())
    }

    pub(crate) fn parse(
        reader: &BlobReader<'_>,
        offset: usize,
        expected_counts: [usize; 4],
    ) -> Result<Self> {
        let stage_count = reader.u32_at(offset, "location stage count")? as usize;
        if stage_count != STAGE_COUNT {
            return Err(ResarcError::corrupt(format!(
                "location stage count {stage_count}, expected {STAGE_COUNT}"
            )));
        }

        let mut locations = Self::default();
        let mut cursor = offset + LOCATIONS_HEADER_WORDS * 4;
        for (i, kind) in ResourceKind::ALL.into_iter().enumerate() {
            let count = reader.u32_at(offset + 4 + i * 4, "location count")? as usize;
            if count != expected_counts[i] {
                return Err(ResarcError::corrupt(format!(
                    "{} location count {count} does not match dictionary size {}",
                    kind.as_str(),
                    expected_counts[i]
                )));
            }
            let len = count * STAGE_COUNT;
            let values = reader.i32_array(cursor, len, "location values")?;
            *locations.table_mut(kind) = LocationTable { values };
            cursor += len * 4;
        }
        Ok(locations)
    }

    pub(crate) fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(LOCATIONS_HEADER_WORDS);
        writer.patch_u32(record, STAGE_COUNT as u32);
        for (i, kind) in ResourceKind::ALL.into_iter().enumerate() {
            let table = self.table(kind);
            writer.patch_u32(record + 4 + i as u32 * 4, table.element_count() as u32);
            writer.push_i32_slice(table.values());
        }
        record
    }
}
