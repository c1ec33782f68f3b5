//! Shader Archive Resources
//!
//! The parsed, immutable side of a shader archive. [`ResShaderArchive`] is the
//! root record of a blob; fixing a blob up produces one of these as a plain
//! arena:
//!
//! ```text
//! ResShaderArchive
//! ├── model dictionary (name → index == position)
//! └── ResShadingModel[]             (sorted by name)
//!     ├── static / dynamic ResShaderOption[] + their dictionaries
//!     ├── ShaderVariantTable         (key → program index)
//!     ├── ResShaderProgram[]         (payloads and stored locations)
//!     └── attribute / sampler / image / uniform block / storage block dictionaries
//! ```
//!
//! Cross-references are indices. A shading model knows its position in the
//! archive through `archive_index`; nothing holds a pointer into the blob.
//!
//! # Blob Layout
//!
//! ```text
//! archive:        name, model_count, models[], model_dictionary
//! shading model:  name, static_count, static[], dynamic_count, dynamic[],
//!                 static_dict, dynamic_dict, variant_table,
//!                 program_count, programs[],
//!                 attribute_dict, sampler_dict, image_dict,
//!                 uniform_block_dict, storage_block_dict
//! program:        flags, binary, source, ir, locations
//! ```
//!
//! All fields are `u32`; arrays of records are arrays of record offsets.

use bitflags::bitflags;
use resarc_core::{
    BlobReader, BlobRoot, BlobWriter, FixupLimits, NameDictionary, ResarcError, Result,
};

use crate::key::VariationKey;
use crate::location::ProgramLocations;
use crate::option::{OptionKind, ResShaderOption, check_disjoint};
use crate::stage::ResourceKind;
use crate::variant_table::ShaderVariantTable;

const ARCHIVE_RECORD_WORDS: usize = 4;
const MODEL_RECORD_WORDS: usize = 15;
const PROGRAM_RECORD_WORDS: usize = 5;

bitflags! {
    /// Payloads a program carries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PayloadFlags: u32 {
        const BINARY = 1 << 0;
        const SOURCE = 1 << 1;
        const IR     = 1 << 2;
    }
}

// ============================================================================
// Program
// ============================================================================

/// One compiled variant as stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResShaderProgram {
    pub(crate) flags: PayloadFlags,
    pub(crate) binary: Option<Box<[u8]>>,
    pub(crate) source: Option<Box<str>>,
    pub(crate) ir: Option<Box<[u8]>>,
    pub(crate) locations: Option<ProgramLocations>,
}

impl ResShaderProgram {
    #[inline]
    #[must_use]
    pub fn flags(&self) -> PayloadFlags {
        self.flags
    }

    #[must_use]
    pub fn binary(&self) -> Option<&[u8]> {
        self.binary.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn ir(&self) -> Option<&[u8]> {
        self.ir.as_deref()
    }

    /// Locations recorded at build time, if any.
    #[must_use]
    pub fn stored_locations(&self) -> Option<&ProgramLocations> {
        self.locations.as_ref()
    }

    fn parse(reader: &BlobReader<'_>, offset: usize, location_counts: [usize; 4]) -> Result<Self> {
        reader.check_range(offset, PROGRAM_RECORD_WORDS * 4, "program record")?;
        let raw = reader.u32_at(offset, "program flags")?;
        let flags = PayloadFlags::from_bits(raw)
            .ok_or_else(|| ResarcError::corrupt(format!("unknown program flag bits {raw:#x}")))?;

        let binary = reader.offset_at(offset + 4, "program binary")?;
        let source = reader.offset_at(offset + 8, "program source")?;
        let ir = reader.offset_at(offset + 12, "program ir")?;
        for (flag, present, what) in [
            (PayloadFlags::BINARY, binary.is_some(), "binary"),
            (PayloadFlags::SOURCE, source.is_some(), "source"),
            (PayloadFlags::IR, ir.is_some(), "ir"),
        ] {
            if flags.contains(flag) != present {
                return Err(ResarcError::corrupt(format!(
                    "program {what} flag does not match its payload offset"
                )));
            }
        }

        let locations = reader
            .offset_at(offset + 16, "program locations")?
            .map(|at| ProgramLocations::parse(reader, at, location_counts))
            .transpose()?;

        Ok(Self {
            flags,
            binary: binary
                .map(|at| reader.bytes_at(at, "program binary"))
                .transpose()?
                .map(Into::into),
            source: source
                .map(|at| reader.str_at(at, "program source"))
                .transpose()?
                .map(Into::into),
            ir: ir
                .map(|at| reader.bytes_at(at, "program ir"))
                .transpose()?
                .map(Into::into),
            locations,
        })
    }

    fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(PROGRAM_RECORD_WORDS);
        let binary = self.binary.as_deref().map_or(0, |b| writer.push_bytes(b));
        let source = self
            .source
            .as_deref()
            .map_or(0, |s| writer.push_bytes(s.as_bytes()));
        let ir = self.ir.as_deref().map_or(0, |b| writer.push_bytes(b));
        let locations = self.locations.as_ref().map_or(0, |l| l.write(writer));

        writer.patch_u32(record, self.flags.bits());
        writer.patch_u32(record + 4, binary);
        writer.patch_u32(record + 8, source);
        writer.patch_u32(record + 12, ir);
        writer.patch_u32(record + 16, locations);
        record
    }
}

// ============================================================================
// Shading Model
// ============================================================================

/// One shader with its variation space and every precompiled variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResShadingModel {
    pub(crate) name: Box<str>,
    pub(crate) archive_index: usize,
    pub(crate) static_options: Vec<ResShaderOption>,
    pub(crate) static_dict: NameDictionary,
    pub(crate) dynamic_options: Vec<ResShaderOption>,
    pub(crate) dynamic_dict: NameDictionary,
    pub(crate) variant_table: ShaderVariantTable,
    pub(crate) programs: Vec<ResShaderProgram>,
    pub(crate) attributes: NameDictionary,
    pub(crate) samplers: NameDictionary,
    pub(crate) images: NameDictionary,
    pub(crate) uniform_blocks: NameDictionary,
    pub(crate) storage_blocks: NameDictionary,
}

impl ResShadingModel {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this model in its archive.
    #[inline]
    #[must_use]
    pub fn archive_index(&self) -> usize {
        self.archive_index
    }

    // --- Options -----------------------------------------------------------

    #[must_use]
    pub fn static_options(&self) -> &[ResShaderOption] {
        &self.static_options
    }

    #[must_use]
    pub fn dynamic_options(&self) -> &[ResShaderOption] {
        &self.dynamic_options
    }

    pub fn static_option(&self, index: usize) -> Result<&ResShaderOption> {
        ResarcError::check_index("static option", index, self.static_options.len())?;
        Ok(&self.static_options[index])
    }

    pub fn dynamic_option(&self, index: usize) -> Result<&ResShaderOption> {
        ResarcError::check_index("dynamic option", index, self.dynamic_options.len())?;
        Ok(&self.dynamic_options[index])
    }

    #[must_use]
    pub fn find_static_option(&self, name: &str) -> Option<usize> {
        self.static_dict.find_index(name)
    }

    #[must_use]
    pub fn find_dynamic_option(&self, name: &str) -> Option<usize> {
        self.dynamic_dict.find_index(name)
    }

    /// Finds an option of either kind by name.
    #[must_use]
    pub fn find_option(&self, name: &str) -> Option<&ResShaderOption> {
        self.find_static_option(name)
            .map(|i| &self.static_options[i])
            .or_else(|| self.find_dynamic_option(name).map(|i| &self.dynamic_options[i]))
    }

    // --- Keys and programs -------------------------------------------------

    #[inline]
    #[must_use]
    pub fn static_key_len(&self) -> usize {
        self.variant_table.static_len()
    }

    #[inline]
    #[must_use]
    pub fn dynamic_key_len(&self) -> usize {
        self.variant_table.dynamic_len()
    }

    #[inline]
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.variant_table.key_len()
    }

    /// A zeroed key shaped for this model.
    #[must_use]
    pub fn new_key(&self) -> VariationKey {
        VariationKey::new(self.static_key_len(), self.dynamic_key_len())
    }

    /// A key with every option at its default choice.
    pub fn default_key(&self) -> Result<VariationKey> {
        let mut key = self.new_key();
        for option in self.static_options.iter().chain(&self.dynamic_options) {
            option.write_default(&mut key)?;
        }
        Ok(key)
    }

    #[inline]
    #[must_use]
    pub fn variant_table(&self) -> &ShaderVariantTable {
        &self.variant_table
    }

    #[inline]
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn program(&self, index: usize) -> Result<&ResShaderProgram> {
        ResarcError::check_index("program", index, self.programs.len())?;
        Ok(&self.programs[index])
    }

    #[must_use]
    pub fn programs(&self) -> &[ResShaderProgram] {
        &self.programs
    }

    #[must_use]
    pub fn find_program_index(&self, key: &VariationKey) -> Option<usize> {
        self.variant_table.find_program_index(key)
    }

    #[inline]
    #[must_use]
    pub fn default_program_index(&self) -> usize {
        self.variant_table.default_program_index()
    }

    // --- Reflection --------------------------------------------------------

    #[must_use]
    pub fn attributes(&self) -> &NameDictionary {
        &self.attributes
    }

    /// Reflection dictionary of a bindable resource kind.
    #[must_use]
    pub fn resources(&self, kind: ResourceKind) -> &NameDictionary {
        match kind {
            ResourceKind::Sampler => &self.samplers,
            ResourceKind::Image => &self.images,
            ResourceKind::UniformBlock => &self.uniform_blocks,
            ResourceKind::StorageBlock => &self.storage_blocks,
        }
    }

    #[must_use]
    pub fn find_attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.find_index(name)
    }

    #[must_use]
    pub fn find_sampler_index(&self, name: &str) -> Option<usize> {
        self.samplers.find_index(name)
    }

    #[must_use]
    pub fn find_image_index(&self, name: &str) -> Option<usize> {
        self.images.find_index(name)
    }

    #[must_use]
    pub fn find_uniform_block_index(&self, name: &str) -> Option<usize> {
        self.uniform_blocks.find_index(name)
    }

    #[must_use]
    pub fn find_storage_block_index(&self, name: &str) -> Option<usize> {
        self.storage_blocks.find_index(name)
    }

    /// Element counts per resource kind, in [`ResourceKind::ALL`] order.
    #[must_use]
    pub fn location_counts(&self) -> [usize; 4] {
        ResourceKind::ALL.map(|kind| self.resources(kind).len())
    }

    // --- Blob --------------------------------------------------------------

    /// Cross-record checks shared by fixup and the builder.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        for (kind, options, dict, segment_len) in [
            (
                OptionKind::Static,
                &self.static_options,
                &self.static_dict,
                self.static_key_len(),
            ),
            (
                OptionKind::Dynamic,
                &self.dynamic_options,
                &self.dynamic_dict,
                self.dynamic_key_len(),
            ),
        ] {
            if dict.len() != options.len()
                || !dict.names_by_index().zip(options.iter()).all(|(n, o)| n == o.name())
            {
                return Err(format!(
                    "model {:?}: {} option dictionary does not match its options",
                    self.name,
                    kind.as_str()
                ));
            }
            for option in options {
                if option.kind() != kind {
                    return Err(format!(
                        "model {:?}: option {:?} is in the wrong segment",
                        self.name,
                        option.name()
                    ));
                }
                option.check_layout(segment_len)?;
            }
            check_disjoint(options)?;
        }

        self.variant_table
            .check_options(&self.static_options, &self.dynamic_options)
            .map_err(|e| format!("model {:?}: {e}", self.name))?;

        if self.programs.len() != self.variant_table.len() {
            return Err(format!(
                "model {:?} has {} programs but {} variant rows",
                self.name,
                self.programs.len(),
                self.variant_table.len()
            ));
        }

        let counts = self.location_counts();
        if let Some(i) = self.programs.iter().position(|p| {
            p.locations.as_ref().is_some_and(|l| l.counts() != counts)
        }) {
            return Err(format!(
                "model {:?}: program {i} locations do not match the reflection dictionaries",
                self.name
            ));
        }
        Ok(())
    }

    fn parse(
        reader: &BlobReader<'_>,
        offset: usize,
        archive_index: usize,
        limits: &FixupLimits,
    ) -> Result<Self> {
        reader.check_range(offset, MODEL_RECORD_WORDS * 4, "shading model record")?;
        let name = reader.str_ref_at(offset, "shading model name")?;
        let max_entries = limits.max_dictionary_entries;
        let dict = |field: usize, max: usize, what: &str| -> Result<NameDictionary> {
            let at = reader.required_offset_at(offset + field, what)?;
            NameDictionary::read(reader, at, max)
        };

        let static_count = reader.count_at(offset + 4, limits.max_options, "static option count")?;
        let static_at = record_offsets(reader, offset + 8, static_count, "static options")?;
        let dynamic_count =
            reader.count_at(offset + 12, limits.max_options, "dynamic option count")?;
        let dynamic_at = record_offsets(reader, offset + 16, dynamic_count, "dynamic options")?;
        let option_entries = limits.max_options.min(max_entries);
        let static_dict = dict(20, option_entries, "static option dictionary")?;
        let dynamic_dict = dict(24, option_entries, "dynamic option dictionary")?;

        let table_at = reader.required_offset_at(offset + 28, "variant table")?;
        let variant_table = ShaderVariantTable::parse(reader, table_at, limits)?;

        let parse_options = |offsets: &[usize], kind: OptionKind, segment_len: usize| {
            offsets
                .iter()
                .map(|&at| ResShaderOption::parse(reader, at, kind, segment_len, limits))
                .collect::<Result<Vec<_>>>()
        };
        let static_options =
            parse_options(&static_at, OptionKind::Static, variant_table.static_len())?;
        let dynamic_options =
            parse_options(&dynamic_at, OptionKind::Dynamic, variant_table.dynamic_len())?;

        let program_count = reader.count_at(offset + 32, limits.max_programs, "program count")?;
        let programs_at = record_offsets(reader, offset + 36, program_count, "programs")?;

        let attributes = dict(40, max_entries, "attribute dictionary")?;
        let samplers = dict(44, max_entries, "sampler dictionary")?;
        let images = dict(48, max_entries, "image dictionary")?;
        let uniform_blocks = dict(52, max_entries, "uniform block dictionary")?;
        let storage_blocks = dict(56, max_entries, "storage block dictionary")?;
        let counts = [
            samplers.len(),
            images.len(),
            uniform_blocks.len(),
            storage_blocks.len(),
        ];

        let programs = programs_at
            .iter()
            .map(|&at| ResShaderProgram::parse(reader, at, counts))
            .collect::<Result<Vec<_>>>()?;

        let model = Self {
            name: name.into(),
            archive_index,
            static_options,
            static_dict,
            dynamic_options,
            dynamic_dict,
            variant_table,
            programs,
            attributes,
            samplers,
            images,
            uniform_blocks,
            storage_blocks,
        };
        model.validate().map_err(ResarcError::corrupt)?;
        Ok(model)
    }

    fn write(&self, writer: &mut BlobWriter) -> u32 {
        let record = writer.reserve(MODEL_RECORD_WORDS);
        let name = writer.push_str(&self.name);
        let static_options = write_records(writer, &self.static_options, ResShaderOption::write);
        let dynamic_options = write_records(writer, &self.dynamic_options, ResShaderOption::write);
        let static_dict = self.static_dict.write(writer);
        let dynamic_dict = self.dynamic_dict.write(writer);
        let table = self.variant_table.write(writer);
        let programs = write_records(writer, &self.programs, ResShaderProgram::write);
        let dictionaries = [
            &self.attributes,
            &self.samplers,
            &self.images,
            &self.uniform_blocks,
            &self.storage_blocks,
        ]
        .map(|d| d.write(writer));

        let fields = [
            name,
            self.static_options.len() as u32,
            static_options,
            self.dynamic_options.len() as u32,
            dynamic_options,
            static_dict,
            dynamic_dict,
            table,
            self.programs.len() as u32,
            programs,
        ];
        for (i, value) in fields.into_iter().chain(dictionaries).enumerate() {
            writer.patch_u32(record + i as u32 * 4, value);
        }
        record
    }
}

// ============================================================================
// Archive
// ============================================================================

/// Root of a fixed-up shader archive blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResShaderArchive {
    name: Box<str>,
    shading_models: Vec<ResShadingModel>,
    model_dict: NameDictionary,
}

impl ResShaderArchive {
    /// Assembles an archive from validated models, sorting them by name.
    pub(crate) fn from_models(name: &str, mut models: Vec<ResShadingModel>) -> Result<Self> {
        models.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        let model_dict = NameDictionary::from_names(models.iter().map(|m| m.name.to_string()))?;
        for (i, model) in models.iter_mut().enumerate() {
            model.archive_index = i;
        }
        Ok(Self {
            name: name.into(),
            shading_models: models,
            model_dict,
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn shading_model_count(&self) -> usize {
        self.shading_models.len()
    }

    #[must_use]
    pub fn shading_models(&self) -> &[ResShadingModel] {
        &self.shading_models
    }

    pub fn shading_model(&self, index: usize) -> Result<&ResShadingModel> {
        ResarcError::check_index("shading model", index, self.shading_models.len())?;
        Ok(&self.shading_models[index])
    }

    #[must_use]
    pub fn find_shading_model(&self, name: &str) -> Option<usize> {
        self.model_dict.find_index(name)
    }

    #[must_use]
    pub fn shading_model_dictionary(&self) -> &NameDictionary {
        &self.model_dict
    }

    /// Serializes the archive into a relocatable blob.
    pub fn to_blob(&self, pointer_width: u8) -> Result<Vec<u8>> {
        if !matches!(pointer_width, 4 | 8) {
            return Err(ResarcError::build(format!(
                "pointer width {pointer_width} is neither 4 nor 8"
            )));
        }
        let mut writer = BlobWriter::new();
        let record = writer.reserve(ARCHIVE_RECORD_WORDS);
        let name = writer.push_str(&self.name);
        let models = write_records(&mut writer, &self.shading_models, ResShadingModel::write);
        let dict = self.model_dict.write(&mut writer);

        writer.patch_u32(record, name);
        writer.patch_u32(record + 4, self.shading_models.len() as u32);
        writer.patch_u32(record + 8, models);
        writer.patch_u32(record + 12, dict);
        writer.finish(record, pointer_width)
    }
}

impl BlobRoot for ResShaderArchive {
    fn parse(reader: &BlobReader<'_>, root_offset: usize, limits: &FixupLimits) -> Result<Self> {
        reader.check_range(root_offset, ARCHIVE_RECORD_WORDS * 4, "archive record")?;
        let name = reader.str_ref_at(root_offset, "archive name")?;
        let model_count =
            reader.count_at(root_offset + 4, limits.max_shading_models, "shading model count")?;
        let models_at = record_offsets(reader, root_offset + 8, model_count, "shading models")?;
        let dict_at = reader.required_offset_at(root_offset + 12, "shading model dictionary")?;
        let model_dict = NameDictionary::read(
            reader,
            dict_at,
            limits.max_shading_models.min(limits.max_dictionary_entries),
        )?;

        let shading_models = models_at
            .iter()
            .enumerate()
            .map(|(i, &at)| ResShadingModel::parse(reader, at, i, limits))
            .collect::<Result<Vec<_>>>()?;

        // sorted dictionary + index == position implies sorted models
        if model_dict.len() != shading_models.len()
            || !model_dict
                .names_by_index()
                .zip(&shading_models)
                .all(|(n, m)| n == m.name())
        {
            return Err(ResarcError::corrupt(
                "shading model dictionary does not match the model array",
            ));
        }

        log::debug!(
            "shader archive {name:?}: {} shading models, {} programs",
            shading_models.len(),
            shading_models.iter().map(ResShadingModel::program_count).sum::<usize>()
        );

        Ok(Self {
            name: name.into(),
            shading_models,
            model_dict,
        })
    }
}

/// Offsets of `count` records whose offset array is referenced at `field`.
fn record_offsets(
    reader: &BlobReader<'_>,
    field: usize,
    count: usize,
    what: &str,
) -> Result<Vec<usize>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let array = reader.required_offset_at(field, what)?;
    reader.offset_array(array, count, what)
}

/// Writes each item and an offset array pointing at them; returns the array's
/// offset, or 0 when there are no items.
fn write_records<T>(
    writer: &mut BlobWriter,
    items: &[T],
    write: impl Fn(&T, &mut BlobWriter) -> u32,
) -> u32 {
    if items.is_empty() {
        return 0;
    }
    let array = writer.reserve(items.len());
    for (i, item) in items.iter().enumerate() {
        let at = write(item, writer);
        writer.patch_u32(array + i as u32 * 4, at);
    }
    array
}
