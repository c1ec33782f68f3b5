//! Archive Builder
//!
//! Offline construction of shader archives. Options are declared by name, key
//! bits are laid out automatically, programs are registered by their named
//! choices and everything is sorted and validated before the blob is written.
//!
//! # Key layout
//!
//! Options are packed in declaration order. Each takes
//! `max(1, ceil(log2(choice_count)))` bits and never straddles a word. If the
//! last option of a segment reaches bit 31 of the final word, a further word
//! is added so that the reserved bit stays clear.
//!
//! # Usage
//!
//! ```rust,ignore
//! let blob = ArchiveBuilder::new("materials")
//!     .shading_model(
//!         ShadingModelBuilder::new("lit")
//!             .static_option("normal_map", &["off", "on"], 0)
//!             .dynamic_option("fog", &["off", "linear"], 0, Some(0))
//!             .samplers(&["albedo", "normal"])
//!             .program(&[], ProgramPayload::binary(off_bytes))
//!             .program(&[("normal_map", "on")], ProgramPayload::binary(on_bytes)),
//!     )
//!     .build_blob()?;
//! ```

use rustc_hash::{FxHashMap, FxHashSet};
use resarc_core::{NameDictionary, ResarcError, Result};

use crate::key::VariationKey;
use crate::location::ProgramLocations;
use crate::option::{BitField, OptionKind, ResShaderOption};
use crate::res::{PayloadFlags, ResShaderArchive, ResShaderProgram, ResShadingModel};
use crate::variant_table::ShaderVariantTable;

// ============================================================================
// Program Payload
// ============================================================================

/// Payloads and optional locations of one program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramPayload {
    binary: Option<Vec<u8>>,
    source: Option<String>,
    ir: Option<Vec<u8>>,
    locations: Option<ProgramLocations>,
}

impl ProgramPayload {
    /// A program without any payload; it can never be initialized.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::empty().with_binary(bytes)
    }

    #[must_use]
    pub fn source(text: impl Into<String>) -> Self {
        Self::empty().with_source(text)
    }

    #[must_use]
    pub fn ir(bytes: impl Into<Vec<u8>>) -> Self {
        Self::empty().with_ir(bytes)
    }

    #[must_use]
    pub fn with_binary(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.binary = Some(bytes.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        self.source = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_ir(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.ir = Some(bytes.into());
        self
    }

    /// Locations to store in the archive for devices that do not reflect.
    #[must_use]
    pub fn with_locations(mut self, locations: ProgramLocations) -> Self {
        self.locations = Some(locations);
        self
    }

    #[must_use]
    pub fn flags(&self) -> PayloadFlags {
        let mut flags = PayloadFlags::empty();
        flags.set(PayloadFlags::BINARY, self.binary.is_some());
        flags.set(PayloadFlags::SOURCE, self.source.is_some());
        flags.set(PayloadFlags::IR, self.ir.is_some());
        flags
    }

    fn into_program(self) -> ResShaderProgram {
        ResShaderProgram {
            flags: self.flags(),
            binary: self.binary.map(Vec::into_boxed_slice),
            source: self.source.map(String::into_boxed_str),
            ir: self.ir.map(Vec::into_boxed_slice),
            locations: self.locations,
        }
    }
}

// ============================================================================
// Shading Model Builder
// ============================================================================

#[derive(Debug, Clone)]
struct OptionDecl {
    name: String,
    choices: Vec<String>,
    default_choice: usize,
    branch_offset: Option<u32>,
}

type Selection = Vec<(String, String)>;

fn selection(choices: &[(&str, &str)]) -> Selection {
    choices
        .iter()
        .map(|&(option, choice)| (option.to_owned(), choice.to_owned()))
        .collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|&s| s.to_owned()).collect()
}

#[derive(Debug, Clone)]
pub struct ShadingModelBuilder {
    name: String,
    static_options: Vec<OptionDecl>,
    dynamic_options: Vec<OptionDecl>,
    attributes: Vec<String>,
    samplers: Vec<String>,
    images: Vec<String>,
    uniform_blocks: Vec<String>,
    storage_blocks: Vec<String>,
    programs: Vec<(Selection, ProgramPayload)>,
    default_program: Option<Selection>,
}

impl ShadingModelBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            static_options: Vec::new(),
            dynamic_options: Vec::new(),
            attributes: Vec::new(),
            samplers: Vec::new(),
            images: Vec::new(),
            uniform_blocks: Vec::new(),
            storage_blocks: Vec::new(),
            programs: Vec::new(),
            default_program: None,
        }
    }

    /// Declares an option resolved by selecting a separate program.
    #[must_use]
    pub fn static_option(mut self, name: &str, choices: &[&str], default_choice: usize) -> Self {
        self.static_options.push(OptionDecl {
            name: name.to_owned(),
            choices: names(choices),
            default_choice,
            branch_offset: None,
        });
        self
    }

    /// Declares an option resolved inside the program. `branch_offset` is the
    /// byte offset of its selector in the option uniform block.
    #[must_use]
    pub fn dynamic_option(
        mut self,
        name: &str,
        choices: &[&str],
        default_choice: usize,
        branch_offset: Option<u32>,
    ) -> Self {
        self.dynamic_options.push(OptionDecl {
            name: name.to_owned(),
            choices: names(choices),
            default_choice,
            branch_offset,
        });
        self
    }

    #[must_use]
    pub fn attributes(mut self, list: &[&str]) -> Self {
        self.attributes = names(list);
        self
    }

    #[must_use]
    pub fn samplers(mut self, list: &[&str]) -> Self {
        self.samplers = names(list);
        self
    }

    #[must_use]
    pub fn images(mut self, list: &[&str]) -> Self {
        self.images = names(list);
        self
    }

    #[must_use]
    pub fn uniform_blocks(mut self, list: &[&str]) -> Self {
        self.uniform_blocks = names(list);
        self
    }

    #[must_use]
    pub fn storage_blocks(mut self, list: &[&str]) -> Self {
        self.storage_blocks = names(list);
        self
    }

    /// Registers a program for the given `(option, choice)` pairs. Options not
    /// named take their default choice. Program indices follow call order.
    #[must_use]
    pub fn program(mut self, choices: &[(&str, &str)], payload: ProgramPayload) -> Self {
        self.programs.push((selection(choices), payload));
        self
    }

    /// Names the program used when a lookup finds nothing. Without this the
    /// all-defaults program is used if registered, else program 0.
    #[must_use]
    pub fn default_program(mut self, choices: &[(&str, &str)]) -> Self {
        self.default_program = Some(selection(choices));
        self
    }

    pub fn build(self) -> Result<ResShadingModel> {
        let model_name = &self.name;
        let build_err = |msg: String| ResarcError::build(format!("model {model_name:?}: {msg}"));

        let (static_options, static_len) =
            lay_out(&self.static_options, OptionKind::Static).map_err(build_err)?;
        let (dynamic_options, dynamic_len) =
            lay_out(&self.dynamic_options, OptionKind::Dynamic).map_err(build_err)?;

        let mut by_name: FxHashMap<&str, &ResShaderOption> = FxHashMap::default();
        for option in static_options.iter().chain(&dynamic_options) {
            if by_name.insert(option.name(), option).is_some() {
                return Err(build_err(format!("option {:?} declared twice", option.name())));
            }
        }

        let encode = |choices: &Selection| -> Result<Vec<u32>> {
            let mut key = VariationKey::new(static_len, dynamic_len);
            for option in static_options.iter().chain(&dynamic_options) {
                option.write_default(&mut key)?;
            }
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            for (option_name, choice_name) in choices {
                let option = by_name
                    .get(option_name.as_str())
                    .ok_or_else(|| build_err(format!("unknown option {option_name:?}")))?;
                if !seen.insert(option_name.as_str()) {
                    return Err(build_err(format!("option {option_name:?} selected twice")));
                }
                let choice = option.find_choice_index(choice_name).ok_or_else(|| {
                    build_err(format!("option {option_name:?} has no choice {choice_name:?}"))
                })?;
                option.write_choice(&mut key, choice)?;
            }
            Ok(key.words().to_vec())
        };

        if self.programs.is_empty() {
            return Err(build_err("no programs registered".to_owned()));
        }

        let mut rows = Vec::with_capacity(self.programs.len());
        let mut programs_by_key: FxHashMap<Vec<u32>, usize> = FxHashMap::default();
        for (index, (choices, _)) in self.programs.iter().enumerate() {
            let key = encode(choices)?;
            if let Some(previous) = programs_by_key.insert(key.clone(), index) {
                return Err(build_err(format!(
                    "programs {previous} and {index} have the same key"
                )));
            }
            rows.push((key, index as u32));
        }
        rows.sort();

        let default_program = match &self.default_program {
            Some(choices) => {
                let key = encode(choices)?;
                *programs_by_key
                    .get(&key)
                    .ok_or_else(|| build_err("default program is not registered".to_owned()))?
            }
            None => programs_by_key.get(&encode(&Vec::new())?).copied().unwrap_or(0),
        };

        let variant_table =
            ShaderVariantTable::from_sorted_rows(static_len, dynamic_len, &rows, default_program as u32)
                .map_err(build_err)?;

        let dictionary = |list: &[String]| NameDictionary::from_names(list.iter().cloned());
        let static_dict = dictionary(
            &self.static_options.iter().map(|o| o.name.clone()).collect::<Vec<_>>(),
        )?;
        let dynamic_dict = dictionary(
            &self.dynamic_options.iter().map(|o| o.name.clone()).collect::<Vec<_>>(),
        )?;

        let program_count = self.programs.len();
        let model = ResShadingModel {
            name: self.name.clone().into_boxed_str(),
            archive_index: 0,
            static_options,
            static_dict,
            dynamic_options,
            dynamic_dict,
            variant_table,
            programs: self
                .programs
                .into_iter()
                .map(|(_, payload)| payload.into_program())
                .collect(),
            attributes: dictionary(&self.attributes)?,
            samplers: dictionary(&self.samplers)?,
            images: dictionary(&self.images)?,
            uniform_blocks: dictionary(&self.uniform_blocks)?,
            storage_blocks: dictionary(&self.storage_blocks)?,
        };
        model.validate().map_err(ResarcError::build)?;

        log::debug!(
            "built shading model {:?}: {program_count} programs, key {}+{} words",
            model.name(),
            static_len,
            dynamic_len
        );
        Ok(model)
    }
}

/// Bits needed to encode `count` choices, at least one.
fn bits_for(count: usize) -> u32 {
    count.next_power_of_two().trailing_zeros().max(1)
}

fn lay_out(
    decls: &[OptionDecl],
    kind: OptionKind,
) -> std::result::Result<(Vec<ResShaderOption>, usize), String> {
    let mut options = Vec::with_capacity(decls.len());
    let (mut word, mut bit) = (0u32, 0u32);

    for decl in decls {
        if decl.choices.is_empty() {
            return Err(format!("option {:?} has no choices", decl.name));
        }
        if decl.default_choice >= decl.choices.len() {
            return Err(format!(
                "option {:?} default choice {} >= choice count {}",
                decl.name,
                decl.default_choice,
                decl.choices.len()
            ));
        }
        let width = bits_for(decl.choices.len());
        if width > 31 {
            return Err(format!("option {:?} has too many choices", decl.name));
        }
        if bit + width > 32 {
            word += 1;
            bit = 0;
        }
        let choices = NameDictionary::from_names(decl.choices.iter().cloned())
            .map_err(|e| format!("option {:?}: {e}", decl.name))?;
        options.push(ResShaderOption::new(
            &decl.name,
            kind,
            choices,
            decl.default_choice as u32,
            BitField {
                key_word: word,
                bit_offset: bit,
                bit_width: width,
            },
            decl.branch_offset,
        ));
        bit += width;
    }

    // keep the reserved bit of the last word clear
    let segment_len = word as usize + 1 + usize::from(bit == 32);
    Ok((options, segment_len))
}

// ============================================================================
// Archive Builder
// ============================================================================

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    name: String,
    pointer_width: u8,
    models: Vec<ShadingModelBuilder>,
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer_width: std::mem::size_of::<usize>() as u8,
            models: Vec::new(),
        }
    }

    /// Pointer width recorded in the header, 4 or 8. Defaults to the host's.
    #[must_use]
    pub fn pointer_width(mut self, width: u8) -> Self {
        self.pointer_width = width;
        self
    }

    #[must_use]
    pub fn shading_model(mut self, model: ShadingModelBuilder) -> Self {
        self.models.push(model);
        self
    }

    /// Builds the in-memory archive without serializing it.
    pub fn build(self) -> Result<ResShaderArchive> {
        let models = self
            .models
            .into_iter()
            .map(ShadingModelBuilder::build)
            .collect::<Result<Vec<_>>>()?;
        ResShaderArchive::from_models(&self.name, models)
    }

    /// Builds and serializes the archive.
    pub fn build_blob(self) -> Result<Vec<u8>> {
        let pointer_width = self.pointer_width;
        let archive = self.build()?;
        let blob = archive.to_blob(pointer_width)?;
        log::debug!(
            "built archive {:?}: {} shading models, {} bytes",
            archive.name(),
            archive.shading_model_count(),
            blob.len()
        );
        Ok(blob)
    }
}
