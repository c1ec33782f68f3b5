//! Variation Selector
//!
//! Per-material helper that owns a [`VariationKey`] for one shading model and
//! resolves it to a program index. The static range is cached: static choices
//! change rarely, so [`update_variation`](VariationSelector::update_variation)
//! repeats the static range search only when the static words changed and
//! otherwise searches just the dynamic suffix inside the cached range.
//!
//! A key with no matching program falls back to the model's default program
//! rather than failing, so rendering continues with a valid variant.

use std::sync::Arc;

use resarc_core::{ResarcError, Result};
use smallvec::SmallVec;

use crate::key::VariationKey;
use crate::option::OptionKind;
use crate::res::{ResShaderArchive, ResShadingModel};
use crate::variant_table::ProgramRange;

#[derive(Debug, Clone)]
struct CachedRange {
    static_words: SmallVec<[u32; 4]>,
    range: Option<ProgramRange>,
}

#[derive(Debug, Clone)]
pub struct VariationSelector {
    res: Arc<ResShaderArchive>,
    model_index: usize,
    key: VariationKey,
    cached: Option<CachedRange>,
    program_index: usize,
    fallback: bool,
}

impl VariationSelector {
    /// A selector with every option at its default choice.
    pub fn new(res: Arc<ResShaderArchive>, model_index: usize) -> Result<Self> {
        let model = res.shading_model(model_index)?;
        let key = model.default_key()?;
        let program_index = model.default_program_index();
        let mut selector = Self {
            res,
            model_index,
            key,
            cached: None,
            program_index,
            fallback: false,
        };
        selector.update_variation();
        Ok(selector)
    }

    fn model(&self) -> &ResShadingModel {
        // index validated in `new`
        &self.res.shading_models()[self.model_index]
    }

    #[inline]
    #[must_use]
    pub fn model_index(&self) -> usize {
        self.model_index
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &VariationKey {
        &self.key
    }

    pub fn write_default_static_key(&mut self) -> Result<()> {
        let res = Arc::clone(&self.res);
        self.key.static_words_mut().fill(0);
        for option in res.shading_models()[self.model_index].static_options() {
            option.write_default(&mut self.key)?;
        }
        Ok(())
    }

    pub fn write_default_dynamic_key(&mut self) -> Result<()> {
        let res = Arc::clone(&self.res);
        self.key.dynamic_words_mut().fill(0);
        for option in res.shading_models()[self.model_index].dynamic_options() {
            option.write_default(&mut self.key)?;
        }
        Ok(())
    }

    /// Marks the dynamic selection as unset. The next lookup falls back to the
    /// default program until a dynamic key is written.
    pub fn reset_dynamic_key_to_invalid(&mut self) {
        self.key.write_invalid_dynamic_key();
    }

    pub fn set_static_choice(&mut self, option: usize, choice: usize) -> Result<()> {
        let res = Arc::clone(&self.res);
        res.shading_models()[self.model_index]
            .static_option(option)?
            .write_choice(&mut self.key, choice)
    }

    pub fn set_dynamic_choice(&mut self, option: usize, choice: usize) -> Result<()> {
        let res = Arc::clone(&self.res);
        let model = &res.shading_models()[self.model_index];
        let option = model.dynamic_option(option)?;
        if self.key.is_invalid_dynamic_key() {
            // leave the invalid pattern before writing a single field
            self.key.dynamic_words_mut().fill(0);
            for other in model.dynamic_options() {
                other.write_default(&mut self.key)?;
            }
        }
        option.write_choice(&mut self.key, choice)
    }

    /// Selects `choice_name` for the option `option_name` of either kind.
    /// Returns false when either name is unknown.
    pub fn set_choice(&mut self, option_name: &str, choice_name: &str) -> bool {
        let model = self.model();
        let target = model
            .find_static_option(option_name)
            .map(|i| (OptionKind::Static, i))
            .or_else(|| {
                model
                    .find_dynamic_option(option_name)
                    .map(|i| (OptionKind::Dynamic, i))
            });
        let Some((kind, index)) = target else {
            log::debug!("{}: unknown option {option_name:?}", model.name());
            return false;
        };
        let option = match kind {
            OptionKind::Static => &model.static_options()[index],
            OptionKind::Dynamic => &model.dynamic_options()[index],
        };
        let Some(choice) = option.find_choice_index(choice_name) else {
            log::debug!(
                "{}: option {option_name:?} has no choice {choice_name:?}",
                model.name()
            );
            return false;
        };
        match kind {
            OptionKind::Static => self.set_static_choice(index, choice),
            OptionKind::Dynamic => self.set_dynamic_choice(index, choice),
        }
        .is_ok()
    }

    /// Current choice of a named option.
    #[must_use]
    pub fn choice(&self, option_name: &str) -> Option<usize> {
        let option = self.model().find_option(option_name)?;
        if option.kind() == OptionKind::Dynamic && self.key.is_invalid_dynamic_key() {
            return None;
        }
        Some(option.read_choice(&self.key))
    }

    /// Resolves the key to a program index, falling back to the default program
    /// when no program matches.
    pub fn update_variation(&mut self) -> usize {
        let res = Arc::clone(&self.res);
        let model = &res.shading_models()[self.model_index];
        let table = model.variant_table();

        let static_words = self.key.static_words();
        let cached = self
            .cached
            .as_ref()
            .filter(|cached| cached.static_words.as_slice() == static_words)
            .map(|cached| cached.range);
        let range = if let Some(range) = cached {
            range
        } else {
            let range = table.find_program_range(static_words);
            self.cached = Some(CachedRange {
                static_words: SmallVec::from_slice(static_words),
                range,
            });
            range
        };

        let found = range.and_then(|range| {
            table.find_program_index_in_range(range, self.key.dynamic_words())
        });
        match found {
            Some(program) => {
                self.program_index = program;
                self.fallback = false;
            }
            None => {
                self.program_index = table.default_program_index();
                self.fallback = true;
                log::debug!(
                    "{}: no program for key {:?}, using default program {}",
                    model.name(),
                    self.key.words(),
                    self.program_index
                );
            }
        }
        self.program_index
    }

    /// Program chosen by the last [`update_variation`](Self::update_variation).
    #[inline]
    #[must_use]
    pub fn program_index(&self) -> usize {
        self.program_index
    }

    /// True when the last update had to fall back to the default program.
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Writes the current choice of every dynamic option into `block` at the
    /// option's branch offset. Options without a branch offset are skipped.
    pub fn write_branch_values(&self, block: &mut [u32]) -> Result<()> {
        let invalid = self.key.is_invalid_dynamic_key();
        for option in self.model().dynamic_options() {
            let Some(offset) = option.branch_offset() else {
                continue;
            };
            let word = offset as usize / 4;
            ResarcError::check_index("option block word", word, block.len())?;
            block[word] = if invalid {
                option.default_choice() as u32
            } else {
                option.read_choice(&self.key) as u32
            };
        }
        Ok(())
    }
}
