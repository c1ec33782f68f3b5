//! Shader archives on top of relocatable blobs.
//!
//! - [`res`]: the parsed archive ([`ResShaderArchive`], [`ResShadingModel`])
//! - [`option`] / [`key`]: options and the bit-packed [`VariationKey`]
//! - [`variant_table`]: key → program lookup
//! - [`program`] / [`archive`]: lazily initialized program slots driven
//!   against a [`ShaderDevice`]
//! - [`selector`]: per-material key management with default fallback
//! - [`builder`]: offline archive construction

pub mod archive;
pub mod builder;
pub mod device;
pub mod key;
pub mod location;
pub mod option;
pub mod program;
pub mod res;
pub mod selector;
pub mod stage;
pub mod variant_table;

#[cfg(test)]
mod test_support;

pub use archive::{ProgramUpdate, SetupOptions, ShaderArchive, UpdateHook};
pub use builder::{ArchiveBuilder, ProgramPayload, ShadingModelBuilder};
pub use device::{BinaryUnavailable, CommandBuffer, CompiledShader, ShaderDevice, ShaderRequest};
pub use key::{RESERVED_KEY_BIT, VariationKey};
pub use location::{LocationTable, ProgramLocations};
pub use option::{BitField, OptionKind, ResShaderOption};
pub use program::{InitializedProgram, ProgramSlot, ProgramState};
pub use res::{PayloadFlags, ResShaderArchive, ResShaderProgram, ResShadingModel};
pub use selector::VariationSelector;
pub use stage::{INVALID_LOCATION, ResourceKind, STAGE_COUNT, ShaderStage};
pub use variant_table::{ProgramRange, ShaderVariantTable};

/// A shader archive blob before and after fixup.
pub type ShaderArchiveBlob = resarc_core::RelocatableBlob<ResShaderArchive>;
