//! resarc: relocatable shader-variant archives.
//!
//! An archive is built offline into an offset-based blob, loaded anywhere,
//! fixed up once into an index-addressed arena, and then queried by name and
//! by variation key. Programs are initialized lazily against a device.
//!
//! ```rust,ignore
//! use resarc::prelude::*;
//!
//! let mut blob = ShaderArchiveBlob::new(bytes);
//! let res = blob.fixup()?;
//!
//! let model = res.find_shading_model("lit").unwrap_or(0);
//! let mut selector = VariationSelector::new(res.clone(), model)?;
//! selector.set_choice("normal_map", "on");
//! let program = selector.update_variation();
//!
//! let mut archive = ShaderArchive::setup(res, &device, SetupOptions::default())?;
//! archive.update(&device, model, program)?;
//! archive.load(model, program, &mut cmd)?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub use resarc_core;
pub use resarc_shader;

pub use resarc_core::{
    BLOB_MAGIC, BLOB_VERSION, BlobHeader, BlobReader, BlobRoot, BlobWriter, FixupLimits,
    HEADER_LEN, NameDictionary, RelocatableBlob, ResarcError, Result,
};
pub use resarc_shader::{
    ArchiveBuilder, BinaryUnavailable, CommandBuffer, CompiledShader, LocationTable,
    OptionKind, PayloadFlags, ProgramLocations, ProgramPayload, ProgramRange, ProgramSlot,
    ProgramState, ProgramUpdate, RESERVED_KEY_BIT, ResShaderArchive, ResShaderOption, ResShaderProgram,
    ResShadingModel, ResourceKind, SetupOptions, ShaderArchive, ShaderArchiveBlob, ShaderDevice,
    ShaderRequest, ShaderStage, ShaderVariantTable, ShadingModelBuilder, UpdateHook,
    VariationKey, VariationSelector, INVALID_LOCATION, STAGE_COUNT,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ArchiveBuilder, CommandBuffer, FixupLimits, ProgramPayload, ProgramState, ResarcError,
        SetupOptions, ShaderArchive, ShaderArchiveBlob, ShaderDevice, ShaderStage,
        ShadingModelBuilder, VariationKey, VariationSelector,
    };
}
