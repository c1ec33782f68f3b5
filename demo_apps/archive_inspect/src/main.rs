//! Archive Inspector
//!
//! Builds a small shader archive, writes it to disk, loads it back and walks
//! through variant selection and lazy program initialization with a logging
//! device.
//!
//! ```text
//! RUST_LOG=debug cargo run -p archive_inspect -- [--settings settings.json] [archive.rsar]
//! ```
//!
//! `settings.json` may carry `limits` (fixup limits) and `setup` (runtime
//! setup options); missing fields keep their defaults.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, bail};
use resarc::prelude::*;
use resarc::{
    BinaryUnavailable, CompiledShader, ResShaderArchive, ResShadingModel, ResourceKind,
    ShaderRequest,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    limits: FixupLimits,
    setup: SetupOptions,
}

struct Args {
    settings: Option<PathBuf>,
    archive: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut settings = None;
    let mut archive = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let path = args.next().context("--settings needs a path")?;
                settings = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            path => archive = Some(PathBuf::from(path)),
        }
    }
    Ok(Args {
        settings,
        archive: archive.unwrap_or_else(|| std::env::temp_dir().join("archive_inspect.rsar")),
    })
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let settings = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    log::info!("settings loaded from {}", path.display());
    Ok(settings)
}

/// Device that only logs what it is asked to do.
struct LoggingDevice {
    next_id: AtomicU32,
}

impl ShaderDevice for LoggingDevice {
    type Shader = u32;

    fn compile_or_upload_shader(
        &self,
        request: &ShaderRequest<'_>,
    ) -> Result<CompiledShader<u32>, BinaryUnavailable> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let how = if let Some(source) = request.source {
            format!("compiled {} bytes of source", source.len())
        } else if let Some(binary) = request.binary {
            format!("uploaded {} byte binary", binary.len())
        } else {
            return Err(BinaryUnavailable);
        };
        log::info!(
            "{}[{}] key {:08x?}: {how} as shader #{id}",
            request.model_name,
            request.program_index,
            request.key
        );
        Ok(CompiledShader::new(id))
    }

    fn release_shader(&self, shader: u32) {
        log::info!("released shader #{shader}");
    }
}

#[derive(Default)]
struct PrintingCommandBuffer {
    binds: usize,
}

impl CommandBuffer<u32> for PrintingCommandBuffer {
    fn bind_shader(&mut self, shader: &u32) {
        self.binds += 1;
        println!("  bind shader #{shader}");
    }
}

fn sample_archive() -> ArchiveBuilder {
    ArchiveBuilder::new("inspect_demo")
        .shading_model(
            ShadingModelBuilder::new("pbr")
                .static_option("normal_map", &["off", "on"], 0)
                .static_option("alpha", &["opaque", "mask", "blend"], 0)
                .dynamic_option("shadow", &["none", "hard", "soft"], 1, Some(0))
                .attributes(&["position", "normal", "tangent", "uv0"])
                .samplers(&["base_color", "normal", "shadow_map"])
                .uniform_blocks(&["camera", "material", "options"])
                .program(&[], ProgramPayload::source("pbr default"))
                .program(&[("shadow", "none")], ProgramPayload::source("pbr unshadowed"))
                .program(
                    &[("normal_map", "on")],
                    ProgramPayload::source("pbr normal mapped").with_binary(vec![0x4e; 32]),
                )
                .program(
                    &[("alpha", "blend"), ("shadow", "none")],
                    ProgramPayload::binary(vec![0xb1; 48]),
                ),
        )
        .shading_model(
            ShadingModelBuilder::new("unlit")
                .samplers(&["color"])
                .program(&[], ProgramPayload::source("unlit")),
        )
}

fn describe_model(model: &ResShadingModel) {
    println!(
        "shading model {:?} (#{}): {} programs, key {}+{} words, default program {}",
        model.name(),
        model.archive_index(),
        model.program_count(),
        model.static_key_len(),
        model.dynamic_key_len(),
        model.default_program_index()
    );
    for option in model.static_options().iter().chain(model.dynamic_options()) {
        let choices: Vec<&str> = option.choices().names_by_index().collect();
        let field = option.bit_field();
        println!(
            "  {} option {:?}: {choices:?}, default {}, word {} bits {}..{}",
            option.kind().as_str(),
            option.name(),
            option.default_choice(),
            field.key_word,
            field.bit_offset,
            field.bit_offset + field.bit_width
        );
    }
    for kind in ResourceKind::ALL {
        let names: Vec<&str> = model.resources(kind).names_by_index().collect();
        if !names.is_empty() {
            println!("  {}: {names:?}", kind.as_str());
        }
    }
}

fn describe(res: &ResShaderArchive) {
    println!(
        "archive {:?}: {} shading models",
        res.name(),
        res.shading_model_count()
    );
    for model in res.shading_models() {
        describe_model(model);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;
    let settings = load_settings(args.settings.as_ref())?;

    let bytes = sample_archive().build_blob()?;
    std::fs::write(&args.archive, &bytes)
        .with_context(|| format!("writing {}", args.archive.display()))?;
    log::info!("wrote {} bytes to {}", bytes.len(), args.archive.display());

    let file = File::open(&args.archive)
        .with_context(|| format!("opening {}", args.archive.display()))?;
    let mut blob = ShaderArchiveBlob::from_reader(BufReader::new(file), settings.limits)?;
    let header = blob.header()?;
    println!(
        "header: version {}, pointer width {}, {} bytes, checksum {:#018x}",
        header.version, header.pointer_width, header.file_size, header.checksum
    );

    let res = blob.fixup()?;
    describe(&res);

    let model = res
        .find_shading_model("pbr")
        .context("sample archive has no pbr model")?;
    let mut selector = VariationSelector::new(res.clone(), model)?;

    let device = LoggingDevice {
        next_id: AtomicU32::new(1),
    };
    let mut archive = ShaderArchive::setup(res.clone(), &device, settings.setup)?;
    archive.set_update_hook(Box::new(|update| {
        log::debug!(
            "program {}/{} is now {}",
            update.model_index,
            update.program_index,
            update.state.as_str()
        );
    }));
    let mut cmd = PrintingCommandBuffer::default();

    let selections: [&[(&str, &str)]; 4] = [
        &[],
        &[("normal_map", "on")],
        &[("normal_map", "off"), ("alpha", "blend"), ("shadow", "none")],
        &[("alpha", "mask")],
    ];
    for selection in selections {
        for &(option, choice) in selection {
            if !selector.set_choice(option, choice) {
                bail!("unknown choice {option}={choice}");
            }
        }
        let program = selector.update_variation();
        let state = archive.update(&device, model, program)?;
        println!(
            "selection {selection:?} -> program {program}{} ({})",
            if selector.is_fallback() { " (fallback)" } else { "" },
            state.as_str()
        );
        if state == ProgramState::Initialized {
            archive.load(model, program, &mut cmd)?;
        }
    }

    let mut options_block = [0u32; 1];
    selector.write_branch_values(&mut options_block)?;
    println!("option block: {options_block:?}");
    println!("{} binds recorded", cmd.binds);

    archive.cleanup(&device);
    blob.unfixup();
    println!("blob relocatable again: {}", !blob.is_fixed_up());
    Ok(())
}
