//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use resarc::{
    ArchiveBuilder, BinaryUnavailable, CommandBuffer, CompiledShader, ProgramLocations,
    ProgramPayload, ShaderDevice, ShaderRequest, ShadingModelBuilder,
};

/// Device that hands out increasing ids and counts every call.
pub struct CountingDevice {
    pub binary_support: bool,
    pub reflected: Option<ProgramLocations>,
    /// Sleep inside each compile to widen race windows.
    pub compile_delay: Option<Duration>,
    pub compiles: AtomicUsize,
    pub releases: AtomicUsize,
    pub next_id: AtomicU32,
}

impl CountingDevice {
    pub fn new() -> Self {
        Self {
            binary_support: true,
            reflected: None,
            compile_delay: None,
            compiles: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            next_id: AtomicU32::new(100),
        }
    }

    pub fn without_binary() -> Self {
        Self {
            binary_support: false,
            ..Self::new()
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl ShaderDevice for CountingDevice {
    type Shader = u32;

    fn compile_or_upload_shader(
        &self,
        request: &ShaderRequest<'_>,
    ) -> Result<CompiledShader<u32>, BinaryUnavailable> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.compile_delay {
            std::thread::sleep(delay);
        }
        let usable = request.source.is_some()
            || request.ir.is_some()
            || (request.binary.is_some() && self.binary_support);
        if !usable {
            return Err(BinaryUnavailable);
        }
        let shader = CompiledShader::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(match &self.reflected {
            Some(locations) => shader.with_locations(locations.clone()),
            None => shader,
        })
    }

    fn release_shader(&self, _shader: u32) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn supports_binary(&self) -> bool {
        self.binary_support
    }
}

#[derive(Default)]
pub struct RecordingCommandBuffer {
    pub bound: Vec<u32>,
}

impl CommandBuffer<u32> for RecordingCommandBuffer {
    fn bind_shader(&mut self, shader: &u32) {
        self.bound.push(*shader);
    }
}

/// Shading model `lit`: static option `a` (a0, a1), dynamic option `b`
/// (b0..b3) and three programs:
///
/// - P0 = (a0, b0), source only
/// - P1 = (a0, b1), source and binary
/// - P2 = (a1, b0), binary only
pub fn lit_model() -> ShadingModelBuilder {
    ShadingModelBuilder::new("lit")
        .static_option("a", &["a0", "a1"], 0)
        .dynamic_option("b", &["b0", "b1", "b2", "b3"], 0, Some(4))
        .attributes(&["position", "normal", "uv"])
        .samplers(&["albedo", "normal_map"])
        .uniform_blocks(&["scene", "options"])
        .program(&[], ProgramPayload::source("void main() {}"))
        .program(
            &[("b", "b1")],
            ProgramPayload::source("void main() { b1(); }").with_binary(vec![0xb1; 16]),
        )
        .program(&[("a", "a1")], ProgramPayload::binary(vec![0xa1; 16]))
}

/// A second model without options, used to check per-model isolation.
pub fn unlit_model() -> ShadingModelBuilder {
    ShadingModelBuilder::new("unlit")
        .samplers(&["color"])
        .program(&[], ProgramPayload::source("void main() { color(); }"))
}

/// Routes `log` output to the test harness; `RUST_LOG` picks the level.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sample_blob() -> Vec<u8> {
    init_logging();
    ArchiveBuilder::new("sample")
        .shading_model(lit_model())
        .shading_model(unlit_model())
        .build_blob()
        .expect("sample archive builds")
}
