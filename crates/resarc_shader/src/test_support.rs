//! Mock device shared by unit tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::builder::{ArchiveBuilder, ProgramPayload, ShadingModelBuilder};
use crate::device::{BinaryUnavailable, CommandBuffer, CompiledShader, ShaderDevice, ShaderRequest};
use crate::location::ProgramLocations;
use crate::res::ResShaderArchive;

pub struct MockDevice {
    pub binary_support: bool,
    pub reject_all: bool,
    pub reflected: Option<ProgramLocations>,
    pub compiles: AtomicUsize,
    pub releases: AtomicUsize,
    pub next_id: AtomicU32,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            binary_support: true,
            reject_all: false,
            reflected: None,
            compiles: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            next_id: AtomicU32::new(1),
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

impl ShaderDevice for MockDevice {
    type Shader = u32;

    fn compile_or_upload_shader(
        &self,
        request: &ShaderRequest<'_>,
    ) -> Result<CompiledShader<u32>, BinaryUnavailable> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let usable = request.source.is_some()
            || request.ir.is_some()
            || (request.binary.is_some() && self.binary_support);
        if self.reject_all || !usable {
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

/// Static option `a` (2 choices) and dynamic option `b` (4 choices) with
/// programs P0 = (0, 0), P1 = (0, 1), P2 = (1, 0). P2 only carries a binary.
pub fn two_option_archive() -> ResShaderArchive {
    ArchiveBuilder::new("test")
        .shading_model(
            ShadingModelBuilder::new("model")
                .static_option("a", &["a0", "a1"], 0)
                .dynamic_option("b", &["b0", "b1", "b2", "b3"], 0, Some(0))
                .samplers(&["albedo", "normal"])
                .uniform_blocks(&["options"])
                .program(&[], ProgramPayload::source("p0"))
                .program(&[("b", "b1")], ProgramPayload::source("p1").with_binary(vec![1]))
                .program(&[("a", "a1")], ProgramPayload::binary(vec![2])),
        )
        .build()
        .expect("test archive builds")
}
