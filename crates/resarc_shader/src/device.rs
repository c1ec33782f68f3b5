//! Device Collaborators
//!
//! The archive never talks to a graphics API directly. A backend implements
//! [`ShaderDevice`] to turn a program's payload into a device shader handle,
//! and [`CommandBuffer`] to bind that handle. All calls are synchronous; the
//! archive does not retry or interpret failures beyond [`BinaryUnavailable`].

use thiserror::Error;

use crate::location::ProgramLocations;
use crate::res::PayloadFlags;

/// The device could not use any payload of this program.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("shader payload is not supported by this device")]
pub struct BinaryUnavailable;

/// Everything a device needs to build one program.
#[derive(Debug, Clone, Copy)]
pub struct ShaderRequest<'a> {
    pub model_name: &'a str,
    pub model_index: usize,
    pub program_index: usize,
    pub flags: PayloadFlags,
    pub binary: Option<&'a [u8]>,
    pub source: Option<&'a str>,
    pub ir: Option<&'a [u8]>,
    /// Full variation key of the program, static words first.
    pub key: &'a [u32],
}

/// A device shader plus the locations the device reflected for it.
#[derive(Debug)]
pub struct CompiledShader<S> {
    pub shader: S,
    /// `None` keeps the locations stored in the archive.
    pub locations: Option<ProgramLocations>,
}

impl<S> CompiledShader<S> {
    pub fn new(shader: S) -> Self {
        Self {
            shader,
            locations: None,
        }
    }

    #[must_use]
    pub fn with_locations(mut self, locations: ProgramLocations) -> Self {
        self.locations = Some(locations);
        self
    }
}

/// Backend that compiles, uploads and releases shaders.
pub trait ShaderDevice {
    type Shader: Send + Sync;

    /// Builds a device shader from whichever payloads the request carries.
    fn compile_or_upload_shader(
        &self,
        request: &ShaderRequest<'_>,
    ) -> Result<CompiledShader<Self::Shader>, BinaryUnavailable>;

    /// Releases a shader previously returned by this device.
    fn release_shader(&self, shader: Self::Shader);

    /// Whether precompiled binaries can be uploaded at all. Programs that only
    /// carry a binary go straight to `BinaryUnavailable` when this is false.
    fn supports_binary(&self) -> bool {
        true
    }
}

/// Recording target for shader binds.
pub trait CommandBuffer<S> {
    fn bind_shader(&mut self, shader: &S);
}
