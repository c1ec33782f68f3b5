//! Program Slots
//!
//! A [`ProgramSlot`] is the runtime half of one program: it lazily turns the
//! stored payload into a device shader and then hands that shader to command
//! buffers.
//!
//! ```text
//!              update()                 device ok
//!  Unloaded ───────────▶ PendingInit ───────────────▶ Initialized
//!     ▲                       │                            │
//!     │                       │ no usable payload          │
//!     │                       ▼                            │
//!     │               BinaryUnavailable                    │
//!     └──────────────── cleanup() ◀────────────────────────┘
//! ```
//!
//! The device call runs outside the slot lock. The lock is only held while
//! the state is swapped, so `load` and the location getters never wait on a
//! compile.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use resarc_core::{ResarcError, Result};

use crate::device::{CommandBuffer, ShaderDevice, ShaderRequest};
use crate::location::ProgramLocations;
use crate::res::{PayloadFlags, ResShadingModel};
use crate::stage::{ResourceKind, ShaderStage};

/// Lifecycle state of a program slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramState {
    Unloaded,
    PendingInit,
    Initialized,
    /// Terminal until the slot is cleaned up.
    BinaryUnavailable,
}

impl ProgramState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::PendingInit => "pending init",
            Self::Initialized => "initialized",
            Self::BinaryUnavailable => "binary unavailable",
        }
    }

    /// True for states `update` will not leave.
    #[inline]
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Initialized | Self::BinaryUnavailable)
    }
}

/// Device shader and resolved locations of an initialized program.
#[derive(Debug)]
pub struct InitializedProgram<S> {
    pub shader: S,
    pub locations: ProgramLocations,
}

#[derive(Debug)]
enum SlotState<S> {
    Unloaded,
    PendingInit,
    Initialized(InitializedProgram<S>),
    BinaryUnavailable,
}

impl<S> SlotState<S> {
    fn summary(&self) -> ProgramState {
        match self {
            Self::Unloaded => ProgramState::Unloaded,
            Self::PendingInit => ProgramState::PendingInit,
            Self::Initialized(_) => ProgramState::Initialized,
            Self::BinaryUnavailable => ProgramState::BinaryUnavailable,
        }
    }
}

pub struct ProgramSlot<S> {
    model_index: usize,
    program_index: usize,
    state: RwLock<SlotState<S>>,
}

impl<S> ProgramSlot<S> {
    pub(crate) fn new(model_index: usize, program_index: usize) -> Self {
        Self {
            model_index,
            program_index,
            state: RwLock::new(SlotState::Unloaded),
        }
    }

    #[inline]
    #[must_use]
    pub fn model_index(&self) -> usize {
        self.model_index
    }

    #[inline]
    #[must_use]
    pub fn program_index(&self) -> usize {
        self.program_index
    }

    #[must_use]
    pub fn state(&self) -> ProgramState {
        self.state.read().summary()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state() == ProgramState::Initialized
    }

    fn not_initialized(&self, state: ProgramState) -> ResarcError {
        ResarcError::ProgramNotInitialized {
            model: self.model_index,
            program: self.program_index,
            state: state.as_str(),
        }
    }

    /// Brings the slot out of `Unloaded`. A settled slot is left untouched and
    /// the device is not called.
    ///
    /// Callers serialize `update` per shading model; the runtime archive does
    /// this through `&mut` access or the model mutex.
    pub(crate) fn update<D>(&self, device: &D, model: &ResShadingModel) -> Result<ProgramState>
    where
        D: ShaderDevice<Shader = S>,
    {
        {
            let mut state = self.state.write();
            let current = state.summary();
            if current.is_settled() {
                return Ok(current);
            }
            *state = SlotState::PendingInit;
        }

        let next = match self.initialize(device, model) {
            Ok(Some(program)) => SlotState::Initialized(program),
            Ok(None) => SlotState::BinaryUnavailable,
            Err(err) => {
                *self.state.write() = SlotState::Unloaded;
                return Err(err);
            }
        };
        let summary = next.summary();
        *self.state.write() = next;
        Ok(summary)
    }

    fn initialize<D>(
        &self,
        device: &D,
        model: &ResShadingModel,
    ) -> Result<Option<InitializedProgram<S>>>
    where
        D: ShaderDevice<Shader = S>,
    {
        let program = model.program(self.program_index)?;
        let flags = program.flags();

        if flags.is_empty() {
            log::warn!(
                "{}[{}]: program has no payload",
                model.name(),
                self.program_index
            );
            return Ok(None);
        }
        if flags == PayloadFlags::BINARY && !device.supports_binary() {
            log::warn!(
                "{}[{}]: binary-only program on a device without binary support",
                model.name(),
                self.program_index
            );
            return Ok(None);
        }

        let request = ShaderRequest {
            model_name: model.name(),
            model_index: self.model_index,
            program_index: self.program_index,
            flags,
            binary: program.binary(),
            source: program.source(),
            ir: program.ir(),
            key: model.variant_table().program_key_words(self.program_index)?,
        };

        let compiled = match device.compile_or_upload_shader(&request) {
            Ok(compiled) => compiled,
            Err(err) => {
                log::warn!("{}[{}]: {err}", model.name(), self.program_index);
                return Ok(None);
            }
        };

        let counts = model.location_counts();
        let reflected = compiled.locations.filter(|locations| {
            let matches = locations.counts() == counts;
            if !matches {
                log::warn!(
                    "{}[{}]: device reflected {:?} locations, expected {counts:?}; ignoring",
                    model.name(),
                    self.program_index,
                    locations.counts()
                );
            }
            matches
        });
        let locations = reflected
            .or_else(|| program.stored_locations().cloned())
            .unwrap_or_else(|| ProgramLocations::invalid(counts));

        log::trace!("{}[{}]: initialized", model.name(), self.program_index);
        Ok(Some(InitializedProgram {
            shader: compiled.shader,
            locations,
        }))
    }

    /// Binds the program's shader into `cmd`.
    pub fn load<C>(&self, cmd: &mut C) -> Result<()>
    where
        C: CommandBuffer<S> + ?Sized,
    {
        match &*self.state.read() {
            SlotState::Initialized(program) => {
                cmd.bind_shader(&program.shader);
                Ok(())
            }
            other => Err(self.not_initialized(other.summary())),
        }
    }

    /// Releases any device shader and returns the slot to `Unloaded`.
    /// Returns whether a shader was released.
    pub fn cleanup<D>(&mut self, device: &D) -> bool
    where
        D: ShaderDevice<Shader = S>,
    {
        match std::mem::replace(self.state.get_mut(), SlotState::Unloaded) {
            SlotState::Initialized(program) => {
                device.release_shader(program.shader);
                true
            }
            _ => false,
        }
    }

    /// Resolved locations of an initialized program.
    #[must_use]
    pub fn locations(&self) -> Option<MappedRwLockReadGuard<'_, ProgramLocations>> {
        RwLockReadGuard::try_map(self.state.read(), |state| match state {
            SlotState::Initialized(program) => Some(&program.locations),
            _ => None,
        })
        .ok()
    }

    /// The device shader of an initialized program.
    #[must_use]
    pub fn shader(&self) -> Option<MappedRwLockReadGuard<'_, S>> {
        RwLockReadGuard::try_map(self.state.read(), |state| match state {
            SlotState::Initialized(program) => Some(&program.shader),
            _ => None,
        })
        .ok()
    }

    pub fn location(&self, kind: ResourceKind, element: usize, stage: ShaderStage) -> Result<i32> {
        match &*self.state.read() {
            SlotState::Initialized(program) => program.locations.table(kind).location(element, stage),
            other => Err(self.not_initialized(other.summary())),
        }
    }

    pub fn sampler_location(&self, element: usize, stage: ShaderStage) -> Result<i32> {
        self.location(ResourceKind::Sampler, element, stage)
    }

    pub fn image_location(&self, element: usize, stage: ShaderStage) -> Result<i32> {
        self.location(ResourceKind::Image, element, stage)
    }

    pub fn uniform_block_location(&self, element: usize, stage: ShaderStage) -> Result<i32> {
        self.location(ResourceKind::UniformBlock, element, stage)
    }

    pub fn storage_block_location(&self, element: usize, stage: ShaderStage) -> Result<i32> {
        self.location(ResourceKind::StorageBlock, element, stage)
    }
}

impl<S> std::fmt::Debug for ProgramSlot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramSlot")
            .field("model_index", &self.model_index)
            .field("program_index", &self.program_index)
            .field("state", &self.state())
            .finish()
    }
}
