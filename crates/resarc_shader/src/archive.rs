//! Runtime Shader Archive
//!
//! [`ShaderArchive`] pairs a fixed-up [`ResShaderArchive`] with one
//! [`ProgramSlot`] per program and drives the slots against a device.
//!
//! # Concurrency
//!
//! - [`update`](ShaderArchive::update) takes `&mut self`, so exclusive access
//!   already serializes initialization and no lock is taken.
//! - [`update_shared`](ShaderArchive::update_shared) takes `&self` and may be
//!   called from several threads. It needs an archive set up with
//!   [`SetupOptions::thread_safe`], which creates one mutex per shading model.
//!   The mutex is held only across the init transition; updates of the same
//!   model contend on it, updates of different models do not.
//! - [`load`](ShaderArchive::load) never takes a model mutex.
//!
//! # Usage
//!
//! ```rust,ignore
//! let res = ShaderArchiveBlob::new(bytes).fixup()?;
//! let mut archive = ShaderArchive::setup(res, &device, SetupOptions::default())?;
//!
//! archive.update(&device, model, program)?;
//! archive.load(model, program, &mut cmd)?;
//!
//! archive.cleanup(&device);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use resarc_core::{ResarcError, Result};
use serde::{Deserialize, Serialize};

use crate::device::{CommandBuffer, ShaderDevice};
use crate::program::{ProgramSlot, ProgramState};
use crate::res::ResShaderArchive;

/// How [`ShaderArchive::setup`] prepares the runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupOptions {
    /// Create one mutex per shading model so `update_shared` can be used.
    pub thread_safe: bool,
    /// Initialize every program during setup instead of on first update.
    pub eager: bool,
}

/// Reported to the update hook after a slot leaves `PendingInit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramUpdate {
    pub model_index: usize,
    pub program_index: usize,
    pub state: ProgramState,
}

pub type UpdateHook = Box<dyn Fn(&ProgramUpdate) + Send + Sync>;

struct ModelSlots<S> {
    slots: Vec<ProgramSlot<S>>,
    lock: Option<Mutex<()>>,
}

pub struct ShaderArchive<S> {
    res: Arc<ResShaderArchive>,
    models: Vec<ModelSlots<S>>,
    thread_safe: bool,
    update_hook: Option<UpdateHook>,
}

impl<S> ShaderArchive<S> {
    /// Creates the runtime slots for `res`. Programs stay `Unloaded` unless
    /// `options.eager` is set.
    pub fn setup<D>(res: Arc<ResShaderArchive>, device: &D, options: SetupOptions) -> Result<Self>
    where
        D: ShaderDevice<Shader = S>,
    {
        let models = res
            .shading_models()
            .iter()
            .enumerate()
            .map(|(model_index, model)| ModelSlots {
                slots: (0..model.program_count())
                    .map(|program_index| ProgramSlot::new(model_index, program_index))
                    .collect(),
                lock: options.thread_safe.then(|| Mutex::new(())),
            })
            .collect();

        let mut archive = Self {
            res,
            models,
            thread_safe: options.thread_safe,
            update_hook: None,
        };

        log::info!(
            "shader archive {:?} set up: {} shading models, {} programs (thread safe: {}, eager: {})",
            archive.res.name(),
            archive.models.len(),
            archive.program_count(),
            options.thread_safe,
            options.eager
        );

        if options.eager {
            archive.update_all(device)?;
        }
        Ok(archive)
    }

    /// Updates every program of every shading model.
    pub fn update_all<D>(&mut self, device: &D) -> Result<()>
    where
        D: ShaderDevice<Shader = S>,
    {
        for model in 0..self.models.len() {
            for program in 0..self.models[model].slots.len() {
                self.update(device, model, program)?;
            }
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn resource(&self) -> &Arc<ResShaderArchive> {
        &self.res
    }

    #[inline]
    #[must_use]
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// Total number of program slots.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.models.iter().map(|m| m.slots.len()).sum()
    }

    /// Installs a callback run after each slot leaves `PendingInit`.
    pub fn set_update_hook(&mut self, hook: UpdateHook) {
        self.update_hook = Some(hook);
    }

    pub fn clear_update_hook(&mut self) {
        self.update_hook = None;
    }

    fn model_slots(&self, model: usize) -> Result<&ModelSlots<S>> {
        ResarcError::check_index("shading model", model, self.models.len())?;
        Ok(&self.models[model])
    }

    pub fn slot(&self, model: usize, program: usize) -> Result<&ProgramSlot<S>> {
        let slots = &self.model_slots(model)?.slots;
        ResarcError::check_index("program", program, slots.len())?;
        Ok(&slots[program])
    }

    pub fn program_state(&self, model: usize, program: usize) -> Result<ProgramState> {
        Ok(self.slot(model, program)?.state())
    }

    fn run_update<D>(&self, device: &D, model: usize, program: usize) -> Result<ProgramState>
    where
        D: ShaderDevice<Shader = S>,
    {
        let slot = self.slot(model, program)?;
        let state = slot.update(device, self.res.shading_model(model)?)?;
        if let Some(hook) = &self.update_hook {
            hook(&ProgramUpdate {
                model_index: model,
                program_index: program,
                state,
            });
        }
        Ok(state)
    }

    /// Lazily initializes one program. Exclusive access stands in for the
    /// model mutex.
    pub fn update<D>(&mut self, device: &D, model: usize, program: usize) -> Result<ProgramState>
    where
        D: ShaderDevice<Shader = S>,
    {
        let state = self.program_state(model, program)?;
        if state.is_settled() {
            return Ok(state);
        }
        self.run_update(device, model, program)
    }

    /// Lazily initializes one program from any thread.
    ///
    /// Fails with [`ResarcError::ConcurrencyDisabled`] unless the archive was
    /// set up with `thread_safe`.
    pub fn update_shared<D>(&self, device: &D, model: usize, program: usize) -> Result<ProgramState>
    where
        D: ShaderDevice<Shader = S>,
    {
        let lock = self
            .model_slots(model)?
            .lock
            .as_ref()
            .ok_or(ResarcError::ConcurrencyDisabled)?;

        let state = self.program_state(model, program)?;
        if state.is_settled() {
            return Ok(state);
        }

        let _guard = lock.lock();
        // another thread may have finished this slot while we waited
        let state = self.program_state(model, program)?;
        if state.is_settled() {
            return Ok(state);
        }
        self.run_update(device, model, program)
    }

    /// Binds an initialized program into `cmd`.
    pub fn load<C>(&self, model: usize, program: usize, cmd: &mut C) -> Result<()>
    where
        C: CommandBuffer<S> + ?Sized,
    {
        self.slot(model, program)?.load(cmd)
    }

    /// Releases every device shader and returns the resource archive.
    pub fn cleanup<D>(mut self, device: &D) -> Arc<ResShaderArchive>
    where
        D: ShaderDevice<Shader = S>,
    {
        let mut released = 0usize;
        for model in &mut self.models {
            for slot in &mut model.slots {
                released += usize::from(slot.cleanup(device));
            }
        }
        self.models.clear();
        log::info!(
            "shader archive {:?} cleaned up, {released} shaders released",
            self.res.name()
        );
        Arc::clone(&self.res)
    }
}

impl<S> Drop for ShaderArchive<S> {
    fn drop(&mut self) {
        let live = self
            .models
            .iter()
            .flat_map(|m| &m.slots)
            .filter(|slot| slot.is_initialized())
            .count();
        if live > 0 {
            log::warn!(
                "shader archive {:?} dropped with {live} initialized programs; call cleanup to release them",
                self.res.name()
            );
        }
    }
}
