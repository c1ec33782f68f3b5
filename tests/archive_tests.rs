//! Runtime Archive Tests
//!
//! Tests for:
//! - Lazy program initialization and idempotent updates
//! - Binding before initialization
//! - Binary-only programs on devices without binary support
//! - Location resolution: reflected, stored, and the invalid fallback
//! - Shared updates across threads
//! - Eager setup, update hooks and cleanup

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use resarc::{
    ArchiveBuilder, INVALID_LOCATION, ProgramLocations, ProgramPayload, ProgramState,
    ResShaderArchive, ResarcError, ResourceKind, SetupOptions, ShaderArchive, ShaderArchiveBlob,
    ShaderStage, ShadingModelBuilder,
};

use common::{CountingDevice, RecordingCommandBuffer, sample_blob};

const LIT: usize = 0;
const UNLIT: usize = 1;

fn sample() -> Arc<ResShaderArchive> {
    ShaderArchiveBlob::new(sample_blob()).fixup().unwrap()
}

fn lazy(device: &CountingDevice) -> ShaderArchive<u32> {
    ShaderArchive::setup(sample(), device, SetupOptions::default()).unwrap()
}

fn shared(device: &CountingDevice) -> ShaderArchive<u32> {
    let options = SetupOptions {
        thread_safe: true,
        ..Default::default()
    };
    ShaderArchive::setup(sample(), device, options).unwrap()
}

// ============================================================================
// Lazy Initialization
// ============================================================================

#[test]
fn setup_leaves_programs_unloaded() {
    let device = CountingDevice::new();
    let archive = lazy(&device);
    assert_eq!(archive.program_count(), 4);
    for program in 0..3 {
        assert_eq!(archive.program_state(LIT, program).unwrap(), ProgramState::Unloaded);
    }
    assert_eq!(device.compiles(), 0);
    archive.cleanup(&device);
}

#[test]
fn update_initializes_once() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);

    assert_eq!(archive.update(&device, LIT, 1).unwrap(), ProgramState::Initialized);
    assert_eq!(archive.update(&device, LIT, 1).unwrap(), ProgramState::Initialized);
    assert_eq!(device.compiles(), 1);
    assert_eq!(archive.program_state(LIT, 0).unwrap(), ProgramState::Unloaded);
    archive.cleanup(&device);
}

#[test]
fn load_before_update_is_rejected() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);
    let mut cmd = RecordingCommandBuffer::default();

    let err = archive.load(LIT, 0, &mut cmd).unwrap_err();
    assert!(matches!(
        err,
        ResarcError::ProgramNotInitialized { model: 0, program: 0, state: "unloaded" }
    ));
    assert!(cmd.bound.is_empty());

    archive.update(&device, LIT, 0).unwrap();
    archive.load(LIT, 0, &mut cmd).unwrap();
    archive.load(LIT, 0, &mut cmd).unwrap();
    assert_eq!(cmd.bound.len(), 2);
    assert_eq!(cmd.bound[0], cmd.bound[1]);
    archive.cleanup(&device);
}

#[test]
fn models_are_independent() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);
    archive.update(&device, UNLIT, 0).unwrap();
    assert_eq!(archive.program_state(UNLIT, 0).unwrap(), ProgramState::Initialized);
    assert_eq!(archive.program_state(LIT, 0).unwrap(), ProgramState::Unloaded);
    archive.cleanup(&device);
}

#[test]
fn out_of_range_indices_are_reported() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);
    let mut cmd = RecordingCommandBuffer::default();
    assert!(matches!(
        archive.update(&device, 2, 0),
        Err(ResarcError::OutOfRange { .. })
    ));
    assert!(matches!(
        archive.load(LIT, 3, &mut cmd),
        Err(ResarcError::OutOfRange { .. })
    ));
    assert!(archive.slot(UNLIT, 1).is_err());
    archive.cleanup(&device);
}

// ============================================================================
// Binary Availability
// ============================================================================

#[test]
fn binary_only_program_without_binary_support() {
    let device = CountingDevice::without_binary();
    let mut archive = lazy(&device);
    let mut cmd = RecordingCommandBuffer::default();

    assert_eq!(
        archive.update(&device, LIT, 2).unwrap(),
        ProgramState::BinaryUnavailable
    );
    assert_eq!(device.compiles(), 0);

    let slot = archive.slot(LIT, 2).unwrap();
    assert!(slot.locations().is_none());
    assert!(slot.shader().is_none());
    assert!(matches!(
        archive.load(LIT, 2, &mut cmd),
        Err(ResarcError::ProgramNotInitialized { state: "binary unavailable", .. })
    ));

    // settled: a second update does not retry
    assert_eq!(
        archive.update(&device, LIT, 2).unwrap(),
        ProgramState::BinaryUnavailable
    );
    assert_eq!(device.compiles(), 0);
    archive.cleanup(&device);
}

#[test]
fn source_program_compiles_without_binary_support() {
    let device = CountingDevice::without_binary();
    let mut archive = lazy(&device);
    assert_eq!(archive.update(&device, LIT, 1).unwrap(), ProgramState::Initialized);
    archive.cleanup(&device);
}

#[test]
fn empty_payload_is_binary_unavailable() {
    let res = Arc::new(
        ArchiveBuilder::new("empty")
            .shading_model(ShadingModelBuilder::new("m").program(&[], ProgramPayload::empty()))
            .build()
            .unwrap(),
    );
    let device = CountingDevice::new();
    let mut archive = ShaderArchive::setup(res, &device, SetupOptions::default()).unwrap();
    assert_eq!(archive.update(&device, 0, 0).unwrap(), ProgramState::BinaryUnavailable);
    assert_eq!(device.compiles(), 0);
    archive.cleanup(&device);
}

// ============================================================================
// Locations
// ============================================================================

#[test]
fn locations_default_to_invalid() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);
    archive.update(&device, LIT, 0).unwrap();

    let slot = archive.slot(LIT, 0).unwrap();
    for stage in ShaderStage::ALL {
        assert_eq!(slot.sampler_location(1, stage).unwrap(), INVALID_LOCATION);
        assert_eq!(slot.uniform_block_location(0, stage).unwrap(), INVALID_LOCATION);
    }
    assert!(matches!(
        slot.sampler_location(2, ShaderStage::Pixel),
        Err(ResarcError::OutOfRange { .. })
    ));
    assert!(slot.image_location(0, ShaderStage::Pixel).is_err());
    archive.cleanup(&device);
}

#[test]
fn reflected_locations_are_used() {
    let mut reflected = ProgramLocations::invalid([2, 0, 2, 0]);
    reflected
        .samplers
        .set_location(1, ShaderStage::Pixel, 3)
        .unwrap();
    reflected
        .uniform_blocks
        .set_location(0, ShaderStage::Vertex, 0)
        .unwrap();
    let device = CountingDevice {
        reflected: Some(reflected),
        ..CountingDevice::new()
    };
    let mut archive = lazy(&device);
    archive.update(&device, LIT, 0).unwrap();

    let slot = archive.slot(LIT, 0).unwrap();
    assert_eq!(slot.sampler_location(1, ShaderStage::Pixel).unwrap(), 3);
    assert_eq!(slot.sampler_location(1, ShaderStage::Vertex).unwrap(), INVALID_LOCATION);
    assert_eq!(slot.uniform_block_location(0, ShaderStage::Vertex).unwrap(), 0);
    assert!(slot.locations().unwrap().samplers.is_used(1));
    assert!(!slot.locations().unwrap().samplers.is_used(0));
    archive.cleanup(&device);
}

#[test]
fn mismatched_reflection_is_ignored() {
    let mut reflected = ProgramLocations::invalid([1, 0, 0, 0]);
    reflected
        .samplers
        .set_location(0, ShaderStage::Pixel, 9)
        .unwrap();
    let device = CountingDevice {
        reflected: Some(reflected),
        ..CountingDevice::new()
    };
    let mut archive = lazy(&device);
    archive.update(&device, LIT, 0).unwrap();

    let slot = archive.slot(LIT, 0).unwrap();
    assert_eq!(slot.sampler_location(0, ShaderStage::Pixel).unwrap(), INVALID_LOCATION);
    assert_eq!(slot.locations().unwrap().counts(), [2, 0, 2, 0]);
    archive.cleanup(&device);
}

#[test]
fn stored_locations_survive_the_blob() {
    let mut stored = ProgramLocations::invalid([1, 1, 0, 0]);
    stored
        .table_mut(ResourceKind::Image)
        .set_location(0, ShaderStage::Compute, 5)
        .unwrap();
    let bytes = ArchiveBuilder::new("stored")
        .shading_model(
            ShadingModelBuilder::new("compute")
                .samplers(&["input"])
                .images(&["output"])
                .program(&[], ProgramPayload::source("cs").with_locations(stored.clone())),
        )
        .build_blob()
        .unwrap();
    let res = ShaderArchiveBlob::new(bytes).fixup().unwrap();
    assert_eq!(
        res.shading_model(0).unwrap().program(0).unwrap().stored_locations(),
        Some(&stored)
    );

    let device = CountingDevice::new();
    let mut archive = ShaderArchive::setup(res, &device, SetupOptions::default()).unwrap();
    archive.update(&device, 0, 0).unwrap();
    let slot = archive.slot(0, 0).unwrap();
    assert_eq!(slot.image_location(0, ShaderStage::Compute).unwrap(), 5);
    assert_eq!(
        slot.location(ResourceKind::Sampler, 0, ShaderStage::Compute).unwrap(),
        INVALID_LOCATION
    );
    archive.cleanup(&device);
}

// ============================================================================
// Shared Updates
// ============================================================================

#[test]
fn shared_update_requires_thread_safe_setup() {
    let device = CountingDevice::new();
    let archive = lazy(&device);
    assert!(matches!(
        archive.update_shared(&device, LIT, 0),
        Err(ResarcError::ConcurrencyDisabled)
    ));
    archive.cleanup(&device);
}

#[test]
fn concurrent_updates_initialize_once() {
    let device = CountingDevice {
        compile_delay: Some(Duration::from_millis(20)),
        ..CountingDevice::new()
    };
    let archive = shared(&device);
    assert!(archive.is_thread_safe());

    let states = Mutex::new(Vec::new());
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let state = archive.update_shared(&device, LIT, 1).unwrap();
                states.lock().push(state);
            });
        }
    });

    assert_eq!(device.compiles(), 1);
    let states = states.into_inner();
    assert_eq!(states.len(), 8);
    assert!(states.iter().all(|&s| s == ProgramState::Initialized));
    archive.cleanup(&device);
}

#[test]
fn concurrent_updates_of_every_program() {
    let device = CountingDevice::new();
    let archive = shared(&device);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for program in 0..3 {
                    archive.update_shared(&device, LIT, program).unwrap();
                }
                archive.update_shared(&device, UNLIT, 0).unwrap();
            });
        }
    });

    assert_eq!(device.compiles(), 4);
    let released = Arc::clone(archive.resource());
    assert_eq!(released.shading_model_count(), 2);
    archive.cleanup(&device);
    assert_eq!(device.releases(), 4);
}

#[test]
fn exclusive_update_works_on_thread_safe_archive() {
    let device = CountingDevice::new();
    let mut archive = shared(&device);
    archive.update(&device, LIT, 0).unwrap();
    assert_eq!(archive.update_shared(&device, LIT, 0).unwrap(), ProgramState::Initialized);
    assert_eq!(device.compiles(), 1);
    archive.cleanup(&device);
}

// ============================================================================
// Setup Options, Hooks, Cleanup
// ============================================================================

#[test]
fn eager_setup_settles_every_program() {
    let device = CountingDevice::without_binary();
    let options = SetupOptions {
        eager: true,
        ..Default::default()
    };
    let archive = ShaderArchive::setup(sample(), &device, options).unwrap();
    assert_eq!(archive.program_state(LIT, 0).unwrap(), ProgramState::Initialized);
    assert_eq!(archive.program_state(LIT, 2).unwrap(), ProgramState::BinaryUnavailable);
    assert_eq!(archive.program_state(UNLIT, 0).unwrap(), ProgramState::Initialized);
    assert_eq!(device.compiles(), 3);
    archive.cleanup(&device);
    assert_eq!(device.releases(), 3);
}

#[test]
fn setup_options_load_from_json() {
    let options: SetupOptions = serde_json::from_str(r#"{ "eager": true }"#).unwrap();
    assert!(options.eager);
    assert!(!options.thread_safe);
    let defaults: SetupOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(defaults, SetupOptions::default());
}

#[test]
fn update_hook_reports_settled_states() {
    let device = CountingDevice::without_binary();
    let mut archive = lazy(&device);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    archive.set_update_hook(Box::new(move |update| {
        sink.lock()
            .push((update.model_index, update.program_index, update.state));
    }));

    archive.update(&device, LIT, 0).unwrap();
    archive.update(&device, LIT, 0).unwrap();
    archive.update(&device, LIT, 2).unwrap();
    assert_eq!(
        *seen.lock(),
        [
            (LIT, 0, ProgramState::Initialized),
            (LIT, 2, ProgramState::BinaryUnavailable),
        ]
    );

    archive.clear_update_hook();
    archive.update(&device, UNLIT, 0).unwrap();
    assert_eq!(seen.lock().len(), 2);
    archive.cleanup(&device);
}

#[test]
fn shared_update_runs_hook_once_per_program() {
    let device = CountingDevice::new();
    let mut archive = shared(&device);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    archive.set_update_hook(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| archive.update_shared(&device, UNLIT, 0).unwrap());
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    archive.cleanup(&device);
}

#[test]
fn cleanup_releases_only_initialized_programs() {
    let device = CountingDevice::without_binary();
    let mut archive = lazy(&device);
    archive.update(&device, LIT, 0).unwrap();
    archive.update(&device, LIT, 2).unwrap();

    let res = archive.cleanup(&device);
    assert_eq!(device.releases(), 1);
    assert_eq!(res.name(), "sample");
}

#[test]
fn archive_can_be_set_up_again_after_cleanup() {
    let device = CountingDevice::new();
    let mut archive = lazy(&device);
    archive.update(&device, LIT, 0).unwrap();
    let res = archive.cleanup(&device);

    let mut again = ShaderArchive::setup(res, &device, SetupOptions::default()).unwrap();
    assert_eq!(again.program_state(LIT, 0).unwrap(), ProgramState::Unloaded);
    again.update(&device, LIT, 0).unwrap();
    assert_eq!(device.compiles(), 2);
    again.cleanup(&device);
    assert_eq!(device.releases(), 2);
}
