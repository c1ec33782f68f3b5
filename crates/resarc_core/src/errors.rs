//! Error Types
//!
//! This module defines the error types used throughout the archive runtime.
//!
//! # Overview
//!
//! The main error type [`ResarcError`] covers the structural failure modes:
//! - Corrupt or hostile blobs rejected at fixup time
//! - Caller-supplied indices outside their declared count
//! - Programs used before their lazy initialization ran
//! - Invalid input handed to the archive builder
//!
//! Lookups that simply find nothing are *not* errors: every name or key search
//! returns `Option` and callers fall back to the documented default.
//!
//! # Usage
//!
//! ```rust,ignore
//! use resarc_core::errors::{ResarcError, Result};
//!
//! fn load(bytes: Vec<u8>) -> Result<()> {
//!     let mut blob = ShaderArchiveBlob::new(bytes);
//!     let _archive = blob.fixup()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for resarc.
#[derive(Error, Debug)]
pub enum ResarcError {
    // ========================================================================
    // Blob Structure Errors
    // ========================================================================
    /// Malformed header, out-of-range offset, duplicate dictionary entry or
    /// duplicate variant key. Fatal for the whole blob.
    #[error("Corrupt blob: {0}")]
    CorruptBlob(String),

    // ========================================================================
    // Caller Contract Errors
    // ========================================================================
    /// An index argument exceeds its declared count.
    #[error("Index out of range: {context} (index: {index}, count: {count})")]
    OutOfRange {
        /// Description of what was being accessed
        context: String,
        /// The invalid index
        index: usize,
        /// The number of valid entries
        count: usize,
    },

    /// A program was bound before `update` brought it to the initialized state.
    #[error("Program {program} of shading model {model} is not initialized (state: {state})")]
    ProgramNotInitialized {
        /// Shading model index within the archive
        model: usize,
        /// Program index within the shading model
        program: usize,
        /// The state the slot was found in
        state: &'static str,
    },

    /// `update_shared` was called on an archive set up without per-model locks.
    #[error("Shared update requires an archive set up with `thread_safe` enabled")]
    ConcurrencyDisabled,

    // ========================================================================
    // Build Errors
    // ========================================================================
    /// The archive builder was given inconsistent input.
    #[error("Archive build error: {0}")]
    Build(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// Reading blob bytes from an external source failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResarcError {
    pub fn corrupt(context: impl Into<String>) -> Self {
        Self::CorruptBlob(context.into())
    }

    pub fn out_of_range(context: impl Into<String>, index: usize, count: usize) -> Self {
        Self::OutOfRange {
            context: context.into(),
            index,
            count,
        }
    }

    pub fn build(context: impl Into<String>) -> Self {
        Self::Build(context.into())
    }

    /// Returns `Ok(())` when `index < count`, otherwise an [`OutOfRange`](Self::OutOfRange).
    #[inline]
    pub fn check_index(context: &str, index: usize, count: usize) -> Result<()> {
        if index < count {
            Ok(())
        } else {
            Err(Self::out_of_range(context, index, count))
        }
    }
}

/// Alias for `Result<T, ResarcError>`.
pub type Result<T> = std::result::Result<T, ResarcError>;
