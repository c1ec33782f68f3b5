//! Relocatable blob primitives.
//!
//! - [`blob`]: the relocatable blob and its fixup/unfixup lifecycle
//! - [`header`]: the fixed blob header
//! - [`reader`] / [`writer`]: bounds-checked record access and the build-side writer
//! - [`dictionary`]: sorted name → index dictionaries
//! - [`settings`]: limits applied while fixing up untrusted blobs
//! - [`errors`]: the shared error taxonomy

#![forbid(unsafe_code)]

pub mod blob;
pub mod dictionary;
pub mod errors;
pub mod header;
pub mod reader;
pub mod settings;
pub mod writer;

pub use blob::{BlobRoot, RelocatableBlob};
pub use dictionary::NameDictionary;
pub use errors::{ResarcError, Result};
pub use header::{BLOB_MAGIC, BLOB_VERSION, BlobHeader, HEADER_LEN};
pub use reader::BlobReader;
pub use settings::FixupLimits;
pub use writer::BlobWriter;
