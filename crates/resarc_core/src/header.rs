//! Blob header.
//!
//! Layout (little-endian, 32 bytes):
//!
//! | Offset | Field           | Notes                                    |
//! |--------|-----------------|------------------------------------------|
//! | 0      | `magic`         | `b"RSAR"`                                |
//! | 4      | `version`       | [`BLOB_VERSION`]                         |
//! | 8      | `endianness`    | 0 = little, 1 = big                      |
//! | 9      | `pointer_width` | 4 or 8, recorded for the build target    |
//! | 10     | `flags`         | reserved, zero                           |
//! | 12     | `file_size`     | total bytes, header included             |
//! | 16     | `root_offset`   | offset of the root record                |
//! | 20     | `reserved`      | zero                                     |
//! | 24     | `checksum`      | xxh3-64 of `bytes[32..file_size]`        |

use bytemuck::{Pod, Zeroable};
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{ResarcError, Result};
use crate::settings::FixupLimits;

pub const BLOB_MAGIC: [u8; 4] = *b"RSAR";
pub const BLOB_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 32;

pub const ENDIAN_LITTLE: u8 = 0;
pub const ENDIAN_BIG: u8 = 1;

/// Fixed header at offset 0 of every blob.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlobHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub endianness: u8,
    pub pointer_width: u8,
    pub flags: u16,
    pub file_size: u32,
    pub root_offset: u32,
    pub reserved: u32,
    pub checksum: u64,
}

const _: () = assert!(std::mem::size_of::<BlobHeader>() == HEADER_LEN);

impl BlobHeader {
    /// Header for a freshly written little-endian blob.
    #[must_use]
    pub fn new(file_size: u32, root_offset: u32, pointer_width: u8, checksum: u64) -> Self {
        Self {
            magic: BLOB_MAGIC,
            version: BLOB_VERSION,
            endianness: ENDIAN_LITTLE,
            pointer_width,
            flags: 0,
            file_size,
            root_offset,
            reserved: 0,
            checksum,
        }
    }

    /// Reads the header from the first [`HEADER_LEN`] bytes, converting from
    /// the on-disk little-endian representation.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ResarcError::corrupt(format!(
                "need at least {HEADER_LEN} header bytes, got {}",
                bytes.len()
            )));
        }
        let raw: BlobHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_LEN]);
        Ok(raw.swap_le())
    }

    /// Serializes the header into its little-endian byte form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let le = self.swap_le();
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(bytemuck::bytes_of(&le));
        out
    }

    // Little-endian <-> native is an involution, so one helper serves both ways.
    fn swap_le(self) -> Self {
        Self {
            magic: self.magic,
            version: u32::from_le(self.version),
            endianness: self.endianness,
            pointer_width: self.pointer_width,
            flags: u16::from_le(self.flags),
            file_size: u32::from_le(self.file_size),
            root_offset: u32::from_le(self.root_offset),
            reserved: u32::from_le(self.reserved),
            checksum: u64::from_le(self.checksum),
        }
    }

    /// Parses and validates the header of `bytes`.
    ///
    /// Checks the magic tag, version, byte order, pointer width, declared size,
    /// root offset and (optionally) the payload checksum.
    pub fn validate(bytes: &[u8], limits: &FixupLimits) -> Result<Self> {
        let header = Self::read(bytes)?;

        if header.magic != BLOB_MAGIC {
            return Err(ResarcError::corrupt(format!(
                "bad magic {:?}, expected {:?}",
                header.magic, BLOB_MAGIC
            )));
        }
        if header.version != BLOB_VERSION {
            return Err(ResarcError::corrupt(format!(
                "unsupported version {}, expected {BLOB_VERSION}",
                header.version
            )));
        }
        match header.endianness {
            ENDIAN_LITTLE => {}
            ENDIAN_BIG => {
                return Err(ResarcError::corrupt("big-endian blobs are not supported"));
            }
            other => {
                return Err(ResarcError::corrupt(format!("unknown endianness tag {other}")));
            }
        }
        if !matches!(header.pointer_width, 4 | 8) {
            return Err(ResarcError::corrupt(format!(
                "pointer width {} is neither 4 nor 8",
                header.pointer_width
            )));
        }

        let file_size = header.file_size as usize;
        if file_size < HEADER_LEN {
            return Err(ResarcError::corrupt(format!(
                "file_size {file_size} is smaller than the header"
            )));
        }
        if file_size > bytes.len() {
            return Err(ResarcError::corrupt(format!(
                "file_size {file_size} exceeds buffer length {}",
                bytes.len()
            )));
        }

        let root = header.root_offset as usize;
        if root < HEADER_LEN || root >= file_size || root % 4 != 0 {
            return Err(ResarcError::corrupt(format!(
                "root offset {root} is not an aligned record inside {HEADER_LEN}..{file_size}"
            )));
        }

        if limits.verify_checksum {
            let actual = xxh3_64(&bytes[HEADER_LEN..file_size]);
            if actual != header.checksum {
                return Err(ResarcError::corrupt(format!(
                    "checksum mismatch: header {:#018x}, payload {actual:#018x}",
                    header.checksum
                )));
            }
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_with_header(header: BlobHeader, payload: &[u8]) -> Vec<u8> {
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn valid_blob() -> Vec<u8> {
        let payload = [0u8; 8];
        let header = BlobHeader::new(40, 32, 8, xxh3_64(&payload));
        blob_with_header(header, &payload)
    }

    #[test]
    fn roundtrips_through_bytes() {
        let header = BlobHeader::new(64, 32, 8, 0xdead_beef);
        assert_eq!(BlobHeader::read(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn accepts_valid_header() {
        let bytes = valid_blob();
        let header = BlobHeader::validate(&bytes, &FixupLimits::default()).unwrap();
        assert_eq!(header.file_size, 40);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = valid_blob();
        bytes[0] = b'X';
        let err = BlobHeader::validate(&bytes, &FixupLimits::default()).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn rejects_other_version() {
        let mut bytes = valid_blob();
        bytes[4] = 9;
        assert!(BlobHeader::validate(&bytes, &FixupLimits::default()).is_err());
    }

    #[test]
    fn rejects_big_endian_tag() {
        let mut bytes = valid_blob();
        bytes[8] = ENDIAN_BIG;
        let err = BlobHeader::validate(&bytes, &FixupLimits::default()).unwrap_err();
        assert!(err.to_string().contains("big-endian"));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = valid_blob();
        assert!(BlobHeader::validate(&bytes[..36], &FixupLimits::default()).is_err());
    }

    #[test]
    fn checksum_is_optional() {
        let mut bytes = valid_blob();
        bytes[HEADER_LEN] = 0xff;
        assert!(BlobHeader::validate(&bytes, &FixupLimits::default()).is_err());

        let relaxed = FixupLimits {
            verify_checksum: false,
            ..Default::default()
        };
        assert!(BlobHeader::validate(&bytes, &relaxed).is_ok());
    }
}
