//! Pipeline stages and reflected resource kinds.

use serde::{Deserialize, Serialize};

/// Number of pipeline stages a location table covers.
pub const STAGE_COUNT: usize = 6;

/// Location value meaning "not referenced by this stage".
pub const INVALID_LOCATION: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; STAGE_COUNT] = [
        Self::Vertex,
        Self::Hull,
        Self::Domain,
        Self::Geometry,
        Self::Pixel,
        Self::Compute,
    ];

    /// Column of this stage in a location table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Hull => "hull",
            Self::Domain => "domain",
            Self::Geometry => "geometry",
            Self::Pixel => "pixel",
            Self::Compute => "compute",
        }
    }
}

/// Kinds of resources a program binds by location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Sampler,
    Image,
    UniformBlock,
    StorageBlock,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        Self::Sampler,
        Self::Image,
        Self::UniformBlock,
        Self::StorageBlock,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sampler => "sampler",
            Self::Image => "image",
            Self::UniformBlock => "uniform block",
            Self::StorageBlock => "storage block",
        }
    }
}
