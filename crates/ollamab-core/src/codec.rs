//! Compression codec selection
//!
//! Model weights are large, mostly incompressible-looking binary blobs that
//! still shrink noticeably under LZMA-family codecs, so the default is xz at
//! its strongest level. Speed is a non-goal for this workload.

use crate::{Error, Result};

/// Compression codec for the backup archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Store the tar stream without compression
    Store,
    /// Gzip compression
    Gzip,
    /// Zstandard compression
    Zstd,
    /// XZ (LZMA2) compression
    Xz,
}

impl Codec {
    /// Strongest ratio-oriented level the codec offers
    pub fn max_level(&self) -> u32 {
        match self {
            Codec::Store => 0,
            Codec::Gzip => 9,
            Codec::Zstd => 22,
            Codec::Xz => 9,
        }
    }

    /// Archive file extension for this codec
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Store => "tar",
            Codec::Gzip => "tar.gz",
            Codec::Zstd => "tar.zst",
            Codec::Xz => "tar.xz",
        }
    }

    /// Validate a requested level, falling back to the maximum when absent
    pub fn resolve_level(&self, level: Option<u32>) -> Result<u32> {
        match level {
            None => Ok(self.max_level()),
            Some(l) if l <= self.max_level() => Ok(l),
            Some(l) => Err(Error::Compression(format!(
                "level {} exceeds maximum {} for {}",
                l,
                self.max_level(),
                self
            ))),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Xz
    }
}

impl std::str::FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "store" | "none" => Ok(Codec::Store),
            "gzip" | "gz" => Ok(Codec::Gzip),
            "zstd" | "zst" => Ok(Codec::Zstd),
            "xz" => Ok(Codec::Xz),
            _ => Err(Error::UnsupportedCodec(s.to_string())),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Store => write!(f, "store"),
            Codec::Gzip => write!(f, "gzip"),
            Codec::Zstd => write!(f, "zstd"),
            Codec::Xz => write!(f, "xz"),
        }
    }
}
