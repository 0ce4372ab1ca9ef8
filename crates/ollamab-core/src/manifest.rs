//! Checksum manifest written alongside each archive
//!
//! Every backup run produces a `<archive>.manifest.json` sidecar recording
//! the blake3 hash, size and mtime of every entry that went into the
//! archive, so an operator can audit a backup without extracting it.

use crate::{Error, Result};
use blake3::Hasher;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Checksum record for a single archived file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChecksum {
    /// File size in bytes
    pub size: u64,
    /// Blake3 hash of file contents
    pub hash: String,
    /// Modified time (Unix timestamp)
    pub mtime: i64,
}

/// Sidecar manifest for one backup archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumManifest {
    /// Version of the manifest format
    pub version: u32,
    /// Creation timestamp (Unix)
    pub created: i64,
    /// Source directory the archive was taken from
    pub base_dir: PathBuf,
    /// Total size of all archived files
    pub total_size: u64,
    /// Number of archived files
    pub file_count: u32,
    /// Checksums indexed by archive-relative path
    pub files: BTreeMap<PathBuf, FileChecksum>,
}

impl ChecksumManifest {
    /// Current manifest format version
    const VERSION: u32 = 1;

    /// Build a manifest from the entries recorded during an archive run
    pub fn new<P: AsRef<Path>>(
        base_dir: P,
        entries: impl IntoIterator<Item = (PathBuf, FileChecksum)>,
    ) -> Self {
        let files: BTreeMap<PathBuf, FileChecksum> = entries.into_iter().collect();
        let total_size = files.values().map(|c| c.size).sum();
        let file_count = files.len() as u32;

        Self {
            version: Self::VERSION,
            created: Utc::now().timestamp(),
            base_dir: base_dir.as_ref().to_path_buf(),
            total_size,
            file_count,
            files,
        }
    }

    /// Save the manifest as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(path, json)?;

        info!("Saved checksum manifest to: {:?}", path);
        Ok(())
    }

    /// Load a manifest from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let manifest: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Other(format!("Failed to parse manifest: {}", e)))?;

        if manifest.version != Self::VERSION {
            return Err(Error::Other(format!(
                "Unsupported manifest version: {} (expected {})",
                manifest.version,
                Self::VERSION
            )));
        }

        Ok(manifest)
    }

    /// Check a source file against its recorded hash
    ///
    /// `relative` is the archive-relative path; the file is read from
    /// `source_root`. Returns false when the content no longer matches.
    pub fn verify_file<P: AsRef<Path>>(&self, source_root: P, relative: &Path) -> Result<bool> {
        let recorded = self
            .files
            .get(relative)
            .ok_or_else(|| Error::NotFound(format!("{:?} is not in the manifest", relative)))?;

        let hash = compute_file_hash(source_root.as_ref().join(relative))?;
        Ok(hash == recorded.hash)
    }
}

/// Compute the blake3 hash of a file
pub fn compute_file_hash<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Reader wrapper that hashes bytes as they stream into the archive
///
/// Hashing during the single archiving read guarantees the manifest
/// describes exactly the bytes that were written, and large model files
/// are read from disk only once.
pub(crate) struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    pub fn finalize_hex(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
