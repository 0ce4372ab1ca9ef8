//! Metadata captured for archive entries

use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

/// Metadata to preserve when writing tar headers
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub modified: Option<SystemTime>,
    #[cfg(unix)]
    pub mode: Option<u32>,
    #[cfg(unix)]
    pub uid: Option<u32>,
    #[cfg(unix)]
    pub gid: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = path.metadata()?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Extract metadata from std::fs::Metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            #[cfg(unix)]
            mode: {
                use std::os::unix::fs::MetadataExt;
                Some(metadata.mode())
            },
            #[cfg(unix)]
            uid: {
                use std::os::unix::fs::MetadataExt;
                Some(metadata.uid())
            },
            #[cfg(unix)]
            gid: {
                use std::os::unix::fs::MetadataExt;
                Some(metadata.gid())
            },
        }
    }

    /// Modification time as seconds since the Unix epoch
    pub fn mtime_secs(&self) -> Option<u64> {
        self.modified
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
    }
}
