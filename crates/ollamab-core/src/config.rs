//! Configuration module
//!
//! Two layers: an optional settings file under the user's config directory
//! for tuning (codec, level, excludes), and the two required paths taken
//! from the environment. Both are folded into a [`BackupConfig`] that is
//! validated once and handed to the archiver.

use crate::codec::Codec;
use crate::{Error, Result};
use dirs::config_dir;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the Ollama model directory
pub const MODELS_ENV: &str = "OLLAMA_MODELS";
/// Environment variable naming the backup destination directory
pub const BACKUP_ENV: &str = "OLLAMA_BACKUP_PATH";

/// Persisted settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Compression settings
    pub compression: CompressionSettings,
    /// Backup behavior settings
    pub backup: BackupSettings,
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Codec name (store, gzip, zstd, xz)
    pub codec: String,
    /// Compression level; unset means the codec's maximum
    pub level: Option<u32>,
}

/// Backup behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Prefix for generated archive file names
    pub archive_prefix: String,
    /// Archive symlink targets instead of skipping links
    pub follow_symlinks: bool,
    /// Glob patterns (relative to the source root) excluded from backups
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compression: CompressionSettings {
                codec: "xz".to_string(),
                level: None,
            },
            backup: BackupSettings {
                archive_prefix: "ollama-backup".to_string(),
                follow_symlinks: false,
                // In-flight Ollama downloads live next to finished blobs
                exclude: vec!["*-partial*".to_string()],
            },
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| Error::Config("Unable to determine config directory".to_string()))?;

        let ollamab_dir = config_dir.join("ollamab");
        if !ollamab_dir.exists() {
            fs::create_dir_all(&ollamab_dir)?;
        }

        Ok(ollamab_dir.join("config.toml"))
    }

    /// Load settings from file, writing defaults on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let defaults = Self::default();
            defaults.save()?;
            return Ok(defaults);
        }

        let contents = fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&path, contents)?;
        Ok(())
    }
}

/// Fully resolved backup configuration handed to the archiver
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Source model directory (read-only)
    pub models_dir: PathBuf,
    /// Destination directory for archives
    pub backup_dir: PathBuf,
    /// Compression codec
    pub codec: Codec,
    /// Compression level
    pub level: u32,
    /// Prefix for generated archive names
    pub archive_prefix: String,
    /// Archive symlink targets instead of skipping links
    pub follow_symlinks: bool,
    /// Compiled exclude patterns
    pub excludes: Vec<Pattern>,
}

impl BackupConfig {
    /// Build a configuration from settings plus explicit paths
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        models_dir: P,
        backup_dir: Q,
        settings: &Settings,
    ) -> Result<Self> {
        let codec: Codec = settings.compression.codec.parse()?;
        let level = codec.resolve_level(settings.compression.level)?;

        let excludes = settings
            .backup
            .exclude
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| Error::Config(format!("Invalid exclude pattern {:?}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            models_dir: models_dir.as_ref().to_path_buf(),
            backup_dir: backup_dir.as_ref().to_path_buf(),
            codec,
            level,
            archive_prefix: settings.backup.archive_prefix.clone(),
            follow_symlinks: settings.backup.follow_symlinks,
            excludes,
        })
    }

    /// Build a configuration from the environment
    ///
    /// Both `OLLAMA_MODELS` and `OLLAMA_BACKUP_PATH` are required.
    pub fn from_env(settings: &Settings) -> Result<Self> {
        let models_dir = std::env::var(MODELS_ENV)
            .map_err(|_| Error::Config(format!("{} is not set", MODELS_ENV)))?;
        let backup_dir = std::env::var(BACKUP_ENV)
            .map_err(|_| Error::Config(format!("{} is not set", BACKUP_ENV)))?;

        Self::new(models_dir, backup_dir, settings)
    }

    /// Validate the source directory and prepare the destination
    ///
    /// The source must exist and be a directory; the destination is created
    /// when missing. Destination creation failure is fatal.
    pub fn validate(&self) -> Result<()> {
        if !self.models_dir.exists() {
            return Err(Error::InvalidPath(format!(
                "source directory {:?} does not exist",
                self.models_dir
            )));
        }
        if !self.models_dir.is_dir() {
            return Err(Error::InvalidPath(format!(
                "source path {:?} is not a directory",
                self.models_dir
            )));
        }

        if !self.backup_dir.exists() {
            debug!("Creating backup directory: {:?}", self.backup_dir);
            fs::create_dir_all(&self.backup_dir)?;
        }

        Ok(())
    }

    /// Whether a relative path matches any exclude pattern
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.excludes.iter().any(|p| p.matches_path(relative))
    }
}
