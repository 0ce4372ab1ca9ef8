//! Archive creation
//!
//! The archiver walks the source tree exactly once and streams every
//! regular file through the configured codec into a single tar stream.
//! The stream goes to a temp file inside the destination directory and is
//! renamed to its final timestamped name only after the encoder finishes,
//! so an interrupted run never leaves a truncated archive behind.

use crate::codec::Codec;
use crate::config::BackupConfig;
use crate::manifest::{ChecksumManifest, FileChecksum, HashingReader};
use crate::metadata::FileMetadata;
use crate::progress::ProgressReporter;
use crate::registry::ModelRef;
use crate::utils::count_regular_files;
use crate::{Error, Result};
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xz2::write::XzEncoder;
use zstd::stream::write::Encoder as ZstdEncoder;

/// A source file that was not written into the archive
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    /// Path relative to the source directory (absolute when outside it)
    pub path: PathBuf,
    /// Why the entry was skipped
    pub reason: String,
}

/// Summary of one backup run
#[derive(Debug)]
pub struct BackupReport {
    /// Final archive location
    pub archive_path: PathBuf,
    /// Sidecar checksum manifest location
    pub manifest_path: PathBuf,
    /// Number of files written into the archive
    pub files_archived: usize,
    /// Total uncompressed bytes archived
    pub bytes_archived: u64,
    /// Files matching an exclude pattern
    pub excluded: usize,
    /// Files skipped with a reason (unreadable, symlink, special)
    pub skipped: Vec<SkippedEntry>,
}

/// What a single run archives
enum EntrySource<'a> {
    /// The whole source tree
    Tree,
    /// An explicit list of absolute paths (per-model backup)
    Paths(&'a [PathBuf]),
}

/// Accumulated state of one packing pass
struct PackState {
    records: Vec<(PathBuf, FileChecksum)>,
    skipped: Vec<SkippedEntry>,
    excluded: usize,
    bytes: u64,
    progress: ProgressReporter,
}

/// Outcome of appending one file
enum Appended {
    Entry(FileChecksum),
    Skipped(String),
}

/// Directory-tree archiver
pub struct Archiver {
    config: BackupConfig,
    progress_enabled: bool,
}

impl Archiver {
    /// Create an archiver over a validated configuration
    pub fn new(config: BackupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress_enabled: false,
        })
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Back up every regular file under the source directory
    pub fn backup_all(&self) -> Result<BackupReport> {
        let prefix = self.config.archive_prefix.clone();
        self.run_backup(&prefix, EntrySource::Tree)
    }

    /// Back up one model: its manifest plus the blobs it references
    pub fn backup_model(&self, model: &ModelRef) -> Result<BackupReport> {
        let prefix = format!("{}-{}", self.config.archive_prefix, model.file_label());
        let paths = model.archive_paths();
        self.run_backup(&prefix, EntrySource::Paths(&paths))
    }

    fn run_backup(&self, prefix: &str, source: EntrySource<'_>) -> Result<BackupReport> {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S");
        let file_name = format!("{}-{}.{}", prefix, timestamp, self.config.codec.extension());
        let final_path = unique_destination(self.config.backup_dir.join(file_name));

        info!(
            "Backing up {:?} to {:?} ({} level {})",
            self.config.models_dir, final_path, self.config.codec, self.config.level
        );

        let progress = if self.progress_enabled {
            let total = match &source {
                EntrySource::Tree => count_regular_files(&self.config.models_dir),
                EntrySource::Paths(paths) => paths.len() as u64,
            };
            ProgressReporter::start("Archiving", total)
        } else {
            ProgressReporter::disabled()
        };

        let mut state = PackState {
            records: Vec::new(),
            skipped: Vec::new(),
            excluded: 0,
            bytes: 0,
            progress,
        };

        // Temp file lives in the destination directory so the final rename
        // stays on one filesystem; dropping it on error removes the partial
        // archive.
        let mut temp = NamedTempFile::new_in(&self.config.backup_dir)?;
        self.pack_into(temp.as_file_mut(), &source, &mut state)?;

        state.progress.finish();

        temp.persist(&final_path)
            .map_err(|e| Error::Io(e.error))?;

        let manifest = ChecksumManifest::new(&self.config.models_dir, state.records);
        let manifest_path = sidecar_path(&final_path);
        manifest.save(&manifest_path)?;

        info!(
            "Backup complete: {:?} ({} files, {} bytes, {} skipped)",
            final_path,
            manifest.file_count,
            state.bytes,
            state.skipped.len()
        );

        Ok(BackupReport {
            archive_path: final_path,
            manifest_path,
            files_archived: manifest.file_count as usize,
            bytes_archived: state.bytes,
            excluded: state.excluded,
            skipped: state.skipped,
        })
    }

    /// Drive the tar builder through the configured codec
    fn pack_into(
        &self,
        output: &mut File,
        source: &EntrySource<'_>,
        state: &mut PackState,
    ) -> Result<()> {
        match self.config.codec {
            Codec::Store => {
                let mut builder = Builder::new(output);
                self.pack_source(&mut builder, source, state)?;
                builder.finish()?;
            }
            Codec::Gzip => {
                let encoder = GzEncoder::new(output, GzCompression::new(self.config.level));
                let mut builder = Builder::new(encoder);
                self.pack_source(&mut builder, source, state)?;
                let encoder = builder.into_inner()?;
                encoder.finish()?;
            }
            Codec::Zstd => {
                let encoder = ZstdEncoder::new(output, self.config.level as i32)
                    .map_err(|e| Error::Compression(e.to_string()))?;
                let mut builder = Builder::new(encoder);
                self.pack_source(&mut builder, source, state)?;
                let encoder = builder.into_inner()?;
                encoder
                    .finish()
                    .map_err(|e| Error::Compression(e.to_string()))?;
            }
            Codec::Xz => {
                let encoder = XzEncoder::new(output, self.config.level);
                let mut builder = Builder::new(encoder);
                self.pack_source(&mut builder, source, state)?;
                let encoder = builder.into_inner()?;
                encoder.finish()?;
            }
        }
        Ok(())
    }

    fn pack_source<W: Write>(
        &self,
        builder: &mut Builder<W>,
        source: &EntrySource<'_>,
        state: &mut PackState,
    ) -> Result<()> {
        match source {
            EntrySource::Tree => self.pack_tree(builder, state),
            EntrySource::Paths(paths) => self.pack_paths(builder, paths, state),
        }
    }

    /// Pack the whole source tree in one depth-first pass
    fn pack_tree<W: Write>(&self, builder: &mut Builder<W>, state: &mut PackState) -> Result<()> {
        let base = &self.config.models_dir;

        let walker = if self.config.follow_symlinks {
            // Bounded depth guards against link cycles
            WalkDir::new(base).follow_links(true).max_depth(100)
        } else {
            WalkDir::new(base).follow_links(false)
        };

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error walking source tree: {}", e);
                    if let Some(path) = e.path() {
                        let shown = path.strip_prefix(base).unwrap_or(path);
                        state.skipped.push(SkippedEntry {
                            path: shown.to_path_buf(),
                            reason: e.to_string(),
                        });
                    }
                    continue;
                }
            };
            let path = entry.path();

            if path == base {
                continue;
            }

            let relative = path
                .strip_prefix(base)
                .map_err(|_| {
                    Error::InvalidPath(format!("Failed to strip prefix from {:?}", path))
                })?
                .to_path_buf();

            let file_type = entry.file_type();

            // Directories are not represented; only regular files become
            // entries.
            if file_type.is_dir() {
                continue;
            }

            if self.config.is_excluded(&relative) {
                debug!("Excluded: {:?}", relative);
                state.excluded += 1;
                state.progress.inc(1);
                continue;
            }

            if file_type.is_symlink() {
                debug!("Skipping symlink: {:?}", relative);
                state.skipped.push(SkippedEntry {
                    path: relative,
                    reason: "symbolic link".to_string(),
                });
                continue;
            }

            if !file_type.is_file() {
                warn!("Skipping special file: {:?}", path);
                state.skipped.push(SkippedEntry {
                    path: relative,
                    reason: "not a regular file".to_string(),
                });
                continue;
            }

            self.append_and_record(builder, path, relative, state)?;
        }

        Ok(())
    }

    /// Pack an explicit list of absolute paths
    fn pack_paths<W: Write>(
        &self,
        builder: &mut Builder<W>,
        paths: &[PathBuf],
        state: &mut PackState,
    ) -> Result<()> {
        for path in paths {
            let relative = path
                .strip_prefix(&self.config.models_dir)
                .map_err(|_| {
                    Error::InvalidPath(format!(
                        "{:?} is outside the source directory",
                        path
                    ))
                })?
                .to_path_buf();

            if self.config.is_excluded(&relative) {
                debug!("Excluded: {:?}", relative);
                state.excluded += 1;
                state.progress.inc(1);
                continue;
            }

            let file_type = match path.symlink_metadata() {
                Ok(m) => m.file_type(),
                Err(e) => {
                    warn!("Skipping missing file {:?}: {}", path, e);
                    state.skipped.push(SkippedEntry {
                        path: relative,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if file_type.is_symlink() && !self.config.follow_symlinks {
                debug!("Skipping symlink: {:?}", relative);
                state.skipped.push(SkippedEntry {
                    path: relative,
                    reason: "symbolic link".to_string(),
                });
                continue;
            }

            self.append_and_record(builder, path, relative, state)?;
        }

        Ok(())
    }

    fn append_and_record<W: Write>(
        &self,
        builder: &mut Builder<W>,
        path: &Path,
        relative: PathBuf,
        state: &mut PackState,
    ) -> Result<()> {
        match self.append_file(builder, path, &relative)? {
            Appended::Entry(checksum) => {
                state.bytes += checksum.size;
                state.records.push((relative, checksum));
            }
            Appended::Skipped(reason) => {
                warn!("Skipping unreadable file {:?}: {}", path, reason);
                state.skipped.push(SkippedEntry {
                    path: relative,
                    reason,
                });
            }
        }
        state.progress.inc(1);
        Ok(())
    }

    /// Stream one file into the tar builder
    ///
    /// Failures to open or stat the source (permission denied, file removed
    /// between discovery and read) are reported as `Skipped`; failures while
    /// writing the archive stream are fatal.
    fn append_file<W: Write>(
        &self,
        builder: &mut Builder<W>,
        path: &Path,
        relative: &Path,
    ) -> Result<Appended> {
        let metadata = match FileMetadata::from_path(path) {
            Ok(m) => m,
            Err(e) => return Ok(Appended::Skipped(e.to_string())),
        };
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => return Ok(Appended::Skipped(e.to_string())),
        };
        let size = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => return Ok(Appended::Skipped(e.to_string())),
        };

        debug!("Adding file: {:?} as {:?}", path, relative);

        let mut header = tar::Header::new_ustar();
        header.set_size(size);

        #[cfg(unix)]
        {
            if let Some(mode) = metadata.mode {
                header.set_mode(mode);
            }
            if let Some(uid) = metadata.uid {
                header.set_uid(uid as u64);
            }
            if let Some(gid) = metadata.gid {
                header.set_gid(gid as u64);
            }
        }

        if let Some(mtime) = metadata.mtime_secs() {
            header.set_mtime(mtime);
        }

        let mut reader = HashingReader::new(file);
        builder.append_data(&mut header, relative, &mut reader)?;

        Ok(Appended::Entry(FileChecksum {
            size,
            hash: reader.finalize_hex(),
            mtime: metadata.mtime_secs().unwrap_or(0) as i64,
        }))
    }
}

/// Sidecar manifest path for an archive: `<archive>.manifest.json`
fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".manifest.json");
    PathBuf::from(name)
}

/// Never overwrite a prior backup: append a counter when the name is taken
fn unique_destination(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let parent = path.parent().unwrap_or(Path::new("")).to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = name.split_once('.').unwrap_or((name.as_str(), ""));

    let mut counter = 1;
    loop {
        let candidate = if ext.is_empty() {
            parent.join(format!("{} ({})", stem, counter))
        } else {
            parent.join(format!("{} ({}).{}", stem, counter, ext))
        };
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
