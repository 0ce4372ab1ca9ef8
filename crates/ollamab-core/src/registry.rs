//! Ollama model registry
//!
//! An Ollama model directory has two halves: manifest JSON files under
//! `manifests/<registry>/<namespace>/<model>/<tag>` and content-addressed
//! blobs under `blobs/<digest>`, where the digest's `:` separator is
//! replaced by `-` in the file name. This module resolves manifests into
//! the blob set a model owns so a single model can be backed up.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Registry host Ollama uses when none is given on the command line
const DEFAULT_REGISTRY: &str = "registry.ollama.ai";
/// Namespace for unqualified model names
const DEFAULT_NAMESPACE: &str = "library";

/// One layer reference inside a model manifest
#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    pub digest: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
}

/// Subset of the Ollama manifest format this tool reads
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    #[serde(default)]
    pub config: Option<Layer>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl ModelManifest {
    /// All digests referenced by the manifest, in file-name form
    pub fn digests(&self) -> Vec<String> {
        let mut digests = Vec::new();
        if let Some(config) = &self.config {
            digests.push(digest_to_file_name(&config.digest));
        }
        digests.extend(self.layers.iter().map(|l| digest_to_file_name(&l.digest)));
        digests
    }
}

/// A resolved model: its manifest file plus the blobs it references
#[derive(Debug, Clone, Serialize)]
pub struct ModelRef {
    /// Model name, `model:tag` for the default registry and namespace
    pub name: String,
    /// Absolute path of the manifest file
    pub manifest_path: PathBuf,
    /// Absolute paths of the referenced blobs
    pub blob_paths: Vec<PathBuf>,
}

impl ModelRef {
    /// All files belonging to this model, manifest first
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.manifest_path.clone())
            .chain(self.blob_paths.iter().cloned())
            .collect()
    }

    /// Name usable inside an archive file name
    pub fn file_label(&self) -> String {
        self.name.replace([':', '/'], "_")
    }

    /// Total on-disk size of manifest and blobs (missing blobs count zero)
    pub fn total_size(&self) -> u64 {
        self.archive_paths()
            .iter()
            .map(crate::utils::calculate_path_size)
            .sum()
    }
}

/// Convert a manifest digest (`sha256:abc`) to its blob file name (`sha256-abc`)
fn digest_to_file_name(digest: &str) -> String {
    digest.replace(':', "-")
}

/// List every model found under the source directory
///
/// Manifests that fail to parse are logged and skipped.
pub fn list_models<P: AsRef<Path>>(models_dir: P) -> Result<Vec<ModelRef>> {
    let models_dir = models_dir.as_ref();
    let manifests_root = models_dir.join("manifests");

    if !manifests_root.is_dir() {
        warn!("No manifests directory under {:?}", models_dir);
        return Ok(Vec::new());
    }

    let mut models = Vec::new();

    for entry in WalkDir::new(&manifests_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let manifest: ModelManifest = match fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|text| {
                serde_json::from_str(&text)
                    .map_err(|e| Error::Other(format!("invalid manifest: {}", e)))
            }) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping unparseable manifest {:?}: {}", path, e);
                continue;
            }
        };

        let relative = path
            .strip_prefix(&manifests_root)
            .map_err(|_| Error::InvalidPath(format!("Failed to strip prefix from {:?}", path)))?;
        let name = match model_name_from_relative(relative) {
            Some(name) => name,
            None => {
                warn!("Skipping manifest with unexpected layout: {:?}", path);
                continue;
            }
        };

        let blobs_dir = models_dir.join("blobs");
        let blob_paths: Vec<PathBuf> = manifest
            .digests()
            .iter()
            .map(|d| blobs_dir.join(d))
            .collect();

        for blob in blob_paths.iter().filter(|b| !b.exists()) {
            warn!("Model {} references missing blob {:?}", name, blob);
        }

        debug!("Found model {} with {} blobs", name, blob_paths.len());
        models.push(ModelRef {
            name,
            manifest_path: path.to_path_buf(),
            blob_paths,
        });
    }

    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

/// Resolve a `model[:tag]` reference to a model in the store
///
/// The tag defaults to `latest`, matching Ollama's own naming.
pub fn find_model<P: AsRef<Path>>(models_dir: P, reference: &str) -> Result<ModelRef> {
    let wanted = match reference.split_once(':') {
        Some((model, tag)) => format!("{}:{}", model, tag),
        None => format!("{}:latest", reference),
    };

    list_models(models_dir)?
        .into_iter()
        .find(|m| m.name == wanted)
        .ok_or_else(|| Error::NotFound(format!("model {} is not in the store", wanted)))
}

/// Derive the user-facing model name from a manifest's path components
///
/// Layout is `<registry>/<namespace>/<model>/<tag>`; the default registry
/// and namespace are elided from the name.
fn model_name_from_relative(relative: &Path) -> Option<String> {
    let parts: Vec<&str> = relative.iter().filter_map(|c| c.to_str()).collect();
    match parts.as_slice() {
        [registry, namespace, model, tag] => {
            if *registry == DEFAULT_REGISTRY && *namespace == DEFAULT_NAMESPACE {
                Some(format!("{}:{}", model, tag))
            } else {
                Some(format!("{}/{}/{}:{}", registry, namespace, model, tag))
            }
        }
        _ => None,
    }
}
