//! Common test fixtures for ollamab testing

use crate::TestDir;
use anyhow::Result;
use serde_json::json;
use std::path::Path;

/// Creates a small model-store-like directory tree
pub fn create_model_tree(test_dir: &TestDir) -> Result<()> {
    test_dir.create_file("a.bin", b"weights aaaa")?;
    test_dir.create_file("sub/b.bin", b"weights bbbb")?;
    test_dir.create_file("sub/nested/c.bin", b"weights cccc")?;
    Ok(())
}

/// Writes one Ollama-style manifest plus the blobs it references
///
/// `segments` is the manifest path below `manifests/`, e.g.
/// `["registry.ollama.ai", "library", "tinyllama", "latest"]`.
pub fn create_model(
    root: &Path,
    segments: &[&str],
    digests: &[(&str, &[u8])],
) -> Result<()> {
    let manifest_path = segments
        .iter()
        .fold(root.join("manifests"), |p, s| p.join(s));
    std::fs::create_dir_all(manifest_path.parent().unwrap())?;

    let layers: Vec<_> = digests[1..]
        .iter()
        .map(|(digest, content)| {
            json!({
                "digest": digest,
                "size": content.len(),
                "mediaType": "application/vnd.ollama.image.model",
            })
        })
        .collect();
    let manifest = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"digest": digests[0].0, "size": digests[0].1.len()},
        "layers": layers,
    });
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    let blobs_dir = root.join("blobs");
    std::fs::create_dir_all(&blobs_dir)?;
    for (digest, content) in digests {
        std::fs::write(blobs_dir.join(digest.replace(':', "-")), content)?;
    }

    Ok(())
}

/// Creates a fake Ollama store with two models sharing the blobs directory
pub fn create_model_store(test_dir: &TestDir) -> Result<()> {
    create_model(
        test_dir.path(),
        &["registry.ollama.ai", "library", "tinyllama", "latest"],
        &[
            ("sha256:aaa0", b"tinyllama config" as &[u8]),
            ("sha256:aaa1", b"tinyllama weights layer one"),
            ("sha256:aaa2", b"tinyllama weights layer two"),
        ],
    )?;
    create_model(
        test_dir.path(),
        &["registry.ollama.ai", "library", "bge-m3", "567m"],
        &[
            ("sha256:bbb0", b"bge config" as &[u8]),
            ("sha256:bbb1", b"bge weights"),
        ],
    )?;

    // An in-flight download that backups must ignore
    test_dir.create_file(
        "blobs/sha256-ccc0-partial",
        b"incomplete download",
    )?;

    Ok(())
}

/// Creates a symlink inside the test directory (Unix only)
#[cfg(unix)]
pub fn create_symlink(test_dir: &TestDir, target: &str, link: &str) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(test_dir.path().join(target), test_dir.path().join(link))?;
    Ok(())
}
