//! Common assertions for ollamab testing

use anyhow::Result;
use ollamab_core::Codec;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;

/// Read every entry of a backup archive into memory
///
/// The codec is detected from the archive file name, the same way the
/// archiver chose the extension when writing it.
pub fn read_archive_entries(archive: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let file = File::open(archive)?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let codec = if name.ends_with(".tar.gz") {
        Codec::Gzip
    } else if name.ends_with(".tar.zst") {
        Codec::Zstd
    } else if name.ends_with(".tar.xz") {
        Codec::Xz
    } else {
        Codec::Store
    };

    match codec {
        Codec::Store => collect_entries(Archive::new(file)),
        Codec::Gzip => collect_entries(Archive::new(flate2::read::GzDecoder::new(file))),
        Codec::Zstd => collect_entries(Archive::new(zstd::stream::read::Decoder::new(file)?)),
        Codec::Xz => collect_entries(Archive::new(xz2::read::XzDecoder::new(file))),
    }
}

fn collect_entries<R: Read>(mut archive: Archive<R>) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut entries = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        entries.insert(path, content);
    }

    Ok(entries)
}

/// Asserts that an archive holds exactly the regular files below a directory
pub fn assert_archive_matches_dir(archive: &Path, dir: &Path) -> Result<()> {
    let entries = read_archive_entries(archive)?;

    let mut expected = BTreeMap::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry.path().strip_prefix(dir)?.to_path_buf();
        expected.insert(relative, std::fs::read(entry.path())?);
    }

    let entry_paths: Vec<_> = entries.keys().collect();
    let expected_paths: Vec<_> = expected.keys().collect();
    assert_eq!(
        entry_paths, expected_paths,
        "archive entry set differs from directory contents"
    );

    for (path, content) in &expected {
        assert_eq!(
            entries.get(path).unwrap(),
            content,
            "content mismatch for {:?}",
            path
        );
    }

    Ok(())
}
