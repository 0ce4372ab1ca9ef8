//! Integration tests for archive creation

use ollamab_core::{Archiver, BackupConfig, ChecksumManifest, Error, Settings};
use ollamab_testing::{assertions, fixtures, TestDir};
use std::fs::File;
use std::path::Path;

fn config(source: &Path, backup: &Path, codec: &str) -> BackupConfig {
    let mut settings = Settings::default();
    settings.compression.codec = codec.to_string();
    BackupConfig::new(source, backup, &settings).unwrap()
}

#[test]
fn test_backup_round_trip_xz() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_tree(&source).unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "xz")).unwrap();
    let report = archiver.backup_all().unwrap();

    assert_eq!(report.files_archived, 3);
    assert!(report.skipped.is_empty());
    assert_eq!(report.archive_path.parent().unwrap(), backup.path());
    assert!(report
        .archive_path
        .to_string_lossy()
        .ends_with(".tar.xz"));

    assertions::assert_archive_matches_dir(&report.archive_path, source.path()).unwrap();
}

#[test]
fn test_backup_round_trip_other_codecs() {
    for codec in ["store", "gzip", "zstd"] {
        let source = TestDir::new().unwrap();
        let backup = TestDir::new().unwrap();
        fixtures::create_model_tree(&source).unwrap();

        let archiver = Archiver::new(config(source.path(), backup.path(), codec)).unwrap();
        let report = archiver.backup_all().unwrap();

        assertions::assert_archive_matches_dir(&report.archive_path, source.path()).unwrap();
    }
}

#[test]
fn test_empty_source_produces_valid_archive() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "gzip")).unwrap();
    let report = archiver.backup_all().unwrap();

    assert_eq!(report.files_archived, 0);
    assert!(report.archive_path.exists());

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_two_runs_produce_distinct_archives() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_tree(&source).unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "zstd")).unwrap();
    let first = archiver.backup_all().unwrap();
    let second = archiver.backup_all().unwrap();

    assert_ne!(first.archive_path, second.archive_path);
    assert!(first.archive_path.exists());
    assert!(second.archive_path.exists());

    // The first archive stays valid after the second run
    assertions::assert_archive_matches_dir(&first.archive_path, source.path()).unwrap();
    assertions::assert_archive_matches_dir(&second.archive_path, source.path()).unwrap();
}

#[test]
fn test_large_files_keep_size_and_content() {
    use rand::RngCore;

    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();

    let mut a = vec![0u8; 2 * 1024 * 1024];
    let mut b = vec![0u8; 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut a);
    rand::thread_rng().fill_bytes(&mut b);
    source.create_file("a.bin", &a).unwrap();
    source.create_file("sub/b.bin", &b).unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "zstd")).unwrap();
    let report = archiver.backup_all().unwrap();

    assert_eq!(report.files_archived, 2);
    assert_eq!(report.bytes_archived, (a.len() + b.len()) as u64);

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert_eq!(entries.get(Path::new("a.bin")).unwrap(), &a);
    assert_eq!(entries.get(Path::new("sub/b.bin")).unwrap(), &b);
}

#[test]
fn test_sidecar_manifest_lists_archived_entries() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_tree(&source).unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "gzip")).unwrap();
    let report = archiver.backup_all().unwrap();

    let manifest = ChecksumManifest::load(&report.manifest_path).unwrap();
    assert_eq!(manifest.file_count, 3);
    assert_eq!(manifest.base_dir, source.path());

    for relative in manifest.files.keys() {
        assert!(manifest.verify_file(source.path(), relative).unwrap());
    }
}

#[test]
fn test_exclude_patterns_filter_entries() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    source.create_file("blobs/sha256-aaa", b"complete blob").unwrap();
    source
        .create_file("blobs/sha256-bbb-partial", b"incomplete")
        .unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "store")).unwrap();
    let report = archiver.backup_all().unwrap();

    assert_eq!(report.files_archived, 1);
    assert_eq!(report.excluded, 1);

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert!(entries.contains_key(Path::new("blobs/sha256-aaa")));
    assert!(!entries.contains_key(Path::new("blobs/sha256-bbb-partial")));
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_skipped_and_reported() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    source.create_file("a.bin", b"real file").unwrap();
    fixtures::create_symlink(&source, "a.bin", "link.bin").unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "store")).unwrap();
    let report = archiver.backup_all().unwrap();

    assert_eq!(report.files_archived, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, Path::new("link.bin"));
    assert_eq!(report.skipped[0].reason, "symbolic link");

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert!(!entries.contains_key(Path::new("link.bin")));
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    source.create_file("readable.bin", b"fine").unwrap();
    let locked = source.create_file("locked.bin", b"no access").unwrap();

    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if File::open(&locked).is_ok() {
        // Privileged user can read anything; nothing to test here
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let archiver = Archiver::new(config(source.path(), backup.path(), "store")).unwrap();
    let report = archiver.backup_all().unwrap();

    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.files_archived, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, Path::new("locked.bin"));

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert!(entries.contains_key(Path::new("readable.bin")));
    assert!(!entries.contains_key(Path::new("locked.bin")));
}

#[test]
fn test_missing_source_directory_fails() {
    let backup = TestDir::new().unwrap();
    let missing = backup.path().join("does-not-exist");

    let result = Archiver::new(config(&missing, backup.path(), "xz"));
    assert!(matches!(result, Err(Error::InvalidPath(_))));
}

#[test]
fn test_no_temp_files_left_after_success() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_tree(&source).unwrap();

    let archiver = Archiver::new(config(source.path(), backup.path(), "gzip")).unwrap();
    let report = archiver.backup_all().unwrap();

    // Exactly the archive and its manifest sidecar remain
    let mut names: Vec<_> = std::fs::read_dir(backup.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names.len(), 2);
    assert!(names.contains(
        &report
            .archive_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    ));
}

#[test]
fn test_mtime_preserved_in_headers() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    let file = source.create_file("a.bin", b"timestamped").unwrap();
    let expected_mtime = file
        .metadata()
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let archiver = Archiver::new(config(source.path(), backup.path(), "store")).unwrap();
    let report = archiver.backup_all().unwrap();

    let mut archive = tar::Archive::new(File::open(&report.archive_path).unwrap());
    let entry = archive.entries().unwrap().next().unwrap().unwrap();
    assert_eq!(entry.header().mtime().unwrap(), expected_mtime);
}

#[test]
fn test_backup_model_archives_manifest_and_blobs() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_store(&source).unwrap();

    let model = ollamab_core::registry::find_model(source.path(), "tinyllama").unwrap();
    let archiver = Archiver::new(config(source.path(), backup.path(), "gzip")).unwrap();
    let report = archiver.backup_model(&model).unwrap();

    assert_eq!(report.files_archived, 4);
    assert!(report
        .archive_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("tinyllama_latest"));

    let entries = assertions::read_archive_entries(&report.archive_path).unwrap();
    assert!(entries.contains_key(Path::new(
        "manifests/registry.ollama.ai/library/tinyllama/latest"
    )));
    assert!(entries.contains_key(Path::new("blobs/sha256-aaa1")));
    // The other model and in-flight downloads stay out
    assert!(!entries.contains_key(Path::new("blobs/sha256-bbb1")));
    assert!(!entries.contains_key(Path::new("blobs/sha256-ccc0-partial")));
}

#[test]
fn test_backup_model_with_missing_blob_continues() {
    let source = TestDir::new().unwrap();
    let backup = TestDir::new().unwrap();
    fixtures::create_model_store(&source).unwrap();
    std::fs::remove_file(source.path().join("blobs/sha256-aaa2")).unwrap();

    let model = ollamab_core::registry::find_model(source.path(), "tinyllama").unwrap();
    let archiver = Archiver::new(config(source.path(), backup.path(), "gzip")).unwrap();
    let report = archiver.backup_model(&model).unwrap();

    assert_eq!(report.files_archived, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, Path::new("blobs/sha256-aaa2"));
}
