use crate::error::ExtractionError;
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive with the given file entries
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

fn extractor() -> ArchiveExtractor {
    ArchiveExtractor::default()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn extracts_files_and_directories() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("backup.zip");
    create_zip_archive(
        &archive,
        &[
            ("export/", b""),
            ("export/conversations.json", b"[]"),
            ("export/notes/readme.md", b"# notes"),
        ],
    );
    let target = dir.path().join("extracted");

    let mut calls = Vec::new();
    let count = extractor()
        .extract(&archive, &target, |done, total| calls.push((done, total)))
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(
        std::fs::read(target.join("export/notes/readme.md")).unwrap(),
        b"# notes"
    );
    assert!(target.join("export").is_dir());
}

#[test]
fn extraction_is_idempotent_and_clears_leftovers() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("backup.zip");
    create_zip_archive(&archive, &[("a.txt", b"alpha"), ("b/c.txt", b"gamma")]);
    let target = dir.path().join("extracted");

    // simulate a crashed earlier run that left a partial tree
    std::fs::create_dir_all(target.join("b")).unwrap();
    std::fs::write(target.join("b/c.txt"), b"gam").unwrap();
    std::fs::write(target.join("stale.txt"), b"from a previous archive").unwrap();

    extractor().extract(&archive, &target, |_, _| {}).unwrap();
    let first = list_tree(&target);
    let first_content = std::fs::read(target.join("b/c.txt")).unwrap();

    extractor().extract(&archive, &target, |_, _| {}).unwrap();
    let second = list_tree(&target);

    assert_eq!(first, second);
    assert_eq!(first, vec![PathBuf::from("a.txt"), PathBuf::from("b/c.txt")]);
    assert_eq!(first_content, b"gamma");
    assert_eq!(std::fs::read(target.join("b/c.txt")).unwrap(), b"gamma");
}

#[test]
fn empty_archive_extracts_zero_entries() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("empty.zip");
    create_zip_archive(&archive, &[]);

    let count = extractor()
        .extract(&archive, &dir.path().join("out"), |_, _| {})
        .unwrap();

    assert_eq!(count, 0);
    assert!(dir.path().join("out").is_dir());
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[test]
fn parent_traversal_fails_before_anything_is_written() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.zip");
    create_zip_archive(
        &archive,
        &[("innocent.txt", b"hello"), ("../escaped.txt", b"owned")],
    );
    let target = dir.path().join("jobs").join("extracted");

    let err = extractor()
        .extract(&archive, &target, |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::UnsafePath { ref entry, .. } if entry == "../escaped.txt"));
    assert!(!dir.path().join("jobs").join("escaped.txt").exists());
    assert!(!target.join("innocent.txt").exists());
}

#[test]
fn absolute_entry_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.zip");
    create_zip_archive(&archive, &[("/tmp/absolute-escape.txt", b"owned")]);

    let err = extractor()
        .extract(&archive, &dir.path().join("out"), |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::UnsafePath { .. }));
}

#[test]
fn backslash_traversal_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.zip");
    create_zip_archive(&archive, &[("sub\\..\\..\\escaped.txt", b"owned")]);

    let err = extractor()
        .extract(&archive, &dir.path().join("out"), |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::UnsafePath { .. }));
}

#[test]
fn symlink_entry_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("link.zip");
    {
        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        writer
            .add_symlink("link", "/etc", ::zip::write::FileOptions::default())
            .unwrap();
        writer.finish().unwrap();
    }

    let err = extractor()
        .extract(&archive, &dir.path().join("out"), |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::UnsafePath { .. }));
    assert!(!dir.path().join("out").join("link").exists());
}

#[test]
fn corrupt_archive_is_reported() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip archive at all").unwrap();

    let err = extractor()
        .extract(&archive, &dir.path().join("out"), |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::Corrupt { .. }));
}

#[test]
fn missing_archive_is_an_io_error() {
    let dir = TempDir::new().unwrap();

    let err = extractor()
        .extract(&dir.path().join("nope.zip"), &dir.path().join("out"), |_, _| {})
        .unwrap_err();

    assert!(matches!(err, ExtractionError::Io { .. }));
}

// ---------------------------------------------------------------------------
// Async wrapper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extract_async_reports_progress_through_channel() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("backup.zip");
    create_zip_archive(&archive, &[("a.txt", b"a"), ("b.txt", b"b")]);
    let (tx, rx) = tokio::sync::watch::channel((0u64, 0u64));

    let count = extractor()
        .extract_async(&archive, &dir.path().join("out"), move |done, total| {
            tx.send_replace((done, total));
        })
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(*rx.borrow(), (2, 2));
}
