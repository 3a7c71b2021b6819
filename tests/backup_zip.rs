#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("kindergarten-backup-src");
    let workspace2 = temp_dir("kindergarten-backup-dst");
    let out_dir = temp_dir("kindergarten-backup-out");

    let db_src = workspace.join("kindergarten.sqlite3");
    let bytes = b"sqlite-test-payload";
    std::fs::write(&db_src, bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/kindergarten.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.db_sha256, export.db_sha256);

    let restored = std::fs::read(workspace2.join("kindergarten.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected_and_workspace_untouched() {
    let workspace = temp_dir("kindergarten-backup-tamper");
    let out_dir = temp_dir("kindergarten-backup-tamper-out");
    std::fs::write(workspace.join("kindergarten.sqlite3"), b"original").expect("write db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest");
        zip.write_all(
            serde_json::json!({
                "format": backup::BUNDLE_FORMAT_V1,
                "version": 1,
                "dbSha256": "0".repeat(64),
            })
            .to_string()
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/kindergarten.sqlite3", opts).expect("db entry");
        zip.write_all(b"replacement").expect("write db entry");
        zip.finish().expect("finish zip");
    }

    let err = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("mismatch");
    assert!(err.to_string().contains("checksum mismatch"), "{err}");
    let kept = std::fs::read(workspace.join("kindergarten.sqlite3")).expect("read db");
    assert_eq!(kept, b"original");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn bare_sqlite_file_is_copied_in_place() {
    let src_dir = temp_dir("kindergarten-backup-bare-src");
    let workspace = temp_dir("kindergarten-backup-bare-dst");
    let bare = src_dir.join("old.sqlite3");
    std::fs::write(&bare, b"SQLite format 3\0payload").expect("write bare db");

    let import = backup::import_workspace_bundle(&bare, &workspace).expect("import bare");
    assert_eq!(import.bundle_format_detected, backup::BARE_SQLITE_FORMAT);
    let restored = std::fs::read(workspace.join("kindergarten.sqlite3")).expect("read db");
    assert_eq!(restored, b"SQLite format 3\0payload");

    let _ = std::fs::remove_dir_all(src_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
