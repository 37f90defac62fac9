//! Archive extraction for HTTP repositories.

use gateway_config_controller::bundle::{load_from_tree, RepositoryPayload};
use gateway_config_controller::crd::BundleFormat;
use gateway_config_controller::repository::{extract_archive, ArchiveKind};
use std::io::Write;

const BUNDLE: &str = r#"{"services": [{"name": "echo", "resolutionPath": "/echo"}]}"#;

fn tar_bytes() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(BUNDLE.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "tree/services/echo.json", BUNDLE.as_bytes())
        .unwrap();
    builder.into_inner().unwrap()
}

fn assert_echo_service(root: &std::path::Path) {
    let payload = load_from_tree(root, &["tree/services".to_string()], BundleFormat::Graphman).unwrap();
    let RepositoryPayload::Graphman(bundle) = payload else {
        panic!("expected graphman payload");
    };
    assert!(bundle.get("services", "echo").is_some());
}

#[test]
fn test_archive_kind_from_url() {
    assert_eq!(
        ArchiveKind::from_url("https://example.com/policies.tar.gz?token=x").unwrap(),
        ArchiveKind::TarGz
    );
    assert_eq!(ArchiveKind::from_url("https://example.com/p.tar").unwrap(), ArchiveKind::Tar);
    assert_eq!(ArchiveKind::from_url("https://example.com/p.ZIP").unwrap(), ArchiveKind::Zip);
    assert!(!ArchiveKind::from_url("https://example.com/p.rar")
        .unwrap_err()
        .is_transient());
}

#[test]
fn test_extract_tar() {
    let dir = tempfile::tempdir().unwrap();
    extract_archive(ArchiveKind::Tar, &tar_bytes(), dir.path()).unwrap();
    assert_echo_service(dir.path());
}

#[test]
fn test_extract_tar_gz() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes()).unwrap();
    let bytes = encoder.finish().unwrap();

    let dir = tempfile::tempdir().unwrap();
    extract_archive(ArchiveKind::TarGz, &bytes, dir.path()).unwrap();
    assert_echo_service(dir.path());
}

#[test]
fn test_extract_zip() {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("tree/services/echo.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(BUNDLE.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let dir = tempfile::tempdir().unwrap();
    extract_archive(ArchiveKind::Zip, &bytes, dir.path()).unwrap();
    assert_echo_service(dir.path());
}

#[test]
fn test_corrupt_zip_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(extract_archive(ArchiveKind::Zip, b"not a zip", dir.path()).is_err());
}
