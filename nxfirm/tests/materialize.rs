// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::Path};

use assert_matches::assert_matches;
use nxfirm::{
    catalog::{ContentType, FirmwareComponent, TitleCatalog},
    error::ErrorKind,
    fetch::{self, MirrorFetcher},
    hash,
    materialize::{self, ArchiveEntry, Error, MissingContent, OutputManifest},
};

fn component(dir: &Path, content_id: &str, title_id: &str, data: &[u8]) -> FirmwareComponent {
    let path = dir.join(format!("{content_id}.nca"));
    fs::write(&path, data).unwrap();

    FirmwareComponent {
        content_id: content_id.to_owned(),
        path,
        title_id: title_id.to_owned(),
        content_type: ContentType::Data,
    }
}

fn digest_hex(data: &[u8]) -> String {
    hex::encode(hash::sha256(data))
}

#[test]
fn report_all_missing_contents() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = TitleCatalog::from_components([component(
        dir.path(),
        "00112233445566778899aabbccddeeff",
        "0100000000000819",
        b"package",
    )]);

    let manifest = OutputManifest::from_json(
        br#"{
            "ncas": {
                "00112233445566778899aabbccddeeff": {"path": "a.nca", "titleId": "0100000000000819", "contentType": "Data"},
                "abc123": {"path": "b.nca", "titleId": "0100000000000809", "contentType": "Data"},
                "def456": {"path": "c.nca"}
            }
        }"#,
    )
    .unwrap();

    let err = materialize::check_contents(&manifest, &catalog).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert_matches!(&err, Error::MissingContents(m) if m.as_slice() == [
        MissingContent {
            content_id: "abc123".to_owned(),
            content_type: "Data".to_owned(),
            title_id: "0100000000000809".to_owned(),
        },
        MissingContent {
            content_id: "def456".to_owned(),
            content_type: "?".to_owned(),
            title_id: "?".to_owned(),
        },
    ]);

    let message = err.to_string();
    assert!(message.contains("abc123 (Data:0100000000000809)"), "{message}");
    assert!(message.contains("def456 (?:?)"), "{message}");
}

#[test]
fn reject_unsafe_paths() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("out");

    for json in [
        r#"{"dirs": {"../escape": ""}}"#,
        r#"{"dirs": {"/etc": ""}}"#,
        r#"{"dirs": {"a\\..\\..\\b": ""}}"#,
    ] {
        let manifest = OutputManifest::from_json(json.as_bytes()).unwrap();
        let err = materialize::create_dirs(&manifest, &root).unwrap_err();

        assert_matches!(err, Error::UnsafePath(_));
        assert_eq!(err.kind(), ErrorKind::Verification);
    }

    let manifest = OutputManifest::from_json(br#"{"files": {"00": {"path": "../x"}}}"#).unwrap();
    assert_matches!(
        materialize::verify_files(&manifest, &root),
        Err(Error::UnsafePath(p)) if p == "../x"
    );

    assert!(!root.exists());
}

#[test]
fn place_contents() {
    let source = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let catalog = TitleCatalog::from_components([
        component(source.path(), "aa", "0100000000000819", b"normal"),
        component(source.path(), "bb", "010000000000081a", b"safe"),
    ]);

    let manifest = OutputManifest::from_json(
        br#"{
            "ncas": {
                "aa": {"path": "Contents/registered/000000aa/00", "attrs": "A"},
                "bb": {"path": "Contents\\registered\\000000bb\\00", "attrs": "N"}
            },
            "dirs": {
                "Contents": "S",
                "Contents/placehld": "",
                "Contents/registered": "SH"
            }
        }"#,
    )
    .unwrap();

    materialize::check_contents(&manifest, &catalog).unwrap();
    materialize::create_dirs(&manifest, output.path()).unwrap();
    materialize::copy_contents(&manifest, &catalog, output.path()).unwrap();

    let contents = output.path().join("Contents");
    assert!(contents.join("placehld").is_dir());
    assert_eq!(
        fs::read(contents.join("registered/000000aa/00")).unwrap(),
        b"normal",
    );
    assert_eq!(
        fs::read(contents.join("registered/000000bb/00")).unwrap(),
        b"safe",
    );
}

#[test]
fn verify_extracted_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("atmosphere")).unwrap();
    fs::write(dir.path().join("atmosphere/config.ini"), b"[config]").unwrap();

    let digest = digest_hex(b"[config]");

    for expected in [&digest[..], &digest[..8], &digest.to_ascii_uppercase()[..16]] {
        let json = format!(r#"{{"files": {{"{expected}": {{"path": "atmosphere/config.ini"}}}}}}"#);
        let manifest = OutputManifest::from_json(json.as_bytes()).unwrap();

        materialize::verify_files(&manifest, dir.path()).unwrap();
    }

    let manifest = OutputManifest::from_json(
        br#"{"files": {"00000000": {"path": "atmosphere/config.ini"}}}"#,
    )
    .unwrap();
    let err = materialize::verify_files(&manifest, dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert_matches!(
        err,
        Error::FileHashMismatch { actual, expected, .. }
            if actual == digest[..8] && expected == "00000000"
    );

    let manifest =
        OutputManifest::from_json(br#"{"files": {"00": {"path": "missing.bin"}}}"#).unwrap();
    let err = materialize::verify_files(&manifest, dir.path()).unwrap_err();
    assert_matches!(err, Error::File(_, _));
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn fetch_archive() {
    let mirror = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let cache_dir = cache.path().join("nxfirm");

    let data = b"7z archive contents";
    fs::write(mirror.path().join("extras.7z"), data).unwrap();

    let fetcher = MirrorFetcher::new(mirror.path().to_owned());
    let entry = ArchiveEntry {
        url: "https://example.com/firmware/extras.7z".to_owned(),
        hash: digest_hex(data)[..16].to_owned(),
    };

    let path = materialize::ensure_archive(&fetcher, &entry, &cache_dir).unwrap();
    assert_eq!(path, cache_dir.join("extras.7z"));
    assert_eq!(fs::read(&path).unwrap(), data);

    // The cached copy is reused without going through the fetcher.
    fs::remove_file(mirror.path().join("extras.7z")).unwrap();
    let path = materialize::ensure_archive(&fetcher, &entry, &cache_dir).unwrap();
    assert_eq!(fs::read(&path).unwrap(), data);

    // A corrupt cached copy is downloaded again.
    fs::write(&path, b"corrupt").unwrap();
    fs::write(mirror.path().join("extras.7z"), b"other contents").unwrap();
    let err = materialize::ensure_archive(&fetcher, &entry, &cache_dir).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert_matches!(err, Error::ArchiveHashMismatch { .. });
    assert_eq!(fs::read(&path).unwrap(), b"other contents");

    fs::remove_file(mirror.path().join("extras.7z")).unwrap();
    fs::remove_file(&path).unwrap();
    let err = materialize::ensure_archive(&fetcher, &entry, &cache_dir).unwrap_err();
    assert_matches!(err, Error::Fetch(fetch::Error::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Resolution);

    let entry = ArchiveEntry {
        url: "https://example.com/firmware/".to_owned(),
        hash: String::new(),
    };
    assert_matches!(
        materialize::ensure_archive(&fetcher, &entry, &cache_dir),
        Err(Error::NoArchiveName(_))
    );
}
