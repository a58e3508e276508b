// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use assert_matches::assert_matches;
use nxfirm::{
    error::ErrorKind,
    patch::{self, BodyPatcher, PatchDocument, PatchEntry, PatchSet, document},
};

const FINGERPRINT: &str = "0123456789abcdef0123456789abcdef";

const INDEXED: &str = r#"{
    "versions": {
        "0123456789ABCDEF0123456789ABCDEF": {
            "name": "FS510-exfat.kip1",
            "patches": {
                "nocmac": "cmac_510",
                "nogc": "",
                "old": null,
                "gone": "does_not_exist"
            }
        }
    },
    "patches": {
        "cmac_510": {
            "0x10": ["10 11", "aa bb"],
            "0x2": ["0203", "cc"],
            "20": ["14", "dd ee ff"]
        }
    }
}"#;

const FLAT: &str = r#"{
    "0123456789abcdef0123456789abcdef": {
        "name": "FS510-exfat.kip1",
        "patches": {
            "nocmac": {
                "0x10": ["10 11", "aa bb"],
                "0x2": ["0203", "cc"],
                "20": ["14", "dd ee ff"]
            },
            "nogc": null,
            "old": {},
            "gone": ""
        }
    }
}"#;

fn body() -> Vec<u8> {
    (0..0x20).collect()
}

fn expected_entries() -> Vec<PatchEntry> {
    vec![
        PatchEntry {
            offset: 0x10,
            expected: vec![0x10, 0x11],
            replacement: vec![0xaa, 0xbb],
        },
        PatchEntry {
            offset: 0x2,
            expected: vec![0x02, 0x03],
            replacement: vec![0xcc],
        },
        PatchEntry {
            offset: 20,
            expected: vec![0x14],
            replacement: vec![0xdd, 0xee, 0xff],
        },
    ]
}

#[test]
fn both_layouts_resolve_identically() {
    for json in [INDEXED, FLAT] {
        let doc = PatchDocument::from_json(json.as_bytes()).unwrap();
        let version = doc.find_version(&[FINGERPRINT]).unwrap();

        assert_eq!(version.name, "FS510-exfat.kip1");
        assert_eq!(version.fingerprint, FINGERPRINT);

        let mut names = version.patch_names().collect::<Vec<_>>();
        names.sort_unstable();
        assert_eq!(names, ["gone", "nocmac", "nogc", "old"]);

        let set = version.patch_set("nocmac").unwrap().unwrap();
        assert_eq!(set.name, "nocmac");
        assert_eq!(set.entries, expected_entries());
    }
}

#[test]
fn not_applicable_patches() {
    for json in [INDEXED, FLAT] {
        let doc = PatchDocument::from_json(json.as_bytes()).unwrap();
        let version = doc.find_version(&[FINGERPRINT]).unwrap();

        for name in ["nogc", "old", "gone"] {
            let set = version.patch_set(name).unwrap();
            assert!(
                set.as_ref().is_none_or(|s| s.entries.is_empty()),
                "{name}: {set:?}",
            );
        }
    }
}

#[test]
fn unknown_version_and_patch() {
    let doc = PatchDocument::from_json(INDEXED.as_bytes()).unwrap();

    let err = doc.find_version(&["ffffffffffffffffffffffffffffffff"]).unwrap_err();
    assert_matches!(err, document::Error::UnknownVersion(_));
    assert_eq!(err.kind(), ErrorKind::Resolution);

    // Fallback fingerprints are tried in order.
    let version = doc
        .find_version(&["ffffffffffffffffffffffffffffffff", FINGERPRINT])
        .unwrap();

    let err = version.patch_set("nosigchk").unwrap_err();
    assert_matches!(
        &err,
        document::Error::UnknownPatch { patch, .. } if patch == "nosigchk"
    );
    assert_eq!(err.kind(), ErrorKind::Resolution);
}

#[test]
fn invalid_definitions() {
    let json = r#"{"versions": {"00": {"name": "FS.kip1", "patches": {"a": "a", "b": "b"}}},
        "patches": {"a": {"0xzz": ["00", "00"]}, "b": {"0x0": ["0", "00"]}}}"#;
    let doc = PatchDocument::from_json(json.as_bytes()).unwrap();
    let version = doc.find_version(&["00"]).unwrap();

    let err = version.patch_set("a").unwrap_err();
    assert_matches!(err, document::Error::InvalidOffset(_, _, _));
    assert_eq!(err.kind(), ErrorKind::Format);

    assert_matches!(
        version.patch_set("b"),
        Err(document::Error::InvalidHex(_, _, _))
    );

    assert_matches!(
        PatchDocument::from_json(b"[]"),
        Err(document::Error::Parse(_))
    );

    // Only strings stand in for missing definitions.
    for json in [
        r#"{"00": {"name": "FS.kip1", "patches": {"a": 5}}}"#,
        r#"{"00": {"name": "FS.kip1", "patches": {"a": {"0x0": "00"}}}}"#,
    ] {
        let err = PatchDocument::from_json(json.as_bytes()).unwrap_err();
        assert_matches!(err, document::Error::Parse(_));
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}

#[test]
fn apply_patch_set() {
    let doc = PatchDocument::from_json(FLAT.as_bytes()).unwrap();
    let version = doc.find_version(&[FINGERPRINT]).unwrap();
    let set = version.patch_set("nocmac").unwrap().unwrap();
    let patcher: &dyn BodyPatcher = &set;

    let mut data = body();
    patcher.patch(&mut data).unwrap();

    let mut expected = body();
    expected[0x2] = 0xcc;
    expected[0x10..0x12].copy_from_slice(&[0xaa, 0xbb]);
    expected[20..23].copy_from_slice(&[0xdd, 0xee, 0xff]);
    assert_eq!(data, expected);

    // The expected bytes are gone after the first application.
    let err = patcher.patch(&mut data).unwrap_err();
    assert_matches!(
        &err,
        patch::Error::ExpectedMismatch { offset: 0x10, actual, expected }
            if actual == "aabb" && expected == "1011"
    );
    assert_eq!(err.kind(), ErrorKind::Verification);

    assert_eq!(
        version.output_name(&["nocmac".to_owned()]),
        "FS510-exfat_nocmac.kip1",
    );
}

#[test]
fn replacement_past_end() {
    let set = PatchSet {
        name: "tail".to_owned(),
        entries: vec![PatchEntry {
            offset: 0x1f,
            expected: vec![0x1f],
            replacement: vec![0, 0],
        }],
    };

    let mut data = body();
    let err = set.patch(&mut data).unwrap_err();
    assert_matches!(
        err,
        patch::Error::OutOfBounds {
            offset: 0x1f,
            length: 2,
            size: 0x20,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Verification);
}

#[test]
fn patched_names() {
    assert_eq!(document::patched_file_name("FS510.kip1", &[]), "FS510.kip1");
    assert_eq!(
        document::patched_file_name("FS510.kip1", &["nocmac".to_owned(), "nogc".to_owned()]),
        "FS510_nocmac_nogc.kip1",
    );
}
