// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::fs;

use assert_matches::assert_matches;
use nxfirm::{
    error::ErrorKind,
    format::bootmedia::{self, BootMedia, BootPackage},
};

fn package(fill: u8, bct_size: usize, package1_size: usize, package2_size: usize) -> BootPackage {
    BootPackage::new(
        &vec![fill; bct_size],
        &vec![fill; package1_size],
        vec![fill; package2_size],
    )
    .unwrap()
}

#[test]
fn maximum_sizes() {
    let normal = package(
        0x11,
        bootmedia::BCT_SIZE,
        bootmedia::PACKAGE1_SIZE,
        bootmedia::PACKAGE2_MAX_SIZE,
    );
    let safe = package(
        0x22,
        bootmedia::BCT_SIZE,
        bootmedia::PACKAGE1_SIZE,
        bootmedia::PACKAGE2_MAX_SIZE,
    );
    let media = BootMedia::assemble(&normal, &safe).unwrap();

    assert_eq!(media.boot0.len(), 0x180000);
    assert_eq!(media.boot1.len(), 0x80000);
    assert_eq!(media.bcpkg2_normal.len(), 0x800000);
    assert_eq!(media.bcpkg2_safe.len(), 0x800000);

    assert!(media.bcpkg2_normal[..0x4000].iter().all(|b| *b == 0));
    assert!(media.bcpkg2_normal[0x4000..].iter().all(|b| *b == 0x11));
    assert!(media.bcpkg2_safe[0x4000..].iter().all(|b| *b == 0x22));
}

#[test]
fn layout() {
    let normal = package(0x11, 0x100, 0x1000, 0x2000);
    let safe = package(0x22, 0x200, 0x3000, 0x10);
    let media = BootMedia::assemble(&normal, &safe).unwrap();

    // BCTs: normal, safe, normal, safe.
    for (i, fill) in [0x11, 0x22, 0x11, 0x22].into_iter().enumerate() {
        let bct = &media.boot0[i * 0x4000..(i + 1) * 0x4000];

        assert_eq!(bct[0], fill);
        assert_eq!(bct[bootmedia::BCT_KEY_OFFSET], bootmedia::BCT_KEY_SENTINEL);
        assert_eq!(bct[0x3fff], 0);
    }

    // Gap, then the normal package1 twice.
    assert!(media.boot0[0x10000..0x100000].iter().all(|b| *b == 0));
    assert_eq!(media.boot0[0x100000], 0x11);
    assert_eq!(media.boot0[0x140000], 0x11);
    assert_eq!(media.boot0[0x141000], 0);

    // Safe package1 twice.
    assert_eq!(media.boot1[0], 0x22);
    assert_eq!(media.boot1[0x3000], 0);
    assert_eq!(media.boot1[0x40000], 0x22);

    assert_eq!(media.bcpkg2_safe[0x4000 + 0xf], 0x22);
    assert_eq!(media.bcpkg2_safe[0x4000 + 0x10], 0);
}

#[test]
fn sentinel_overrides_bct_data() {
    let bct = vec![0xff; bootmedia::BCT_SIZE];
    let package = BootPackage::new(&bct, &[], vec![]).unwrap();

    assert_eq!(package.bct()[bootmedia::BCT_KEY_OFFSET], 0x77);
    assert_eq!(package.bct()[bootmedia::BCT_KEY_OFFSET - 1], 0xff);
    assert_eq!(package.package1().len(), bootmedia::PACKAGE1_SIZE);
}

#[test]
fn reject_oversized_components() {
    let err = BootPackage::new(&vec![0; bootmedia::BCT_SIZE + 1], &[], vec![]).unwrap_err();
    assert_matches!(err, bootmedia::Error::TooLarge { name: "BCT", .. });
    assert_eq!(err.kind(), ErrorKind::SizeInvariant);

    assert_matches!(
        BootPackage::new(&[], &vec![0; bootmedia::PACKAGE1_SIZE + 1], vec![]),
        Err(bootmedia::Error::TooLarge { name: "package1", .. })
    );

    assert_matches!(
        BootPackage::new(&[], &[], vec![0; bootmedia::PACKAGE2_MAX_SIZE + 1]),
        Err(bootmedia::Error::TooLarge { name: "package2", .. })
    );
}

#[test]
fn write_images() {
    let dir = tempfile::tempdir().unwrap();
    let normal = package(0x11, 0x10, 0x10, 0x10);
    let safe = package(0x22, 0x10, 0x10, 0x10);
    let media = BootMedia::assemble(&normal, &safe).unwrap();

    media.write_to_dir(dir.path()).unwrap();

    let read = |name: &str| fs::read(dir.path().join(name)).unwrap();

    assert_eq!(read(bootmedia::BOOT0_NAME), media.boot0);
    assert_eq!(read(bootmedia::BOOT1_NAME), media.boot1);
    assert_eq!(
        read(bootmedia::BCPKG2_NORMAL_MAIN_NAME),
        read(bootmedia::BCPKG2_NORMAL_SUB_NAME),
    );
    assert_eq!(read(bootmedia::BCPKG2_SAFE_SUB_NAME), media.bcpkg2_safe);
    assert_ne!(media.bcpkg2_normal, media.bcpkg2_safe);
}
