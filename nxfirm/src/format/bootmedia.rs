// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Layout of the eMMC boot partitions (BOOT0, BOOT1) and the four BCPKG2
//! partitions from the decrypted contents of the normal and safe mode
//! firmware packages.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::{error::ErrorKind, format::padding::ZeroPadding, util::NumBytes};

pub const BCT_SIZE: usize = 0x4000;
pub const PACKAGE1_SIZE: usize = 0x40000;
pub const BCPKG2_SIZE: usize = 0x800000;
/// Empty space at the start of each BCPKG2 partition before package2.
pub const BCPKG2_HEADER_SIZE: usize = 0x4000;
pub const PACKAGE2_MAX_SIZE: usize = BCPKG2_SIZE - BCPKG2_HEADER_SIZE;

pub const BOOT0_SIZE: usize = 0x180000;
pub const BOOT1_SIZE: usize = 0x80000;
/// Gap between the BCT copies and the package1 copies in BOOT0.
const BOOT0_GAP_SIZE: usize = 0xf0000;

/// Offset inside the BCT that is overwritten so that the embedded public key
/// no longer validates and the image cannot boot as a genuine one.
pub const BCT_KEY_OFFSET: usize = 0x210;
pub const BCT_KEY_SENTINEL: u8 = 0x77;

pub const BOOT0_NAME: &str = "BOOT0.bin";
pub const BOOT1_NAME: &str = "BOOT1.bin";
pub const BCPKG2_NORMAL_MAIN_NAME: &str = "BCPKG2-1-Normal-Main.bin";
pub const BCPKG2_NORMAL_SUB_NAME: &str = "BCPKG2-2-Normal-Sub.bin";
pub const BCPKG2_SAFE_MAIN_NAME: &str = "BCPKG2-3-SafeMode-Main.bin";
pub const BCPKG2_SAFE_SUB_NAME: &str = "BCPKG2-4-SafeMode-Sub.bin";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{name} is too large: {size:#x} > {max:#x}")]
    TooLarge {
        name: &'static str,
        size: usize,
        max: usize,
    },
    #[error("{name} has invalid total size: {size:#x} != {expected:#x}")]
    InvalidTotalSize {
        name: &'static str,
        size: usize,
        expected: usize,
    },
    #[error("Failed to write partition image: {0:?}")]
    DataWrite(PathBuf, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooLarge { .. } | Self::InvalidTotalSize { .. } => ErrorKind::SizeInvariant,
            Self::DataWrite(_, _) => ErrorKind::Io,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

fn pad(name: &'static str, data: &[u8], size: usize) -> Result<Vec<u8>> {
    data.to_padded_vec(size).ok_or(Error::TooLarge {
        name,
        size: data.len(),
        max: size,
    })
}

fn check_total(name: &'static str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::InvalidTotalSize {
            name,
            size: data.len(),
            expected,
        });
    }

    Ok(())
}

/// The boot components of one firmware package.
#[derive(Clone, PartialEq, Eq)]
pub struct BootPackage {
    /// Padded to [`BCT_SIZE`] with the key sentinel applied.
    bct: Vec<u8>,
    /// Padded to [`PACKAGE1_SIZE`].
    package1: Vec<u8>,
    package2: Vec<u8>,
}

impl BootPackage {
    pub fn new(bct: &[u8], package1: &[u8], package2: Vec<u8>) -> Result<Self> {
        let mut bct = pad("BCT", bct, BCT_SIZE)?;
        bct[BCT_KEY_OFFSET] = BCT_KEY_SENTINEL;

        let package1 = pad("package1", package1, PACKAGE1_SIZE)?;

        if package2.len() > PACKAGE2_MAX_SIZE {
            return Err(Error::TooLarge {
                name: "package2",
                size: package2.len(),
                max: PACKAGE2_MAX_SIZE,
            });
        }

        Ok(Self {
            bct,
            package1,
            package2,
        })
    }

    pub fn bct(&self) -> &[u8] {
        &self.bct
    }

    pub fn package1(&self) -> &[u8] {
        &self.package1
    }

    pub fn package2(&self) -> &[u8] {
        &self.package2
    }
}

impl fmt::Debug for BootPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootPackage")
            .field("bct", &NumBytes(self.bct.len()))
            .field("package1", &NumBytes(self.package1.len()))
            .field("package2", &NumBytes(self.package2.len()))
            .finish()
    }
}

/// Assembled partition images. The main and sub BCPKG2 partitions of each
/// variant are identical and share a buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct BootMedia {
    pub boot0: Vec<u8>,
    pub boot1: Vec<u8>,
    pub bcpkg2_normal: Vec<u8>,
    pub bcpkg2_safe: Vec<u8>,
}

impl BootMedia {
    pub fn assemble(normal: &BootPackage, safe: &BootPackage) -> Result<Self> {
        let mut boot0 = Vec::with_capacity(BOOT0_SIZE);
        for _ in 0..2 {
            boot0.extend_from_slice(&normal.bct);
            boot0.extend_from_slice(&safe.bct);
        }
        boot0.resize(boot0.len() + BOOT0_GAP_SIZE, 0);
        boot0.extend_from_slice(&normal.package1);
        boot0.extend_from_slice(&normal.package1);
        check_total("BOOT0", &boot0, BOOT0_SIZE)?;

        let mut boot1 = Vec::with_capacity(BOOT1_SIZE);
        boot1.extend_from_slice(&safe.package1);
        boot1.extend_from_slice(&safe.package1);
        check_total("BOOT1", &boot1, BOOT1_SIZE)?;

        let bcpkg2_normal = Self::bcpkg2(&normal.package2);
        check_total("BCPKG2 (normal)", &bcpkg2_normal, BCPKG2_SIZE)?;

        let bcpkg2_safe = Self::bcpkg2(&safe.package2);
        check_total("BCPKG2 (safe mode)", &bcpkg2_safe, BCPKG2_SIZE)?;

        Ok(Self {
            boot0,
            boot1,
            bcpkg2_normal,
            bcpkg2_safe,
        })
    }

    fn bcpkg2(package2: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; BCPKG2_HEADER_SIZE];
        data.extend_from_slice(package2);
        if data.len() < BCPKG2_SIZE {
            data.resize(BCPKG2_SIZE, 0);
        }
        data
    }

    /// All six output images in write order.
    pub fn images(&self) -> [(&'static str, &[u8]); 6] {
        [
            (BOOT0_NAME, self.boot0.as_slice()),
            (BOOT1_NAME, self.boot1.as_slice()),
            (BCPKG2_NORMAL_MAIN_NAME, self.bcpkg2_normal.as_slice()),
            (BCPKG2_NORMAL_SUB_NAME, self.bcpkg2_normal.as_slice()),
            (BCPKG2_SAFE_MAIN_NAME, self.bcpkg2_safe.as_slice()),
            (BCPKG2_SAFE_SUB_NAME, self.bcpkg2_safe.as_slice()),
        ]
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        for (name, data) in self.images() {
            let path = dir.join(name);
            debug!("Writing {name}: {} bytes", data.len());

            fs::write(&path, data).map_err(|e| Error::DataWrite(path, e))?;
        }

        Ok(())
    }
}

impl fmt::Debug for BootMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootMedia")
            .field("boot0", &NumBytes(self.boot0.len()))
            .field("boot1", &NumBytes(self.boot1.len()))
            .field("bcpkg2_normal", &NumBytes(self.bcpkg2_normal.len()))
            .field("bcpkg2_safe", &NumBytes(self.bcpkg2_safe.len()))
            .finish()
    }
}
