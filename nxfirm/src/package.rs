// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Selection and loading of the normal and safe mode firmware packages.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    catalog::{FirmwareComponent, TitleCatalog},
    error::ErrorKind,
    format::{
        bootmedia::{self, BootPackage},
        sysver::{self, SYSTEM_VERSION_FILE, SYSTEM_VERSION_TITLE_ID, SystemVersion},
    },
    tool::{self, Decryptor, Extraction},
};

/// Standard (FAT32 only) normal and safe mode package titles.
pub const STANDARD_TITLES: PackageTitles = PackageTitles {
    normal: "0100000000000819",
    safe: "010000000000081a",
};

/// exFAT capable normal and safe mode package titles.
pub const EXFAT_TITLES: PackageTitles = PackageTitles {
    normal: "010000000000081b",
    safe: "010000000000081c",
};

/// Content ID of the broken exFAT normal package shipped with 1.0.0.
pub const DEFECTIVE_EXFAT_CONTENT_ID: &str = "3b7cd379e18e2ee7e1c6d0449d540841";

const BCT_NAME: &str = "bct";
const PACKAGE1_NAME: &str = "package1";
const PACKAGE2_NAME: &str = "package2";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing {role} firmware package (title ID: {title_id})")]
    MissingPackage { role: Role, title_id: &'static str },
    #[error("System version title not found (title ID: 0100000000000809)")]
    MissingSystemVersion,
    #[error("Invalid system version in firmware")]
    SystemVersion(#[source] sysver::Error),
    #[error("Failed to extract system version title")]
    ExtractSystemVersion(#[source] tool::Error),
    #[error("Failed to extract {0} package")]
    Extract(Role, #[source] tool::Error),
    #[error("Failed to read {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Invalid {0} package")]
    BootMedia(Role, #[source] bootmedia::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPackage { .. } | Self::MissingSystemVersion => ErrorKind::Resolution,
            Self::SystemVersion(e) => e.kind(),
            Self::ExtractSystemVersion(e) => e.kind(),
            Self::Extract(_, e) => e.kind(),
            Self::File(_, _) => ErrorKind::Io,
            Self::BootMedia(_, e) => e.kind(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Normal,
    Safe,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Safe => f.write_str("SAFE"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackageTitles {
    pub normal: &'static str,
    pub safe: &'static str,
}

impl PackageTitles {
    fn get(&self, role: Role) -> &'static str {
        match role {
            Role::Normal => self.normal,
            Role::Safe => self.safe,
        }
    }

    pub fn contains(&self, title_id: &str) -> bool {
        self.normal.eq_ignore_ascii_case(title_id) || self.safe.eq_ignore_ascii_case(title_id)
    }
}

/// A firmware package chosen for one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedPackage<'a> {
    pub title_id: &'static str,
    pub component: &'a FirmwareComponent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSelection<'a> {
    pub normal: SelectedPackage<'a>,
    pub safe: SelectedPackage<'a>,
}

impl PackageSelection<'_> {
    /// Whether the normal package is the exFAT capable variant.
    pub fn is_exfat(&self) -> bool {
        EXFAT_TITLES.contains(self.normal.title_id)
    }
}

fn select_role<'a>(
    catalog: &'a TitleCatalog,
    role: Role,
    try_exfat: bool,
) -> Result<SelectedPackage<'a>> {
    if try_exfat {
        let exfat_title_id = EXFAT_TITLES.get(role);
        let component = catalog.title(exfat_title_id).filter(|c| {
            let defective = role == Role::Normal
                && c.content_id.eq_ignore_ascii_case(DEFECTIVE_EXFAT_CONTENT_ID);
            if defective {
                info!("Ignoring known defective exFAT package: {}", c.content_id);
            }
            !defective
        });

        if let Some(component) = component {
            return Ok(SelectedPackage {
                title_id: exfat_title_id,
                component,
            });
        }

        debug!("No usable exFAT {role} package, falling back to standard package");
    }

    let title_id = STANDARD_TITLES.get(role);

    match catalog.title(title_id) {
        Some(component) => Ok(SelectedPackage {
            title_id,
            component,
        }),
        None => Err(Error::MissingPackage { role, title_id }),
    }
}

/// Pick the normal and safe mode packages. The exFAT variants are preferred
/// when `try_exfat` is set. Each role falls back to its standard title
/// independently.
pub fn select_packages(catalog: &TitleCatalog, try_exfat: bool) -> Result<PackageSelection<'_>> {
    Ok(PackageSelection {
        normal: select_role(catalog, Role::Normal, try_exfat)?,
        safe: select_role(catalog, Role::Safe, try_exfat)?,
    })
}

/// Extract the system version title into `work_dir/<title ID>` and parse its
/// version blob.
pub fn load_system_version(
    decryptor: &dyn Decryptor,
    catalog: &TitleCatalog,
    work_dir: &Path,
) -> Result<SystemVersion> {
    let component = catalog
        .title(SYSTEM_VERSION_TITLE_ID)
        .ok_or(Error::MissingSystemVersion)?;

    let out_dir = work_dir.join(SYSTEM_VERSION_TITLE_ID);
    fs::create_dir_all(&out_dir).map_err(|e| Error::File(out_dir.clone(), e))?;

    decryptor
        .extract(&Extraction::Romfs {
            nca: &component.path,
            out_dir: &out_dir,
        })
        .map_err(Error::ExtractSystemVersion)?;

    let path = out_dir.join(SYSTEM_VERSION_FILE);
    let data = fs::read(&path).map_err(|e| Error::File(path, e))?;

    SystemVersion::parse(&data).map_err(Error::SystemVersion)
}

/// A loaded firmware package and the location of its raw package2.
#[derive(Debug)]
pub struct LoadedPackage {
    pub boot: BootPackage,
    pub package2_path: PathBuf,
}

/// Extract the romfs of a selected package into `work_dir/<title ID>` and load
/// the boot components for `platform`.
pub fn load_boot_package(
    decryptor: &dyn Decryptor,
    role: Role,
    package: &SelectedPackage,
    work_dir: &Path,
    platform: &str,
) -> Result<LoadedPackage> {
    let out_dir = work_dir.join(package.title_id);
    fs::create_dir_all(&out_dir).map_err(|e| Error::File(out_dir.clone(), e))?;

    decryptor
        .extract(&Extraction::Romfs {
            nca: &package.component.path,
            out_dir: &out_dir,
        })
        .map_err(|e| Error::Extract(role, e))?;

    let dir = out_dir.join(platform.to_ascii_lowercase());
    let read = |name: &str| {
        let path = dir.join(name);
        fs::read(&path).map_err(|e| Error::File(path, e))
    };

    let bct = read(BCT_NAME)?;
    let package1 = read(PACKAGE1_NAME)?;
    let package2 = read(PACKAGE2_NAME)?;

    debug!(
        "Loaded {role} package: bct={}, package1={}, package2={}",
        bct.len(),
        package1.len(),
        package2.len(),
    );

    let boot = BootPackage::new(&bct, &package1, package2).map_err(|e| Error::BootMedia(role, e))?;

    Ok(LoadedPackage {
        boot,
        package2_path: dir.join(PACKAGE2_NAME),
    })
}
