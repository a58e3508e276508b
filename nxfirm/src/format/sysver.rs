// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the system version blob stored in the romfs of the system
//! version title.

use std::{
    fmt,
    str::{self, Utf8Error},
};

use bstr::ByteSlice;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy_derive::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::error::ErrorKind;

pub const SYSTEM_VERSION_TITLE_ID: &str = "0100000000000809";

/// Name of the blob inside the extracted romfs.
pub const SYSTEM_VERSION_FILE: &str = "file";

#[derive(Debug, Error)]
pub enum Error {
    #[error("System version data is too small: {0} bytes")]
    TooSmall(usize),
    #[error("{0:?} field is not UTF-8 encoded: {data:?}", data = .2.as_bstr())]
    StringNotUtf8(&'static str, #[source] Utf8Error, Vec<u8>),
    #[error("Display version {display:?} does not match numeric version {numeric:?}")]
    VersionMismatch { display: String, numeric: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the fixed part of the blob. The description fills the
/// remainder of the file.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawSystemVersion {
    numbers: [u8; 4],
    _reserved: [u8; 4],
    platform: [u8; 0x20],
    version_hash: [u8; 0x40],
    display_version: [u8; 0x18],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemVersion {
    pub numbers: [u8; 4],
    /// Target platform, eg. `NX`.
    pub platform: String,
    /// Hex identifier of the build, used to name the output manifest.
    pub version_hash: String,
    /// Short version string, eg. `5.1.0`.
    pub display_version: String,
    /// Full human-readable name, eg. `NintendoSDK Firmware for NX 5.1.0-3.0`.
    pub display_title: String,
}

fn c_string(field: &'static str, data: &[u8]) -> Result<String> {
    let end = data.find_byte(0).unwrap_or(data.len());
    let data = &data[..end];

    str::from_utf8(data)
        .map(|s| s.to_owned())
        .map_err(|e| Error::StringNotUtf8(field, e, data.to_vec()))
}

impl SystemVersion {
    /// Parse the blob and check that the display version is consistent with
    /// the numeric version.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (raw, description) =
            RawSystemVersion::read_from_prefix(data).map_err(|_| Error::TooSmall(data.len()))?;

        let result = Self {
            numbers: raw.numbers,
            platform: c_string("SystemVersion::platform", &raw.platform)?,
            version_hash: c_string("SystemVersion::version_hash", &raw.version_hash)?,
            display_version: c_string("SystemVersion::display_version", &raw.display_version)?,
            display_title: c_string("SystemVersion::display_title", description)?,
        };

        let numeric = result.numeric();
        if !numeric.starts_with(&result.display_version) {
            return Err(Error::VersionMismatch {
                display: result.display_version,
                numeric,
            });
        }

        Ok(result)
    }

    /// Dotted form of all four version numbers, eg. `5.1.0.0`.
    pub fn numeric(&self) -> String {
        let [a, b, c, d] = self.numbers;
        format!("{a}.{b}.{c}.{d}")
    }

    /// Display version without the dots, as used in boot menu section names.
    pub fn digits(&self) -> String {
        self.display_version.replace('.', "")
    }
}

impl fmt::Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} firmware version {:?} ({}) = {} (hash: {})",
            self.platform,
            self.display_version,
            self.numeric(),
            self.display_title,
            self.version_hash,
        )
    }
}
