// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Remote FS patch definitions (`fs_patches.json`).
//!
//! Two layouts are accepted. The indexed layout maps each version to patch
//! definition names that are looked up in a shared table:
//!
//! ```json
//! {
//!     "versions": {
//!         "<fingerprint>": {
//!             "name": "FS510.kip1",
//!             "patches": { "nocmac": "cmac_510", "nogc": "" }
//!         }
//!     },
//!     "patches": {
//!         "cmac_510": { "0x1234": ["aa bb", "cc dd"] }
//!     }
//! }
//! ```
//!
//! The flat layout embeds the definitions directly:
//!
//! ```json
//! {
//!     "<fingerprint>": {
//!         "name": "FS510.kip1",
//!         "patches": { "nocmac": { "0x1234": ["aa bb", "cc dd"] }, "nogc": null }
//!     }
//! }
//! ```
//!
//! A patch that maps to nothing (null, an empty string, or a definition that
//! does not exist) does not need to be applied for that version.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    num::ParseIntError,
    path::Path,
};

use hex::FromHexError;
use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    error::ErrorKind,
    patch::{PatchEntry, PatchSet},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse patch document")]
    Parse(#[source] serde_json::Error),
    #[error("Unknown FS version fingerprint: {}", .0.join(", "))]
    UnknownVersion(Vec<String>),
    #[error("Requested patch {patch:?} is not available for {version:?}")]
    UnknownPatch { patch: String, version: String },
    #[error("Invalid offset {0:?} in patch {1:?}")]
    InvalidOffset(String, String, #[source] ParseIntError),
    #[error("Invalid hex data {0:?} in patch {1:?}")]
    InvalidHex(String, String, #[source] FromHexError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) | Self::InvalidOffset(_, _, _) | Self::InvalidHex(_, _, _) => {
                ErrorKind::Format
            }
            Self::UnknownVersion(_) | Self::UnknownPatch { .. } => ErrorKind::Resolution,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// `[expected, replacement]` hex pairs keyed by offset string, in document
/// order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct RawEntries(Vec<(String, [String; 2])>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of offsets to [expected, replacement] hex strings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());

                while let Some(entry) = map.next_entry::<String, [String; 2]>()? {
                    entries.push(entry);
                }

                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Deserialize)]
struct IndexedVersion {
    name: String,
    patches: HashMap<String, Option<String>>,
}

#[derive(Deserialize)]
struct IndexedDocument {
    versions: HashMap<String, IndexedVersion>,
    patches: HashMap<String, RawEntries>,
}

/// A string in place of a definition. The value itself is not used.
struct Placeholder;

impl<'de> Deserialize<'de> for Placeholder {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PlaceholderVisitor;

        impl Visitor<'_> for PlaceholderVisitor {
            type Value = Placeholder;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E>(self, _value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Placeholder)
            }
        }

        deserializer.deserialize_str(PlaceholderVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlatPatch {
    Entries(RawEntries),
    NotApplicable(Placeholder),
}

#[derive(Deserialize)]
struct FlatVersion {
    name: String,
    patches: HashMap<String, Option<FlatPatch>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Indexed(IndexedDocument),
    Flat(HashMap<String, FlatVersion>),
}

/// C-style integer literal: `0x`, `0o`, and `0b` prefixes or decimal.
fn parse_offset(value: &str) -> std::result::Result<usize, ParseIntError> {
    let value = value.trim().to_ascii_lowercase().replace('_', "");

    let (digits, radix) = if let Some(d) = value.strip_prefix("0x") {
        (d, 16)
    } else if let Some(d) = value.strip_prefix("0o") {
        (d, 8)
    } else if let Some(d) = value.strip_prefix("0b") {
        (d, 2)
    } else {
        (value.as_str(), 10)
    };

    usize::from_str_radix(digits, radix)
}

fn parse_hex(value: &str) -> std::result::Result<Vec<u8>, FromHexError> {
    let value = value.replace(' ', "");
    hex::decode(value)
}

/// Patches available for one FS version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionPatches {
    /// Fingerprint the version was found under, in lowercase.
    pub fingerprint: String,
    /// File name of the KIP for this version, eg. `FS510-exfat.kip1`.
    pub name: String,
    /// Patch name to its definition, or [`None`] if it is not needed.
    patches: BTreeMap<String, Option<RawEntries>>,
}

impl VersionPatches {
    pub fn patch_names(&self) -> impl Iterator<Item = &str> {
        self.patches.keys().map(|k| k.as_str())
    }

    /// Resolve a patch by name. Returns [`None`] if the patch exists but does
    /// not need to be applied to this version.
    pub fn patch_set(&self, name: &str) -> Result<Option<PatchSet>> {
        let Some(definition) = self.patches.get(name) else {
            return Err(Error::UnknownPatch {
                patch: name.to_owned(),
                version: self.name.clone(),
            });
        };
        let Some(definition) = definition else {
            return Ok(None);
        };

        let mut entries = Vec::with_capacity(definition.0.len());

        for (offset, [expected, replacement]) in &definition.0 {
            let offset = parse_offset(offset)
                .map_err(|e| Error::InvalidOffset(offset.clone(), name.to_owned(), e))?;
            let expected = parse_hex(expected)
                .map_err(|e| Error::InvalidHex(expected.clone(), name.to_owned(), e))?;
            let replacement = parse_hex(replacement)
                .map_err(|e| Error::InvalidHex(replacement.clone(), name.to_owned(), e))?;

            entries.push(PatchEntry {
                offset,
                expected,
                replacement,
            });
        }

        Ok(Some(PatchSet {
            name: name.to_owned(),
            entries,
        }))
    }

    /// Output file name for the patched KIP. See [`patched_file_name`].
    pub fn output_name(&self, applied: &[String]) -> String {
        patched_file_name(&self.name, applied)
    }
}

/// File name for a patched KIP: the file stem of `name`, followed by the names
/// of the applied patches, followed by the extension of `name`.
pub fn patched_file_name(name: &str, applied: &[String]) -> String {
    let path = Path::new(name);
    let mut result = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    for patch in applied {
        result.push('_');
        result.push_str(patch);
    }

    if let Some(ext) = path.extension() {
        result.push('.');
        result.push_str(&ext.to_string_lossy());
    }

    result
}

/// Parsed patch definitions for every known FS version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchDocument {
    versions: BTreeMap<String, VersionPatches>,
}

impl PatchDocument {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: RawDocument = serde_json::from_slice(data).map_err(Error::Parse)?;
        let mut versions = BTreeMap::new();

        match raw {
            RawDocument::Indexed(doc) => {
                for (fingerprint, version) in doc.versions {
                    let patches = version
                        .patches
                        .into_iter()
                        .map(|(patch, definition)| {
                            let entries = definition
                                .filter(|d| !d.is_empty())
                                .and_then(|d| doc.patches.get(&d).cloned());
                            (patch, entries)
                        })
                        .collect();

                    let fingerprint = fingerprint.to_ascii_lowercase();
                    versions.insert(
                        fingerprint.clone(),
                        VersionPatches {
                            fingerprint,
                            name: version.name,
                            patches,
                        },
                    );
                }
            }
            RawDocument::Flat(doc) => {
                for (fingerprint, version) in doc {
                    let patches = version
                        .patches
                        .into_iter()
                        .map(|(patch, definition)| {
                            let entries = match definition {
                                Some(FlatPatch::Entries(e)) => Some(e),
                                Some(FlatPatch::NotApplicable(_)) | None => None,
                            };
                            (patch, entries)
                        })
                        .collect();

                    let fingerprint = fingerprint.to_ascii_lowercase();
                    versions.insert(
                        fingerprint.clone(),
                        VersionPatches {
                            fingerprint,
                            name: version.name,
                            patches,
                        },
                    );
                }
            }
        }

        debug!("Loaded patch definitions for {} versions", versions.len());

        Ok(Self { versions })
    }

    /// Find the first version matching one of the fingerprints, in order.
    pub fn find_version(&self, fingerprints: &[&str]) -> Result<&VersionPatches> {
        fingerprints
            .iter()
            .find_map(|f| self.versions.get(&f.to_ascii_lowercase()))
            .ok_or_else(|| {
                Error::UnknownVersion(fingerprints.iter().map(|f| (*f).to_owned()).collect())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("0x1A").unwrap(), 0x1a);
        assert_eq!(parse_offset("0X1a").unwrap(), 0x1a);
        assert_eq!(parse_offset("0o17").unwrap(), 0o17);
        assert_eq!(parse_offset("0b101").unwrap(), 0b101);
        assert_eq!(parse_offset(" 1234 ").unwrap(), 1234);
        assert_eq!(parse_offset("0x1_0").unwrap(), 0x10);
        assert!(parse_offset("-1").is_err());
        assert!(parse_offset("0xzz").is_err());
    }

    #[test]
    fn hex_with_spaces() {
        assert_eq!(parse_hex("aa BB 0c").unwrap(), [0xaa, 0xbb, 0x0c]);
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn output_name() {
        let version = VersionPatches {
            fingerprint: String::new(),
            name: "FS510-exfat.kip1".to_owned(),
            patches: BTreeMap::new(),
        };

        assert_eq!(version.output_name(&[]), "FS510-exfat.kip1");
        assert_eq!(
            version.output_name(&["nocmac".to_owned(), "nogc".to_owned()]),
            "FS510-exfat_nocmac_nogc.kip1",
        );
    }
}
