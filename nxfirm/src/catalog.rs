// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    error::ErrorKind,
    hash,
    tool::{self, Decryptor},
};

pub const TITLE_ID_PREFIX: &str = "Title ID:";
pub const CONTENT_TYPE_PREFIX: &str = "Content Type:";

/// Name of the first part of a split NCA, stored inside a `*.nca` directory.
const SPLIT_NCA_FIRST_PART: &str = "00";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path:?} is missing {field:?} in decryptor output")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("Failed to inspect {0:?}")]
    Inspect(PathBuf, #[source] tool::Error),
    #[error("Failed to hash {0:?}")]
    Hash(PathBuf, #[source] io::Error),
    #[error("Failed to list directory: {0:?}")]
    ReadDir(PathBuf, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } => ErrorKind::Format,
            Self::Inspect(_, e) => e.kind(),
            Self::Hash(_, _) | Self::ReadDir(_, _) => ErrorKind::Io,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentType {
    Meta,
    Program,
    Data,
    Control,
    Manual,
    PublicData,
    Other(String),
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        match value {
            "Meta" => Self::Meta,
            "Program" => Self::Program,
            "Data" => Self::Data,
            "Control" => Self::Control,
            "Manual" => Self::Manual,
            "PublicData" => Self::PublicData,
            v => Self::Other(v.to_owned()),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta => f.write_str("Meta"),
            Self::Program => f.write_str("Program"),
            Self::Data => f.write_str("Data"),
            Self::Control => f.write_str("Control"),
            Self::Manual => f.write_str("Manual"),
            Self::PublicData => f.write_str("PublicData"),
            Self::Other(v) => f.write_str(v),
        }
    }
}

/// A decrypted firmware NCA found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareComponent {
    /// Lowercase hex of the first half of the SHA-256 digest.
    pub content_id: String,
    pub path: PathBuf,
    /// Lowercase 16-digit hex title ID.
    pub title_id: String,
    pub content_type: ContentType,
}

/// Find the value of the first line starting with `prefix`.
fn find_line_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim_start)
}

/// Extract the title ID and content type from the decryptor's information
/// dump for an NCA.
pub fn parse_inspection(text: &str) -> (Option<&str>, Option<&str>) {
    (
        find_line_value(text, TITLE_ID_PREFIX),
        find_line_value(text, CONTENT_TYPE_PREFIX),
    )
}

fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(OsStr::to_str) else {
        return false;
    };

    if name.ends_with(".nca") {
        return true;
    }

    name == SPLIT_NCA_FIRST_PART
        && path
            .parent()
            .and_then(Path::file_name)
            .and_then(OsStr::to_str)
            .is_some_and(|p| p.ends_with(".nca"))
}

/// List all files below `dir`. Entries of each directory are sorted by name
/// and files come before the contents of subdirectories.
fn walk_sorted(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .and_then(|iter| iter.collect::<io::Result<Vec<_>>>())
        .map_err(|e| Error::ReadDir(dir.to_owned(), e))?;
    entries.sort_by_key(|e| e.file_name());

    let mut subdirs = vec![];

    for entry in entries {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .map_err(|e| Error::ReadDir(path.clone(), e))?
            .is_dir();

        if is_dir {
            subdirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }

    for subdir in subdirs {
        walk_sorted(&subdir, files)?;
    }

    Ok(())
}

/// All firmware components of an update, keyed by content ID, and the
/// component that represents each title.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleCatalog {
    components: BTreeMap<String, FirmwareComponent>,
    titles: BTreeMap<String, String>,
    meta_count: usize,
    data_count: usize,
}

impl TitleCatalog {
    /// Build a catalog from components in discovery order. The first non-meta
    /// component of a title represents it.
    pub fn from_components(components: impl IntoIterator<Item = FirmwareComponent>) -> Self {
        let mut result = Self::default();

        for component in components {
            if component.content_type == ContentType::Meta {
                result.meta_count += 1;
            } else {
                result.data_count += 1;
                result
                    .titles
                    .entry(component.title_id.clone())
                    .or_insert_with(|| component.content_id.clone());
            }

            result
                .components
                .insert(component.content_id.clone(), component);
        }

        result
    }

    /// Find and identify every NCA below `root`.
    pub fn scan(root: &Path, decryptor: &dyn Decryptor) -> Result<Self> {
        let mut files = vec![];
        walk_sorted(root, &mut files)?;

        let mut components = vec![];

        for path in files {
            if !is_candidate(&path) {
                debug!("Skipping non-NCA file: {path:?}");
                continue;
            }

            let content_id = hash::file_fingerprint(&path).map_err(|e| Error::Hash(path.clone(), e))?;
            let info = decryptor
                .inspect(&path)
                .map_err(|e| Error::Inspect(path.clone(), e))?;

            let (title_id, content_type) = match parse_inspection(&info) {
                (Some(t), Some(c)) => (t.to_ascii_lowercase(), ContentType::parse(c)),
                (None, _) => {
                    return Err(Error::MissingField {
                        path,
                        field: TITLE_ID_PREFIX,
                    });
                }
                (_, None) => {
                    return Err(Error::MissingField {
                        path,
                        field: CONTENT_TYPE_PREFIX,
                    });
                }
            };

            trace!("{content_id} = {content_type}:{title_id} ({path:?})");

            components.push(FirmwareComponent {
                content_id,
                path,
                title_id,
                content_type,
            });
        }

        Ok(Self::from_components(components))
    }

    pub fn component(&self, content_id: &str) -> Option<&FirmwareComponent> {
        self.components.get(&content_id.to_ascii_lowercase())
    }

    /// Component that represents a title.
    pub fn title(&self, title_id: &str) -> Option<&FirmwareComponent> {
        self.titles
            .get(&title_id.to_ascii_lowercase())
            .and_then(|id| self.components.get(id))
    }

    pub fn components(&self) -> impl Iterator<Item = &FirmwareComponent> {
        self.components.values()
    }

    pub fn meta_count(&self) -> usize {
        self.meta_count
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }
}
