// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Placement and verification of the output files described by a remote
//! output manifest.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    catalog::TitleCatalog,
    error::ErrorKind,
    fetch::{self, Fetcher},
    hash,
    tool::{self, ArchiveExtractor},
    util,
};

/// A manifest `ncas` entry that has no matching component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingContent {
    pub content_id: String,
    pub content_type: String,
    pub title_id: String,
}

impl fmt::Display for MissingContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.content_id, self.content_type, self.title_id,
        )
    }
}

struct MissingList<'a>(&'a [MissingContent]);

impl fmt::Display for MissingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, missing) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{missing}")?;
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse output manifest")]
    Parse(#[source] serde_json::Error),
    #[error("Missing {} required NCAs in firmware: {}", .0.len(), MissingList(.0))]
    MissingContents(Vec<MissingContent>),
    #[error("Unsafe path in output manifest: {0:?}")]
    UnsafePath(String),
    #[error("Archive URL has no file name: {0}")]
    NoArchiveName(String),
    #[error("Downloaded file hash {actual} expected {expected}: {path:?}")]
    ArchiveHashMismatch {
        path: PathBuf,
        actual: String,
        expected: String,
    },
    #[error("Extracted file {path:?} has hash {actual}, expected {expected}")]
    FileHashMismatch {
        path: PathBuf,
        actual: String,
        expected: String,
    },
    #[error("Failed to fetch archive")]
    Fetch(#[from] fetch::Error),
    #[error("Failed to extract archive: {0:?}")]
    Extract(PathBuf, #[source] tool::Error),
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Format,
            Self::MissingContents(_)
            | Self::UnsafePath(_)
            | Self::ArchiveHashMismatch { .. }
            | Self::FileHashMismatch { .. } => ErrorKind::Verification,
            Self::NoArchiveName(_) => ErrorKind::Resolution,
            Self::Fetch(e) => e.kind(),
            Self::Extract(_, e) => e.kind(),
            Self::File(_, _) => ErrorKind::Io,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

bitflags! {
    /// Attribute letters used by the manifest. Only the read-only attribute
    /// has an equivalent outside of Windows.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
    pub struct FileAttributes: u8 {
        const SYSTEM = 1 << 0;
        const HIDDEN = 1 << 1;
        const READ_ONLY = 1 << 2;
        const ARCHIVE = 1 << 3;
        const TEMPORARY = 1 << 4;
    }
}

impl FileAttributes {
    /// Parse an attribute string like `SHRA`. `N` or an empty string means no
    /// attributes. Unknown letters are ignored.
    pub fn parse(value: &str) -> Self {
        value
            .chars()
            .map(|c| match c.to_ascii_uppercase() {
                'S' => Self::SYSTEM,
                'H' => Self::HIDDEN,
                'R' => Self::READ_ONLY,
                'A' => Self::ARCHIVE,
                'T' => Self::TEMPORARY,
                _ => Self::empty(),
            })
            .collect()
    }

    /// Apply the attributes to a file or directory.
    pub fn apply(self, path: &Path) -> io::Result<()> {
        trace!("Attributes for {path:?}: {self:?}");

        if self.contains(Self::READ_ONLY) && path.is_file() {
            let mut permissions = fs::metadata(path)?.permissions();
            permissions.set_readonly(true);
            fs::set_permissions(path, permissions)?;
        }

        Ok(())
    }
}

/// Identity of an NCA entry in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentIdentity {
    pub title_id: String,
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OutputEntry {
    /// Relative path inside the output directory.
    pub path: String,
    #[serde(default)]
    pub attrs: String,
    /// Present for NCA entries.
    #[serde(flatten)]
    pub identity: Option<ContentIdentity>,
}

impl OutputEntry {
    pub fn attributes(&self) -> FileAttributes {
        FileAttributes::parse(&self.attrs)
    }

    pub fn resolve(&self, root: &Path) -> Result<PathBuf> {
        resolve_path(root, &self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ArchiveEntry {
    pub url: String,
    /// Expected SHA-256 digest or prefix, in hex.
    pub hash: String,
}

/// Remote description of the files making up a prepared firmware update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct OutputManifest {
    /// Content ID to output location.
    #[serde(default)]
    pub ncas: BTreeMap<String, OutputEntry>,
    /// File hash (or prefix) to the location of a file from the archive.
    #[serde(default)]
    pub files: BTreeMap<String, OutputEntry>,
    /// Directory to its attribute string.
    #[serde(default)]
    pub dirs: BTreeMap<String, String>,
    #[serde(default)]
    pub archive: Option<ArchiveEntry>,
}

impl OutputManifest {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(Error::Parse)
    }
}

fn resolve_path(root: &Path, path: &str) -> Result<PathBuf> {
    util::join_relative(root, path).ok_or_else(|| Error::UnsafePath(path.to_owned()))
}

/// Check that every NCA the manifest requires exists in the catalog. All
/// missing entries are reported together.
pub fn check_contents(manifest: &OutputManifest, catalog: &TitleCatalog) -> Result<()> {
    let mut missing = vec![];

    for (content_id, entry) in &manifest.ncas {
        if catalog.component(content_id).is_some() {
            continue;
        }

        let (content_type, title_id) = match &entry.identity {
            Some(i) => (i.content_type.clone(), i.title_id.clone()),
            None => ("?".to_owned(), "?".to_owned()),
        };

        warn!("Missing NCA for {content_type}:{title_id}");

        missing.push(MissingContent {
            content_id: content_id.clone(),
            content_type,
            title_id,
        });
    }

    if !missing.is_empty() {
        return Err(Error::MissingContents(missing));
    }

    Ok(())
}

/// Create every directory listed in the manifest, in sorted order.
pub fn create_dirs(manifest: &OutputManifest, root: &Path) -> Result<()> {
    let mut dirs = manifest.dirs.iter().collect::<Vec<_>>();
    dirs.sort();

    for (dir, attrs) in dirs {
        let path = resolve_path(root, dir)?;
        debug!("Creating directory: {path:?}");

        fs::create_dir_all(&path).map_err(|e| Error::File(path.clone(), e))?;
        FileAttributes::parse(attrs)
            .apply(&path)
            .map_err(|e| Error::File(path, e))?;
    }

    Ok(())
}

/// Copy each catalog component to its location in the manifest.
pub fn copy_contents(manifest: &OutputManifest, catalog: &TitleCatalog, root: &Path) -> Result<()> {
    for (content_id, entry) in &manifest.ncas {
        let Some(component) = catalog.component(content_id) else {
            return Err(Error::MissingContents(vec![MissingContent {
                content_id: content_id.clone(),
                content_type: entry
                    .identity
                    .as_ref()
                    .map_or_else(|| "?".to_owned(), |i| i.content_type.clone()),
                title_id: entry
                    .identity
                    .as_ref()
                    .map_or_else(|| "?".to_owned(), |i| i.title_id.clone()),
            }]));
        };

        let path = entry.resolve(root)?;
        info!(
            "Writing NCA {}:{} to {}",
            component.content_type, component.title_id, entry.path,
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::File(parent.to_owned(), e))?;
        }

        fs::copy(&component.path, &path).map_err(|e| Error::File(path.clone(), e))?;
        entry
            .attributes()
            .apply(&path)
            .map_err(|e| Error::File(path, e))?;
    }

    Ok(())
}

fn check_hash(path: &Path, expected: &str) -> Result<std::result::Result<(), String>> {
    let digest = hash::sha256_file(path).map_err(|e| Error::File(path.to_owned(), e))?;
    let (matched, actual) = hash::matches_prefix(&digest, expected);

    Ok(if matched { Ok(()) } else { Err(actual) })
}

/// Make sure the archive is present in `cache_dir` with the expected hash,
/// downloading it if necessary. Returns the path to the archive.
pub fn ensure_archive(
    fetcher: &dyn Fetcher,
    archive: &ArchiveEntry,
    cache_dir: &Path,
) -> Result<PathBuf> {
    let name =
        fetch::url_file_name(&archive.url).ok_or_else(|| Error::NoArchiveName(archive.url.clone()))?;
    let path = cache_dir.join(name);

    if path.is_file() {
        info!("Needed archive already downloaded, checking hash...");

        match check_hash(&path, &archive.hash)? {
            Ok(()) => {
                info!("Downloaded file hash is {} as expected", archive.hash);
                return Ok(path);
            }
            Err(actual) => {
                warn!("Existing file hash {actual} mismatch, redownloading");
            }
        }
    }

    fs::create_dir_all(cache_dir).map_err(|e| Error::File(cache_dir.to_owned(), e))?;
    fetcher.download(&archive.url, &path)?;

    if let Err(actual) = check_hash(&path, &archive.hash)? {
        return Err(Error::ArchiveHashMismatch {
            path,
            actual,
            expected: archive.hash.clone(),
        });
    }

    Ok(path)
}

/// Unpack the archive into the output directory.
pub fn extract_archive(extractor: &dyn ArchiveExtractor, archive: &Path, root: &Path) -> Result<()> {
    extractor
        .extract(archive, root)
        .map_err(|e| Error::Extract(archive.to_owned(), e))
}

/// Verify the hash of every file listed in the manifest and apply its
/// attributes. Stops at the first mismatch.
pub fn verify_files(manifest: &OutputManifest, root: &Path) -> Result<()> {
    for (expected, entry) in &manifest.files {
        let path = entry.resolve(root)?;
        info!("Verifying file {}", entry.path);

        if let Err(actual) = check_hash(&path, expected)? {
            return Err(Error::FileHashMismatch {
                path,
                actual,
                expected: expected.clone(),
            });
        }

        entry
            .attributes()
            .apply(&path)
            .map_err(|e| Error::File(path, e))?;
    }

    Ok(())
}
