// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Retrieval of remote documents and archives.

use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use attohttpc::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ErrorKind;

/// Base URL for patch definitions and output manifests.
pub const DEFAULT_BASE_URL: &str = "https://switchtools.sshnuke.net/firmware";

/// Name of the FS patch definitions document under the base URL.
pub const FS_PATCHES_NAME: &str = "fs_patches.json";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Document does not exist: {0}")]
    NotFound(String),
    #[error("Request failed: {0}")]
    Request(String, #[source] attohttpc::Error),
    #[error("Request failed with status {1}: {0}")]
    Status(String, StatusCode),
    #[error("Failed to receive data: {0}")]
    Transfer(String, #[source] io::Error),
    #[error("URL has no file name: {0}")]
    NoFileName(String),
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NoFileName(_) => ErrorKind::Resolution,
            Self::Request(_, _) | Self::Status(_, _) | Self::Transfer(_, _) => ErrorKind::Network,
            Self::File(_, _) => ErrorKind::Io,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Last path segment of a URL, ignoring any query string or fragment.
pub fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);

    path.rsplit('/').next().filter(|s| !s.is_empty())
}

/// Source of remote documents. A missing document is reported as
/// [`Error::NotFound`] so that callers can tell it apart from failures.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Save a (potentially large) file to `path`. Returns the number of bytes
    /// written.
    fn download(&self, url: &str, path: &Path) -> Result<u64>;
}

/// [`Fetcher`] that performs HTTP requests.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    http_only: bool,
}

impl HttpFetcher {
    /// If `http_only` is set, `https:` URLs are requested over plain HTTP.
    pub fn new(http_only: bool) -> Self {
        Self { http_only }
    }

    fn effective_url<'a>(&self, url: &'a str) -> Cow<'a, str> {
        match url.strip_prefix("https:") {
            Some(rest) if self.http_only => Cow::Owned(format!("http:{rest}")),
            _ => Cow::Borrowed(url),
        }
    }

    fn send(&self, url: &str) -> Result<attohttpc::Response> {
        info!("Making a request to URL {url}");

        let response = attohttpc::get(url)
            .send()
            .map_err(|e| Error::Request(url.to_owned(), e))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::NotFound(url.to_owned())),
            s => Err(Error::Status(url.to_owned(), s)),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.effective_url(url);
        let response = self.send(&url)?;

        response
            .bytes()
            .map_err(|e| Error::Request(url.clone().into_owned(), e))
    }

    fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let url = self.effective_url(url);
        let mut response = self.send(&url)?;

        let file = File::create(path).map_err(|e| Error::File(path.to_owned(), e))?;
        let mut writer = BufWriter::new(file);

        let size = io::copy(&mut response, &mut writer)
            .map_err(|e| Error::Transfer(url.clone().into_owned(), e))?;
        writer
            .flush()
            .map_err(|e| Error::File(path.to_owned(), e))?;

        debug!("Downloaded {size} bytes from {url} to {path:?}");

        Ok(size)
    }
}

/// [`Fetcher`] that serves documents from a local directory. Each URL maps to
/// the file in the directory with the same name as the URL's last segment.
#[derive(Clone, Debug)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn local_path(&self, url: &str) -> Result<PathBuf> {
        let name = url_file_name(url).ok_or_else(|| Error::NoFileName(url.to_owned()))?;
        let path = self.root.join(name);

        if !path.is_file() {
            return Err(Error::NotFound(url.to_owned()));
        }

        debug!("Using mirrored file {path:?} for {url}");

        Ok(path)
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.local_path(url)?;

        fs::read(&path).map_err(|e| Error::File(path, e))
    }

    fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let source = self.local_path(url)?;

        fs::copy(&source, path).map_err(|e| Error::File(source, e))
    }
}
