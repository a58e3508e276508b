// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Wrappers around the external programs that do the work this crate does not
//! implement itself: NCA decryption and extraction, archive extraction, and
//! the optional external KIP compressor.

use std::{
    env,
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output, Stdio},
};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{error::ErrorKind, format::kip, util::DebugString};

pub mod archive;
pub mod compressor;
pub mod hactool;

pub use archive::{ArchiveExtractor, SevenZip};
pub use compressor::{CompressedSizes, KipCompressor};
pub use hactool::{Decryptor, Extraction, Hactool, InputType};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Required tool {0:?} is missing")]
    NotFound(String),
    #[error("Keyset not found: {0:?}")]
    KeysetNotFound(PathBuf),
    #[error("Cannot find home directory for the default keyset")]
    NoHomeDir,
    #[error("Failed to run command: {0:?}")]
    CommandSpawn(DebugString, #[source] io::Error),
    #[error("Command failed with status: {status}: {command:?}: {stderr}")]
    CommandExecution {
        command: DebugString,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Command reported errors: {command:?}: {stderr}")]
    CommandStderr { command: DebugString, stderr: String },
    #[error("Expected output was not produced: {0:?}")]
    MissingOutput(PathBuf),
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("KIP error")]
    Kip(#[from] kip::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::KeysetNotFound(_) | Self::NoHomeDir => ErrorKind::Resolution,
            Self::CommandSpawn(_, _)
            | Self::CommandExecution { .. }
            | Self::CommandStderr { .. }
            | Self::MissingOutput(_) => ErrorKind::ExternalTool,
            Self::File(_, _) => ErrorKind::Io,
            Self::Kip(e) => e.kind(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

fn executable_name(name: &str) -> OsString {
    let mut result = OsString::from(name);
    result.push(env::consts::EXE_SUFFIX);
    result
}

/// Find a tool in the directory containing the current executable or, failing
/// that, in `PATH`.
pub fn find_tool(name: &str) -> Result<PathBuf> {
    let file_name = executable_name(name);

    let exe_dir = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let path_dirs = env::var_os("PATH")
        .map(|p| env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();

    for dir in exe_dir.into_iter().chain(path_dirs) {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            debug!("Found {name}: {candidate:?}");
            return Ok(candidate);
        }
    }

    Err(Error::NotFound(name.to_owned()))
}

fn execute(command: &mut Command) -> Result<Output> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    trace!("Running: {command:?}");

    command
        .output()
        .map_err(|e| Error::CommandSpawn(DebugString::new(&command), e))
}

/// Run a command and return its stdout. A nonzero exit status is an error, and
/// so is any output on stderr.
pub fn run_strict(command: &mut Command) -> Result<String> {
    let output = execute(command)?;
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

    if !output.status.success() {
        return Err(Error::CommandExecution {
            command: DebugString::new(&command),
            status: output.status,
            stderr,
        });
    } else if !stderr.is_empty() {
        return Err(Error::CommandStderr {
            command: DebugString::new(&command),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command where only the exit status matters. Output is forwarded to
/// the log as it would have been shown on the terminal.
pub fn run(command: &mut Command) -> Result<()> {
    let output = execute(command)?;
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("{line}");
    }

    if !output.status.success() {
        return Err(Error::CommandExecution {
            command: DebugString::new(&command),
            status: output.status,
            stderr,
        });
    }

    Ok(())
}
