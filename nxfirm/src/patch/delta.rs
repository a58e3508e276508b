// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use thiserror::Error;
use tracing::info;

use crate::{
    error::ErrorKind,
    hash,
    patch::{self, BodyPatcher},
    tool,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Body fingerprint {actual} does not match delta base {expected}")]
    BaseMismatch { actual: String, expected: String },
    #[error("Failed to access delta file: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Delta tool error")]
    Tool(#[from] tool::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BaseMismatch { .. } => ErrorKind::Verification,
            Self::File(_, _) => ErrorKind::Io,
            Self::Tool(e) => e.kind(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Replaces the body with the result of applying a VCDIFF delta with
/// `xdelta3`. The delta is only applied to the exact base it was made from.
#[derive(Clone, Debug)]
pub struct DeltaPatcher {
    name: String,
    program: PathBuf,
    delta: PathBuf,
    base_fingerprint: String,
    work_dir: PathBuf,
}

impl DeltaPatcher {
    pub const TOOL_NAME: &str = "xdelta3";

    pub fn new(
        program: PathBuf,
        delta: PathBuf,
        base_fingerprint: String,
        work_dir: PathBuf,
    ) -> Self {
        let name = delta
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "delta".to_owned());

        Self {
            name,
            program,
            delta,
            base_fingerprint,
            work_dir,
        }
    }

    fn apply(&self, body: &mut Vec<u8>) -> Result<()> {
        let actual = hash::fingerprint(&hash::sha256(body));
        if !actual.eq_ignore_ascii_case(&self.base_fingerprint) {
            return Err(Error::BaseMismatch {
                actual,
                expected: self.base_fingerprint.clone(),
            });
        }

        let base_path = self.work_dir.join("delta_base.bin");
        let out_path = self.work_dir.join("delta_out.bin");

        fs::write(&base_path, body.as_slice()).map_err(|e| Error::File(base_path.clone(), e))?;

        let mut command = Command::new(&self.program);
        command.args(["-d", "-f", "-s"]);
        command.arg(&base_path);
        command.arg(&self.delta);
        command.arg(&out_path);

        tool::run(&mut command)?;

        *body = read_and_remove(&out_path)?;
        fs::remove_file(&base_path).map_err(|e| Error::File(base_path, e))?;

        Ok(())
    }
}

fn read_and_remove(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).map_err(|e| Error::File(path.to_owned(), e))?;
    fs::remove_file(path).map_err(|e| Error::File(path.to_owned(), e))?;
    Ok(data)
}

impl BodyPatcher for DeltaPatcher {
    fn patcher_name(&self) -> &str {
        &self.name
    }

    fn patch(&self, body: &mut Vec<u8>) -> patch::Result<()> {
        info!("Applying delta {:?} to body", self.delta);

        self.apply(body)?;

        Ok(())
    }
}
