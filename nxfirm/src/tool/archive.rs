// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use crate::tool::{self, Result};

/// Unpacks an archive into a directory, overwriting existing files.
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()>;
}

/// [`ArchiveExtractor`] backed by the standalone 7-Zip executable.
#[derive(Clone, Debug)]
pub struct SevenZip {
    path: PathBuf,
}

impl SevenZip {
    pub const NAME: &str = "7za";

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ArchiveExtractor for SevenZip {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()> {
        let mut command = Command::new(&self.path);
        command.arg("x");
        command.arg(archive);
        command.arg("-aoa");
        command.current_dir(out_dir);

        tool::run(&mut command)
    }
}
