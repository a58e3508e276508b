// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process::Command,
};

use tracing::debug;

use crate::{
    format::kip::Kip,
    stream::{CountingWriter, FromReader, ToWriter},
    tool::{self, Error, Result},
};

/// Sizes of a KIP file before and after compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressedSizes {
    pub uncompressed: u64,
    pub compressed: u64,
}

/// How the patched KIP is recompressed.
#[derive(Clone, Debug, Default)]
pub enum KipCompressor {
    /// Use the built-in BLZ encoder.
    #[default]
    Builtin,
    /// Use an external `kip1decomp` executable.
    External(PathBuf),
}

impl KipCompressor {
    pub const EXTERNAL_NAME: &str = "kip1decomp";

    fn write_kip(kip: &Kip, path: &Path) -> Result<u64> {
        let file = File::create(path).map_err(|e| Error::File(path.to_owned(), e))?;
        let mut writer = CountingWriter::new(BufWriter::new(file));
        kip.to_writer(&mut writer)?;

        let (mut writer, size) = writer.finish();
        writer
            .flush()
            .map_err(|e| Error::File(path.to_owned(), e))?;

        Ok(size)
    }

    fn compress_in_place(&self, path: &Path) -> Result<()> {
        match self {
            Self::Builtin => {
                let file = File::open(path).map_err(|e| Error::File(path.to_owned(), e))?;
                let mut kip = Kip::from_reader(BufReader::new(file))?;
                kip.compress();

                Self::write_kip(&kip, path)?;
            }
            Self::External(program) => {
                let mut command = Command::new(program);
                command.arg("c");
                command.arg(path);
                command.arg(path);

                tool::run(&mut command)?;
            }
        }

        Ok(())
    }

    /// Write an uncompressed KIP to `path` and compress it in place.
    pub fn write_compressed(&self, kip: &Kip, path: &Path) -> Result<CompressedSizes> {
        let uncompressed = Self::write_kip(kip, path)?;

        debug!("Compressing {path:?} with {self:?}");
        self.compress_in_place(path)?;

        let compressed = fs::metadata(path)
            .map_err(|e| Error::File(path.to_owned(), e))?
            .len();

        Ok(CompressedSizes {
            uncompressed,
            compressed,
        })
    }
}
