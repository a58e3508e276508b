// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    env,
    ffi::OsString,
    fmt,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    process::Command,
};

use clap::ValueEnum;
use tracing::debug;

use crate::tool::{self, Error, Result};

/// Magic at the start of a raw HFS0 partition.
const HFS0_MAGIC: [u8; 4] = *b"HFS0";

/// Name of the INI1 blob produced by extracting package2.
pub const INI1_NAME: &str = "INI1.bin";
/// Name of the FS KIP produced by extracting INI1.
pub const FS_KIP_NAME: &str = "FS.kip1";

/// Container type of a firmware input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputType {
    Nca,
    Xci,
    Romfs,
    Hfs0,
}

impl InputType {
    /// Guess the type from the file extension or, failing that, the magic.
    pub fn detect(path: &Path) -> io::Result<Option<Self>> {
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xci"))
        {
            return Ok(Some(Self::Xci));
        }

        let mut magic = [0u8; 4];
        let mut file = File::open(path)?;

        match file.read_exact(&mut magic) {
            Ok(()) if magic == HFS0_MAGIC => Ok(Some(Self::Hfs0)),
            Ok(()) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_possible_value().ok_or(fmt::Error)?.get_name())
    }
}

/// An extraction request for the decryptor.
#[derive(Clone, Copy, Debug)]
pub enum Extraction<'a> {
    /// Extract the romfs of an NCA into a directory.
    Romfs { nca: &'a Path, out_dir: &'a Path },
    /// Extract a package2 blob. Produces [`INI1_NAME`].
    Package2 { package2: &'a Path, out_dir: &'a Path },
    /// Extract an INI1 blob. Produces one KIP per process, including
    /// [`FS_KIP_NAME`].
    Ini1 { ini1: &'a Path, out_dir: &'a Path },
    /// Extract the firmware NCAs from an input package.
    Input {
        input: &'a Path,
        input_type: InputType,
        out_dir: &'a Path,
    },
}

impl Extraction<'_> {
    fn args(&self) -> Vec<OsString> {
        fn dir_arg(name: &str, dir: &Path) -> OsString {
            let mut arg = OsString::from(format!("--{name}="));
            arg.push(dir);
            arg
        }

        match self {
            Self::Romfs { nca, out_dir } => vec![
                "-x".into(),
                "--intype=nca".into(),
                dir_arg("romfsdir", out_dir),
                nca.into(),
            ],
            Self::Package2 { package2, out_dir } => vec![
                "-x".into(),
                "--intype=package2".into(),
                dir_arg("outdir", out_dir),
                package2.into(),
            ],
            Self::Ini1 { ini1, out_dir } => vec![
                "-x".into(),
                "--intype=ini1".into(),
                dir_arg("outdir", out_dir),
                ini1.into(),
            ],
            Self::Input {
                input,
                input_type,
                out_dir,
            } => {
                let dir_name = match input_type {
                    InputType::Nca => "romfsdir",
                    InputType::Xci => "updatedir",
                    InputType::Romfs | InputType::Hfs0 => "outdir",
                };

                vec![
                    format!("--intype={input_type}").into(),
                    dir_arg(dir_name, out_dir),
                    input.into(),
                ]
            }
        }
    }
}

/// Decrypts and unpacks NCAs and related containers.
pub trait Decryptor {
    /// Return the human-readable information dump for an NCA.
    fn inspect(&self, path: &Path) -> Result<String>;

    fn extract(&self, extraction: &Extraction) -> Result<()>;
}

/// [`Decryptor`] backed by `hactool`.
#[derive(Clone, Debug)]
pub struct Hactool {
    path: PathBuf,
    keyset: PathBuf,
    dev: bool,
}

impl Hactool {
    pub const NAME: &str = "hactool";

    pub fn new(path: PathBuf, keyset: PathBuf, dev: bool) -> Self {
        Self { path, keyset, dev }
    }

    /// Default location of the keyset in the user's home directory.
    pub fn default_keyset(home: &Path, dev: bool) -> PathBuf {
        let name = if dev { "dev.keys" } else { "prod.keys" };
        home.join(".switch").join(name)
    }

    /// Use `explicit` if given, otherwise the default keyset. Either way, the
    /// file must exist.
    pub fn locate_keyset(explicit: Option<&Path>, dev: bool) -> Result<PathBuf> {
        let path = match explicit {
            Some(p) => p.to_owned(),
            None => {
                let home = env::var_os("HOME")
                    .or_else(|| env::var_os("USERPROFILE"))
                    .ok_or(Error::NoHomeDir)?;
                Self::default_keyset(Path::new(&home), dev)
            }
        };

        if !path.is_file() {
            return Err(Error::KeysetNotFound(path));
        }

        debug!("Using keyset: {path:?}");

        Ok(path)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.path);
        if self.dev {
            command.arg("--dev");
        }
        let mut keyset = OsString::from("--keyset=");
        keyset.push(&self.keyset);
        command.arg(keyset);
        command
    }
}

impl Decryptor for Hactool {
    fn inspect(&self, path: &Path) -> Result<String> {
        let mut command = self.command();
        command.arg(path);

        tool::run_strict(&mut command)
    }

    fn extract(&self, extraction: &Extraction) -> Result<()> {
        debug!("Extracting: {extraction:?}");

        let mut command = self.command();
        command.args(extraction.args());

        tool::run_strict(&mut command)?;

        let expected = match extraction {
            Extraction::Package2 { out_dir, .. } => Some(out_dir.join(INI1_NAME)),
            Extraction::Ini1 { out_dir, .. } => Some(out_dir.join(FS_KIP_NAME)),
            _ => None,
        };

        if let Some(path) = expected {
            if !path.is_file() {
                return Err(Error::MissingOutput(path));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn extraction_args() {
        let args = Extraction::Input {
            input: Path::new("fw.xci"),
            input_type: InputType::Xci,
            out_dir: Path::new("fw_update"),
        }
        .args();

        assert_eq!(args, ["--intype=xci", "--updatedir=fw_update", "fw.xci"]);

        let args = Extraction::Romfs {
            nca: Path::new("a.nca"),
            out_dir: Path::new("out"),
        }
        .args();

        assert_eq!(args, ["-x", "--intype=nca", "--romfsdir=out", "a.nca"]);
    }

    #[cfg(unix)]
    #[test]
    fn extraction_args_non_utf8() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = Path::new(OsStr::from_bytes(b"out\xff"));
        let ini1 = Path::new(OsStr::from_bytes(b"\xfe.bin"));

        let args = Extraction::Ini1 { ini1, out_dir: dir }.args();

        assert_eq!(args[2].as_bytes(), b"--outdir=out\xff");
        assert_eq!(args[3].as_bytes(), b"\xfe.bin");
    }

    #[test]
    fn detect_input_type() {
        let dir = tempfile::tempdir().unwrap();

        let xci = dir.path().join("game.XCI");
        fs::write(&xci, b"").unwrap();
        assert_eq!(InputType::detect(&xci).unwrap(), Some(InputType::Xci));

        let hfs0 = dir.path().join("update.bin");
        fs::write(&hfs0, b"HFS0\x01\x00").unwrap();
        assert_eq!(InputType::detect(&hfs0).unwrap(), Some(InputType::Hfs0));

        let short = dir.path().join("short.bin");
        fs::write(&short, b"HF").unwrap();
        assert_eq!(InputType::detect(&short).unwrap(), None);
    }
}
