// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{status, warning},
    format::kip::{Kip, SEGMENT_NAMES},
    stream::{FromReader, ToWriter},
    tool::KipCompressor,
};

pub fn read_kip(path: &Path) -> Result<Kip> {
    let file = File::open(path).with_context(|| format!("Failed to open for reading: {path:?}"))?;
    let reader = BufReader::new(file);
    let kip =
        Kip::from_reader(reader).with_context(|| format!("Failed to read KIP: {path:?}"))?;

    Ok(kip)
}

fn write_kip(path: &Path, kip: &Kip) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to open for writing: {path:?}"))?;
    let mut writer = BufWriter::new(file);
    kip.to_writer(&mut writer)
        .with_context(|| format!("Failed to write KIP: {path:?}"))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush KIP: {path:?}"))?;

    Ok(())
}

fn read_header(path: &Path) -> Result<Kip> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read header TOML: {path:?}"))?;
    let kip = toml_edit::de::from_str(&data)
        .with_context(|| format!("Failed to parse header TOML: {path:?}"))?;

    Ok(kip)
}

fn write_header(path: &Path, kip: &Kip) -> Result<()> {
    let data = toml_edit::ser::to_string_pretty(kip)
        .with_context(|| format!("Failed to serialize header TOML: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write header TOML: {path:?}"))?;

    Ok(())
}

fn segment_path(prefix: &Path, name: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(name);
    PathBuf::from(path)
}

fn display_info(cli: &KipCli, kip: &Kip) {
    if !cli.quiet {
        if cli.debug {
            println!("{kip:#?}");
        } else {
            println!("{kip}");
        }
    }
}

fn unpack_subcommand(kip_cli: &KipCli, cli: &UnpackCli) -> Result<()> {
    let kip = read_kip(&cli.input)?;
    display_info(kip_cli, &kip);

    write_header(&cli.output_header, &kip)?;

    for (name, segment) in SEGMENT_NAMES.iter().zip(&kip.segments) {
        if segment.data.is_empty() {
            continue;
        }

        let path = segment_path(&cli.output_segment_prefix, name);
        fs::write(&path, &segment.data)
            .with_context(|| format!("Failed to write segment: {path:?}"))?;
    }

    Ok(())
}

fn pack_subcommand(kip_cli: &KipCli, cli: &PackCli) -> Result<()> {
    let mut kip = read_header(&cli.input_header)?;

    for (name, segment) in SEGMENT_NAMES.iter().zip(&mut kip.segments) {
        let path = segment_path(&cli.input_segment_prefix, name);

        segment.data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => vec![],
            Err(e) => Err(e).with_context(|| format!("Failed to read segment: {path:?}"))?,
        };
    }

    display_info(kip_cli, &kip);
    write_kip(&cli.output, &kip)?;

    Ok(())
}

fn decompress_subcommand(kip_cli: &KipCli, cli: &DecompressCli) -> Result<()> {
    let mut kip = read_kip(&cli.input)?;
    if !kip.is_compressed() {
        warning!("KIP has no compressed segments: {:?}", cli.input);
    }

    kip.decompress()
        .with_context(|| format!("Failed to decompress KIP: {:?}", cli.input))?;

    display_info(kip_cli, &kip);
    write_kip(&cli.output, &kip)?;

    Ok(())
}

fn compress_subcommand(kip_cli: &KipCli, cli: &CompressCli) -> Result<()> {
    let mut kip = read_kip(&cli.input)?;
    kip.decompress()
        .with_context(|| format!("Failed to decompress KIP: {:?}", cli.input))?;

    let compressor = match &cli.kip1decomp {
        Some(path) => KipCompressor::External(path.clone()),
        None => KipCompressor::Builtin,
    };

    let sizes = compressor
        .write_compressed(&kip, &cli.output)
        .with_context(|| format!("Failed to compress KIP: {:?}", cli.output))?;

    if !kip_cli.quiet {
        status!(
            "Compressed {} bytes to {} bytes",
            sizes.uncompressed,
            sizes.compressed,
        );
    }

    Ok(())
}

fn info_subcommand(kip_cli: &KipCli, cli: &InfoCli) -> Result<()> {
    let kip = read_kip(&cli.input)?;
    display_info(kip_cli, &kip);

    Ok(())
}

pub fn kip_main(cli: &KipCli) -> Result<()> {
    match &cli.command {
        KipCommand::Unpack(c) => unpack_subcommand(cli, c),
        KipCommand::Pack(c) => pack_subcommand(cli, c),
        KipCommand::Decompress(c) => decompress_subcommand(cli, c),
        KipCommand::Compress(c) => compress_subcommand(cli, c),
        KipCommand::Info(c) => info_subcommand(cli, c),
    }
}

/// Unpack a KIP into its header and segments.
///
/// Segments are written as stored. Compressed segments stay compressed.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output header TOML.
    #[arg(long, value_name = "FILE", value_parser, default_value = "header.toml")]
    output_header: PathBuf,

    /// Path prefix for output segments.
    #[arg(long, value_name = "FILE", value_parser, default_value = "segment.")]
    output_segment_prefix: PathBuf,
}

/// Pack a KIP from its header and segments.
#[derive(Debug, Parser)]
struct PackCli {
    /// Path to output KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Path to input header TOML.
    #[arg(long, value_name = "FILE", value_parser, default_value = "header.toml")]
    input_header: PathBuf,

    /// Path prefix for input segments.
    ///
    /// Missing segment files are packed as empty segments.
    #[arg(long, value_name = "FILE", value_parser, default_value = "segment.")]
    input_segment_prefix: PathBuf,
}

/// Decompress all segments of a KIP.
#[derive(Debug, Parser)]
struct DecompressCli {
    /// Path to input KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,
}

/// Compress the text, rodata, and data segments of a KIP.
#[derive(Debug, Parser)]
struct CompressCli {
    /// Path to input KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Compress with an external kip1decomp executable.
    #[arg(long, value_name = "FILE", value_parser)]
    kip1decomp: Option<PathBuf>,
}

/// Display KIP header information.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input KIP.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum KipCommand {
    Unpack(UnpackCli),
    Pack(PackCli),
    Decompress(DecompressCli),
    Compress(CompressCli),
    Info(InfoCli),
}

/// Pack, unpack, or (de)compress KIP1 executables.
#[derive(Debug, Parser)]
pub struct KipCli {
    #[command(subcommand)]
    command: KipCommand,

    /// Don't print KIP header information.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print KIP header information in debug format.
    #[arg(short, long, global = true)]
    debug: bool,
}
