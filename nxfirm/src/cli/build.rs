// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    env,
    ffi::OsString,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::info;

use crate::{
    catalog::TitleCatalog,
    cli::{status, warning},
    fetch::{self, Fetcher, HttpFetcher, MirrorFetcher},
    format::{
        bootcfg::{BOOT_CONFIG_NAME, BootMenu},
        bootmedia::BootMedia,
        kip::Kip,
    },
    hash,
    materialize::{self, OutputManifest},
    package::{self, Role},
    patch::{BodyPatcher, DeltaPatcher, PatchDocument, document},
    stream::FromReader,
    tool::{
        self, Decryptor, Extraction, Hactool, InputType, KipCompressor, SevenZip,
        hactool::{FS_KIP_NAME, INI1_NAME},
    },
};

const DEFAULT_PATCHES: &str = "nocmac,nogc";

/// Directory under the system temporary directory for cached archives.
const CACHE_DIR_NAME: &str = "nxfirm";

const MICROSD_DIR_NAME: &str = "microSD";

/// Split a comma separated patch list. Names are trimmed, lowercased, sorted,
/// and deduplicated. Empty names are dropped.
fn parse_patch_list(value: &str) -> Vec<String> {
    let mut result = value
        .split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    result.sort();
    result.dedup();
    result
}

/// `<dir>/<stem>_update` for an input package at `<dir>/<stem>.<ext>`.
fn extraction_dir(input: &Path) -> PathBuf {
    let mut path = OsString::from(input.with_extension("").as_os_str());
    path.push("_update");
    PathBuf::from(path)
}

fn output_dir_name(platform: &str, display_version: &str, exfat: bool) -> String {
    let mut name = format!("{platform}-{display_version}");
    if exfat {
        name.push_str("_exfat");
    }
    name
}

fn manifest_url(base_url: &str, version_hash: &str, exfat: bool) -> String {
    let mut url = format!("{}/{version_hash}", base_url.trim_end_matches('/'));
    if exfat {
        url.push_str("_exfat");
    }
    url.push_str(".json");
    url
}

/// Extract a firmware package file into a directory next to it. Directories
/// are used as is.
fn prepare_input(decryptor: &dyn Decryptor, cli: &BuildCli) -> Result<PathBuf> {
    let input = &cli.input;

    if input.is_dir() {
        status!("Using source firmware files from folder {input:?}");
        return Ok(input.clone());
    } else if !input.exists() {
        bail!("Input source firmware package path does not exist: {input:?}");
    }

    let input_type = match cli.intype {
        Some(t) => t,
        None => InputType::detect(input)
            .with_context(|| format!("Failed to read input file: {input:?}"))?
            .ok_or_else(|| {
                anyhow!("Unknown type of input file {input:?}; specify it with --intype")
            })?,
    };

    let out_dir = extraction_dir(input);
    status!("Extracting files from {input:?} to folder {out_dir:?}");

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create directory: {out_dir:?}"))?;

    decryptor
        .extract(&Extraction::Input {
            input,
            input_type,
            out_dir: &out_dir,
        })
        .with_context(|| format!("Failed to extract input package: {input:?}"))?;

    Ok(out_dir)
}

/// Resolve the patches to apply to the decompressed FS KIP body. Returns the
/// patchers in application order and the unpatched output file name.
fn resolve_patchers(
    cli: &BuildCli,
    fetcher: &dyn Fetcher,
    work_dir: &Path,
    fingerprints: &[&str],
    default_name: String,
) -> Result<(Vec<Box<dyn BodyPatcher>>, String)> {
    if let Some(delta) = &cli.fs_delta {
        let Some(base) = &cli.fs_delta_base else {
            bail!("--fs-delta requires --fs-delta-base");
        };

        let program = tool::find_tool(DeltaPatcher::TOOL_NAME)?;
        let patcher = DeltaPatcher::new(
            program,
            delta.clone(),
            base.clone(),
            work_dir.to_owned(),
        );

        return Ok((vec![Box::new(patcher)], default_name));
    }

    let requested = parse_patch_list(&cli.fs_patches);
    if requested.is_empty() {
        info!("No FS patches requested");
        return Ok((vec![], default_name));
    }

    let url = format!(
        "{}/{}",
        cli.base_url.trim_end_matches('/'),
        fetch::FS_PATCHES_NAME,
    );
    let data = fetcher
        .fetch(&url)
        .with_context(|| format!("Failed to fetch FS patch definitions: {url}"))?;
    let document = PatchDocument::from_json(&data)
        .with_context(|| format!("Failed to load FS patch definitions: {url}"))?;

    let version = document
        .find_version(fingerprints)
        .context("This firmware is not supported (yet?)")?;

    let mut patchers: Vec<Box<dyn BodyPatcher>> = vec![];

    for name in &requested {
        match version.patch_set(name)? {
            Some(set) => {
                info!(
                    "Patch {name:?} on {:?} has {} entries",
                    version.name,
                    set.entries.len(),
                );
                patchers.push(Box::new(set));
            }
            None => {
                status!(
                    "Patch {name:?} does not need to be applied on {:?}, skipping",
                    version.name,
                );
            }
        }
    }

    Ok((patchers, version.name.clone()))
}

pub fn build_main(cli: &BuildCli) -> Result<()> {
    let keyset = Hactool::locate_keyset(cli.keyset.as_deref(), cli.dev)?;
    let hactool = Hactool::new(tool::find_tool(Hactool::NAME)?, keyset, cli.dev);

    let fetcher: Box<dyn Fetcher> = match &cli.mirror {
        Some(dir) => Box::new(MirrorFetcher::new(dir.clone())),
        None => Box::new(HttpFetcher::new(cli.nossl)),
    };

    let source_dir = prepare_input(&hactool, cli)?;
    let source_dir = fs::canonicalize(&source_dir)
        .with_context(|| format!("Failed to resolve path: {source_dir:?}"))?;

    let catalog = TitleCatalog::scan(&source_dir, &hactool)
        .with_context(|| format!("Failed to scan firmware files: {source_dir:?}"))?;
    status!(
        "Found {} meta and {} data NCAs in {source_dir:?}",
        catalog.meta_count(),
        catalog.data_count(),
    );

    // Removed on drop, including when bailing out early.
    let temp_dir = tempfile::TempDir::new().context("Failed to create temporary directory")?;
    let work_dir = temp_dir.path();

    let version = package::load_system_version(&hactool, &catalog, work_dir)?;
    status!("Package contains {version}");

    let selection = package::select_packages(&catalog, !cli.noexfat)?;
    let exfat = selection.is_exfat();
    let platform = version.platform.to_ascii_lowercase();

    status!("Using TitleID {} for Normal firmware package", selection.normal.title_id);
    let normal = package::load_boot_package(
        &hactool,
        Role::Normal,
        &selection.normal,
        work_dir,
        &platform,
    )?;

    status!("Using TitleID {} for SAFE firmware package", selection.safe.title_id);
    let safe =
        package::load_boot_package(&hactool, Role::Safe, &selection.safe, work_dir, &platform)?;

    let media = BootMedia::assemble(&normal.boot, &safe.boot)?;

    let kip_dir = work_dir.join("kip");
    fs::create_dir_all(&kip_dir)
        .with_context(|| format!("Failed to create directory: {kip_dir:?}"))?;

    hactool.extract(&Extraction::Package2 {
        package2: &normal.package2_path,
        out_dir: &kip_dir,
    })?;
    hactool.extract(&Extraction::Ini1 {
        ini1: &kip_dir.join(INI1_NAME),
        out_dir: &kip_dir,
    })?;

    let fs_kip_path = kip_dir.join(FS_KIP_NAME);
    let raw_fingerprint = hash::file_fingerprint(&fs_kip_path)
        .with_context(|| format!("Failed to hash {fs_kip_path:?}"))?;

    status!(
        "Decompressing {FS_KIP_NAME} from TitleID {} hash {raw_fingerprint}",
        selection.normal.title_id,
    );

    let mut kip = crate::cli::kip::read_kip(&fs_kip_path)?;
    kip.decompress()
        .with_context(|| format!("Failed to decompress {fs_kip_path:?}"))?;

    let mut body = kip.to_vec()?;
    let body_fingerprint = hash::fingerprint(&hash::sha256(&body));

    let default_name = format!(
        "FS{}{}.kip1",
        version.digits(),
        if exfat { "-exfat" } else { "" },
    );
    let (patchers, base_name) = resolve_patchers(
        cli,
        fetcher.as_ref(),
        work_dir,
        &[body_fingerprint.as_str(), raw_fingerprint.as_str()],
        default_name,
    )?;

    let mut applied = vec![];

    for patcher in &patchers {
        let name = patcher.patcher_name().to_owned();
        status!("Applying patch {name:?} on {base_name:?}");

        patcher
            .patch(&mut body)
            .with_context(|| format!("Failed to apply patch {name:?}"))?;
        applied.push(name);
    }

    let kip = Kip::from_reader(Cursor::new(&body)).context("Failed to parse patched FS KIP")?;
    let kip_name = document::patched_file_name(&base_name, &applied);
    let patched_path = work_dir.join(&kip_name);

    let compressor = if cli.kip1decomp {
        KipCompressor::External(tool::find_tool(KipCompressor::EXTERNAL_NAME)?)
    } else {
        KipCompressor::Builtin
    };

    status!("Compressing {kip_name}...");
    let sizes = compressor
        .write_compressed(&kip, &patched_path)
        .with_context(|| format!("Failed to compress {patched_path:?}"))?;
    status!(
        "Compressed {kip_name} from {} to {} bytes",
        sizes.uncompressed,
        sizes.compressed,
    );

    let out_name = output_dir_name(&version.platform, &version.display_version, exfat);
    let out_dir = cli.output_dir.join(&out_name);

    if out_dir.exists() {
        warning!("Replacing existing output directory {out_dir:?}");
        fs::remove_dir_all(&out_dir)
            .with_context(|| format!("Failed to remove directory: {out_dir:?}"))?;
    }

    status!("Writing microSD files");

    let microsd_dir = out_dir.join(MICROSD_DIR_NAME);
    fs::create_dir_all(&microsd_dir)
        .with_context(|| format!("Failed to create directory: {microsd_dir:?}"))?;

    let kip_target = microsd_dir.join(&kip_name);
    fs::copy(&patched_path, &kip_target)
        .with_context(|| format!("Failed to copy {patched_path:?} to {kip_target:?}"))?;

    let menu = BootMenu {
        version_digits: version.digits(),
        exfat,
        applied_patches: applied,
        kip_name,
    };
    let menu_path = microsd_dir.join(BOOT_CONFIG_NAME);
    fs::write(&menu_path, menu.to_string())
        .with_context(|| format!("Failed to write {menu_path:?}"))?;

    let url = manifest_url(&cli.base_url, &version.version_hash, exfat);
    let data = fetcher
        .fetch(&url)
        .with_context(|| format!("No index on server for {out_name}"))?;
    let manifest = OutputManifest::from_json(&data)
        .with_context(|| format!("Failed to load output manifest: {url}"))?;

    materialize::check_contents(&manifest, &catalog)?;

    let archive = match &manifest.archive {
        Some(a) => {
            let cache_dir = env::temp_dir().join(CACHE_DIR_NAME);
            Some(materialize::ensure_archive(fetcher.as_ref(), a, &cache_dir)?)
        }
        None => None,
    };

    status!("Writing partition images");
    media.write_to_dir(&out_dir)?;

    materialize::create_dirs(&manifest, &out_dir)?;
    materialize::copy_contents(&manifest, &catalog, &out_dir)?;

    if let Some(path) = archive {
        let extractor = SevenZip::new(tool::find_tool(SevenZip::NAME)?);
        materialize::extract_archive(&extractor, &path, &out_dir)?;
    }

    materialize::verify_files(&manifest, &out_dir)?;

    status!("All files verified! Prepared firmware update is in folder {out_dir:?}");

    Ok(())
}

/// Build a prepared firmware update from a set of firmware files.
///
/// The input is either a directory containing the firmware NCAs or a firmware
/// package (XCI, HFS0, NCA, or romfs) that is first extracted next to itself.
#[derive(Debug, Parser)]
pub struct BuildCli {
    /// Firmware directory or package.
    #[arg(value_name = "PATH", value_parser)]
    pub input: PathBuf,

    /// Path to keyset file.
    ///
    /// Defaults to ~/.switch/prod.keys, or ~/.switch/dev.keys with --dev.
    #[arg(long, value_name = "FILE", value_parser)]
    pub keyset: Option<PathBuf>,

    /// Decrypt with development keys instead of retail.
    #[arg(long)]
    pub dev: bool,

    /// Only use the standard (FAT32) firmware packages.
    #[arg(long)]
    pub noexfat: bool,

    /// Request remote documents over plain HTTP.
    #[arg(long)]
    pub nossl: bool,

    /// Comma separated list of FS patches to apply. Empty means none.
    #[arg(long, value_name = "PATCHES", default_value = DEFAULT_PATCHES)]
    pub fs_patches: String,

    /// Type of the input package if it cannot be detected.
    #[arg(long, value_name = "TYPE")]
    pub intype: Option<InputType>,

    /// Patch the FS KIP with a VCDIFF delta instead of the patch definitions.
    #[arg(long, value_name = "FILE", value_parser, requires = "fs_delta_base")]
    pub fs_delta: Option<PathBuf>,

    /// Fingerprint of the decompressed FS KIP that the delta applies to.
    #[arg(long, value_name = "HASH", requires = "fs_delta")]
    pub fs_delta_base: Option<String>,

    /// Compress the patched KIP with the external kip1decomp tool.
    #[arg(long)]
    pub kip1decomp: bool,

    /// Serve remote documents and archives from a local directory.
    #[arg(long, value_name = "DIR", value_parser)]
    pub mirror: Option<PathBuf>,

    /// Base URL for patch definitions and output manifests.
    #[arg(long, value_name = "URL", default_value = fetch::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Directory to create the output folder in.
    #[arg(short, long, value_name = "DIR", value_parser, default_value = ".")]
    pub output_dir: PathBuf,
}
