// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

pub const BOOT_CONFIG_NAME: &str = "hekate_ipl.ini";

/// Patch that makes the stock entry unsafe to boot with the game card reader.
const GC_PATCH: &str = "nogc";

/// Boot menu (`hekate_ipl.ini`) with a stock entry and an entry that loads the
/// patched FS KIP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootMenu {
    /// Display version without dots, eg. `510`.
    pub version_digits: String,
    pub exfat: bool,
    /// Patches that were actually applied, in application order.
    pub applied_patches: Vec<String>,
    /// File name of the patched KIP next to the config.
    pub kip_name: String,
}

impl BootMenu {
    pub fn stock_section(&self) -> String {
        let mut name = "stock".to_owned();
        if self.applied_patches.iter().any(|p| p == GC_PATCH) {
            name.push_str("-POTENTIALLY_UNSAFE_FOR_GC_READER");
        }
        name
    }

    pub fn fs_section(&self) -> String {
        let mut name = format!("FS_{}", self.version_digits);
        if self.exfat {
            name.push_str("-exfat");
        }
        if !self.applied_patches.is_empty() {
            name.push('_');
            name.push_str(&self.applied_patches.join("_"));
        }
        name
    }
}

impl fmt::Display for BootMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.stock_section())?;
        writeln!(f, "[{}]", self.fs_section())?;
        writeln!(f, "kip1={}", self.kip_name)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpatched() {
        let menu = BootMenu {
            version_digits: "510".to_owned(),
            exfat: false,
            applied_patches: vec![],
            kip_name: "FS510.kip1".to_owned(),
        };

        assert_eq!(menu.to_string(), "[stock]\n[FS_510]\nkip1=FS510.kip1\n\n");
    }

    #[test]
    fn patched_exfat() {
        let menu = BootMenu {
            version_digits: "510".to_owned(),
            exfat: true,
            applied_patches: vec!["nocmac".to_owned(), "nogc".to_owned()],
            kip_name: "FS510-exfat_nocmac_nogc.kip1".to_owned(),
        };

        assert_eq!(
            menu.to_string(),
            "[stock-POTENTIALLY_UNSAFE_FOR_GC_READER]\n\
             [FS_510-exfat_nocmac_nogc]\n\
             kip1=FS510-exfat_nocmac_nogc.kip1\n\n",
        );
    }
}
