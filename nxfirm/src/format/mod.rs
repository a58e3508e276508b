// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

pub mod blz;
pub mod bootcfg;
pub mod bootmedia;
pub mod kip;
pub mod padding;
pub mod sysver;
