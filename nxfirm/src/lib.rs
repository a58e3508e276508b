// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Since nxfirm is primarily an application and not a library, the semver
//! versioning covers the CLI only. All Rust APIs can change at any time, even
//! in patch releases.
//!
//! External programs (decryption, archive extraction, delta patching) and
//! remote documents are only reached through the traits in [`tool`] and
//! [`fetch`], so the rest of the library can be exercised without them.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod escape;
pub mod fetch;
pub mod format;
pub mod hash;
pub mod materialize;
pub mod package;
pub mod patch;
pub mod stream;
pub mod tool;
pub mod util;
