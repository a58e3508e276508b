// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Verified transformations of a decompressed KIP body.

use thiserror::Error;

use crate::error::ErrorKind;

pub mod delta;
pub mod document;
pub mod offsets;

pub use delta::DeltaPatcher;
pub use document::PatchDocument;
pub use offsets::{PatchEntry, PatchSet};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Data at offset {offset:#x} ( {actual} ) does not match expected ( {expected} )")]
    ExpectedMismatch {
        offset: usize,
        actual: String,
        expected: String,
    },
    #[error("Data at offset {offset:#x} ( {actual} ) does not match written ( {expected} )")]
    WriteMismatch {
        offset: usize,
        actual: String,
        expected: String,
    },
    #[error("Range {offset:#x}+{length:#x} exceeds body size {size:#x}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },
    #[error("Delta patch error")]
    Delta(#[from] delta::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ExpectedMismatch { .. } | Self::WriteMismatch { .. } | Self::OutOfBounds { .. } => {
                ErrorKind::Verification
            }
            Self::Delta(e) => e.kind(),
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

/// A verified transformation of a decompressed KIP body. Implementations check
/// that the body is the one they were written for before changing anything.
pub trait BodyPatcher {
    fn patcher_name(&self) -> &str;

    fn patch(&self, body: &mut Vec<u8>) -> Result<()>;
}
