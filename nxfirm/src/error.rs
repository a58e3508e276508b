// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, io};

use crate::{
    catalog, fetch,
    format::{blz, bootmedia, kip, sysver},
    materialize, package, patch, tool,
};

/// Coarse category of a failure. Every module error maps onto exactly one of
/// these through its `kind()` method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or truncated input data.
    Format,
    /// Data did not match an expected hash or byte sequence.
    Verification,
    /// A component or assembled image has the wrong size.
    SizeInvariant,
    /// Something required could not be found.
    Resolution,
    /// An external program failed.
    ExternalTool,
    /// A remote fetch failed.
    Network,
    /// Local I/O failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Format => "format error",
            Self::Verification => "verification error",
            Self::SizeInvariant => "size invariant error",
            Self::Resolution => "resolution error",
            Self::ExternalTool => "external tool error",
            Self::Network => "network error",
            Self::Io => "I/O error",
        };

        f.write_str(name)
    }
}

macro_rules! try_kind {
    ($cause:expr, $($ty:ty),+ $(,)?) => {
        $(
            if let Some(e) = $cause.downcast_ref::<$ty>() {
                return Some(e.kind());
            }
        )+
    };
}

fn module_kind(cause: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    try_kind!(
        cause,
        blz::Error,
        kip::Error,
        sysver::Error,
        bootmedia::Error,
        catalog::Error,
        package::Error,
        patch::Error,
        patch::document::Error,
        patch::delta::Error,
        tool::Error,
        fetch::Error,
        materialize::Error,
    );

    None
}

/// Find the category of an error chain. The outermost library error decides.
/// Bare I/O errors are only used when no library error is present.
pub fn classify(error: &anyhow::Error) -> Option<ErrorKind> {
    if let Some(kind) = error.chain().find_map(module_kind) {
        return Some(kind);
    }

    error
        .chain()
        .any(|c| c.is::<io::Error>())
        .then_some(ErrorKind::Io)
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn outermost_library_kind_wins() {
        let error = blz::decompress(&[0u8; 4])
            .map_err(|e| kip::Error::Decompress("text", e))
            .context("Failed to load KIP")
            .unwrap_err();

        assert_eq!(classify(&error), Some(ErrorKind::Format));
    }

    #[test]
    fn truncation_is_format_error() {
        let error = anyhow::Error::new(kip::Error::DataRead(
            "Kip::header",
            io::Error::from(io::ErrorKind::UnexpectedEof),
        ));

        assert_eq!(classify(&error), Some(ErrorKind::Format));
    }

    #[test]
    fn io_errors() {
        let error = anyhow::Error::new(io::Error::other("boom")).context("Failed to write");

        assert_eq!(classify(&error), Some(ErrorKind::Io));
    }

    #[test]
    fn unknown_errors() {
        let error = anyhow::anyhow!("plain message");

        assert_eq!(classify(&error), None);
    }
}
