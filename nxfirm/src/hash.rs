// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Content fingerprints. Components, files, and containers are all identified
//! by (a prefix of) the lowercase hex SHA-256 digest of their contents.

use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use ring::digest::{Context, Digest, SHA256};

use crate::stream::HashingReader;

/// Number of digest bytes used for content ids and version fingerprints.
pub const FINGERPRINT_SIZE: usize = 16;

/// Compute the SHA-256 digest of a file.
pub fn sha256_file(path: &Path) -> io::Result<[u8; 32]> {
    let file = File::open(path)?;
    let mut reader = HashingReader::new(BufReader::new(file), Context::new(&SHA256));

    io::copy(&mut reader, &mut io::sink())?;

    let (_, context) = reader.finish();
    Ok(to_array(context.finish()))
}

/// Compute the SHA-256 digest of a buffer.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    to_array(ring::digest::digest(&SHA256, data))
}

fn to_array(digest: Digest) -> [u8; 32] {
    let mut result = [0u8; 32];
    result.copy_from_slice(digest.as_ref());
    result
}

/// Truncated hex fingerprint of a digest.
pub fn fingerprint(digest: &[u8; 32]) -> String {
    hex::encode(&digest[..FINGERPRINT_SIZE])
}

/// Truncated hex fingerprint of a file.
pub fn file_fingerprint(path: &Path) -> io::Result<String> {
    sha256_file(path).map(|d| fingerprint(&d))
}

/// Check whether a full hex digest matches an expected hash, which may be
/// truncated. The comparison is case-insensitive. Returns the prefix of the
/// actual digest that was compared, for use in error messages.
pub fn matches_prefix(digest: &[u8; 32], expected: &str) -> (bool, String) {
    let full = hex::encode(digest);
    let actual = &full[..expected.len().min(full.len())];
    let matched = !expected.is_empty() && actual.eq_ignore_ascii_case(expected);

    (matched, actual.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_half_digest() {
        let digest = sha256(b"");
        let fp = fingerprint(&digest);

        assert_eq!(fp, "e3b0c44298fc1c149afbf4c8996fb924");
    }

    #[test]
    fn prefix_matching() {
        let digest = sha256(b"");

        assert_eq!(
            matches_prefix(&digest, "E3B0C442"),
            (true, "e3b0c442".to_owned()),
        );
        assert_eq!(
            matches_prefix(&digest, "e3b0c443"),
            (false, "e3b0c442".to_owned()),
        );
        assert!(!matches_prefix(&digest, "").0);
    }
}
