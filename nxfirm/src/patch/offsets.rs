// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::ops::Range;

use tracing::{debug, info};

use crate::patch::{BodyPatcher, Error, Result};

/// Replace `replacement.len()` bytes at `offset` if the body currently holds
/// `expected` there. The two lengths may differ. Later entries are never
/// shifted to compensate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchEntry {
    pub offset: usize,
    pub expected: Vec<u8>,
    pub replacement: Vec<u8>,
}

impl PatchEntry {
    fn range(&self, length: usize, size: usize) -> Result<Range<usize>> {
        self.offset
            .checked_add(length)
            .filter(|end| *end <= size)
            .map(|end| self.offset..end)
            .ok_or(Error::OutOfBounds {
                offset: self.offset,
                length,
                size,
            })
    }

    pub fn apply(&self, body: &mut [u8]) -> Result<()> {
        let expected_range = self.range(self.expected.len(), body.len())?;
        let actual = &body[expected_range];
        if actual != self.expected {
            return Err(Error::ExpectedMismatch {
                offset: self.offset,
                actual: hex::encode(actual),
                expected: hex::encode(&self.expected),
            });
        }

        let replacement_range = self.range(self.replacement.len(), body.len())?;
        body[replacement_range.clone()].copy_from_slice(&self.replacement);

        let written = &body[replacement_range];
        if written != self.replacement {
            return Err(Error::WriteMismatch {
                offset: self.offset,
                actual: hex::encode(written),
                expected: hex::encode(&self.replacement),
            });
        }

        debug!(
            "Written to {:#x}: {}",
            self.offset,
            hex::encode_upper(written),
        );

        Ok(())
    }
}

/// A named, ordered list of offset patches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSet {
    pub name: String,
    pub entries: Vec<PatchEntry>,
}

impl BodyPatcher for PatchSet {
    fn patcher_name(&self) -> &str {
        &self.name
    }

    fn patch(&self, body: &mut Vec<u8>) -> Result<()> {
        info!("Applying {} entries of patch {:?}", self.entries.len(), self.name);

        for entry in &self.entries {
            entry.apply(body)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(offset: usize, expected: &[u8], replacement: &[u8]) -> PatchEntry {
        PatchEntry {
            offset,
            expected: expected.to_vec(),
            replacement: replacement.to_vec(),
        }
    }

    #[test]
    fn different_lengths_do_not_shift() {
        let mut body = b"0123456789".to_vec();

        entry(2, b"234", b"ab").apply(&mut body).unwrap();
        assert_eq!(body, b"01ab456789");

        entry(6, b"6", b"xyz").apply(&mut body).unwrap();
        assert_eq!(body, b"01ab45xyz9");
    }

    #[test]
    fn out_of_bounds() {
        let mut body = b"0123".to_vec();

        assert_matches!(
            entry(3, b"34", b"ab").apply(&mut body),
            Err(Error::OutOfBounds { offset: 3, length: 2, size: 4 })
        );
        assert_matches!(
            entry(3, b"3", b"ab").apply(&mut body),
            Err(Error::OutOfBounds { offset: 3, length: 2, size: 4 })
        );
        assert_matches!(
            entry(usize::MAX, b"3", b"a").apply(&mut body),
            Err(Error::OutOfBounds { .. })
        );
        assert_eq!(body, b"0123");
    }
}
