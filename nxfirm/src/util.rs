// SPDX-FileCopyrightText: 2023-2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    ops::{Bound, RangeBounds},
    path::{Component, Path, PathBuf},
};

use num_traits::PrimInt;
use thiserror::Error;

/// A small wrapper to format a number as a size in bytes.
#[derive(Clone, Copy)]
pub struct NumBytes<T: PrimInt>(pub T);

impl<T: PrimInt + fmt::Debug> fmt::Debug for NumBytes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == T::one() {
            write!(f, "<{:?} byte>", self.0)
        } else {
            write!(f, "<{:?} bytes>", self.0)
        }
    }
}

/// A string whose [`fmt::Debug`] implementation prints the string verbatim.
/// This is used for embedding preformatted values, like commands, into error
/// messages.
#[derive(Clone)]
pub struct DebugString(String);

impl DebugString {
    pub fn new(value: impl fmt::Debug) -> Self {
        Self(format!("{value:?}"))
    }
}

impl fmt::Debug for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("{value} not in bounds: {start:?}..{end:?}")]
pub struct OutOfBoundsError {
    value: String,
    start: Bound<String>,
    end: Bound<String>,
}

/// Return `value` unchanged if it is within `bounds`.
pub fn check_bounds<T, R>(value: T, bounds: R) -> Result<T, OutOfBoundsError>
where
    T: PartialOrd + fmt::Display,
    R: RangeBounds<T>,
{
    if bounds.contains(&value) {
        return Ok(value);
    }

    let map = |b: Bound<&T>| match b {
        Bound::Included(v) => Bound::Included(v.to_string()),
        Bound::Excluded(v) => Bound::Excluded(v.to_string()),
        Bound::Unbounded => Bound::Unbounded,
    };

    Err(OutOfBoundsError {
        value: value.to_string(),
        start: map(bounds.start_bound()),
        end: map(bounds.end_bound()),
    })
}

/// Join an untrusted relative path onto `root`. Both `/` and `\` are treated
/// as separators. Returns [`None`] if the path is empty, absolute, or contains
/// anything other than normal components.
pub fn join_relative(root: &Path, untrusted: &str) -> Option<PathBuf> {
    let normalized = untrusted.replace('\\', "/");
    let relative = Path::new(&normalized);
    let mut result = root.to_path_buf();
    let mut components = 0;

    for component in relative.components() {
        match component {
            Component::Normal(c) => {
                result.push(c);
                components += 1;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    if components == 0 {
        return None;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn bounds() {
        assert_eq!(check_bounds(5u32, ..=5).unwrap(), 5);
        assert!(check_bounds(6u32, ..=5).is_err());
        assert!(check_bounds(0u32, 1..).is_err());
    }

    #[test]
    fn relative_join() {
        let root = Path::new("out");

        assert_eq!(
            join_relative(root, "SYSTEM/Contents/registered").unwrap(),
            Path::new("out/SYSTEM/Contents/registered"),
        );
        assert_eq!(
            join_relative(root, "SYSTEM\\save\\8000000000000120").unwrap(),
            Path::new("out/SYSTEM/save/8000000000000120"),
        );
        assert_eq!(join_relative(root, "./a").unwrap(), Path::new("out/a"));
        assert_eq!(join_relative(root, "../a"), None);
        assert_eq!(join_relative(root, "a/../../b"), None);
        assert_eq!(join_relative(root, "/etc/passwd"), None);
        assert_eq!(join_relative(root, ""), None);
    }
}
