// SPDX-FileCopyrightText: 2023-2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use num_traits::PrimInt;

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a page boundary.
pub fn calc<N: PrimInt>(offset: N, page_size: N) -> N {
    let r = offset % page_size;
    if r == N::zero() {
        N::zero()
    } else {
        page_size - r
    }
}

pub trait ZeroPadding {
    /// Trim trailing zeros. Intermediate zeros before the last non-zero byte
    /// are kept.
    fn trim_end_padding(&self) -> &[u8];

    /// Return the slice as an array padded with zeros at the end.
    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]>;

    /// Return the slice as a [`Vec`] padded with zeros at the end to exactly
    /// `size` bytes.
    fn to_padded_vec(&self, size: usize) -> Option<Vec<u8>>;
}

impl ZeroPadding for [u8] {
    fn trim_end_padding(&self) -> &[u8] {
        let first_ending_zero = self
            .iter()
            .rposition(|b| *b != 0)
            .map(|pos| pos + 1)
            .unwrap_or_default();

        &self[..first_ending_zero]
    }

    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]> {
        if self.len() > N {
            return None;
        }

        let mut result = [0u8; N];
        result[..self.len()].copy_from_slice(self);

        Some(result)
    }

    fn to_padded_vec(&self, size: usize) -> Option<Vec<u8>> {
        if self.len() > size {
            return None;
        }

        let mut result = self.to_vec();
        result.resize(size, 0);

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_calc() {
        assert_eq!(calc(0u32, 4), 0);
        assert_eq!(calc(5u32, 4), 3);
        assert_eq!(calc(8usize, 4), 0);
    }

    #[test]
    fn zero_padding() {
        assert_eq!(b"FS\0\0\0".trim_end_padding(), b"FS");
        assert_eq!(b"a\0b\0".trim_end_padding(), b"a\0b");
        assert_eq!(b"FS".to_padded_array::<4>(), Some(*b"FS\0\0"));
        assert_eq!(b"FSFS".to_padded_array::<2>(), None);
        assert_eq!(b"ab".to_padded_vec(3), Some(b"ab\0".to_vec()));
        assert_eq!(b"abcd".to_padded_vec(3), None);
    }
}
