// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Backwards LZ ("BLZ") compression as used by KIP1 segments.
//!
//! A compressed buffer consists of an optional raw prefix, a token stream that
//! is read from the end towards the start, some padding, and a 12-byte footer.
//! Decoding also writes the output from the end towards the start, so the
//! format supports in-place decompression as long as the output cursor never
//! overtakes the input cursor.

use std::mem;

use thiserror::Error;
use tracing::trace;
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{error::ErrorKind, format::padding};

pub const FOOTER_SIZE: usize = mem::size_of::<RawFooter>();

/// Largest output that [`decompress`] will produce. This matches the KIP
/// segment size limit.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 0xf + MIN_LENGTH;
const MIN_DISTANCE: usize = 3;
const MAX_DISTANCE: usize = 0xfff + MIN_DISTANCE;

const HASH_BITS: u32 = 15;
const HASH_MASK: usize = (1 << HASH_BITS) - 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Buffer is too small to contain footer: {0} bytes")]
    TooSmall(usize),
    #[error("Compressed size {compressed_size:#x} exceeds buffer size {buffer_size:#x}")]
    InvalidCompressedSize {
        compressed_size: u32,
        buffer_size: usize,
    },
    #[error("Header size {header_size:#x} not in bounds: {min:#x}..={compressed_size:#x}", min = FOOTER_SIZE)]
    InvalidHeaderSize {
        header_size: u32,
        compressed_size: u32,
    },
    #[error("Decompressed size overflows")]
    SizeOverflow,
    #[error("Decompressed size {size:#x} exceeds limit {limit:#x}")]
    OutputTooLarge { size: usize, limit: usize },
    #[error("Input underrun at output offset {0:#x}")]
    InputUnderrun(usize),
    #[error("Copy of {length} bytes at output offset {offset:#x} would enter the raw prefix")]
    OutputOverrun { offset: usize, length: usize },
    #[error("Back reference at output offset {offset:#x} with distance {distance} is out of bounds")]
    ReferenceOutOfBounds { offset: usize, distance: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Format
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the footer at the end of a compressed buffer.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawFooter {
    /// Size of the compressed region, including the token stream, padding,
    /// and this footer. Everything before it is an uncompressed prefix.
    compressed_size: little_endian::U32,
    /// Distance from the end of the token stream to the end of the compressed
    /// region.
    header_size: little_endian::U32,
    /// Number of bytes the decompressed data is larger than the input.
    extra_size: little_endian::U32,
}

/// Decompress a BLZ buffer. Any access outside of the input or output buffers
/// is reported as an error.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < FOOTER_SIZE {
        return Err(Error::TooSmall(data.len()));
    }

    let footer = RawFooter::read_from_bytes(&data[data.len() - FOOTER_SIZE..])
        .map_err(|_| Error::TooSmall(data.len()))?;
    let compressed_size = footer.compressed_size.get();
    let header_size = footer.header_size.get();
    let extra_size = footer.extra_size.get();

    if compressed_size as usize > data.len() {
        return Err(Error::InvalidCompressedSize {
            compressed_size,
            buffer_size: data.len(),
        });
    }
    if (header_size as usize) < FOOTER_SIZE || header_size > compressed_size {
        return Err(Error::InvalidHeaderSize {
            header_size,
            compressed_size,
        });
    }

    let out_size = data
        .len()
        .checked_add(extra_size as usize)
        .ok_or(Error::SizeOverflow)?;
    if out_size > MAX_DECOMPRESSED_SIZE {
        return Err(Error::OutputTooLarge {
            size: out_size,
            limit: MAX_DECOMPRESSED_SIZE,
        });
    }
    let raw_size = data.len() - compressed_size as usize;
    let stream = &data[raw_size..raw_size + (compressed_size - header_size) as usize];

    trace!(
        compressed_size,
        header_size,
        extra_size,
        raw_size,
        "Decompressing BLZ buffer",
    );

    let mut out = Vec::with_capacity(out_size);
    out.extend_from_slice(data);
    out.resize(out_size, 0);

    let mut in_pos = stream.len();
    let mut out_pos = out_size;

    while out_pos > raw_size {
        if in_pos < 1 {
            return Err(Error::InputUnderrun(out_pos));
        }
        in_pos -= 1;
        let mut control = stream[in_pos];

        for _ in 0..8 {
            if control & 0x80 != 0 {
                if in_pos < 2 {
                    return Err(Error::InputUnderrun(out_pos));
                }
                in_pos -= 2;

                let field = u16::from_le_bytes([stream[in_pos], stream[in_pos + 1]]);
                let length = usize::from(field >> 12) + MIN_LENGTH;
                // Offset of the source byte relative to the output cursor
                // before it is decremented.
                let offset = usize::from(field & 0xfff) + MIN_DISTANCE - 1;

                if out_pos - raw_size < length {
                    return Err(Error::OutputOverrun {
                        offset: out_pos,
                        length,
                    });
                }

                for _ in 0..length {
                    let source = out_pos + offset;
                    if source >= out_size {
                        return Err(Error::ReferenceOutOfBounds {
                            offset: out_pos,
                            distance: offset + 1,
                        });
                    }

                    out_pos -= 1;
                    out[out_pos] = out[source];
                }
            } else {
                if in_pos < 1 {
                    return Err(Error::InputUnderrun(out_pos));
                }
                in_pos -= 1;
                out_pos -= 1;
                out[out_pos] = stream[in_pos];
            }

            control <<= 1;

            if out_pos == raw_size {
                break;
            }
        }
    }

    Ok(out)
}

/// Hash chain match finder. Positions are indexes into the reversed input.
struct MatchFinder<'a> {
    data: &'a [u8],
    /// Most recent position + 1 for each hash bucket. Zero means empty.
    head: Vec<usize>,
    /// Previous position + 1 in the same bucket for each position.
    prev: Vec<usize>,
}

impl<'a> MatchFinder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            head: vec![0; HASH_MASK + 1],
            prev: vec![0; data.len()],
        }
    }

    fn hash(&self, pos: usize) -> usize {
        let b = &self.data[pos..pos + MIN_LENGTH];

        ((usize::from(b[0]) << 10) ^ (usize::from(b[1]) << 5) ^ usize::from(b[2])) & HASH_MASK
    }

    fn insert(&mut self, pos: usize) {
        if pos + MIN_LENGTH > self.data.len() {
            return;
        }

        let h = self.hash(pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos + 1;
    }

    /// Find the longest match for the data at `pos`. Returns the length and
    /// distance, or [`None`] if no match of at least [`MIN_LENGTH`] exists.
    fn find(&self, pos: usize) -> Option<(usize, usize)> {
        if pos + MIN_LENGTH > self.data.len() {
            return None;
        }

        let max_length = MAX_LENGTH.min(self.data.len() - pos);
        let mut best: Option<(usize, usize)> = None;
        let mut candidate = self.head[self.hash(pos)];

        while candidate != 0 {
            let start = candidate - 1;
            let distance = pos - start;
            if distance > MAX_DISTANCE {
                break;
            }

            if distance >= MIN_DISTANCE {
                let length = (0..max_length)
                    .take_while(|&i| self.data[start + i] == self.data[pos + i])
                    .count();

                if length >= MIN_LENGTH && best.is_none_or(|(l, _)| length > l) {
                    best = Some((length, distance));

                    if length == max_length {
                        break;
                    }
                }
            }

            candidate = self.prev[start];
        }

        best
    }
}

/// Compress data with BLZ. Returns [`None`] if the compressed form would not be
/// smaller than the input, which the format cannot represent.
///
/// The token stream is generated from the end of the input towards the start.
/// It is cut off at the point where it saves the most space so that the
/// remaining input is stored as a raw prefix. This also guarantees that the
/// result can be decompressed in place.
pub fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let reversed = data.iter().rev().copied().collect::<Vec<_>>();
    let mut finder = MatchFinder::new(&reversed);

    // Tokens in the order that the decoder reads them.
    let mut tokens = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    let mut control_pos = 0;
    let mut flag = 8;
    let mut pos = 0;

    // (savings, token stream size, input covered, control byte, flags used)
    let mut best = (0isize, 0usize, 0usize, 0usize, 0u32);

    while pos < reversed.len() {
        if flag == 8 {
            control_pos = tokens.len();
            tokens.push(0u8);
            flag = 0;
        }

        if let Some((length, distance)) = finder.find(pos) {
            tokens[control_pos] |= 0x80 >> flag;

            let field = (((length - MIN_LENGTH) << 12) | (distance - MIN_DISTANCE)) as u16;
            let [lo, hi] = field.to_le_bytes();
            tokens.push(hi);
            tokens.push(lo);

            for p in pos..pos + length {
                finder.insert(p);
            }
            pos += length;
        } else {
            tokens.push(reversed[pos]);
            finder.insert(pos);
            pos += 1;
        }

        flag += 1;

        let savings = pos as isize - tokens.len() as isize;
        if savings > best.0 {
            best = (savings, tokens.len(), pos, control_pos, flag);
        }
    }

    let (_, stream_size, covered, last_control, flags_used) = best;
    tokens.truncate(stream_size);
    if let Some(c) = tokens.get_mut(last_control) {
        // Clear flags for tokens past the cut.
        *c &= !u8::MAX.checked_shr(flags_used).unwrap_or(0);
    }

    let raw_size = data.len() - covered;

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..raw_size]);
    out.extend(tokens.iter().rev());
    let pad = padding::calc(out.len(), 4);
    out.resize(out.len() + pad, 0xff);

    let total = out.len() + FOOTER_SIZE;
    if total >= data.len() {
        return None;
    }

    let footer = RawFooter {
        compressed_size: ((total - raw_size) as u32).into(),
        header_size: ((pad + FOOTER_SIZE) as u32).into(),
        extra_size: ((data.len() - total) as u32).into(),
    };
    out.extend_from_slice(footer.as_bytes());

    trace!(
        input = data.len(),
        output = out.len(),
        raw_size,
        "Compressed BLZ buffer",
    );

    Some(out)
}
