// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use assert_matches::assert_matches;
use nxfirm::{error::ErrorKind, format::blz};

/// Deterministic pseudorandom bytes.
fn noise(size: usize, mut state: u32) -> Vec<u8> {
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn footer(compressed_size: u32, header_size: u32, extra_size: u32) -> Vec<u8> {
    let mut data = vec![];
    data.extend_from_slice(&compressed_size.to_le_bytes());
    data.extend_from_slice(&header_size.to_le_bytes());
    data.extend_from_slice(&extra_size.to_le_bytes());
    data
}

fn check_round_trip(data: &[u8]) -> Option<usize> {
    let compressed = blz::compress(data)?;
    assert!(compressed.len() < data.len());
    assert_eq!(blz::decompress(&compressed).unwrap(), data);

    Some(compressed.len())
}

#[test]
fn zeros() {
    let size = check_round_trip(&[0u8; 0x10000]).unwrap();

    // Every 18 bytes become 2 bytes plus a control bit.
    assert!(size < 0x10000 / 8, "{size:#x}");
}

#[test]
fn text() {
    let data = b"The quick brown fox jumps over the lazy dog. ".repeat(100);

    check_round_trip(&data).unwrap();
}

#[test]
fn incompressible() {
    let data = noise(0x1000, 0x1234_5678);

    assert_eq!(blz::compress(&data), None);
    assert_eq!(blz::compress(&[]), None);
    assert_eq!(blz::compress(b"ab"), None);
}

#[test]
fn mixed_prefix() {
    // Noise at the start ends up in the raw prefix.
    let mut data = noise(0x800, 1);
    data.extend(std::iter::repeat_n(0xaa, 0x800));

    let compressed = blz::compress(&data).unwrap();
    assert_eq!(&compressed[..0x100], &data[..0x100]);
    assert_eq!(blz::decompress(&compressed).unwrap(), data);
}

#[test]
fn maximum_distance() {
    // A block repeated at exactly the largest encodable distance.
    let block = noise(4098, 7);
    let data = [block.as_slice(), block.as_slice(), block.as_slice()].concat();

    check_round_trip(&data).unwrap();
}

#[test]
fn beyond_maximum_distance() {
    let block = noise(4099, 9);
    let data = [block.as_slice(), block.as_slice()].concat();

    if let Some(compressed) = blz::compress(&data) {
        assert_eq!(blz::decompress(&compressed).unwrap(), data);
    }
}

#[test]
fn short_runs() {
    let mut data = vec![];
    for i in 0..2000u32 {
        data.extend_from_slice(&(i % 7).to_le_bytes());
        data.push((i % 3) as u8);
    }

    check_round_trip(&data).unwrap();
}

#[test]
fn reject_too_small() {
    assert_matches!(blz::decompress(&[0; 11]), Err(blz::Error::TooSmall(11)));
}

#[test]
fn reject_bad_footer() {
    assert_matches!(
        blz::decompress(&footer(13, 12, 0)),
        Err(blz::Error::InvalidCompressedSize { .. })
    );
    assert_matches!(
        blz::decompress(&footer(12, 4, 0)),
        Err(blz::Error::InvalidHeaderSize { .. })
    );
    assert_matches!(
        blz::decompress(&footer(12, 16, 0)),
        Err(blz::Error::InvalidHeaderSize { .. })
    );
}

#[test]
fn reject_oversized_output() {
    // A single control byte claiming to expand to 1 GiB.
    let mut data = vec![0x00];
    data.extend(footer(13, 12, 0x4000_0000));

    let err = blz::decompress(&data).unwrap_err();
    assert_matches!(
        err,
        blz::Error::OutputTooLarge {
            size: 0x4000_000d,
            limit: blz::MAX_DECOMPRESSED_SIZE,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Format);

    let mut data = vec![0x00];
    data.extend(footer(13, 12, u32::MAX));
    assert_matches!(
        blz::decompress(&data),
        Err(blz::Error::OutputTooLarge { .. } | blz::Error::SizeOverflow)
    );
}

#[test]
fn reject_input_underrun() {
    // A control byte announcing literals that are not there.
    let mut data = vec![0x00];
    data.extend(footer(13, 12, 5));

    let err = blz::decompress(&data).unwrap_err();
    assert_matches!(err, blz::Error::InputUnderrun(_));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn reject_reference_out_of_bounds() {
    // Back reference of length 3 reaching past the end of the output.
    let mut data = vec![0xff, 0x0f, 0x80];
    data.extend(footer(15, 12, 3));

    assert_matches!(
        blz::decompress(&data),
        Err(blz::Error::ReferenceOutOfBounds { offset: 18, .. })
    );
}

#[test]
fn reject_output_overrun() {
    // Back reference of length 18 when only 4 bytes remain to be written.
    let mut data = vec![0x00, 0xf0, 0x80];
    data.extend(footer(15, 12, 1));

    assert_matches!(
        blz::decompress(&data),
        Err(blz::Error::OutputOverrun { offset: 16, length: 18 })
    );
}
