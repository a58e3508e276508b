// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    io::{self, Read, Write},
};

use bitflags::bitflags;
use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zerocopy::{FromBytes, FromZeros, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    error::ErrorKind,
    format::{blz, padding::ZeroPadding},
    stream::{FromReader, ReadFixedSizeExt, ToWriter},
    util::{self, NumBytes, OutOfBoundsError},
};

pub const KIP_MAGIC: [u8; 4] = *b"KIP1";
pub const KIP_NAME_SIZE: usize = 12;
pub const SEGMENT_COUNT: usize = 6;
pub const CAPABILITY_COUNT: usize = 32;

/// Only the first three segments (text, rodata, data) can be compressed.
pub const COMPRESSIBLE_SEGMENTS: usize = 3;

pub const SEGMENT_NAMES: [&str; SEGMENT_COUNT] =
    ["text", "rodata", "data", "bss", "reserved1", "reserved2"];

/// Maximum size of any individual segment. The largest known KIP (FS) is a
/// little over 1 MiB when decompressed.
const SEGMENT_MAX_SIZE: u32 = blz::MAX_DECOMPRESSED_SIZE as u32;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown magic: {0:?}")]
    UnknownMagic([u8; 4]),
    #[error("{0:?} field is too long (>{1}): {data:?}", data = .2.as_bstr())]
    StringTooLong(&'static str, usize, Vec<u8>),
    #[error("{0:?} field is out of bounds")]
    IntOutOfBounds(&'static str, #[source] OutOfBoundsError),
    #[error("Failed to decompress {0} segment")]
    Decompress(&'static str, #[source] blz::Error),
    #[error("Failed to read KIP data: {0}")]
    DataRead(&'static str, #[source] io::Error),
    #[error("Failed to write KIP data: {0}")]
    DataWrite(&'static str, #[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataWrite(_, _) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
    pub struct KipFlags: u8 {
        const TEXT_COMPRESSED = 1 << 0;
        const RODATA_COMPRESSED = 1 << 1;
        const DATA_COMPRESSED = 1 << 2;
        const IS_64BIT = 1 << 3;
        const ADDRESS_SPACE_64BIT = 1 << 4;
        const USE_SECURE_MEMORY = 1 << 5;

        const _ = !0;
    }
}

impl KipFlags {
    pub const COMPRESSED_MASK: Self = Self::TEXT_COMPRESSED
        .union(Self::RODATA_COMPRESSED)
        .union(Self::DATA_COMPRESSED);

    /// Flag marking the segment at `index` as compressed.
    pub fn compressed(index: usize) -> Self {
        match index {
            0 => Self::TEXT_COMPRESSED,
            1 => Self::RODATA_COMPRESSED,
            2 => Self::DATA_COMPRESSED,
            _ => Self::empty(),
        }
    }
}

/// Raw on-disk layout for a segment descriptor.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawSegment {
    dst_offset: little_endian::U32,
    decompressed_size: little_endian::U32,
    compressed_size: little_endian::U32,
    attribute: little_endian::U32,
}

/// Raw on-disk layout for the KIP1 header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawHeader {
    /// Magic value. This should be equal to [`KIP_MAGIC`].
    magic: [u8; 4],
    name: [u8; KIP_NAME_SIZE],
    program_id: little_endian::U64,
    process_category: little_endian::U32,
    main_thread_priority: u8,
    default_cpu_id: u8,
    reserved: u8,
    flags: u8,
    segments: [RawSegment; SEGMENT_COUNT],
    capabilities: [little_endian::U32; CAPABILITY_COUNT],
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Segment {
    pub dst_offset: u32,
    pub decompressed_size: u32,
    pub attribute: u32,
    /// Segment contents as stored in the file. The stored (compressed) size
    /// is always the length of this buffer.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Segment {
    pub fn compressed_size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("dst_offset", &self.dst_offset)
            .field("decompressed_size", &self.decompressed_size)
            .field("attribute", &self.attribute)
            .field("data", &NumBytes(self.data.len()))
            .finish()
    }
}

/// A KIP1 (kernel initial process) executable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Kip {
    /// Raw name without trailing padding. This is usually, but not always,
    /// ASCII.
    #[serde(with = "crate::escape")]
    pub name: Vec<u8>,
    pub program_id: u64,
    pub process_category: u32,
    pub main_thread_priority: u8,
    pub default_cpu_id: u8,
    pub reserved: u8,
    pub flags: KipFlags,
    pub segments: [Segment; SEGMENT_COUNT],
    pub capabilities: [u32; CAPABILITY_COUNT],
}

impl Kip {
    /// Whether any of the compressible segments are marked as compressed.
    pub fn is_compressed(&self) -> bool {
        self.flags.intersects(KipFlags::COMPRESSED_MASK)
    }

    /// Decompress every segment that is marked as compressed and clear all
    /// compression flags.
    pub fn decompress(&mut self) -> Result<()> {
        for (i, segment) in self
            .segments
            .iter_mut()
            .enumerate()
            .take(COMPRESSIBLE_SEGMENTS)
        {
            if !self.flags.contains(KipFlags::compressed(i)) {
                continue;
            }

            let data = blz::decompress(&segment.data)
                .map_err(|e| Error::Decompress(SEGMENT_NAMES[i], e))?;

            debug!(
                "Decompressed {} segment: {} -> {} bytes",
                SEGMENT_NAMES[i],
                segment.data.len(),
                data.len(),
            );

            segment.data = data;
        }

        self.flags.remove(KipFlags::COMPRESSED_MASK);

        Ok(())
    }

    /// Compress every compressible segment that is not compressed yet.
    /// Segments that would not shrink are left uncompressed.
    pub fn compress(&mut self) {
        for (i, segment) in self
            .segments
            .iter_mut()
            .enumerate()
            .take(COMPRESSIBLE_SEGMENTS)
        {
            let flag = KipFlags::compressed(i);
            if self.flags.contains(flag) {
                continue;
            }

            match blz::compress(&segment.data) {
                Some(data) => {
                    debug!(
                        "Compressed {} segment: {} -> {} bytes",
                        SEGMENT_NAMES[i],
                        segment.data.len(),
                        data.len(),
                    );

                    segment.data = data;
                    self.flags.insert(flag);
                }
                None => {
                    debug!("Leaving {} segment uncompressed", SEGMENT_NAMES[i]);
                }
            }
        }
    }

    /// Serialize the KIP to a new buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.to_writer(&mut data)?;
        Ok(data)
    }
}

impl fmt::Display for Kip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "KIP1 header:")?;
        writeln!(f, "- Name:                 {:?}", self.name.as_bstr())?;
        writeln!(f, "- Program ID:           {:016x}", self.program_id)?;
        writeln!(f, "- Process category:     {}", self.process_category)?;
        writeln!(f, "- Main thread priority: {}", self.main_thread_priority)?;
        writeln!(f, "- Default CPU ID:       {}", self.default_cpu_id)?;
        writeln!(f, "- Flags:                {:?}", self.flags)?;

        for (name, segment) in SEGMENT_NAMES.iter().zip(&self.segments) {
            writeln!(
                f,
                "- Segment {name:<9}     offset={:#x}, size={:#x}, stored={:#x}, attribute={:#x}",
                segment.dst_offset,
                segment.decompressed_size,
                segment.data.len(),
                segment.attribute,
            )?;
        }

        write!(f, "- Capabilities:         {:08x?}", self.capabilities)
    }
}

impl<R: Read> FromReader<R> for Kip {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let raw =
            RawHeader::read_from_io(&mut reader).map_err(|e| Error::DataRead("Kip::header", e))?;

        if raw.magic != KIP_MAGIC {
            return Err(Error::UnknownMagic(raw.magic));
        }

        let mut segments: [Segment; SEGMENT_COUNT] = Default::default();

        for (segment, raw_segment) in segments.iter_mut().zip(&raw.segments) {
            segment.dst_offset = raw_segment.dst_offset.get();
            segment.decompressed_size = raw_segment.decompressed_size.get();
            segment.attribute = raw_segment.attribute.get();
        }

        for (i, (segment, raw_segment)) in segments.iter_mut().zip(&raw.segments).enumerate() {
            let size = util::check_bounds(raw_segment.compressed_size.get(), ..=SEGMENT_MAX_SIZE)
                .map_err(|e| Error::IntOutOfBounds(segment_field(i), e))?;

            segment.data = reader
                .read_vec_exact(size as usize)
                .map_err(|e| Error::DataRead(segment_field(i), e))?;
        }

        Ok(Self {
            name: raw.name.trim_end_padding().to_vec(),
            program_id: raw.program_id.get(),
            process_category: raw.process_category.get(),
            main_thread_priority: raw.main_thread_priority,
            default_cpu_id: raw.default_cpu_id,
            reserved: raw.reserved,
            flags: KipFlags::from_bits_retain(raw.flags),
            segments,
            capabilities: raw.capabilities.map(|c| c.get()),
        })
    }
}

impl<W: Write> ToWriter<W> for Kip {
    type Error = Error;

    fn to_writer(&self, mut writer: W) -> Result<()> {
        let name = self
            .name
            .to_padded_array::<KIP_NAME_SIZE>()
            .ok_or_else(|| Error::StringTooLong("Kip::name", KIP_NAME_SIZE, self.name.clone()))?;

        let mut raw_segments = [RawSegment::new_zeroed(); SEGMENT_COUNT];

        for (i, (raw_segment, segment)) in raw_segments.iter_mut().zip(&self.segments).enumerate() {
            let size =
                util::check_bounds(segment.data.len(), ..=SEGMENT_MAX_SIZE as usize)
                    .map_err(|e| Error::IntOutOfBounds(segment_field(i), e))?;

            *raw_segment = RawSegment {
                dst_offset: segment.dst_offset.into(),
                decompressed_size: segment.decompressed_size.into(),
                compressed_size: (size as u32).into(),
                attribute: segment.attribute.into(),
            };
        }

        let raw = RawHeader {
            magic: KIP_MAGIC,
            name,
            program_id: self.program_id.into(),
            process_category: self.process_category.into(),
            main_thread_priority: self.main_thread_priority,
            default_cpu_id: self.default_cpu_id,
            reserved: self.reserved,
            flags: self.flags.bits(),
            segments: raw_segments,
            capabilities: self.capabilities.map(|c| c.into()),
        };

        raw.write_to_io(&mut writer)
            .map_err(|e| Error::DataWrite("Kip::header", e))?;

        for (i, segment) in self.segments.iter().enumerate() {
            // Segments without stored data (eg. bss) contribute nothing.
            if segment.data.is_empty() {
                continue;
            }

            writer
                .write_all(&segment.data)
                .map_err(|e| Error::DataWrite(segment_field(i), e))?;
        }

        Ok(())
    }
}

fn segment_field(index: usize) -> &'static str {
    const FIELDS: [&str; SEGMENT_COUNT] = [
        "Kip::segment[text]",
        "Kip::segment[rodata]",
        "Kip::segment[data]",
        "Kip::segment[bss]",
        "Kip::segment[reserved1]",
        "Kip::segment[reserved2]",
    ];

    FIELDS[index]
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn header_size() {
        assert_eq!(mem::size_of::<RawHeader>(), 0x100);
    }

    #[test]
    fn compressed_flags() {
        assert_eq!(KipFlags::COMPRESSED_MASK.bits(), 0x07);
        assert_eq!(KipFlags::compressed(2), KipFlags::DATA_COMPRESSED);
        assert_eq!(KipFlags::compressed(3), KipFlags::empty());
    }
}
