// SPDX-FileCopyrightText: 2023-2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Read, Write};

use ring::digest::Context;

/// Common function for reading a structure from a reader.
pub trait FromReader<R: Read>: Sized {
    type Error;

    fn from_reader(reader: R) -> Result<Self, Self::Error>;
}

/// Common function for writing a structure to a writer.
pub trait ToWriter<W: Write>: Sized {
    type Error;

    fn to_writer(&self, writer: W) -> Result<(), Self::Error>;
}

/// Extension for readers to read fixed-size buffers.
pub trait ReadFixedSizeExt {
    /// Read fixed-sized [`Vec`].
    fn read_vec_exact(&mut self, size: usize) -> io::Result<Vec<u8>>;
}

impl<R: Read> ReadFixedSizeExt for R {
    fn read_vec_exact(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// A reader wrapper that hashes data as it's being read.
pub struct HashingReader<R> {
    inner: R,
    context: Context,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, context: Context) -> Self {
        Self { inner, context }
    }

    pub fn finish(self) -> (R, Context) {
        (self.inner, self.context)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.context.update(&buf[..n]);
        Ok(n)
    }
}

/// A writer wrapper that counts the number of bytes written.
pub struct CountingWriter<W> {
    inner: W,
    offset: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn finish(self) -> (W, u64) {
        (self.inner, self.offset)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read, Write};

    use super::*;

    #[test]
    fn read_fixed_size() {
        let mut reader = Cursor::new(b"foobar");

        assert_eq!(reader.read_vec_exact(3).unwrap(), b"foo");
        assert_eq!(reader.read_vec_exact(2).unwrap(), b"ba");
        assert_eq!(
            reader.read_vec_exact(2).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof,
        );
    }

    #[test]
    fn hashing_reader() {
        let context = Context::new(&ring::digest::SHA256);
        let mut reader = HashingReader::new(Cursor::new(b"foobar"), context);

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();

        let (_, context) = reader.finish();
        let expected = ring::digest::digest(&ring::digest::SHA256, b"foobar");

        assert_eq!(buf, b"foobar");
        assert_eq!(context.finish().as_ref(), expected.as_ref());
    }

    #[test]
    fn counting_writer() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"foo").unwrap();
        writer.write_all(b"bar").unwrap();

        let (inner, n) = writer.finish();

        assert_eq!(inner, b"foobar");
        assert_eq!(n, 6);
    }
}
