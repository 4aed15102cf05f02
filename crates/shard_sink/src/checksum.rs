//! Checksum-tracking destination sink
//!
//! Wraps any `Write` target and keeps a running CRC-64 over every byte
//! written. `finalize()` appends the snapshot-file trailer: the `0xFF` end
//! marker (itself checksummed, per the destination file format) followed by
//! the 8-byte little-endian checksum value.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crc::{Algorithm, Crc, Digest};

/// CRC-64 with the Jones polynomial, as used by the target snapshot file
/// format. Declared inline so the build does not depend on a particular
/// crc-catalog revision.
const CRC_64_JONES: Algorithm<u64> = Algorithm {
    width: 64,
    poly: 0xad93d23594c935a9,
    init: 0,
    refin: true,
    refout: true,
    xorout: 0,
    check: 0xe9c6d914c4b8d9ca,
    residue: 0,
};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_JONES);

/// End-of-data marker byte preceding the trailer checksum.
pub const EOF_MARKER: u8 = 0xFF;

/// One-shot CRC-64 over a byte slice (trailer verification helper).
pub fn crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Append-only byte sink with a cumulative CRC-64.
///
/// Lifecycle: opened once, written many times, finalized exactly once after
/// all data writes, then closed. A second `finalize()` is a no-op so a
/// double-close cannot corrupt the trailer.
pub struct ChecksumSink<W: Write> {
    inner: W,
    digest: Digest<'static, u64>,
    finalized: bool,
}

impl ChecksumSink<BufWriter<File>> {
    /// Open a buffered file-backed sink.
    pub fn create(path: impl AsRef<Path>, buffer_size: usize) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::with_capacity(buffer_size, file)))
    }
}

impl<W: Write> ChecksumSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            finalized: false,
        }
    }

    /// Current cumulative checksum value.
    pub fn crc(&self) -> u64 {
        self.digest.clone().finalize()
    }

    /// Inspect the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Append the end marker and the trailer checksum, then flush.
    ///
    /// The marker byte goes through the checksummed path (the file format's
    /// trailer checksum covers it); the checksum bytes themselves are raw.
    pub fn finalize(&mut self) -> std::io::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.write_all(&[EOF_MARKER])?;
        let crc = self.crc();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;
        self.finalized = true;
        Ok(())
    }
}

impl<W: Write> Write for ChecksumSink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
