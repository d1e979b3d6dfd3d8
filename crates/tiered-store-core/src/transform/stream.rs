//! The individual pluggable stages: `BaseChunker`, `Compress`, `Encrypt` on the
//! write path; `BaseDechunker`, `Decrypt`, `Decompress` on the read path.

use std::io::Read;

use crate::crypto::DataKey;
use crate::crypto::envelope::EnvelopeCrypto;

use super::TransformError;

/// Splits a byte source into fixed-size plaintext blocks. The final block may
/// be shorter than `chunk_size`; every block before it is exactly `chunk_size`.
pub struct BaseChunker<R> {
    source: R,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> BaseChunker<R> {
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size,
            done: false,
        }
    }
}

impl<R: Read> Iterator for BaseChunker<R> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => return Some(Err(e.into())),
            }
        }
        if filled == 0 {
            self.done = true;
            return None;
        }
        buf.truncate(filled);
        if filled < self.chunk_size {
            self.done = true;
        }
        Some(Ok(buf))
    }
}

/// Per-block zstd compression. Each block is its own independent frame so a
/// single chunk can be decompressed without any neighboring chunk.
pub struct Compress<I> {
    inner: I,
    level: i32,
}

impl<I> Compress<I> {
    pub fn new(inner: I, level: i32) -> Self {
        Self { inner, level }
    }
}

impl<I: Iterator<Item = Result<Vec<u8>, TransformError>>> Iterator for Compress<I> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.inner.next()?;
        Some(block.and_then(|b| {
            zstd::encode_all(b.as_slice(), self.level)
                .map_err(|e| crate::error::CompressionError::Compress(e).into())
        }))
    }
}

/// Per-block zstd decompression, the inverse of [`Compress`].
pub struct Decompress<I> {
    inner: I,
}

impl<I> Decompress<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator<Item = Result<Vec<u8>, TransformError>>> Iterator for Decompress<I> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.inner.next()?;
        Some(block.and_then(|b| {
            zstd::decode_all(b.as_slice())
                .map_err(|e| crate::error::CompressionError::Corrupt(e).into())
        }))
    }
}

/// AES-256-GCM encryption of each block: prepends a fresh IV, appends the
/// authentication tag. `aad` is the segment-level additional authenticated
/// data from the manifest; it is combined with the running chunk ordinal.
pub struct Encrypt<I> {
    inner: I,
    crypto: EnvelopeCrypto,
    data_key: DataKey,
    aad: Vec<u8>,
    ordinal: u32,
}

impl<I> Encrypt<I> {
    pub fn new(inner: I, crypto: EnvelopeCrypto, data_key: DataKey, aad: Vec<u8>) -> Self {
        Self {
            inner,
            crypto,
            data_key,
            aad,
            ordinal: 0,
        }
    }
}

impl<I: Iterator<Item = Result<Vec<u8>, TransformError>>> Iterator for Encrypt<I> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.inner.next()?;
        let ordinal = self.ordinal;
        self.ordinal += 1;
        Some(block.and_then(|b| {
            self.crypto
                .encrypt_chunk(&self.data_key, ordinal, &self.aad, &b)
                .map_err(TransformError::from)
        }))
    }
}

/// AES-256-GCM decryption of each block, the inverse of [`Encrypt`]. Each
/// input block corresponds to exactly one chunk, so the ordinal used for AAD
/// must be supplied per block rather than counted from zero (a chunk manager
/// decrypting a single out-of-order chunk is not reading the segment from the
/// start).
pub struct Decrypt<I> {
    inner: I,
    crypto: EnvelopeCrypto,
    data_key: DataKey,
    aad: Vec<u8>,
    first_ordinal: u32,
    offset: u32,
}

impl<I> Decrypt<I> {
    pub fn new(inner: I, crypto: EnvelopeCrypto, data_key: DataKey, aad: Vec<u8>, first_ordinal: u32) -> Self {
        Self {
            inner,
            crypto,
            data_key,
            aad,
            first_ordinal,
            offset: 0,
        }
    }
}

impl<I: Iterator<Item = Result<Vec<u8>, TransformError>>> Iterator for Decrypt<I> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.inner.next()?;
        let ordinal = self.first_ordinal + self.offset;
        self.offset += 1;
        Some(block.and_then(|b| {
            self.crypto
                .decrypt_chunk(&self.data_key, ordinal, &self.aad, &b)
                .map_err(TransformError::from)
        }))
    }
}

/// Reads exactly the transformed byte ranges of the given chunks from a
/// seekable, readable source. Used on the read path to turn an object-store
/// byte-range GET into the block stream the decrypt/decompress stages expect.
pub struct BaseDechunker<R> {
    source: R,
    remaining_sizes: std::vec::IntoIter<u32>,
}

impl<R: Read> BaseDechunker<R> {
    /// `source` must already be positioned at the start of the first chunk's
    /// transformed bytes (the object-store driver performed the byte-range GET).
    pub fn new(source: R, transformed_sizes: Vec<u32>) -> Self {
        Self {
            source,
            remaining_sizes: transformed_sizes.into_iter(),
        }
    }
}

impl<R: Read> Iterator for BaseDechunker<R> {
    type Item = Result<Vec<u8>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.remaining_sizes.next()?;
        let mut buf = vec![0u8; size as usize];
        if let Err(e) = self.source.read_exact(&mut buf) {
            return Some(Err(e.into()));
        }
        Some(Ok(buf))
    }
}
