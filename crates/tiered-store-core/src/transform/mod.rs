//! Lazy, pull-based transform stream: the sequence of stages a segment passes
//! through on the write path (split, optionally compress, optionally encrypt)
//! and the mirror sequence on the read path.
//!
//! Every stage is a plain [`Iterator`] over `Result<Vec<u8>, TransformError>`
//! blocks. Pull semantics fall out of `Iterator` for free: nothing downstream
//! of a stage runs until `next()` is called, and a consumer that drops the
//! stream early simply never calls it again. A block produced by one stage is
//! the input block consumed by the next, so the write path's base chunker
//! fixes the original block boundaries and every later stage transforms one
//! block to one block of possibly different size, exactly as described for a
//! random read landing on a single chunk.

pub mod finisher;
pub mod stream;

use thiserror::Error;

use crate::error::{CompressionError, CryptoError};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read source data")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Compression(#[from] CompressionError),
}

/// A lazy, finite, non-restartable sequence of transformed blocks.
pub type BlockStream<'a> = Box<dyn Iterator<Item = Result<Vec<u8>, TransformError>> + 'a>;
