//! Drives a write-path transform stream to completion, forwarding each
//! transformed block to the uploader and recording the chunk index.

use crate::chunk::index::{ChunkIndex, FixedChunkIndex, VariableChunkIndex};

use super::TransformError;

/// Consumes a [`super::BlockStream`][super::BlockStream]-shaped iterator and
/// builds the [`ChunkIndex`] for the segment it produced. The index is only
/// ever returned once the stream has been fully drained, matching the
/// requirement that chunk sizes aren't known (and so can't be claimed) before
/// every block has actually been transformed and uploaded.
pub struct TransformFinisher {
    original_chunk_size: u32,
    original_total_size: u64,
}

impl TransformFinisher {
    #[must_use]
    pub fn new(original_chunk_size: u32, original_total_size: u64) -> Self {
        Self {
            original_chunk_size,
            original_total_size,
        }
    }

    /// Drive `stream` to completion, calling `upload` once per transformed
    /// block in order. On any error the upload is left to the caller to abort.
    pub fn drive<I, W>(&self, stream: I, mut upload: W) -> Result<ChunkIndex, TransformError>
    where
        I: Iterator<Item = Result<Vec<u8>, TransformError>>,
        W: FnMut(&[u8]) -> std::io::Result<()>,
    {
        let mut transformed_sizes = Vec::new();
        for block in stream {
            let block = block?;
            upload(&block)?;
            transformed_sizes.push(block.len() as u32);
        }
        Ok(self.build_index(transformed_sizes))
    }

    /// Choose the most compact representation: fixed-size when every block
    /// but the last shares one transformed size, variable otherwise.
    fn build_index(&self, transformed_sizes: Vec<u32>) -> ChunkIndex {
        if transformed_sizes.is_empty() {
            return ChunkIndex::Fixed(FixedChunkIndex {
                original_chunk_size: self.original_chunk_size,
                original_file_size: 0,
                transformed_chunk_size: 0,
                transformed_file_size: 0,
            });
        }

        let non_final = &transformed_sizes[..transformed_sizes.len() - 1];
        let uniform = non_final
            .first()
            .is_none_or(|first| non_final.iter().all(|s| s == first));

        if uniform {
            let transformed_chunk_size = non_final.first().copied().unwrap_or(transformed_sizes[0]);
            let transformed_file_size: u64 = transformed_sizes.iter().map(|&s| u64::from(s)).sum();
            ChunkIndex::Fixed(FixedChunkIndex {
                original_chunk_size: self.original_chunk_size,
                original_file_size: self.original_total_size,
                transformed_chunk_size,
                transformed_file_size,
            })
        } else {
            ChunkIndex::Variable(VariableChunkIndex::new(
                self.original_chunk_size,
                transformed_sizes,
                self.original_total_size,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_yield_fixed_index() {
        let finisher = TransformFinisher::new(10, 25);
        let blocks: Vec<Result<Vec<u8>, TransformError>> =
            vec![Ok(vec![0; 10]), Ok(vec![0; 10]), Ok(vec![0; 5])];
        let mut uploaded = Vec::new();
        let index = finisher
            .drive(blocks.into_iter(), |b| {
                uploaded.push(b.to_vec());
                Ok(())
            })
            .unwrap();
        assert!(matches!(index, ChunkIndex::Fixed(_)));
        assert_eq!(index.chunk_count(), 3);
        assert_eq!(uploaded.len(), 3);
    }

    #[test]
    fn varying_sizes_yield_variable_index() {
        let finisher = TransformFinisher::new(10, 25);
        let blocks: Vec<Result<Vec<u8>, TransformError>> =
            vec![Ok(vec![0; 6]), Ok(vec![0; 9]), Ok(vec![0; 2])];
        let index = finisher.drive(blocks.into_iter(), |_| Ok(())).unwrap();
        assert!(matches!(index, ChunkIndex::Variable(_)));
    }

    #[test]
    fn empty_stream_yields_empty_index() {
        let finisher = TransformFinisher::new(10, 0);
        let index = finisher
            .drive(std::iter::empty(), |_| Ok(()))
            .unwrap();
        assert_eq!(index.chunk_count(), 0);
    }
}
