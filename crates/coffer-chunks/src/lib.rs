//! coffer-chunks: lazy fixed-size chunking over a reader of known length
//!
//! Splits a source into successive plaintext chunks of exactly
//! `chunk_size` bytes, with a short final chunk. Boundaries are fixed
//! offsets, so an unchanged file re-chunks to byte-identical chunks and
//! the engine can recognize them by re-encrypting under the previously
//! recorded IVs.
//!
//! The chunker never pads; padding to the chunk boundary happens inside
//! the cipher. It is an `Iterator`, not restartable, and must not be
//! shared across threads mid-file.

use std::io::Read;

use coffer_core::{CofferError, CofferResult};

/// One step of the chunker: a plaintext chunk plus whether more follow.
#[derive(Debug)]
pub struct ChunkData {
    pub data: Vec<u8>,
    pub has_more: bool,
}

pub struct Chunker<R> {
    source: R,
    chunk_size: usize,
    total_bytes: u64,
    consumed: u64,
}

impl<R: Read> Chunker<R> {
    /// Chunk `total_bytes` from `source` into pieces of `chunk_size`.
    ///
    /// `total_bytes` is the caller's claim about the source length
    /// (normally from a stat); a source that cannot deliver that many
    /// bytes produces a fatal I/O error mid-iteration.
    pub fn new(source: R, chunk_size: usize, total_bytes: u64) -> Self {
        debug_assert!(chunk_size > 0, "chunk size must be positive");
        Chunker {
            source,
            chunk_size,
            total_bytes,
            consumed: 0,
        }
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = CofferResult<ChunkData>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.total_bytes - self.consumed;
        if remaining == 0 {
            return None;
        }
        let take = remaining.min(self.chunk_size as u64) as usize;
        let mut data = vec![0u8; take];
        if let Err(e) = self.source.read_exact(&mut data) {
            // Make further calls terminate instead of re-reading.
            self.consumed = self.total_bytes;
            return Some(Err(CofferError::Io(e)));
        }
        self.consumed += take as u64;
        Some(Ok(ChunkData {
            data,
            has_more: self.consumed < self.total_bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ABC: &[u8] = b"abc";

    fn collect(chunk_size: usize, total: u64) -> Vec<ChunkData> {
        Chunker::new(ABC, chunk_size, total)
            .collect::<CofferResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn read_less_than_one_chunk() {
        let chunks = collect(10, 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, ABC);
        assert!(!chunks[0].has_more);
    }

    #[test]
    fn read_exactly_one_chunk() {
        let chunks = collect(3, 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, ABC);
        assert!(!chunks[0].has_more);
    }

    #[test]
    fn read_two_chunks() {
        let chunks = collect(2, 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, b"ab");
        assert!(chunks[0].has_more);
        assert_eq!(chunks[1].data, b"c");
        assert!(!chunks[1].has_more);
    }

    #[test]
    fn read_three_chunks() {
        let chunks = collect(1, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, b"a");
        assert!(chunks[0].has_more);
        assert_eq!(chunks[1].data, b"b");
        assert!(chunks[1].has_more);
        assert_eq!(chunks[2].data, b"c");
        assert!(!chunks[2].has_more);
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        let mut chunker = Chunker::new(&b""[..], 4, 0);
        assert!(chunker.next().is_none());
    }

    #[test]
    fn short_read_is_fatal() {
        // Claim 10 bytes but only deliver 3.
        let mut chunker = Chunker::new(ABC, 8, 10);
        let err = chunker.next().unwrap().unwrap_err();
        assert!(matches!(err, CofferError::Io(_)));
        assert!(chunker.next().is_none(), "iteration ends after a failure");
    }

    proptest! {
        /// Concatenating emitted chunks reproduces the source, and the
        /// chunk count is ceil(total / chunk_size).
        #[test]
        fn chunks_cover_source(
            data in proptest::collection::vec(any::<u8>(), 0..=4096),
            chunk_size in 1usize..=512,
        ) {
            let total = data.len() as u64;
            let chunks: Vec<ChunkData> = Chunker::new(data.as_slice(), chunk_size, total)
                .collect::<CofferResult<Vec<_>>>()
                .unwrap();

            let expected_count = (data.len() + chunk_size - 1) / chunk_size;
            prop_assert_eq!(chunks.len(), expected_count);

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.clone()).collect();
            prop_assert_eq!(joined, data);

            if let Some((last, head)) = chunks.split_last() {
                prop_assert!(!last.has_more);
                prop_assert!(head.iter().all(|c| c.has_more));
            }
        }
    }
}
