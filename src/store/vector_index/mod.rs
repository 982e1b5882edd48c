
use bytemuck::{Pod, Zeroable};
use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::embeddings::dot;
use crate::{RagError, Result};

const MAGIC: [u8; 4] = *b"PRVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = size_of::<Header>();

// Header fields and the f32 body are written in native order, which must be little-endian.
const _: () = assert!(cfg!(target_endian = "little"));
const _: () = assert!(HEADER_LEN == 20);

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
struct Header {
    magic: [u8; 4],
    version: u32,
    dimension: u32,
    count: u64,
}

/// A single search result: the vector id and its inner product with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub vector_id: usize,
    pub score: f32,
}

/// Append-only flat inner-product index. Vector ids are insertion positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl VectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension frozen by the first insertion, or `None` while the index is empty.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self.dimension {
            Some(dimension) if dimension > 0 => self.data.len() / dimension,
            _ => 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn vector(&self, vector_id: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        let start = vector_id.checked_mul(dimension)?;
        self.data.get(start..start + dimension)
    }

    /// Append `vectors`, returning the new total count.
    ///
    /// All vectors are checked before any is stored, so a rejected call leaves the
    /// index untouched.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<usize> {
        let Some(first) = vectors.first() else {
            return Ok(self.len());
        };

        let dimension = self.dimension.unwrap_or(first.len());
        if dimension == 0 {
            return Err(RagError::Embedding(
                "Cannot index zero-dimensional vectors".to_string(),
            ));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dimension);
        self.data.reserve(vectors.len() * dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors (dimension {}), index now holds {}",
            vectors.len(),
            dimension,
            self.len()
        );

        Ok(self.len())
    }

    /// Top-`k` vectors by descending inner product. Ties go to the lower vector id.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(dimension) = self.dimension.filter(|_| !self.is_empty()) else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(dimension)
            .enumerate()
            .map(|(vector_id, vector)| SearchHit {
                vector_id,
                score: dot(query, vector),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank);

        Ok(hits)
    }

    /// Write the index in the little-endian `PRVI` format.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let dimension = u32::try_from(self.dimension.unwrap_or(0))
            .map_err(|_| RagError::Config("Vector dimension does not fit in u32".to_string()))?;
        let count = self.len() as u64;

        let header = Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dimension,
            count,
        };

        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytemuck::bytes_of(&header))?;
        writer.write_all(bytemuck::cast_slice::<f32, u8>(&self.data))?;
        writer.flush()?;

        debug!("Saved {} vectors to {}", count, path.display());
        Ok(())
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let corrupted = |reason: &str| {
            RagError::IndexCorrupted(format!("{}: {}", path.display(), reason))
        };

        let Some(header_bytes) = bytes.get(..HEADER_LEN) else {
            return Err(corrupted("not a vector index file"));
        };
        let Header {
            magic,
            version,
            dimension,
            count,
        } = bytemuck::pod_read_unaligned(header_bytes);

        if magic != MAGIC {
            return Err(corrupted("not a vector index file"));
        }
        if version != FORMAT_VERSION {
            return Err(corrupted(&format!("unsupported format version {}", version)));
        }

        let dimension = dimension as usize;
        let count = usize::try_from(count).map_err(|_| corrupted("vector count out of range"))?;

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|values| values.checked_mul(4))
            .and_then(|body| body.checked_add(HEADER_LEN))
            .ok_or_else(|| corrupted("header sizes overflow"))?;
        if bytes.len() != expected_len {
            return Err(corrupted(&format!(
                "expected {} bytes for {} vectors of dimension {}, found {}",
                expected_len,
                count,
                dimension,
                bytes.len()
            )));
        }
        if count > 0 && dimension == 0 {
            return Err(corrupted("vectors present but dimension is zero"));
        }

        // The read buffer carries no alignment guarantee, so copy rather than cast in place
        let data = bytemuck::pod_collect_to_vec::<u8, f32>(&bytes[HEADER_LEN..]);

        Ok(Self {
            dimension: (dimension > 0).then_some(dimension),
            data,
        })
    }
}

fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.vector_id.cmp(&b.vector_id))
}
