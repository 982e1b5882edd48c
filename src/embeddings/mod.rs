pub mod chunking;
pub mod ollama;

use anyhow::{Result, bail};
use tracing::warn;

pub use chunking::{ChunkingConfig, chunk_document, split_text};
pub use ollama::OllamaClient;

/// Maps texts to fixed-dimension vectors.
///
/// Implementors provide raw model output through [`Embedder::embed_raw`]. Callers use
/// [`Embedder::embed`], which checks the shape of the batch and L2-normalizes every
/// vector, so corpus and query vectors go through exactly the same post-processing.
pub trait Embedder: Send + Sync {
    /// Name of the underlying model, recorded in the index manifest.
    fn model_name(&self) -> &str;

    /// One raw vector per input text, in input order.
    fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.embed_raw(texts)?;

        if vectors.len() != texts.len() {
            bail!(
                "Embedding model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 {
            bail!("Embedding model returned empty vectors");
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            bail!(
                "Embedding model returned vectors of mixed dimension ({} and {})",
                dimension,
                bad.len()
            );
        }

        for vector in &mut vectors {
            if !normalize(vector) {
                warn!("Embedding model returned an all-zero vector; leaving it unnormalized");
            }
        }

        Ok(vectors)
    }
}

/// Scale `vector` to unit L2 norm in place. Returns false for a zero vector, which is left untouched.
#[inline]
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    true
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
