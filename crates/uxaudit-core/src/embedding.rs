//! Embedding trait and vector utilities.
//!
//! Defines the [`QueryEmbedder`] trait used by knowledge retrieval and
//! indexing, plus pure helpers for vector serialization and distance.
//!
//! The OpenAI-backed implementation lives in the `uxaudit` app crate.

use async_trait::async_trait;

use crate::error::AuditResult;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text. Failures surface as [`AuditError::Gateway`](crate::error::AuditError::Gateway).
    async fn embed(&self, text: &str) -> AuditResult<Vec<f32>>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use uxaudit_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance between two vectors.
///
/// Vectors of different lengths are infinitely far apart, so a stale
/// embedding from another model never ranks first.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
