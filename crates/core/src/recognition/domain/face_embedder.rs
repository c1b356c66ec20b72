use crate::recognition::domain::embedding::Embedding;
use crate::shared::frame::Frame;

/// Domain interface for turning an aligned face crop into an embedding.
///
/// Shared by every camera worker, hence `&self` and `Sync`.
pub trait FaceEmbedder: Send + Sync {
    /// Length of every embedding this embedder produces.
    fn dimension(&self) -> usize;

    fn embed(&self, face: &Frame) -> Result<Embedding, Box<dyn std::error::Error>>;
}
