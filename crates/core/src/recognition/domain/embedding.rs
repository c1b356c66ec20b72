use serde::{Deserialize, Serialize};

/// How two embeddings are compared. Lower distance means more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance, the convention of 128-d dlib encodings.
    Euclidean,
    /// `1 - cos(a, b)`, suited to L2-normalized ArcFace vectors.
    #[default]
    Cosine,
}

/// Fixed-length face identity signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Distance to `other` under `metric`.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ. Callers validate dimensions when
    /// records enter the registry and when the embedder is wired up.
    pub fn distance(&self, other: &Embedding, metric: DistanceMetric) -> f64 {
        assert_eq!(
            self.dimension(),
            other.dimension(),
            "embedding dimensions must match"
        );
        match metric {
            DistanceMetric::Euclidean => euclidean_distance(&self.0, &other.0),
            DistanceMetric::Cosine => (1.0 - cosine_similarity(&self.0, &other.0)).max(0.0),
        }
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
