use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::identity::IdentityId;

/// Outcome of comparing one query embedding against a registry snapshot.
///
/// `identity_id` is set only when the nearest distance is within the match
/// threshold; `distance` and `similarity` always describe the nearest record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity_id: Option<IdentityId>,
    pub display_name: Option<String>,
    pub distance: f64,
    pub similarity: f64,
    pub query: Embedding,
}

impl MatchResult {
    pub fn matched(
        identity_id: IdentityId,
        display_name: String,
        distance: f64,
        query: Embedding,
    ) -> Self {
        Self {
            identity_id: Some(identity_id),
            display_name: Some(display_name),
            distance,
            similarity: 1.0 - distance,
            query,
        }
    }

    pub fn no_match(distance: f64, query: Embedding) -> Self {
        Self {
            identity_id: None,
            display_name: None,
            distance,
            similarity: 1.0 - distance,
            query,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_similarity_is_one_minus_distance() {
        let m = MatchResult::matched(
            IdentityId::new("p1"),
            "Ada".into(),
            0.3,
            Embedding::new(vec![0.0]),
        );
        assert!(m.is_match());
        assert_relative_eq!(m.similarity, 0.7);
    }

    #[test]
    fn test_no_match_keeps_diagnostics() {
        let m = MatchResult::no_match(0.8, Embedding::new(vec![0.0]));
        assert!(!m.is_match());
        assert!(m.display_name.is_none());
        assert_relative_eq!(m.similarity, 0.2, epsilon = 1e-12);
    }
}
