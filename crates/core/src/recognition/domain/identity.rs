use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recognition::domain::embedding::Embedding;

/// Stable identifier of an enrolled person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One enrolled embedding. A person with several enrolled photos owns
/// several records sharing the same `identity_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub embedding: Embedding,
}

impl IdentityRecord {
    pub fn new(identity_id: IdentityId, display_name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            identity_id,
            display_name: display_name.into(),
            embedding,
        }
    }
}
