//! Capability -- the portfolio-level grouping of Epics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A program-level grouping. Created administratively, rarely mutated,
/// never deleted while any Epic references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Stable `CAP-NNNNN` ID.
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub archived: bool,
}

impl Capability {
    /// Creates a capability with the given ID and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            created_at: now,
            updated_at: now,
            archived: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_serde_roundtrip() {
        let cap = Capability::new("CAP-00001", "Payments");
        let json = serde_json::to_string(&cap).unwrap();
        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "CAP-00001");
        assert_eq!(back.name, "Payments");
        assert!(!back.archived);
    }
}
