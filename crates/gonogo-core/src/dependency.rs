//! EpicDependency -- a directed edge between Epics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DependencyKind;

/// A directed edge between Epics. Edges of kind `blocks` must keep the
/// graph acyclic; the Store rejects cycle-forming inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicDependency {
    pub from_epic: String,

    pub to_epic: String,

    /// Edge kind (serialised as "kind" in JSON).
    #[serde(default, skip_serializing_if = "DependencyKind::is_default")]
    pub kind: DependencyKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EpicDependency {
    /// Creates a `blocks` edge.
    pub fn blocks(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_epic: from.into(),
            to_epic: to.into(),
            kind: DependencyKind::Blocks,
            rationale: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns `true` for degenerate self-loops, which are always rejected.
    pub fn is_self_loop(&self) -> bool {
        self.from_epic == self.to_epic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_constructor() {
        let dep = EpicDependency::blocks("EP-00001", "EP-00002");
        assert_eq!(dep.kind, DependencyKind::Blocks);
        assert!(!dep.is_self_loop());
    }

    #[test]
    fn self_loop_detected() {
        let dep = EpicDependency::blocks("EP-00001", "EP-00001");
        assert!(dep.is_self_loop());
    }

    #[test]
    fn dependency_serde_roundtrip() {
        let dep = EpicDependency {
            from_epic: "EP-00001".into(),
            to_epic: "EP-00002".into(),
            kind: DependencyKind::RelatesTo,
            rationale: "shared payment rail".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains(r#""kind":"relates-to""#));
        let back: EpicDependency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dep);
    }
}
