//! Stable entity ID handling (`EP-NNNNN`, `US-NNNNN`, ...).
//!
//! IDs are five-digit zero-padded sequence numbers behind a kind prefix.
//! The Store owns the counters; this module owns the format.

use std::fmt;

/// The kinds of entities that carry prefixed sequential IDs.
///
/// Tests are identified by path + symbol instead (see [`crate::test::test_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Capability,
    Epic,
    Story,
    Defect,
}

impl EntityKind {
    /// The ID prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Capability => "CAP",
            Self::Epic => "EP",
            Self::Story => "US",
            Self::Defect => "DEF",
        }
    }

    /// The config key under which the Store keeps this kind's counter.
    pub fn counter_key(&self) -> &'static str {
        match self {
            Self::Capability => "next_id:capability",
            Self::Epic => "next_id:epic",
            Self::Story => "next_id:story",
            Self::Defect => "next_id:defect",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Number of digits in the sequence part.
pub const ID_DIGITS: usize = 5;

/// Formats an ID from a kind and sequence number, e.g. `format_id(Epic, 3)`
/// yields `"EP-00003"`.
pub fn format_id(kind: EntityKind, seq: u32) -> String {
    format!("{}-{:0width$}", kind.prefix(), seq, width = ID_DIGITS)
}

/// Parses a prefixed ID back into its kind and sequence number.
///
/// Returns `None` for malformed input (wrong prefix, wrong digit count,
/// non-numeric sequence).
pub fn parse_id(s: &str) -> Option<(EntityKind, u32)> {
    let (prefix, rest) = s.split_once('-')?;
    let kind = match prefix {
        "CAP" => EntityKind::Capability,
        "EP" => EntityKind::Epic,
        "US" => EntityKind::Story,
        "DEF" => EntityKind::Defect,
        _ => return None,
    };
    if rest.len() != ID_DIGITS || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((kind, rest.parse().ok()?))
}

/// Returns `true` if `s` is a well-formed ID of the given kind.
pub fn is_valid_id(kind: EntityKind, s: &str) -> bool {
    matches!(parse_id(s), Some((k, _)) if k == kind)
}
