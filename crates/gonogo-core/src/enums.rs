//! Enum types for the gonogo traceability engine.
//!
//! Each enum is a closed set of string variants with:
//! - `as_str()`, `parse()`, `Display`
//! - Serialize as the snake_case/kebab-case string
//! - Deserialize that rejects unknown values (store rows must round-trip)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Macro: defines a closed string enum.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }

            /// Parses the string representation; `None` for unknown values.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $str => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| {
                    format!("unknown {} value: {s:?}", stringify!($name))
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} value: {s:?}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

// ===========================================================================
// EpicStatus
// ===========================================================================

define_enum! {
    /// Lifecycle state of an Epic.
    EpicStatus, default = Planned,
    variants: [
        (Planned, "planned"),
        (InProgress, "in_progress"),
        (InReview, "in_review"),
        (Done, "done"),
        (Cancelled, "cancelled"),
    ]
}

impl EpicStatus {
    /// Position in the progress lattice planned < in_progress < in_review < done.
    ///
    /// `cancelled` sits outside the lattice and has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Planned => Some(0),
            Self::InProgress => Some(1),
            Self::InReview => Some(2),
            Self::Done => Some(3),
            Self::Cancelled => None,
        }
    }

    /// Returns `true` if moving from `self` to `to` goes backwards in the
    /// lattice. Such transitions require an explicit administrative override.
    pub fn is_regression_to(&self, to: EpicStatus) -> bool {
        match (self.rank(), to.rank()) {
            (Some(from), Some(to)) => to < from,
            _ => false,
        }
    }
}

// ===========================================================================
// StoryStatus
// ===========================================================================

define_enum! {
    /// Lifecycle state of a UserStory (mirrored from the tracker).
    StoryStatus, default = Planned,
    variants: [
        (Planned, "planned"),
        (InProgress, "in_progress"),
        (InReview, "in_review"),
        (Done, "done"),
        (Blocked, "blocked"),
        (Cancelled, "cancelled"),
    ]
}

impl StoryStatus {
    /// Returns `true` if the story counts as delivered for completion rollups.
    pub fn is_done(&self) -> bool {
        *self == Self::Done
    }
}

// ===========================================================================
// DefectStatus
// ===========================================================================

define_enum! {
    /// Lifecycle state of a Defect (resolution is authoritative from the tracker).
    DefectStatus, default = Open,
    variants: [
        (Open, "open"),
        (Triaged, "triaged"),
        (InProgress, "in_progress"),
        (Resolved, "resolved"),
        (Wontfix, "wontfix"),
    ]
}

impl DefectStatus {
    /// Returns `true` if the defect counts as open for density and debt rollups.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::Triaged | Self::InProgress)
    }
}

// ===========================================================================
// DefectSeverity
// ===========================================================================

define_enum! {
    /// Severity of a Defect.
    DefectSeverity, default = Medium,
    variants: [
        (Critical, "critical"),
        (High, "high"),
        (Medium, "medium"),
        (Low, "low"),
    ]
}

// ===========================================================================
// TestType
// ===========================================================================

define_enum! {
    /// Kind of executable test.
    TestType, default = Unit,
    variants: [
        (Unit, "unit"),
        (Integration, "integration"),
        (E2e, "e2e"),
        (Security, "security"),
        (Bdd, "bdd"),
    ]
}

// ===========================================================================
// TestPriority
// ===========================================================================

define_enum! {
    /// Priority of a test.
    TestPriority, default = Medium,
    variants: [
        (Critical, "critical"),
        (High, "high"),
        (Medium, "medium"),
        (Low, "low"),
    ]
}

// ===========================================================================
// ExecutionStatus
// ===========================================================================

define_enum! {
    /// Outcome of a single test execution.
    ExecutionStatus, default = Passed,
    variants: [
        (Passed, "passed"),
        (Failed, "failed"),
        (Skipped, "skipped"),
        (Error, "error"),
        (Xfail, "xfail"),
        (Xpass, "xpass"),
    ]
}

impl ExecutionStatus {
    /// Returns `true` if the outcome counts in the pass-rate denominator.
    ///
    /// Skipped and xfail/xpass are reported separately.
    pub fn counts_toward_pass_rate(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Error)
    }

    /// Returns `true` for outcomes that feed auto-Defect escalation.
    pub fn is_failing(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

// ===========================================================================
// FailureCategory
// ===========================================================================

define_enum! {
    /// Classification of a test failure.
    FailureCategory, default = Assertion,
    variants: [
        (Assertion, "assertion"),
        (Timeout, "timeout"),
        (Resource, "resource"),
        (Flaky, "flaky"),
        (Integration, "integration"),
    ]
}

// ===========================================================================
// DependencyKind
// ===========================================================================

define_enum! {
    /// Kind of a directed edge between Epics.
    DependencyKind, default = Blocks,
    variants: [
        (Blocks, "blocks"),
        (RelatesTo, "relates-to"),
        (Duplicates, "duplicates"),
    ]
}

impl DependencyKind {
    /// Returns `true` if this kind participates in the acyclicity invariant
    /// and the critical-path / reachability analytics.
    pub fn is_blocking(&self) -> bool {
        *self == Self::Blocks
    }
}

// ===========================================================================
// EventType
// ===========================================================================

define_enum! {
    /// Categorises audit trail events.
    EventType, default = Created,
    variants: [
        (Created, "created"),
        (Updated, "updated"),
        (StatusChanged, "status_changed"),
        (StatusOverridden, "status_overridden"),
        (DependencyAdded, "dependency_added"),
        (DependencyRemoved, "dependency_removed"),
        (DefectAutoCreated, "defect_auto_created"),
        (Archived, "archived"),
    ]
}
