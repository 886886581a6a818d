//! Epic -- the primary rollup target of the traceability matrix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::EpicStatus;

/// Helper for `skip_serializing_if` on `bool` fields.
fn is_false(b: &bool) -> bool {
    !b
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

/// A large unit of work. Authored locally; status may be mirrored from the
/// tracker when a tracker reference is linked. Soft-deleted via `archived`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    /// Stable `EP-NNNNN` ID.
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "EpicStatus::is_default")]
    pub status: EpicStatus,

    /// Owning capability, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_id: Option<String>,

    /// External tracker reference, if the Epic is mirrored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_ref: Option<String>,

    /// Planned completion date; feeds the PM schedule-variance dashboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_end_at: Option<DateTime<Utc>>,

    /// Configured business value in cents (ROI numerator).
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub roi_value_cents: i64,

    /// Configured delivery cost in cents (ROI denominator).
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub roi_cost_cents: i64,

    /// Tracked adoption gauge, if the Epic has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adoption_metric: Option<f64>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Epic {
    /// Returns the ROI ratio, or `None` when no cost is configured.
    pub fn roi(&self) -> Option<f64> {
        if self.roi_cost_cents <= 0 {
            return None;
        }
        Some(self.roi_value_cents as f64 / self.roi_cost_cents as f64)
    }
}

/// Builder for constructing an [`Epic`] with a fluent API.
pub struct EpicBuilder {
    epic: Epic,
}

impl EpicBuilder {
    /// Creates a new builder with the given ID and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            epic: Epic {
                id: id.into(),
                title: title.into(),
                status: EpicStatus::Planned,
                capability_id: None,
                tracker_ref: None,
                planned_end_at: None,
                roi_value_cents: 0,
                roi_cost_cents: 0,
                adoption_metric: None,
                created_at: now,
                updated_at: now,
                archived: false,
            },
        }
    }

    pub fn status(mut self, status: EpicStatus) -> Self {
        self.epic.status = status;
        self
    }

    pub fn capability(mut self, id: impl Into<String>) -> Self {
        self.epic.capability_id = Some(id.into());
        self
    }

    pub fn tracker_ref(mut self, r: impl Into<String>) -> Self {
        self.epic.tracker_ref = Some(r.into());
        self
    }

    pub fn planned_end_at(mut self, t: DateTime<Utc>) -> Self {
        self.epic.planned_end_at = Some(t);
        self
    }

    pub fn roi(mut self, value_cents: i64, cost_cents: i64) -> Self {
        self.epic.roi_value_cents = value_cents;
        self.epic.roi_cost_cents = cost_cents;
        self
    }

    pub fn adoption_metric(mut self, m: f64) -> Self {
        self.epic.adoption_metric = Some(m);
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.epic.created_at = t;
        self
    }

    /// Consumes the builder and returns the constructed [`Epic`].
    pub fn build(self) -> Epic {
        self.epic
    }
}
