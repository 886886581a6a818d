//! The tracker client seam: a trait, its HTTP implementation, and the
//! retry/backoff policy.
//!
//! Consumers depend on [`TrackerClient`] rather than on the HTTP stack so
//! that tests (and alternative trackers) can substitute an in-memory fake.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gonogo_config::TrackerConfig;

use crate::{Result, SyncError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One item as delivered by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerItem {
    /// External ID, e.g. `US-00070`. The prefix routes the mapping.
    pub external_id: String,

    pub title: String,

    /// The tracker's status label, mapped via the configured table.
    #[serde(default)]
    pub status_label: String,

    /// Free-form body; recognized lines (`Parent: EP-NNNNN`) are extracted.
    #[serde(default)]
    pub body: String,

    /// Labels; recognized patterns (`points:N`, `capability:CAP-NNNNN`,
    /// `severity:high`) are extracted.
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub assignee: Option<String>,
}

/// One page of a paginated pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerPage {
    #[serde(default)]
    pub items: Vec<TrackerItem>,

    /// Cursor for the next page within this pull; `None` on the last page.
    #[serde(default)]
    pub next_cursor: Option<String>,

    /// Change cursor to persist once this page's items have committed.
    #[serde(default)]
    pub since_token: Option<String>,
}

/// Payload for creating a tracker item (auto-Defect mirroring).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Access to the external tracker.
pub trait TrackerClient {
    /// Fetches one page of items changed since `since`, continuing from
    /// `cursor` within the pull. Transient failures are retried internally
    /// up to the per-page budget.
    fn fetch_page(&self, since: Option<&str>, cursor: Option<&str>) -> Result<TrackerPage>;

    /// Fetches a single item by external reference.
    fn fetch_item(&self, tracker_ref: &str) -> Result<Option<TrackerItem>>;

    /// Creates an item, returning it with its assigned external ID.
    fn create_item(&self, draft: &ItemDraft) -> Result<TrackerItem>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// HTTP tracker client (ureq, blocking).
pub struct HttpTracker {
    config: TrackerConfig,
    agent: ureq::Agent,
}

impl HttpTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.request_timeout_ms)))
            .http_status_as_error(false)
            .build();
        Self {
            agent: agent_config.into(),
            config,
        }
    }

    /// Runs one GET with the retry policy: exponential backoff with jitter
    /// for transport errors and 5xx, Retry-After for 429, immediate
    /// failure for other 4xx.
    fn get_with_retry(&self, url: &str) -> Result<TrackerPage> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms.max(1));
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = self
                .agent
                .get(url)
                .header("Accept", "application/json")
                .header("Authorization", &format!("Bearer {}", self.config.token))
                .call();

            match outcome {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        return response
                            .body_mut()
                            .read_json::<TrackerPage>()
                            .map_err(|e| SyncError::MalformedResponse(e.to_string()));
                    }
                    if status == 429 {
                        // Honor the tracker's pacing signal; never spin.
                        let wait = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or(backoff);
                        if attempt > self.config.max_retries {
                            return Err(SyncError::Http { status });
                        }
                        warn!(attempt, ?wait, "tracker rate-limited, backing off");
                        thread::sleep(wait);
                        continue;
                    }
                    if status >= 500 {
                        if attempt > self.config.max_retries {
                            return Err(SyncError::Http { status });
                        }
                        debug!(attempt, status, "transient tracker error, retrying");
                    } else {
                        return Err(SyncError::Http { status });
                    }
                }
                Err(e) => {
                    if attempt > self.config.max_retries {
                        return Err(SyncError::Transport(e.to_string()));
                    }
                    debug!(attempt, error = %e, "tracker transport error, retrying");
                }
            }

            thread::sleep(with_jitter(backoff));
            backoff = backoff.saturating_mul(2);
        }
    }
}

/// Adds up to 25% random jitter so parallel pullers do not synchronize.
fn with_jitter(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 4).max(1));
    base + Duration::from_millis(jitter)
}

impl TrackerClient for HttpTracker {
    fn fetch_page(&self, since: Option<&str>, cursor: Option<&str>) -> Result<TrackerPage> {
        let mut url = format!(
            "{}/items?page_size={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.page_size
        );
        if let Some(since) = since {
            url.push_str(&format!("&since={since}"));
        }
        if let Some(cursor) = cursor {
            url.push_str(&format!("&cursor={cursor}"));
        }
        for filter in &self.config.filters {
            url.push_str(&format!("&filter={filter}"));
        }
        self.get_with_retry(&url)
    }

    fn fetch_item(&self, tracker_ref: &str) -> Result<Option<TrackerItem>> {
        let url = format!(
            "{}/items/{tracker_ref}",
            self.config.base_url.trim_end_matches('/')
        );
        let mut response = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .header("Authorization", &format!("Bearer {}", self.config.token))
            .call()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            s if (200..300).contains(&s) => response
                .body_mut()
                .read_json::<TrackerItem>()
                .map(Some)
                .map_err(|e| SyncError::MalformedResponse(e.to_string())),
            404 => Ok(None),
            s => Err(SyncError::Http { status: s }),
        }
    }

    fn create_item(&self, draft: &ItemDraft) -> Result<TrackerItem> {
        let url = format!(
            "{}/items",
            self.config.base_url.trim_end_matches('/')
        );
        let mut response = self
            .agent
            .post(&url)
            .header("Accept", "application/json")
            .header("Authorization", &format!("Bearer {}", self.config.token))
            .send_json(draft)
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(SyncError::Http { status });
        }
        response
            .body_mut()
            .read_json::<TrackerItem>()
            .map_err(|e| SyncError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_page_deserializes_with_defaults() {
        let page: TrackerPage = serde_json::from_str(
            r#"{"items":[{"external_id":"US-00070","title":"Epic dependency ORM","status_label":"in progress","body":"Parent: EP-00010","labels":["points:5"]}]}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].external_id, "US-00070");
        assert!(page.next_cursor.is_none());
        assert!(page.since_token.is_none());
    }

    #[test]
    fn jitter_stays_bounded() {
        let base = Duration::from_millis(200);
        for _ in 0..20 {
            let jittered = with_jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= base + Duration::from_millis(51));
        }
    }
}
