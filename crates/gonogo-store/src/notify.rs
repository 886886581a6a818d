//! Change notifications -- in-process publish/subscribe for committed writes.
//!
//! The report engine's cache invalidator subscribes here. Events are
//! published only after the surrounding transaction commits, so a
//! subscriber never observes a half-applied write.

use std::sync::Mutex;

/// The table a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTable {
    Capabilities,
    Epics,
    Stories,
    Defects,
    Tests,
    Dependencies,
    Executions,
    Meta,
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    /// Primary key of the changed row (edge changes carry the from-epic).
    pub id: String,
}

impl ChangeEvent {
    pub fn new(table: ChangeTable, id: impl Into<String>) -> Self {
        Self {
            table,
            id: id.into(),
        }
    }
}

/// Subscriber callback type.
pub type Subscriber = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Holds subscribers and fans committed events out to them.
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Subscribers cannot be removed; they live as
    /// long as the store.
    pub fn subscribe(&self, f: Subscriber) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(f);
        }
    }

    /// Publishes a batch of committed events to every subscriber.
    pub fn publish(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        if let Ok(subs) = self.subscribers.lock() {
            for event in events {
                for sub in subs.iter() {
                    sub(event);
                }
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_all_subscribers() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            notifier.subscribe(Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        notifier.publish(&[
            ChangeEvent::new(ChangeTable::Epics, "EP-00001"),
            ChangeEvent::new(ChangeTable::Stories, "US-00001"),
        ]);

        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn empty_batch_is_noop() {
        let notifier = Notifier::new();
        notifier.publish(&[]);
    }
}
