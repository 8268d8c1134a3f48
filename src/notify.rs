//! User-facing notification queue.
//!
//! Fetch and write failures surface here as user-meaningful summaries; the
//! UI layer drains the queue and renders toasts or inline messages.
//! Pushing never blocks and never panics; when the queue is full the
//! oldest entry is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::utils::lock;

/// Default queue capacity. Old entries the UI never drained are not worth
/// keeping around.
const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Mutex<VecDeque<Notification>>>,
    capacity: usize,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(Level::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    fn push(&self, level: Level, message: String) {
        debug!(?level, message = %message, "notification queued");
        let mut queue = lock(&self.inner);
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(Notification {
            level,
            message,
            at: Utc::now(),
        });
    }

    /// Remove and return all queued notifications, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        lock(&self.inner).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_oldest_first() {
        let notifier = Notifier::default();
        notifier.error("first");
        notifier.info("second");

        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "first");
        assert_eq!(drained[0].level, Level::Error);
        assert_eq!(drained[1].message, "second");
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let notifier = Notifier::new(2);
        notifier.info("a");
        notifier.info("b");
        notifier.info("c");

        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "b");
        assert_eq!(drained[1].message, "c");
    }
}
