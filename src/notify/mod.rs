// User notifications
// Author: kelexine (https://github.com/kelexine)
//
// Components that need to tell the user something (missing API key, spending
// limit reached) receive a Notifier instead of talking to an editor UI.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Capability for surfacing a message to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "markpilot::notice", "{}", message);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Keeps the most recent notifications so editors can poll them, and logs
/// each one as it arrives.
#[derive(Debug)]
pub struct NotificationLog {
    recent: Mutex<VecDeque<Notice>>,
    capacity: usize,
}

impl NotificationLog {
    /// Keeps at most `capacity` notices, and always at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<Notice> {
        self.recent.lock().iter().rev().cloned().collect()
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, message: &str) {
        TracingNotifier.notify(message);

        let mut recent = self.recent.lock();
        while recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(Notice {
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_latest_notices_first() {
        let log = NotificationLog::new(2);
        log.notify("one");
        log.notify("two");
        log.notify("three");

        let messages: Vec<_> = log.recent().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["three", "two"]);
    }

    #[test]
    fn test_zero_capacity_keeps_only_latest() {
        let log = NotificationLog::new(0);
        for message in ["one", "two", "three"] {
            log.notify(message);
        }

        let messages: Vec<_> = log.recent().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["three"]);
    }
}
