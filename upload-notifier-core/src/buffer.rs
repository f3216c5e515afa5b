// pending notification lines shared between the event classifier and the scheduler

use chrono::{DateTime, TimeZone};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// one finished upload waiting for the next hourly report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedLine {
    /// local wall-clock time of the delete event, `HH:MM`
    pub timestamp: String,
    pub canonical_name: String,
}

impl BufferedLine {
    pub fn new(timestamp: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            canonical_name: canonical_name.into(),
        }
    }

    /// stamp `canonical_name` with the hour and minute of `at`
    pub fn at<Tz: TimeZone>(at: &DateTime<Tz>, canonical_name: impl Into<String>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self::new(at.format("%H:%M").to_string(), canonical_name)
    }
}

impl fmt::Display for BufferedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.timestamp, self.canonical_name)
    }
}

/// insertion-ordered lines behind a single lock. clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct NotificationBuffer {
    lines: Arc<Mutex<Vec<BufferedLine>>>,
}

impl NotificationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: BufferedLine) {
        self.lines.lock().push(line);
    }

    /// take everything buffered so far, leaving the buffer empty
    pub fn drain(&self) -> Vec<BufferedLine> {
        std::mem::take(&mut *self.lines.lock())
    }

    /// put lines back at the front, ahead of anything appended since they were drained
    pub fn requeue(&self, mut lines: Vec<BufferedLine>) {
        if lines.is_empty() {
            return;
        }
        let mut guard = self.lines.lock();
        lines.append(&mut guard);
        *guard = lines;
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// copy of the current contents without clearing them
    pub fn snapshot(&self) -> Vec<BufferedLine> {
        self.lines.lock().clone()
    }
}
