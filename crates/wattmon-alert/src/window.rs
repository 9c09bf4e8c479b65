use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use wattmon_common::types::Reading;

/// Bounded trailing history of readings for one device, evicted by age.
pub struct ReadingWindow {
    window_secs: i64,
    data: VecDeque<Reading>,
}

impl ReadingWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: window_secs as i64,
            data: VecDeque::new(),
        }
    }

    pub fn push(&mut self, reading: Reading) {
        self.data.push_back(reading);
    }

    /// Drops readings older than the window, relative to `now`.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.window_secs);
        while let Some(front) = self.data.front() {
            if front.timestamp < cutoff {
                self.data.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn into_vec(mut self) -> Vec<Reading> {
        self.data.make_contiguous();
        self.data.into()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
