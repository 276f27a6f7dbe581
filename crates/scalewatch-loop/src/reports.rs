//! Bounded history of recent cycle reports.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use scalewatch_core::CycleReport;

/// Ring buffer of the most recent reports across all services.
pub struct ReportLog {
    capacity: usize,
    entries: Mutex<VecDeque<CycleReport>>,
}

impl ReportLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a report, evicting the oldest when full.
    pub fn push(&self, report: CycleReport) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(report);
    }

    /// Up to `limit` reports, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CycleReport> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Up to `limit` reports for one service, newest first.
    pub fn for_service(&self, service_id: &str, limit: usize) -> Vec<CycleReport> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| r.service_id == service_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CycleReport>> {
        // A panic while holding the lock leaves the deque intact.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ReportLog {
    fn default() -> Self {
        Self::new(256)
    }
}
