use std::collections::VecDeque;
use tracing::trace;

use super::event::TelemetryEvent;
use super::metrics::{compute_snapshot, TelemetrySnapshot};

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded event log. When full, the oldest event is evicted and counted.
#[derive(Debug)]
pub struct TelemetryRecorder {
    events: VecDeque<TelemetryEvent>,
    capacity: usize,
    evicted: u64,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        trace!(?event, "telemetry");
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    /// Counters over the events still held; evicted ones no longer count.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.events)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_events_are_evicted() {
        let mut recorder = TelemetryRecorder::with_capacity(2);
        for count in 1..=3 {
            recorder.record(TelemetryEvent::SessionsExpired { count });
        }
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.evicted(), 1);
        assert_eq!(recorder.snapshot().session_stats.expired, 5);
    }
}
