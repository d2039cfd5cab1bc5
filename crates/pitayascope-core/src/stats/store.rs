//! In-memory capture statistics
//!
//! Keeps a bounded per-channel history of measurements and running counters
//! for continuous monitoring. Nothing here is persisted.

use crate::acquisition::engine::AcquisitionOutcome;
use crate::acquisition::reader::Channel;
use crate::analysis::measure::MeasurementResult;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Maximum number of measurement points kept per channel
const MAX_HISTORY_SIZE: usize = 3600; // 30 minutes at 2 captures/sec

/// A single timestamped channel measurement
#[derive(Debug, Clone)]
pub struct MeasurementPoint {
    pub timestamp: DateTime<Utc>,
    pub measurement: MeasurementResult,
    /// Measurement was taken on a zero-filled fallback buffer
    pub zero_filled: bool,
}

/// Running counters over all recorded outcomes
#[derive(Debug, Default, Clone)]
pub struct RunningStats {
    /// Acquisitions that produced data
    pub captures: u64,
    /// Acquisitions that ended in trigger timeout
    pub trigger_timeouts: u64,
    /// Channel reads that fell back to zeros (counted per channel)
    pub zero_filled_reads: u64,
    /// Time of the first recorded outcome
    pub started_at: Option<DateTime<Utc>>,
    /// Time of the most recent capture with data
    pub last_capture_at: Option<DateTime<Utc>>,
}

/// Capture statistics for one monitoring session
#[derive(Debug)]
pub struct CaptureStats {
    history: [VecDeque<MeasurementPoint>; 2],
    max_size: usize,
    stats: RunningStats,
}

impl CaptureStats {
    /// Create a store with the default history bound
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_SIZE)
    }

    /// Create a store keeping at most `max_size` points per channel
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            history: [VecDeque::new(), VecDeque::new()],
            max_size: max_size.max(1),
            stats: RunningStats::default(),
        }
    }

    /// Record the outcome of one acquisition
    pub fn record(&mut self, outcome: &AcquisitionOutcome) {
        let now = Utc::now();
        self.stats.started_at.get_or_insert(now);

        match outcome {
            AcquisitionOutcome::TriggerTimeout => {
                self.stats.trigger_timeouts += 1;
            }
            AcquisitionOutcome::Captured(result) => {
                self.stats.captures += 1;
                self.stats.last_capture_at = Some(result.captured_at);

                for channel in Channel::BOTH {
                    let buffer = result.buffer(channel);
                    if buffer.zero_filled {
                        self.stats.zero_filled_reads += 1;
                    }
                    self.push(
                        channel,
                        MeasurementPoint {
                            timestamp: result.captured_at,
                            measurement: *result.measurement(channel),
                            zero_filled: buffer.zero_filled,
                        },
                    );
                }
            }
        }
    }

    fn push(&mut self, channel: Channel, point: MeasurementPoint) {
        let history = &mut self.history[channel.slot()];
        while history.len() >= self.max_size {
            history.pop_front();
        }
        history.push_back(point);
    }

    /// Measurement history for `channel`, oldest first
    pub fn history(&self, channel: Channel) -> &VecDeque<MeasurementPoint> {
        &self.history[channel.slot()]
    }

    /// Most recent measurement for `channel`
    pub fn latest(&self, channel: Channel) -> Option<&MeasurementPoint> {
        self.history(channel).back()
    }

    /// Mean of the frequencies measured on `channel` from real (non zero-filled) data
    pub fn average_frequency(&self, channel: Channel) -> Option<f64> {
        let (sum, n) = self
            .history(channel)
            .iter()
            .filter(|p| !p.zero_filled)
            .filter_map(|p| p.measurement.frequency_hz)
            .fold((0.0, 0usize), |(sum, n), f| (sum + f, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Fraction of acquisitions that timed out waiting for the trigger
    pub fn timeout_ratio(&self) -> f64 {
        let total = self.stats.captures + self.stats.trigger_timeouts;
        if total == 0 {
            0.0
        } else {
            self.stats.trigger_timeouts as f64 / total as f64
        }
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Forget all history and counters
    pub fn clear(&mut self) {
        for history in &mut self.history {
            history.clear();
        }
        self.stats = RunningStats::default();
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}
