//! Per-identity outlier sampling
//!
//! An [`OutlierStore`] keeps at most one candidate trace per flush window:
//! the slowest one seen since the last flush. On flush the candidate is kept
//! when it is a robust outlier against the archive of previously kept
//! timings, or when the periodic rule forces a sample.
//!
//! # Decision per flush window
//!
//! | Archive      | Condition                          | Kept |
//! |--------------|------------------------------------|------|
//! | empty        | any candidate                      | yes  |
//! | MAD > 0      | `|t - median| / MAD > max_z_score` | yes  |
//! | MAD == 0     | `t != median`                      | yes  |
//! | any          | `counter % force_every == 0`       | yes  |
//!
//! Kept timings are appended to a bounded archive (oldest evicted first),
//! so memory per identity is `O(archive_size)`.

use crate::stats::{median, median_absolute_deviation, robust_z_score};
use crate::trace::TraceRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Sampling configuration shared by every identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierOptions {
    /// Force a sample every N windows even without an outlier
    pub force_every: u64,
    /// Number of past kept timings used as the reference distribution
    pub archive_size: usize,
    /// Robust z-score above which a candidate counts as an outlier
    pub max_z_score: f64,
}

impl Default for OutlierOptions {
    fn default() -> Self {
        Self {
            force_every: 30,
            archive_size: 30,
            max_z_score: 3.0,
        }
    }
}

impl OutlierOptions {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.force_every == 0 {
            return Err("force_every must be >= 1".to_string());
        }

        if self.archive_size == 0 {
            return Err("archive_size must be >= 1".to_string());
        }

        if !self.max_z_score.is_finite() || self.max_z_score < 0.0 {
            return Err(format!(
                "max_z_score must be a finite non-negative number, got {}",
                self.max_z_score
            ));
        }

        Ok(())
    }
}

/// Why a candidate was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Outlier,
    Periodic,
    Dropped,
}

/// Outlier sampling state for one operation identity
#[derive(Debug, Clone)]
pub struct OutlierStore {
    options: OutlierOptions,
    counter: u64,
    current_max: Option<TraceRecord>,
    archive: VecDeque<f64>,
}

impl OutlierStore {
    pub fn new(options: OutlierOptions) -> Self {
        let archive = VecDeque::with_capacity(options.archive_size + 1);
        Self {
            options,
            counter: 0,
            current_max: None,
            archive,
        }
    }

    /// Store with a pre-seeded archive (oldest first)
    pub fn with_archive(options: OutlierOptions, archive: impl IntoIterator<Item = f64>) -> Self {
        let mut store = Self::new(options);
        for time in archive {
            store.push_archive(time);
        }
        store
    }

    /// Offer a trace for the current window; only the slowest is kept
    pub fn add_trace(&mut self, trace: TraceRecord) {
        let replace = match &self.current_max {
            Some(current) => trace.time > current.time,
            None => true,
        };
        if replace {
            self.current_max = Some(trace);
        }
    }

    /// Close the current window, returning the candidate if it is kept
    pub fn get_outliers(&mut self) -> Vec<TraceRecord> {
        self.counter += 1;

        let Some(candidate) = self.current_max.take() else {
            return Vec::new();
        };

        match self.verdict(candidate.time) {
            Verdict::Dropped => Vec::new(),
            verdict => {
                trace!(
                    name = %candidate.name,
                    time = candidate.time,
                    window = self.counter,
                    ?verdict,
                    "sampled trace"
                );
                self.push_archive(candidate.time);
                vec![candidate]
            }
        }
    }

    /// Windows closed so far
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn current_max(&self) -> Option<&TraceRecord> {
        self.current_max.as_ref()
    }

    /// Kept timings, oldest first
    pub fn archive(&self) -> &VecDeque<f64> {
        &self.archive
    }

    pub fn options(&self) -> &OutlierOptions {
        &self.options
    }

    fn verdict(&self, time: f64) -> Verdict {
        if self.is_outlier(time) {
            Verdict::Outlier
        } else if self.counter % self.options.force_every.max(1) == 0 {
            Verdict::Periodic
        } else {
            Verdict::Dropped
        }
    }

    fn is_outlier(&self, time: f64) -> bool {
        if self.archive.is_empty() {
            return true;
        }

        let samples: Vec<f64> = self.archive.iter().copied().collect();
        let center = median(&samples);
        let mad = median_absolute_deviation(&samples, center);

        match robust_z_score(time, center, mad) {
            Some(z) => z > self.options.max_z_score,
            None => time != center,
        }
    }

    fn push_archive(&mut self, time: f64) {
        self.archive.push_back(time);
        while self.archive.len() > self.options.archive_size {
            self.archive.pop_front();
        }
    }
}

impl Default for OutlierStore {
    fn default() -> Self {
        Self::new(OutlierOptions::default())
    }
}
