//! Detection dispatch with stale-result rejection
//!
//! Every submitted frame gets a fresh [`Generation`]. Engines cannot be
//! cancelled, so a completion whose generation is older than the newest
//! submission is dropped instead of being forwarded; only the most recent
//! request can ever reach the overlay.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::capture::frame::Frame;
use crate::vision::{
    DetectionOptions, DetectionRequest, DetectionResult, Generation, TextDetector, TextRegion,
};

/// A detection result that survived the staleness check
#[derive(Debug, Clone)]
pub struct DetectionUpdate {
    pub generation: Generation,
    /// Regions found; empty when the request failed
    pub regions: Vec<TextRegion>,
    /// Time from submission to completion
    pub latency: Duration,
}

/// Receives forwarded updates, on whichever thread the engine completed on
pub type UpdateSink = Box<dyn Fn(DetectionUpdate) + Send + Sync>;

/// Bounds on concurrent engine calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Maximum requests in flight (`None` = unbounded)
    pub max_in_flight: Option<usize>,
    /// Requests older than this stop counting toward `max_in_flight`
    pub stall_timeout: Option<Duration>,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            max_in_flight: Some(1),
            stall_timeout: Some(Duration::from_secs(2)),
        }
    }
}

#[cfg(test)]
impl DispatchLimits {
    pub fn unbounded() -> Self {
        Self {
            max_in_flight: None,
            stall_timeout: None,
        }
    }
}

/// Point-in-time copy of the dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    /// Frames not submitted because the in-flight cap was reached
    pub skipped: u64,
    /// Results forwarded downstream
    pub completed: u64,
    /// Results discarded because a newer request existed
    pub stale: u64,
    pub failed: u64,
    /// Requests given up on after the stall timeout
    pub stalled: u64,
    /// Requests the engine is still working on
    pub in_flight: usize,
    /// Highest generation submitted so far
    pub latest: Option<Generation>,
}

#[derive(Debug, Default)]
struct DispatchStats {
    submitted: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
    stalled: AtomicU64,
}

#[derive(Debug)]
struct InFlight {
    generation: Generation,
    submitted_at: Instant,
}

#[derive(Debug)]
struct Submissions {
    /// Highest generation handed to the engine so far
    latest: Option<Generation>,
    /// Requests still counted toward the cap; stalled ones are dropped from here
    in_flight: Vec<InFlight>,
}

struct DispatchShared {
    submissions: Mutex<Submissions>,
    sink: UpdateSink,
    stats: DispatchStats,
}

/// Submits frames to a [`TextDetector`] and forwards only the newest results
pub struct DetectionDispatcher {
    detector: Arc<dyn TextDetector>,
    options: DetectionOptions,
    limits: DispatchLimits,
    shared: Arc<DispatchShared>,
}

impl DetectionDispatcher {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        options: DetectionOptions,
        limits: DispatchLimits,
        sink: impl Fn(DetectionUpdate) + Send + Sync + 'static,
    ) -> Self {
        Self {
            detector,
            options,
            limits,
            shared: Arc::new(DispatchShared {
                submissions: Mutex::new(Submissions {
                    latest: None,
                    in_flight: Vec::new(),
                }),
                sink: Box::new(sink),
                stats: DispatchStats::default(),
            }),
        }
    }

    /// Submit a frame for detection.
    ///
    /// Returns the generation assigned, or `None` when the in-flight cap
    /// caused the frame to be skipped.
    pub fn submit(&self, frame: Arc<Frame>) -> Option<Generation> {
        let generation = {
            let mut submissions = self.shared.submissions.lock();
            self.release_stalled(&mut submissions);
            if !self.has_capacity(&submissions) {
                self.shared.stats.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("Detection busy, skipping frame");
                return None;
            }

            let generation = submissions
                .latest
                .map(Generation::next)
                .unwrap_or(Generation::FIRST);
            submissions.latest = Some(generation);
            submissions.in_flight.push(InFlight {
                generation,
                submitted_at: Instant::now(),
            });
            generation
        };
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let submitted_at = Instant::now();
        let shared = self.shared.clone();
        let request = DetectionRequest { frame, generation };

        // The engine may complete inline, so no lock is held here
        self.detector.detect(
            request,
            &self.options,
            Box::new(move |result| complete(&shared, generation, submitted_at, result)),
        );

        Some(generation)
    }

    /// Stop tracking requests older than the stall timeout.
    ///
    /// Their completions may still arrive later and go through the usual
    /// staleness check.
    fn release_stalled(&self, submissions: &mut Submissions) {
        let Some(timeout) = self.limits.stall_timeout else {
            return;
        };

        let stats = &self.shared.stats;
        submissions.in_flight.retain(|entry| {
            let elapsed = entry.submitted_at.elapsed();
            if elapsed < timeout {
                return true;
            }
            stats.stalled.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Detection {} has been running for {:?}, no longer waiting on it",
                entry.generation, elapsed
            );
            false
        });
    }

    fn has_capacity(&self, submissions: &Submissions) -> bool {
        self.limits
            .max_in_flight
            .map_or(true, |max| submissions.in_flight.len() < max)
    }

    pub fn stats(&self) -> DispatchSnapshot {
        let stats = &self.shared.stats;
        let submissions = self.shared.submissions.lock();
        DispatchSnapshot {
            submitted: stats.submitted.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            completed: stats.completed.load(Ordering::Relaxed),
            stale: stats.stale.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            stalled: stats.stalled.load(Ordering::Relaxed),
            in_flight: submissions.in_flight.len(),
            latest: submissions.latest,
        }
    }
}

fn complete(
    shared: &DispatchShared,
    generation: Generation,
    submitted_at: Instant,
    result: DetectionResult,
) {
    let latest = {
        let mut submissions = shared.submissions.lock();
        // Absent when the request was already released as stalled
        submissions.in_flight.retain(|entry| entry.generation != generation);
        submissions.latest
    };

    if latest.is_some_and(|latest| generation < latest) {
        shared.stats.stale.fetch_add(1, Ordering::Relaxed);
        debug!("Discarding stale detection {} (latest {:?})", generation, latest);
        return;
    }

    let regions = match result {
        Ok(regions) => {
            shared.stats.completed.fetch_add(1, Ordering::Relaxed);
            regions
        }
        Err(e) => {
            shared.stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Detection {} failed: {}", generation, e);
            Vec::new()
        }
    };

    (shared.sink)(DetectionUpdate {
        generation,
        regions,
        latency: submitted_at.elapsed(),
    });
}
