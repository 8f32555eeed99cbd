//! Per-access-group garbage accounting: decides when a compaction should be
//! escalated to collect garbage, and rescales its own targets after each
//! measurement so the decision self-corrects over time.
//!
//! No teacher analogue exists — the teacher always fully merges on every
//! compaction and never measures garbage fractions — so this module is
//! grounded directly on the algorithmic description rather than on an
//! existing source file.

use std::time::Duration;

/// Lower bound every rescaled target is clamped to, so a quiet access group
/// (near-zero garbage) never rescales its target down to zero and starts
/// triggering on every single write.
const MINIMUM_DATA_TARGET: u64 = 1024 * 1024;

/// Tracks garbage accumulation for one access group and decides when a
/// collecting compaction (GC) is warranted.
#[derive(Debug, Clone)]
pub struct GarbageTracker {
    delete_count: u64,
    expirable_bytes: u64,
    total_bytes: u64,

    data_target: u64,
    elapsed_target: Duration,

    min_ttl: Option<Duration>,
    #[allow(dead_code)]
    max_ttl: Option<Duration>,
    any_family_has_max_versions: bool,

    need_collection: bool,
    last_clear_time: std::time::Instant,

    garbage_threshold_percent: f64,
}

impl GarbageTracker {
    /// Builds a tracker for an access group whose split-size budget is
    /// `split_size` (seeds `data_target = split_size / 10`), whose
    /// column-family TTLs span `[min_ttl, max_ttl]` (`None` if no family has
    /// a TTL), and which escalates to GC at `garbage_threshold_percent`.
    #[must_use]
    pub fn new(
        split_size: u64,
        min_ttl: Option<Duration>,
        max_ttl: Option<Duration>,
        any_family_has_max_versions: bool,
        garbage_threshold_percent: f64,
    ) -> Self {
        let elapsed_target = min_ttl.map(|t| t / 10).unwrap_or(Duration::ZERO);
        GarbageTracker {
            delete_count: 0,
            expirable_bytes: 0,
            total_bytes: 0,
            data_target: (split_size / 10).max(MINIMUM_DATA_TARGET),
            elapsed_target,
            min_ttl,
            max_ttl,
            any_family_has_max_versions,
            need_collection: false,
            last_clear_time: std::time::Instant::now(),
            garbage_threshold_percent,
        }
    }

    /// Records `delete_count` additional tombstones and `bytes` additional
    /// written bytes, `expirable_bytes` of which belong to a family with a
    /// nonzero TTL. Called as writes land in the access group's cache.
    pub fn observe_write(&mut self, delete_count: u64, bytes: u64, expirable_bytes: u64) {
        self.delete_count += delete_count;
        self.total_bytes += bytes;
        self.expirable_bytes += expirable_bytes;
    }

    /// Returns `true` if a compaction should run now given `cached_data`
    /// bytes currently sitting in caches and the current time `now`.
    ///
    /// Two independent triggers, matching the accumulation rule: version- or
    /// delete-discipline garbage (`data_target` reached), or TTL-driven
    /// garbage (a family has a TTL, enough expirable bytes have piled up,
    /// and enough time has elapsed since the last clear).
    #[must_use]
    pub fn check_needed(&self, cached_data: u64, now: std::time::Instant) -> bool {
        let discipline_applies = self.any_family_has_max_versions || self.delete_count > 0;
        if discipline_applies && self.total_bytes.saturating_add(cached_data) >= self.data_target {
            return true;
        }

        if self.min_ttl.is_some()
            && self.expirable_bytes >= MINIMUM_DATA_TARGET
            && now.saturating_duration_since(self.last_clear_time) >= self.elapsed_target
        {
            return true;
        }

        false
    }

    /// Records the result of an actual merge-scan measurement: `total` input
    /// bytes and `valid` (surviving) output bytes. Updates `need_collection`
    /// and rescales `data_target`/`elapsed_target` so that, at this measured
    /// garbage percentage, the next trigger lands exactly at the configured
    /// threshold. Clamps each target to `[minimum, 2*current]`.
    pub fn set_garbage_stats(&mut self, total: u64, valid: u64, now: std::time::Instant) {
        let garbage_percent = if total == 0 {
            0.0
        } else {
            100.0 * (1.0 - (valid as f64 / total as f64))
        };
        self.need_collection = garbage_percent >= self.garbage_threshold_percent;

        if garbage_percent > 0.0 {
            let scale = self.garbage_threshold_percent / garbage_percent;
            let new_data_target = ((self.data_target as f64) * scale) as u64;
            self.data_target = new_data_target.clamp(MINIMUM_DATA_TARGET, self.data_target.saturating_mul(2));

            if !self.elapsed_target.is_zero() {
                let new_elapsed = self.elapsed_target.mul_f64(scale);
                let min_elapsed = Duration::from_secs(1);
                let max_elapsed = self.elapsed_target.saturating_mul(2);
                self.elapsed_target = new_elapsed.clamp(min_elapsed, max_elapsed);
            }
        }

        self.delete_count = 0;
        self.expirable_bytes = 0;
        self.total_bytes = 0;
        self.last_clear_time = now;
    }

    /// Whether the last measurement escalated this access group to
    /// "needs garbage collection" — consulted by the compaction algorithm to
    /// upgrade a minor compaction to a major one.
    #[must_use]
    pub fn need_collection(&self) -> bool {
        self.need_collection
    }

    /// Current byte target for the discipline-based trigger. Exposed for tests.
    #[must_use]
    pub fn data_target(&self) -> u64 {
        self.data_target
    }
}
