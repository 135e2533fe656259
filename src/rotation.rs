use std::time::Duration;

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Error, Result};

/// Writer-exposed counters a rotation policy decides on.
///
/// A snapshot taken under the writer's sink lock, so `bytes_written` is
/// exact at the point rotation is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct RotationView {
    /// Bytes written to the current file since it was opened.
    pub bytes_written: u64,
    /// When the writer last rotated (or first opened the file).
    pub last_rotation: OffsetDateTime,
}

/// Advisory predicate: "should the writer rotate now?"
///
/// Policies only decide; the periodic checker (or the pre-emptive size check
/// on the write path) performs the rotation.
pub trait RotationPolicy: Send + Sync {
    /// Whether the writer should rotate given its current state.
    fn should_rotate(&self, view: &RotationView) -> bool;

    /// The size ceiling this policy implies, if any.
    ///
    /// The writer caches the minimum across its policy set as a snapshot
    /// whenever the set changes, so the hot write path never reads live
    /// policy state.
    fn size_limit(&self) -> Option<u64> {
        None
    }
}

/// Rotate once the current file reaches a byte limit.
#[derive(Debug, Clone, Copy)]
pub struct SizeRotationPolicy {
    max_size: u64,
}

impl SizeRotationPolicy {
    /// Rotate when `bytes_written` reaches `max_size`. Zero is rejected.
    pub fn new(max_size: u64) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::Config("size limit must be non-zero".to_string()));
        }
        Ok(Self { max_size })
    }
}

impl RotationPolicy for SizeRotationPolicy {
    fn should_rotate(&self, view: &RotationView) -> bool {
        // >= so exactly-at-limit triggers
        view.bytes_written >= self.max_size
    }

    fn size_limit(&self) -> Option<u64> {
        Some(self.max_size)
    }
}

/// Rotate at fixed times of day.
///
/// Configured as minute-of-day offsets (0..1440). Each check computes the
/// first scheduled instant strictly after the last rotation by walking the
/// sorted offsets, wrapping to the next day once today's offsets are
/// exhausted, and rotates once the clock reaches that instant.
#[derive(Debug, Clone)]
pub struct FixedTimeRotationPolicy {
    /// Sorted, deduplicated minute-of-day offsets.
    offsets: Vec<u16>,
}

impl FixedTimeRotationPolicy {
    /// Build from minute-of-day offsets; each must be below 1440.
    pub fn new(mut offsets: Vec<u16>) -> Result<Self> {
        if offsets.is_empty() {
            return Err(Error::Config(
                "fixed-time rotation needs at least one time of day".to_string(),
            ));
        }
        if let Some(bad) = offsets.iter().find(|&&m| m >= 24 * 60) {
            return Err(Error::Config(format!(
                "time-of-day offset {bad} is outside 0..1440"
            )));
        }
        offsets.sort_unstable();
        offsets.dedup();
        Ok(Self { offsets })
    }

    /// The first scheduled instant strictly after `last`.
    fn next_rotation_after(&self, last: OffsetDateTime) -> OffsetDateTime {
        let last_minute = u16::from(last.hour()) * 60 + u16::from(last.minute());
        match self.offsets.iter().find(|&&m| m > last_minute) {
            Some(&m) => at_minute(last.date(), m, last.offset()),
            // last rotation is past all of today's offsets: walk into tomorrow
            None => at_minute(
                last.date().next_day().unwrap_or(last.date()),
                self.offsets[0],
                last.offset(),
            ),
        }
    }

    fn due(&self, last: OffsetDateTime, now: OffsetDateTime) -> bool {
        // calendar math in a single zone
        let last = last.to_offset(now.offset());
        now >= self.next_rotation_after(last)
    }
}

fn at_minute(date: Date, minute: u16, offset: UtcOffset) -> OffsetDateTime {
    let time = Time::from_hms((minute / 60) as u8, (minute % 60) as u8, 0).unwrap();
    PrimitiveDateTime::new(date, time).assume_offset(offset)
}

impl RotationPolicy for FixedTimeRotationPolicy {
    fn should_rotate(&self, view: &RotationView) -> bool {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        self.due(view.last_rotation, now)
    }
}

/// Rotate once a fixed interval has elapsed since the last rotation.
#[derive(Debug, Clone, Copy)]
pub struct IntervalRotationPolicy {
    interval: time::Duration,
}

impl IntervalRotationPolicy {
    /// Rotate once strictly more than `interval` has passed. Zero is rejected.
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config(
                "rotation interval must be non-zero".to_string(),
            ));
        }
        let interval = time::Duration::try_from(interval)
            .map_err(|e| Error::Config(format!("rotation interval out of range: {e}")))?;
        Ok(Self { interval })
    }

    fn due(&self, last: OffsetDateTime, now: OffsetDateTime) -> bool {
        // strict: exactly-at-interval does not yet trigger
        now - last > self.interval
    }
}

impl RotationPolicy for IntervalRotationPolicy {
    fn should_rotate(&self, view: &RotationView) -> bool {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        self.due(view.last_rotation, now)
    }
}
