use crate::domain::interval::{sort_by_start, Interval};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MIN_FREE_SLOT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: i64,
}

impl FreeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
        }
    }

    pub fn as_interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }

    /// Keeps `[start, end)` only when it reaches the minimum publishable size.
    pub(crate) fn publishable(
        start: NaiveDateTime,
        end: NaiveDateTime,
        min_minutes: i64,
    ) -> Option<FreeSlot> {
        (end > start && (end - start).num_minutes() >= min_minutes)
            .then(|| FreeSlot::new(start, end))
    }
}

/// Daily span in which goals may be placed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for WorkingWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl WorkingWindow {
    pub fn validate(&self) -> Result<(), String> {
        if self.end <= self.start {
            return Err("working window end must be after start".to_string());
        }
        Ok(())
    }

    pub fn on(&self, date: NaiveDate) -> Option<Interval> {
        Interval::new(date.and_time(self.start), date.and_time(self.end))
    }
}

pub fn calculate_free_slots(window: &Interval, busy: &[Interval], min_minutes: i64) -> Vec<FreeSlot> {
    let clipped = busy
        .iter()
        .filter_map(|interval| interval.clip(window))
        .collect::<Vec<_>>();

    let mut slots = Vec::new();
    let mut cursor = window.start;
    for interval in sort_by_start(clipped) {
        if interval.start > cursor {
            slots.extend(FreeSlot::publishable(cursor, interval.start, min_minutes));
        }
        if interval.end > cursor {
            cursor = interval.end;
        }
    }
    if cursor < window.end {
        slots.extend(FreeSlot::publishable(cursor, window.end, min_minutes));
    }
    slots
}
