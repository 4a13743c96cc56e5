use crate::domain::free_slots::FreeSlot;
use chrono::{Duration, NaiveDateTime};

/// Removes `[start, end + relaxation)` from the free-slot list and returns the
/// new list. Split or trimmed fragments shorter than `min_minutes` are dropped.
pub fn consume_slot(
    slots: &[FreeSlot],
    start: NaiveDateTime,
    end: NaiveDateTime,
    relaxation_minutes: u32,
    min_minutes: i64,
) -> Vec<FreeSlot> {
    let used_start = start;
    let used_end = end + Duration::minutes(i64::from(relaxation_minutes));

    let mut remaining = Vec::with_capacity(slots.len() + 1);
    for slot in slots {
        let overlaps = slot.start < used_end && slot.end > used_start;
        if !overlaps {
            remaining.push(*slot);
            continue;
        }
        // Before and after fragments cover the split, trim-start, trim-end and
        // full-containment cases alike; empty fragments vanish.
        remaining.extend(FreeSlot::publishable(slot.start, used_start, min_minutes));
        remaining.extend(FreeSlot::publishable(used_end, slot.end, min_minutes));
    }
    remaining
}
