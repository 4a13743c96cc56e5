use crate::domain::interval::Interval;
use crate::domain::models::{parse_clock_time, Shift};
use chrono::{Duration, NaiveDate};

/// Converts a work shift to a busy interval on its own date.
///
/// A shift whose end clock time is earlier than its start runs past midnight,
/// so its end is rolled to the following day. Equal start and end is treated
/// as an empty shift.
pub fn shift_interval(shift: &Shift) -> Option<Interval> {
    let Some(start_time) = parse_clock_time(&shift.start_time) else {
        tracing::warn!(shift_id = %shift.id, start_time = %shift.start_time, "skipping shift with unparseable start time");
        return None;
    };
    let Some(end_time) = parse_clock_time(&shift.end_time) else {
        tracing::warn!(shift_id = %shift.id, end_time = %shift.end_time, "skipping shift with unparseable end time");
        return None;
    };

    let start = shift.date.and_time(start_time);
    let mut end = shift.date.and_time(end_time);
    if end_time < start_time {
        end += Duration::days(1);
    }
    Interval::new(start, end)
}

/// Unsorted union of remote busy time and the target day's shifts.
pub fn aggregate_busy(remote: &[Interval], shifts: &[Shift], date: NaiveDate) -> Vec<Interval> {
    let shift_intervals = shifts
        .iter()
        .filter(|shift| shift.date == date)
        .filter_map(shift_interval)
        .collect::<Vec<_>>();
    tracing::debug!(%date, shifts = shift_intervals.len(), remote = remote.len(), "aggregated busy time");

    remote
        .iter()
        .copied()
        .filter(|interval| interval.end > interval.start)
        .chain(shift_intervals)
        .collect()
}
