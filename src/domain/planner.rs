use crate::domain::free_slots::FreeSlot;
use crate::domain::interval::Interval;
use crate::domain::models::{validate_preferred_window, Goal, GoalType};
use crate::domain::rules::PlacementRules;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A same-day `HH:MM-HH:MM` window a goal would like to be placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl PreferredWindow {
    pub fn parse(value: &str) -> Result<Self, String> {
        let (start, end) = validate_preferred_window(value, "preferred time")?;
        Ok(Self { start, end })
    }

    pub fn on(&self, date: NaiveDate) -> Option<Interval> {
        Interval::new(date.and_time(self.start), date.and_time(self.end))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlacementTier {
    Preferred,
    Optimal,
    FirstFit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placement {
    pub goal_id: String,
    pub goal_type: GoalType,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub relaxation_minutes: u32,
    pub tier: PlacementTier,
}

/// Goals in placement order: type group first, then descending priority.
/// Inactive goals are dropped; ties keep their input order.
pub fn order_goals<'a>(goals: &'a [Goal], rules: &PlacementRules) -> Vec<&'a Goal> {
    let mut ordered = goals.iter().filter(|goal| goal.active).collect::<Vec<_>>();
    ordered.sort_by(|left, right| {
        rules
            .group_rank(left.goal_type)
            .cmp(&rules.group_rank(right.goal_type))
            .then(right.priority.cmp(&left.priority))
    });
    ordered
}

/// Finds a place for one goal in the current free slots, or `None` when
/// nothing on the day is long enough.
///
/// `placed` holds the blocks already on the day. A candidate is rejected when
/// its own relaxation buffer would run into one of them; the buffers of
/// `placed` are already cut out of `slots`.
pub fn place_goal(
    goal: &Goal,
    slots: &[FreeSlot],
    placed: &[Placement],
    date: NaiveDate,
    rules: &PlacementRules,
    default_relaxation_minutes: u32,
) -> Option<Placement> {
    let minutes = rules.block_minutes(goal);
    if minutes <= 0 {
        tracing::warn!(goal_id = %goal.id, minutes, "goal has no positive block duration");
        return None;
    }
    let fit = Fit {
        duration: Duration::minutes(minutes),
        relaxation: Duration::minutes(i64::from(goal.relaxation_minutes(default_relaxation_minutes))),
        placed,
    };

    let (start, tier) = preferred_start(goal, slots, date, &fit)
        .map(|start| (start, PlacementTier::Preferred))
        .or_else(|| optimal_start(goal, slots, rules, &fit).map(|start| (start, PlacementTier::Optimal)))
        .or_else(|| first_fit_start(slots, &fit).map(|start| (start, PlacementTier::FirstFit)))?;
    let duration = fit.duration;

    if tier == PlacementTier::FirstFit && !goal.preferred_times.is_empty() {
        tracing::warn!(
            goal_id = %goal.id,
            preferred = ?goal.preferred_times,
            %start,
            "preferred times could not be honored; placed at first fit"
        );
    }

    Some(Placement {
        goal_id: goal.id.clone(),
        goal_type: goal.goal_type,
        title: goal.name.clone(),
        start,
        end: start + duration,
        relaxation_minutes: goal.relaxation_minutes(default_relaxation_minutes),
        tier,
    })
}

struct Fit<'a> {
    duration: Duration,
    relaxation: Duration,
    placed: &'a [Placement],
}

impl Fit<'_> {
    /// `[start, start + duration)` lies inside the slot and the trailing
    /// buffer stays clear of every placed block.
    fn admits(&self, slot: &FreeSlot, start: NaiveDateTime) -> bool {
        let end = start + self.duration;
        if start < slot.start || end > slot.end {
            return false;
        }
        let reserved_end = end + self.relaxation;
        self.placed
            .iter()
            .all(|block| reserved_end <= block.start || start >= block.end)
    }
}

fn preferred_start(goal: &Goal, slots: &[FreeSlot], date: NaiveDate, fit: &Fit<'_>) -> Option<NaiveDateTime> {
    for raw in &goal.preferred_times {
        let window = match PreferredWindow::parse(raw) {
            Ok(window) => window,
            Err(error) => {
                tracing::warn!(goal_id = %goal.id, %error, "ignoring invalid preferred time");
                continue;
            }
        };
        let Some(window) = window.on(date) else {
            continue;
        };

        for slot in slots {
            if !slot.as_interval().overlaps(&window) {
                continue;
            }
            let candidate = slot.start.max(window.start);
            if fit.admits(slot, candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn optimal_start(
    goal: &Goal,
    slots: &[FreeSlot],
    rules: &PlacementRules,
    fit: &Fit<'_>,
) -> Option<NaiveDateTime> {
    rules
        .optimal_windows(goal.goal_type)
        .iter()
        .find_map(|window| {
            slots
                .iter()
                .find(|slot| window.admits_start(slot.start) && fit.admits(slot, slot.start))
                .map(|slot| slot.start)
        })
}

fn first_fit_start(slots: &[FreeSlot], fit: &Fit<'_>) -> Option<NaiveDateTime> {
    slots
        .iter()
        .find(|slot| fit.admits(slot, slot.start))
        .map(|slot| slot.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DEFAULT_RELAXATION_MINUTES;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        day().and_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn slot(start: (u32, u32), end: (u32, u32)) -> FreeSlot {
        FreeSlot::new(at(start.0, start.1), at(end.0, end.1))
    }

    fn goal(id: &str, goal_type: GoalType, priority: i32, preferred: &[&str]) -> Goal {
        Goal {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            goal_type,
            name: format!("{} goal", goal_type.as_str()),
            weekly_target: 3,
            daily_hours: None,
            preferred_times: preferred.iter().map(|value| value.to_string()).collect(),
            priority,
            active: true,
            relaxation_time_after: None,
        }
    }

    fn place(goal: &Goal, slots: &[FreeSlot]) -> Option<Placement> {
        place_goal(
            goal,
            slots,
            &[],
            day(),
            &PlacementRules::standard(),
            DEFAULT_RELAXATION_MINUTES,
        )
    }

    #[test]
    fn preferred_window_start_is_used_inside_a_larger_slot() {
        let study = Goal {
            daily_hours: Some(2.0),
            ..goal("study", GoalType::Study, 1, &["19:00-22:00"])
        };
        let placed = place(&study, &[slot((6, 0), (9, 0)), slot((17, 0), (22, 0))])
            .expect("placement");
        assert_eq!((placed.start, placed.end), (at(19, 0), at(21, 0)));
        assert_eq!(placed.tier, PlacementTier::Preferred);
    }

    #[test]
    fn preferred_candidate_starts_at_slot_start_when_slot_opens_later() {
        let gym = goal("gym", GoalType::Gym, 1, &["17:00-20:00"]);
        let placed = place(&gym, &[slot((17, 15), (22, 0))]).expect("placement");
        assert_eq!((placed.start, placed.end), (at(17, 15), at(18, 45)));
    }

    #[test]
    fn preferred_windows_are_tried_in_goal_order() {
        let gym = goal("gym", GoalType::Gym, 1, &["20:00-22:00", "06:00-08:00"]);
        let placed = place(&gym, &[slot((6, 0), (22, 0))]).expect("placement");
        assert_eq!(placed.start, at(20, 0));
    }

    #[test]
    fn preferred_tier_skips_when_candidate_overruns_slot() {
        let gym = goal("gym", GoalType::Gym, 1, &["08:30-09:00"]);
        let placed = place(&gym, &[slot((6, 0), (9, 30)), slot((18, 0), (22, 0))])
            .expect("placement");
        // 08:30 + 90 overruns 09:30; the optimal morning window takes the slot start.
        assert_eq!(placed.start, at(6, 0));
        assert_eq!(placed.tier, PlacementTier::Optimal);
    }

    #[test]
    fn optimal_tier_places_gym_at_morning_start() {
        let gym = goal("gym", GoalType::Gym, 1, &[]);
        let placed = place(&gym, &[slot((6, 0), (22, 0))]).expect("placement");
        assert_eq!((placed.start, placed.end), (at(6, 0), at(7, 30)));
        assert_eq!(placed.tier, PlacementTier::Optimal);
        assert_eq!(placed.relaxation_minutes, 15);
    }

    #[test]
    fn optimal_tier_walks_ranges_before_slots() {
        let gym = goal("gym", GoalType::Gym, 1, &[]);
        // The 10:00 slot is earlier than the evening one but outside both gym ranges.
        let placed = place(&gym, &[slot((10, 0), (12, 0)), slot((17, 30), (20, 0))])
            .expect("placement");
        assert_eq!(placed.start, at(17, 30));
        assert_eq!(placed.tier, PlacementTier::Optimal);
    }

    #[test]
    fn first_fit_is_used_when_no_optimal_slot_exists() {
        let gym = goal("gym", GoalType::Gym, 1, &[]);
        let placed = place(&gym, &[slot((10, 0), (10, 45)), slot((11, 0), (13, 0))])
            .expect("placement");
        assert_eq!(placed.start, at(11, 0));
        assert_eq!(placed.tier, PlacementTier::FirstFit);
    }

    #[test]
    fn goal_is_omitted_when_no_slot_is_long_enough() {
        let gym = goal("gym", GoalType::Gym, 1, &[]);
        assert!(place(&gym, &[slot((6, 0), (7, 0)), slot((12, 0), (13, 0))]).is_none());
    }

    #[test]
    fn invalid_preferred_strings_are_skipped() {
        let custom = goal("custom", GoalType::Custom, 1, &["whenever", "10:00-11:00"]);
        let placed = place(&custom, &[slot((6, 0), (22, 0))]).expect("placement");
        assert_eq!(placed.start, at(10, 0));
        assert_eq!(placed.tier, PlacementTier::Preferred);
    }

    #[test]
    fn order_groups_by_type_then_descending_priority() {
        let goals = vec![
            goal("custom", GoalType::Custom, 9, &[]),
            goal("study-low", GoalType::Study, 1, &[]),
            goal("gym", GoalType::Gym, 1, &[]),
            goal("study-high", GoalType::Study, 5, &[]),
            goal("work", GoalType::Work, 0, &[]),
            Goal {
                active: false,
                ..goal("inactive-work", GoalType::Work, 10, &[])
            },
        ];
        let ordered = order_goals(&goals, &PlacementRules::standard())
            .into_iter()
            .map(|goal| goal.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ordered, vec!["work", "gym", "study-high", "study-low", "custom"]);
    }

    #[test]
    fn preferred_window_parse_rejects_overnight() {
        assert!(PreferredWindow::parse("22:00-02:00").is_err());
        let window = PreferredWindow::parse("06:00-08:30").expect("window");
        assert_eq!(window.end, NaiveTime::from_hms_opt(8, 30, 0).expect("time"));
    }
}
