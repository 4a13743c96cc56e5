use crate::domain::consumption::consume_slot;
use crate::domain::free_slots::{calculate_free_slots, FreeSlot, WorkingWindow, MIN_FREE_SLOT_MINUTES};
use crate::domain::interval::Interval;
use crate::domain::models::{Goal, DEFAULT_RELAXATION_MINUTES};
use crate::domain::planner::{order_goals, place_goal, Placement};
use crate::domain::rules::PlacementRules;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanningPolicy {
    pub working_window: WorkingWindow,
    pub min_slot_minutes: i64,
    pub default_relaxation_minutes: u32,
}

impl Default for PlanningPolicy {
    fn default() -> Self {
        Self {
            working_window: WorkingWindow::default(),
            min_slot_minutes: MIN_FREE_SLOT_MINUTES,
            default_relaxation_minutes: DEFAULT_RELAXATION_MINUTES,
        }
    }
}

impl PlanningPolicy {
    pub fn validate(&self) -> Result<(), String> {
        self.working_window.validate()?;
        if self.min_slot_minutes <= 0 {
            return Err("policy.min_slot_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub free_slots: Vec<FreeSlot>,
    pub remaining_slots: Vec<FreeSlot>,
    pub placements: Vec<Placement>,
    pub unplaced: Vec<String>,
}

pub fn free_slots_for_day(busy: &[Interval], date: NaiveDate, policy: &PlanningPolicy) -> Vec<FreeSlot> {
    match policy.working_window.on(date) {
        Some(window) => calculate_free_slots(&window, busy, policy.min_slot_minutes),
        None => Vec::new(),
    }
}

/// Greedy placement of every active goal into the day's free time. Earlier
/// placements are never revisited when a later goal does not fit.
///
/// Any two blocks keep the earlier one's relaxation buffer between them,
/// whichever of the two was placed first.
pub fn plan_day(
    goals: &[Goal],
    busy: &[Interval],
    date: NaiveDate,
    policy: &PlanningPolicy,
    rules: &PlacementRules,
) -> DayPlan {
    let free_slots = free_slots_for_day(busy, date, policy);
    let mut slots = free_slots.clone();
    let mut placements = Vec::new();
    let mut unplaced = Vec::new();

    for goal in order_goals(goals, rules) {
        match place_goal(goal, &slots, &placements, date, rules, policy.default_relaxation_minutes) {
            Some(placement) => {
                tracing::debug!(
                    goal_id = %goal.id,
                    start = %placement.start,
                    end = %placement.end,
                    tier = ?placement.tier,
                    "placed goal"
                );
                slots = consume_slot(
                    &slots,
                    placement.start,
                    placement.end,
                    placement.relaxation_minutes,
                    policy.min_slot_minutes,
                );
                placements.push(placement);
            }
            None => {
                tracing::info!(goal_id = %goal.id, goal_type = goal.goal_type.as_str(), %date, "no slot fits goal today");
                unplaced.push(goal.id.clone());
            }
        }
    }

    DayPlan {
        date,
        free_slots,
        remaining_slots: slots,
        placements,
        unplaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::busy_time::aggregate_busy;
    use crate::domain::models::{GoalType, Shift};
    use crate::domain::planner::PlacementTier;
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        day().and_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn busy(start: (u32, u32), end: (u32, u32)) -> Interval {
        Interval::new(at(start.0, start.1), at(end.0, end.1)).expect("interval")
    }

    fn goal(id: &str, goal_type: GoalType, priority: i32, preferred: &[&str]) -> Goal {
        Goal {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            goal_type,
            name: id.to_string(),
            weekly_target: 3,
            daily_hours: None,
            preferred_times: preferred.iter().map(|value| value.to_string()).collect(),
            priority,
            active: true,
            relaxation_time_after: None,
        }
    }

    fn plan(goals: &[Goal], busy: &[Interval]) -> DayPlan {
        plan_day(
            goals,
            busy,
            day(),
            &PlanningPolicy::default(),
            &PlacementRules::standard(),
        )
    }

    #[test]
    fn empty_day_places_gym_in_morning_window() {
        let result = plan(&[goal("gym", GoalType::Gym, 1, &[])], &[]);
        assert_eq!(result.placements.len(), 1);
        assert_eq!(result.placements[0].start, at(6, 0));
        assert_eq!(result.placements[0].end, at(7, 30));
        assert_eq!(result.placements[0].tier, PlacementTier::Optimal);
    }

    #[test]
    fn study_after_work_shift_lands_in_preferred_evening() {
        let shifts = vec![Shift {
            id: "shift-1".to_string(),
            user_id: "user-1".to_string(),
            date: day(),
            start_time: "09:00:00".to_string(),
            end_time: "17:00:00".to_string(),
            source: "manual".to_string(),
        }];
        let busy = aggregate_busy(&[], &shifts, day());
        let study = Goal {
            daily_hours: Some(2.0),
            ..goal("study", GoalType::Study, 1, &["19:00-22:00"])
        };

        let result = plan(&[study], &busy);

        assert_eq!(result.placements[0].start, at(19, 0));
        assert_eq!(result.placements[0].end, at(21, 0));
        assert_eq!(result.placements[0].tier, PlacementTier::Preferred);
    }

    #[test]
    fn gym_is_omitted_when_only_short_slots_remain() {
        let result = plan(
            &[goal("gym", GoalType::Gym, 1, &[])],
            &[busy((7, 0), (12, 0)), busy((13, 0), (22, 0))],
        );
        assert_eq!(result.free_slots.len(), 2);
        assert!(result.placements.is_empty());
        assert_eq!(result.unplaced, vec!["gym".to_string()]);
    }

    #[test]
    fn relaxation_buffer_is_removed_after_block() {
        let custom = Goal {
            relaxation_time_after: Some(30),
            ..goal("custom", GoalType::Custom, 1, &["10:00-11:30"])
        };
        let rules = PlacementRules::standard().with_rule(
            GoalType::Custom,
            crate::domain::rules::TypeRule {
                duration: crate::domain::rules::DurationRule::Fixed(90),
                optimal_windows: Vec::new(),
            },
        );
        let result = plan_day(&[custom], &[], day(), &PlanningPolicy::default(), &rules);

        assert_eq!(result.placements[0].start, at(10, 0));
        assert_eq!(result.placements[0].end, at(11, 30));
        let used = busy((10, 0), (12, 0));
        assert!(result
            .remaining_slots
            .iter()
            .all(|slot| !slot.as_interval().overlaps(&used)));
    }

    #[test]
    fn work_then_gym_respects_work_buffer() {
        let goals = vec![
            goal("gym", GoalType::Gym, 5, &["17:00-20:00"]),
            goal("work", GoalType::Work, 1, &[]),
        ];
        let result = plan(&goals, &[busy((6, 0), (9, 0))]);

        assert_eq!(result.placements[0].goal_id, "work");
        assert_eq!(
            (result.placements[0].start, result.placements[0].end),
            (at(9, 0), at(17, 0))
        );
        assert_eq!(result.placements[1].goal_id, "gym");
        assert_eq!(
            (result.placements[1].start, result.placements[1].end),
            (at(17, 15), at(18, 45))
        );
    }

    #[test]
    fn block_placed_before_an_existing_one_keeps_its_own_buffer() {
        let goals = vec![
            goal("evening", GoalType::Gym, 5, &["07:30-09:00"]),
            goal("second", GoalType::Gym, 1, &[]),
        ];
        let result = plan(&goals, &[]);

        assert_eq!(result.placements[0].goal_id, "evening");
        assert_eq!(result.placements[0].start, at(7, 30));
        assert_eq!(result.placements[0].tier, PlacementTier::Preferred);

        // 06:00-07:30 fits the block but leaves no room for its 15 minute buffer.
        assert_eq!(result.placements[1].goal_id, "second");
        assert_eq!(result.placements[1].start, at(9, 15));
        assert_eq!(result.placements[1].end, at(10, 45));
        assert_eq!(result.placements[1].tier, PlacementTier::FirstFit);
    }

    #[test]
    fn first_fit_is_used_when_nothing_better_exists() {
        let result = plan(
            &[goal("gym", GoalType::Gym, 1, &[])],
            &[busy((6, 0), (10, 0)), busy((12, 0), (22, 0))],
        );
        assert_eq!(result.placements[0].start, at(10, 0));
        assert_eq!(result.placements[0].tier, PlacementTier::FirstFit);
    }

    fn goal_type_strategy() -> impl Strategy<Value = GoalType> {
        prop_oneof![
            Just(GoalType::Gym),
            Just(GoalType::Study),
            Just(GoalType::Work),
            Just(GoalType::Custom),
        ]
    }

    proptest! {
        #[test]
        fn placement_attempts_follow_type_order(
            specs in proptest::collection::vec((goal_type_strategy(), -5i32..5i32), 1..8)
        ) {
            let goals = specs
                .iter()
                .enumerate()
                .map(|(index, (goal_type, priority))| goal(&format!("g{index}"), *goal_type, *priority, &[]))
                .collect::<Vec<_>>();
            let rules = PlacementRules::standard();
            let result = plan(&goals, &[]);

            let ranks = result
                .placements
                .iter()
                .map(|placement| rules.group_rank(placement.goal_type))
                .collect::<Vec<_>>();
            for pair in ranks.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }

        #[test]
        fn blocks_never_overlap_and_keep_buffers(
            specs in proptest::collection::vec(
                (
                    goal_type_strategy(),
                    0u32..60u32,
                    -3i32..3i32,
                    proptest::option::of((360u32..1290u32, 30u32..240u32)),
                ),
                1..8
            ),
            busy_raw in proptest::collection::vec((360u32..1300u32, 1u32..180u32), 0..4)
        ) {
            let goals = specs
                .iter()
                .enumerate()
                .map(|(index, (goal_type, relaxation, priority, preferred))| {
                    let preferred_times = preferred
                        .iter()
                        .map(|(start, length)| {
                            let end = (start + length).min(22 * 60);
                            format!("{:02}:{:02}-{:02}:{:02}", start / 60, start % 60, end / 60, end % 60)
                        })
                        .collect();
                    Goal {
                        relaxation_time_after: Some(*relaxation),
                        preferred_times,
                        ..goal(&format!("g{index}"), *goal_type, *priority, &[])
                    }
                })
                .collect::<Vec<_>>();
            let busy = busy_raw
                .into_iter()
                .filter_map(|(start, length)| {
                    let end = (start + length).min(1439);
                    Interval::new(at(start / 60, start % 60), at(end / 60, end % 60))
                })
                .collect::<Vec<_>>();

            let result = plan(&goals, &busy);

            for (index, left) in result.placements.iter().enumerate() {
                let left_span = Interval::new(left.start, left.end).expect("placement span");
                prop_assert!(busy.iter().all(|interval| !interval.overlaps(&left_span)));
                for right in &result.placements[index + 1..] {
                    let (first, second) = if left.start <= right.start { (left, right) } else { (right, left) };
                    let gap = (second.start - first.end).num_minutes();
                    prop_assert!(
                        gap >= i64::from(first.relaxation_minutes),
                        "{} ends {} but {} starts {}",
                        first.goal_id,
                        first.end,
                        second.goal_id,
                        second.start
                    );
                }
            }
        }

        #[test]
        fn fully_free_preferred_window_uses_preferred_tier(
            start_hour in 6u32..19u32,
            goal_type in goal_type_strategy()
        ) {
            let rules = PlacementRules::standard();
            let mut candidate = goal("g", goal_type, 0, &[]);
            if goal_type == GoalType::Work {
                candidate.daily_hours = Some(2.0);
            }
            let minutes = rules.block_minutes(&candidate);
            let end_minute = start_hour * 60 + minutes as u32;
            prop_assume!(end_minute <= 22 * 60);
            candidate.preferred_times = vec![format!(
                "{:02}:00-{:02}:{:02}",
                start_hour,
                end_minute / 60,
                end_minute % 60
            )];

            let result = plan(&[candidate], &[]);
            prop_assert_eq!(result.placements.len(), 1);
            prop_assert_eq!(result.placements[0].tier, PlacementTier::Preferred);
            prop_assert_eq!(result.placements[0].start, at(start_hour, 0));
        }
    }
}
