use crate::domain::models::{Goal, GoalType};
use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationRule {
    Fixed(i64),
    /// `daily_hours * 60` when the goal sets it, otherwise the default.
    DailyHours { default_minutes: i64 },
}

/// Hour range `[start_hour, end_hour)` tested against a slot's start hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimalWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl OptimalWindow {
    pub const fn hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn admits_start(&self, start: NaiveDateTime) -> bool {
        let hour = start.hour();
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRule {
    pub duration: DurationRule,
    pub optimal_windows: Vec<OptimalWindow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRules {
    rules: HashMap<GoalType, TypeRule>,
    group_order: Vec<GoalType>,
}

impl Default for PlacementRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl PlacementRules {
    pub fn standard() -> Self {
        let rules = HashMap::from([
            (
                GoalType::Gym,
                TypeRule {
                    duration: DurationRule::Fixed(90),
                    optimal_windows: vec![OptimalWindow::hours(6, 9), OptimalWindow::hours(17, 20)],
                },
            ),
            (
                GoalType::Study,
                TypeRule {
                    duration: DurationRule::DailyHours {
                        default_minutes: 120,
                    },
                    optimal_windows: vec![
                        OptimalWindow::hours(6, 10),
                        OptimalWindow::hours(14, 18),
                        OptimalWindow::hours(19, 22),
                    ],
                },
            ),
            (
                GoalType::Work,
                TypeRule {
                    duration: DurationRule::DailyHours {
                        default_minutes: 480,
                    },
                    optimal_windows: vec![OptimalWindow::hours(9, 17)],
                },
            ),
            (
                GoalType::Custom,
                TypeRule {
                    duration: DurationRule::Fixed(60),
                    optimal_windows: vec![OptimalWindow::hours(8, 22)],
                },
            ),
        ]);

        Self {
            rules,
            group_order: vec![GoalType::Work, GoalType::Gym, GoalType::Study, GoalType::Custom],
        }
    }

    pub fn with_rule(mut self, goal_type: GoalType, rule: TypeRule) -> Self {
        self.rules.insert(goal_type, rule);
        self
    }

    pub fn rule(&self, goal_type: GoalType) -> Option<&TypeRule> {
        self.rules.get(&goal_type)
    }

    pub fn block_minutes(&self, goal: &Goal) -> i64 {
        let Some(rule) = self.rule(goal.goal_type) else {
            return 60;
        };
        match rule.duration {
            DurationRule::Fixed(minutes) => minutes,
            DurationRule::DailyHours { default_minutes } => goal
                .daily_hours
                .filter(|hours| hours.is_finite() && *hours > 0.0)
                .map(|hours| (hours * 60.0).round() as i64)
                .unwrap_or(default_minutes),
        }
    }

    pub fn optimal_windows(&self, goal_type: GoalType) -> &[OptimalWindow] {
        self.rule(goal_type)
            .map(|rule| rule.optimal_windows.as_slice())
            .unwrap_or(&[])
    }

    /// Position of the type in the placement sequence; unknown types go last.
    pub fn group_rank(&self, goal_type: GoalType) -> usize {
        self.group_order
            .iter()
            .position(|candidate| *candidate == goal_type)
            .unwrap_or(self.group_order.len())
    }
}
