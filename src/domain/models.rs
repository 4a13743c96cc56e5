use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RELAXATION_MINUTES: u32 = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Gym,
    Study,
    Work,
    Custom,
}

impl GoalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gym => "gym",
            Self::Study => "study",
            Self::Work => "work",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gym" => Ok(Self::Gym),
            "study" => Ok(Self::Study),
            "work" => Ok(Self::Work),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown goal type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub goal_type: GoalType,
    pub name: String,
    pub weekly_target: u32,
    pub daily_hours: Option<f64>,
    pub preferred_times: Vec<String>,
    pub priority: i32,
    pub active: bool,
    pub relaxation_time_after: Option<u32>,
}

impl Goal {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "goal.id")?;
        validate_non_empty(&self.user_id, "goal.user_id")?;
        validate_non_empty(&self.name, "goal.name")?;
        if self.active && self.weekly_target == 0 {
            return Err("goal.weekly_target must be >= 1 for an active goal".to_string());
        }
        if let Some(hours) = self.daily_hours {
            if !hours.is_finite() || hours <= 0.0 || hours > 24.0 {
                return Err("goal.daily_hours must be within (0, 24]".to_string());
            }
        }
        for value in &self.preferred_times {
            validate_preferred_window(value, "goal.preferred_times[]")?;
        }
        Ok(())
    }

    pub fn relaxation_minutes(&self, fallback: u32) -> u32 {
        self.relaxation_time_after.unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shift {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub source: String,
}

impl Shift {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "shift.id")?;
        validate_non_empty(&self.user_id, "shift.user_id")?;
        parse_clock_time(&self.start_time)
            .ok_or_else(|| "shift.start_time must be HH:MM or HH:MM:SS".to_string())?;
        parse_clock_time(&self.end_time)
            .ok_or_else(|| "shift.end_time must be HH:MM or HH:MM:SS".to_string())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Scheduled,
    Completed,
    Missed,
    Skipped,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "missed" => Ok(Self::Missed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown block status '{other}'")),
        }
    }
}

/// A goal's concrete placement for one day, as handed to persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledBlock {
    pub id: String,
    pub user_id: String,
    pub goal_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub relaxation_minutes: u32,
    pub calendar_event_id: Option<String>,
    /// The calendar event matches this block's current span and title.
    #[serde(default)]
    pub calendar_synced: bool,
    pub status: BlockStatus,
}

impl ScheduledBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "block.user_id")?;
        validate_non_empty(&self.goal_id, "block.goal_id")?;
        if self.end_at <= self.start_at {
            return Err("block.end_at must be after block.start_at".to_string());
        }
        if self.start_at.date() != self.date {
            return Err("block.start_at must fall on block.date".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<NaiveTime, String> {
    let mut split = value.trim().split(':');
    let (Some(hour_str), Some(minute_str), None) = (split.next(), split.next(), split.next())
    else {
        return Err(format!("{field_name} must be HH:MM"));
    };

    let hour = hour_str
        .parse::<u32>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u32>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| format!("{field_name} must be HH:MM"))
}

pub(crate) fn validate_preferred_window(
    value: &str,
    field_name: &str,
) -> Result<(NaiveTime, NaiveTime), String> {
    let Some((start, end)) = value.split_once('-') else {
        return Err(format!("{field_name} must be HH:MM-HH:MM"));
    };
    let start = validate_hhmm(start, field_name)?;
    let end = validate_hhmm(end, field_name)?;
    if end <= start {
        return Err(format!("{field_name} end must be after start (got '{value}')"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn sample_goal() -> Goal {
        Goal {
            id: "goal-1".to_string(),
            user_id: "user-1".to_string(),
            goal_type: GoalType::Study,
            name: "Thesis".to_string(),
            weekly_target: 5,
            daily_hours: Some(2.0),
            preferred_times: vec!["19:00-22:00".to_string()],
            priority: 3,
            active: true,
            relaxation_time_after: None,
        }
    }

    fn sample_shift() -> Shift {
        Shift {
            id: "shift-1".to_string(),
            user_id: "user-1".to_string(),
            date: date("2026-02-16"),
            start_time: "09:00:00".to_string(),
            end_time: "17:00:00".to_string(),
            source: "manual".to_string(),
        }
    }

    fn sample_block() -> ScheduledBlock {
        let day = date("2026-02-16");
        ScheduledBlock {
            id: "blk-1".to_string(),
            user_id: "user-1".to_string(),
            goal_id: "goal-1".to_string(),
            title: "Thesis".to_string(),
            date: day,
            start_at: day.and_hms_opt(19, 0, 0).expect("valid time"),
            end_at: day.and_hms_opt(21, 0, 0).expect("valid time"),
            relaxation_minutes: 15,
            calendar_event_id: None,
            calendar_synced: false,
            status: BlockStatus::Scheduled,
        }
    }

    #[test]
    fn goal_validate_accepts_valid_goal() {
        assert!(sample_goal().validate().is_ok());
    }

    #[test]
    fn goal_validate_rejects_zero_weekly_target_when_active() {
        let mut goal = sample_goal();
        goal.weekly_target = 0;
        assert!(goal.validate().is_err());

        goal.active = false;
        assert!(goal.validate().is_ok());
    }

    #[test]
    fn goal_validate_rejects_overnight_preferred_window() {
        let mut goal = sample_goal();
        goal.preferred_times = vec!["22:00-06:00".to_string()];
        assert!(goal.validate().is_err());
    }

    #[test]
    fn goal_validate_rejects_malformed_preferred_window() {
        for raw in ["19:00", "7pm-9pm", "19:00-25:00", "19:00-19:00", "19:00-20:00:00"] {
            let mut goal = sample_goal();
            goal.preferred_times = vec![raw.to_string()];
            assert!(goal.validate().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn relaxation_falls_back_when_unset() {
        let mut goal = sample_goal();
        assert_eq!(goal.relaxation_minutes(DEFAULT_RELAXATION_MINUTES), 15);
        goal.relaxation_time_after = Some(30);
        assert_eq!(goal.relaxation_minutes(DEFAULT_RELAXATION_MINUTES), 30);
    }

    #[test]
    fn shift_validate_accepts_both_clock_formats() {
        let mut shift = sample_shift();
        assert!(shift.validate().is_ok());
        shift.end_time = "17:30".to_string();
        assert!(shift.validate().is_ok());
        shift.end_time = "five pm".to_string();
        assert!(shift.validate().is_err());
    }

    #[test]
    fn block_validate_rejects_reverse_range() {
        let mut block = sample_block();
        assert!(block.validate().is_ok());
        block.end_at = block.start_at;
        assert!(block.validate().is_err());
    }

    #[test]
    fn goal_type_and_status_parse_their_own_labels() {
        for goal_type in [GoalType::Gym, GoalType::Study, GoalType::Work, GoalType::Custom] {
            assert_eq!(GoalType::parse(goal_type.as_str()), Ok(goal_type));
        }
        for status in [
            BlockStatus::Scheduled,
            BlockStatus::Completed,
            BlockStatus::Missed,
            BlockStatus::Skipped,
        ] {
            assert_eq!(BlockStatus::parse(status.as_str()), Ok(status));
        }
        assert!(GoalType::parse("yoga").is_err());
    }

    proptest! {
        #[test]
        fn preferred_window_accepts_any_forward_same_day_range(
            start_hour in 0u32..23u32,
            start_minute in 0u32..60u32,
            span in 1u32..120u32
        ) {
            let start = start_hour * 60 + start_minute;
            let end = (start + span).min(23 * 60 + 59);
            prop_assume!(end > start);
            let raw = format!(
                "{:02}:{:02}-{:02}:{:02}",
                start / 60,
                start % 60,
                end / 60,
                end % 60
            );
            let parsed = validate_preferred_window(&raw, "window");
            prop_assert!(parsed.is_ok());
        }
    }
}
