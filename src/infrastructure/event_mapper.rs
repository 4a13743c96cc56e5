use crate::domain::models::{GoalType, ScheduledBlock};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use std::collections::HashMap;

const KEY_BLOCK_ID: &str = "db_block_id";
const KEY_GOAL_ID: &str = "db_goal_id";
const KEY_USER_ID: &str = "db_user_id";
const KEY_DATE: &str = "db_date";
const KEY_GOAL_TYPE: &str = "db_goal_type";
const LOCAL_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventReminders {
    #[serde(rename = "useDefault")]
    pub use_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventExtendedProperties {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: CalendarEventDateTime,
    pub end: CalendarEventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<CalendarEventReminders>,
    #[serde(rename = "colorId", skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(rename = "extendedProperties", skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<CalendarEventExtendedProperties>,
}

/// Calendar-side presentation shared by every pushed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStyle {
    pub time_zone: Tz,
    pub reminder_minutes: Vec<u32>,
    pub color_id: String,
}

pub fn event_title(goal_type: GoalType, goal_name: &str) -> String {
    let label = match goal_type {
        GoalType::Gym => "Gym",
        GoalType::Study => "Study",
        GoalType::Work => "Work",
        GoalType::Custom => "Goal",
    };
    format!("[{label}] {}", goal_name.trim())
}

/// Block wall-clock times are sent without an offset and pinned to the
/// configured zone, so the calendar resolves DST itself.
pub fn encode_block_event(block: &ScheduledBlock, goal_type: GoalType, style: &EventStyle) -> GoogleCalendarEvent {
    let private = HashMap::from([
        (KEY_BLOCK_ID.to_string(), block.id.clone()),
        (KEY_GOAL_ID.to_string(), block.goal_id.clone()),
        (KEY_USER_ID.to_string(), block.user_id.clone()),
        (KEY_DATE.to_string(), block.date.to_string()),
        (KEY_GOAL_TYPE.to_string(), goal_type.as_str().to_string()),
    ]);

    let reminders = if style.reminder_minutes.is_empty() {
        CalendarEventReminders {
            use_default: true,
            overrides: Vec::new(),
        }
    } else {
        CalendarEventReminders {
            use_default: false,
            overrides: style
                .reminder_minutes
                .iter()
                .map(|minutes| ReminderOverride {
                    method: "popup".to_string(),
                    minutes: *minutes,
                })
                .collect(),
        }
    };

    GoogleCalendarEvent {
        id: None,
        summary: Some(event_title(goal_type, &block.title)),
        description: Some(format!("Scheduled by DailyBlock - {}", block.title.trim())),
        start: local_date_time(block.start_at, style.time_zone),
        end: local_date_time(block.end_at, style.time_zone),
        reminders: Some(reminders),
        color_id: Some(style.color_id.clone()).filter(|value| !value.trim().is_empty()),
        extended_properties: Some(CalendarEventExtendedProperties { private }),
    }
}

fn local_date_time(value: NaiveDateTime, time_zone: Tz) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date_time: value.format(LOCAL_DATE_TIME_FORMAT).to_string(),
        time_zone: Some(time_zone.name().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BlockStatus;
    use chrono::NaiveDate;

    fn sample_block() -> ScheduledBlock {
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        ScheduledBlock {
            id: "block-001".to_string(),
            user_id: "user-1".to_string(),
            goal_id: "goal-gym".to_string(),
            title: "Morning lift".to_string(),
            date,
            start_at: date.and_hms_opt(6, 0, 0).expect("time"),
            end_at: date.and_hms_opt(7, 30, 0).expect("time"),
            relaxation_minutes: 15,
            calendar_event_id: None,
            calendar_synced: false,
            status: BlockStatus::Scheduled,
        }
    }

    fn style() -> EventStyle {
        EventStyle {
            time_zone: chrono_tz::America::Edmonton,
            reminder_minutes: vec![15, 5],
            color_id: "11".to_string(),
        }
    }

    #[test]
    fn encoded_event_carries_zone_reminders_and_ids() {
        let event = encode_block_event(&sample_block(), GoalType::Gym, &style());

        assert_eq!(event.summary.as_deref(), Some("[Gym] Morning lift"));
        assert_eq!(event.start.date_time, "2026-02-16T06:00:00");
        assert_eq!(event.end.time_zone.as_deref(), Some("America/Edmonton"));
        assert_eq!(event.color_id.as_deref(), Some("11"));
        let reminders = event.reminders.expect("reminders");
        assert!(!reminders.use_default);
        assert_eq!(
            reminders.overrides.iter().map(|entry| entry.minutes).collect::<Vec<_>>(),
            vec![15, 5]
        );
        let private = event.extended_properties.expect("properties").private;
        assert_eq!(private.get(KEY_GOAL_ID).map(String::as_str), Some("goal-gym"));
        assert_eq!(private.get(KEY_DATE).map(String::as_str), Some("2026-02-16"));
    }

    #[test]
    fn serialized_event_uses_google_field_names() {
        let event = encode_block_event(&sample_block(), GoalType::Study, &style());
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["colorId"], "11");
        assert_eq!(value["reminders"]["useDefault"], false);
        assert_eq!(value["reminders"]["overrides"][0]["method"], "popup");
        assert_eq!(value["start"]["timeZone"], "America/Edmonton");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn empty_reminder_list_falls_back_to_calendar_defaults() {
        let style = EventStyle {
            reminder_minutes: Vec::new(),
            ..style()
        };
        let event = encode_block_event(&sample_block(), GoalType::Custom, &style);
        let reminders = event.reminders.expect("reminders");
        assert!(reminders.use_default);
        assert!(reminders.overrides.is_empty());
        assert_eq!(event.summary.as_deref(), Some("[Goal] Morning lift"));
    }
}
