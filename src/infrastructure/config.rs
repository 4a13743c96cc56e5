use crate::domain::day_plan::PlanningPolicy;
use crate::domain::free_slots::WorkingWindow;
use crate::domain::models::parse_clock_time;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::EventStyle;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POLICIES_JSON: &str = "policies.json";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_EVENT_COLOR_ID: &str = "11";
const DEFAULT_PUSH_CONCURRENCY: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub policies: serde_json::Value,
}

/// Everything a scheduling run reads from the workspace config.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub time_zone: Tz,
    pub calendar_id: String,
    pub event_color_id: String,
    pub planning: PlanningPolicy,
    pub require_calendar_connection: bool,
    pub reminder_minutes: Vec<u32>,
    pub push_concurrency: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            time_zone: Tz::UTC,
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            event_color_id: DEFAULT_EVENT_COLOR_ID.to_string(),
            planning: PlanningPolicy::default(),
            require_calendar_connection: true,
            reminder_minutes: vec![15, 5],
            push_concurrency: DEFAULT_PUSH_CONCURRENCY,
        }
    }
}

impl SchedulerSettings {
    pub fn event_style(&self) -> EventStyle {
        EventStyle {
            time_zone: self.time_zone,
            reminder_minutes: self.reminder_minutes.clone(),
            color_id: self.event_color_id.clone(),
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "DailyBlock",
                "timezone": "UTC",
                "calendarId": DEFAULT_CALENDAR_ID,
                "eventColorId": DEFAULT_EVENT_COLOR_ID
            }),
        ),
        (
            POLICIES_JSON,
            serde_json::json!({
                "schema": 1,
                "workingWindow": {
                    "start": "06:00",
                    "end": "22:00"
                },
                "minimumSlotMinutes": 30,
                "defaultRelaxationMinutes": 15,
                "requireCalendarConnection": true,
                "eventReminderMinutes": [15, 5],
                "pushConcurrency": DEFAULT_PUSH_CONCURRENCY
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        policies: read_config(&config_dir.join(POLICIES_JSON))?,
    })
}

pub fn load_scheduler_settings(config_dir: &Path) -> Result<SchedulerSettings, InfraError> {
    let bundle = load_configs(config_dir)?;
    settings_from_bundle(&bundle)
}

fn settings_from_bundle(bundle: &ConfigBundle) -> Result<SchedulerSettings, InfraError> {
    let defaults = SchedulerSettings::default();
    let app = &bundle.app;
    let policies = &bundle.policies;

    let time_zone = match non_empty_str(app, "timezone") {
        Some(name) => name.parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{name}': {error}"))
        })?,
        None => defaults.time_zone,
    };

    let mut working_window = WorkingWindow::default();
    if let Some(window) = policies.get("workingWindow") {
        if let Some(start) = non_empty_str(window, "start") {
            working_window.start = parse_clock_time(start).ok_or_else(|| {
                InfraError::InvalidConfig(format!("workingWindow.start must be HH:MM (got '{start}')"))
            })?;
        }
        if let Some(end) = non_empty_str(window, "end") {
            working_window.end = parse_clock_time(end).ok_or_else(|| {
                InfraError::InvalidConfig(format!("workingWindow.end must be HH:MM (got '{end}')"))
            })?;
        }
    }

    let planning = PlanningPolicy {
        working_window,
        min_slot_minutes: policies
            .get("minimumSlotMinutes")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(defaults.planning.min_slot_minutes),
        default_relaxation_minutes: policies
            .get("defaultRelaxationMinutes")
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(defaults.planning.default_relaxation_minutes),
    };
    planning.validate().map_err(InfraError::InvalidConfig)?;

    let reminder_minutes = match policies
        .get("eventReminderMinutes")
        .and_then(serde_json::Value::as_array)
    {
        Some(values) => values
            .iter()
            .filter_map(serde_json::Value::as_u64)
            .filter_map(|value| u32::try_from(value).ok())
            .collect(),
        None => defaults.reminder_minutes,
    };

    Ok(SchedulerSettings {
        time_zone,
        calendar_id: non_empty_str(app, "calendarId")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.calendar_id),
        event_color_id: non_empty_str(app, "eventColorId")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.event_color_id),
        planning,
        require_calendar_connection: policies
            .get("requireCalendarConnection")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.require_calendar_connection),
        reminder_minutes,
        push_concurrency: policies
            .get("pushConcurrency")
            .and_then(serde_json::Value::as_u64)
            .map(|value| value.clamp(1, 16) as usize)
            .unwrap_or(defaults.push_concurrency),
    })
}

fn non_empty_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
