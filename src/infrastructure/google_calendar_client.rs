use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    async fn query_free_busy(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyPeriod>, InfraError>;

    /// Inserts the event and returns the id Google assigned to it.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError>;

    /// Replaces an existing event in place; the id does not change.
    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError>;

    /// Deleting an event that is already gone succeeds.
    async fn delete_event(&self, access_token: &str, calendar_id: &str, event_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
    api_base: String,
}

impl Default for ReqwestGoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestGoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: CALENDAR_API_BASE.to_string(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Calendar(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|error| InfraError::Calendar(format!("invalid calendar api base url: {error}")))?;
        url.path_segments_mut()
            .map_err(|_| InfraError::Calendar("calendar api base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_body(response: reqwest::Response, action: &str) -> Result<String, InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while reading {action} response: {error}")))?;
        if !status.is_success() {
            return Err(http_error(status, action, &body));
        }
        Ok(body)
    }
}

fn http_error(status: StatusCode, action: &str, body: &str) -> InfraError {
    let code = status.as_u16();
    if status == StatusCode::UNAUTHORIZED {
        return InfraError::OAuth(format!("google rejected the access token during {action}"));
    }
    let prefix = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        "temporarily unavailable"
    } else {
        "google calendar api error"
    };
    if body.trim().is_empty() {
        InfraError::Calendar(format!("{prefix} during {action}: http {code}"))
    } else {
        InfraError::Calendar(format!("{prefix} during {action}: http {code}; body={body}"))
    }
}

#[derive(Debug, serde::Serialize)]
struct FreeBusyRequest<'a> {
    #[serde(rename = "timeMin")]
    time_min: String,
    #[serde(rename = "timeMax")]
    time_max: String,
    items: [FreeBusyItem<'a>; 1],
}

#[derive(Debug, serde::Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusyRange>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, serde::Deserialize)]
struct FreeBusyError {
    reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CreatedEvent {
    id: Option<String>,
}

fn parse_free_busy(body: &str, calendar_id: &str) -> Result<Vec<BusyPeriod>, InfraError> {
    let mut parsed: FreeBusyResponse = serde_json::from_str(body)
        .map_err(|error| InfraError::Calendar(format!("invalid freeBusy payload: {error}")))?;
    let Some(calendar) = parsed.calendars.remove(calendar_id) else {
        return Ok(Vec::new());
    };
    if let Some(error) = calendar.errors.first() {
        let reason = error.reason.as_deref().unwrap_or("unknown");
        return Err(InfraError::Calendar(format!(
            "freeBusy could not read calendar {calendar_id}: {reason}"
        )));
    }
    Ok(calendar
        .busy
        .into_iter()
        .filter(|range| range.end > range.start)
        .map(|range| BusyPeriod {
            start: range.start,
            end: range.end,
        })
        .collect())
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn query_free_busy(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyPeriod>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let request = FreeBusyRequest {
            time_min: time_min.to_rfc3339(),
            time_max: time_max.to_rfc3339(),
            items: [FreeBusyItem { id: calendar_id }],
        };
        let response = self
            .client
            .post(self.endpoint(&["freeBusy"])?)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while querying free/busy: {error}")))?;

        let body = Self::read_body(response, "freeBusy").await?;
        parse_free_busy(&body, calendar_id)
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let response = self
            .client
            .post(self.endpoint(&["calendars", calendar_id, "events"])?)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while creating event: {error}")))?;

        let body = Self::read_body(response, "events.insert").await?;
        let created: CreatedEvent = serde_json::from_str(&body)
            .map_err(|error| InfraError::Calendar(format!("invalid event create payload: {error}")))?;
        created
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Calendar("event create response did not include id".to_string()))
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let response = self
            .client
            .put(self.endpoint(&["calendars", calendar_id, "events", event_id])?)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while updating event: {error}")))?;

        Self::read_body(response, "events.update").await?;
        Ok(())
    }

    async fn delete_event(&self, access_token: &str, calendar_id: &str, event_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let response = self
            .client
            .delete(self.endpoint(&["calendars", calendar_id, "events", event_id])?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Calendar(format!("network error while deleting event: {error}")))?;

        if is_already_gone(response.status()) {
            return Ok(());
        }
        Self::read_body(response, "events.delete").await?;
        Ok(())
    }
}

fn is_already_gone(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::GONE
}
