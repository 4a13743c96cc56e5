use crate::application::oauth::{EnsureTokenResult, OAuthManager};
use crate::domain::interval::Interval;
use crate::domain::models::{GoalType, ScheduledBlock};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{encode_block_event, EventStyle};
use crate::infrastructure::google_calendar_client::{BusyPeriod, GoogleCalendarClient};
use crate::infrastructure::oauth_client::TokenEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

/// Remote busy time for one user and day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusyTime {
    Connected(Vec<Interval>),
    /// No usable calendar credential. Nothing should be pushed for this user.
    NotConnected,
}

#[async_trait]
pub trait BusyTimeSource: Send + Sync {
    async fn busy_intervals(
        &self,
        user_id: &str,
        date: NaiveDate,
        time_zone: Tz,
    ) -> Result<BusyTime, InfraError>;
}

#[async_trait]
pub trait CalendarPush: Send + Sync {
    /// Writes the calendar event for a block and returns its external id.
    /// A block that already carries an event id has that event updated.
    async fn push_block(
        &self,
        block: &ScheduledBlock,
        goal_type: GoalType,
        style: &EventStyle,
    ) -> Result<String, InfraError>;

    /// Removes the block's event, if it has one.
    async fn retract_block(&self, block: &ScheduledBlock) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u8) -> TokioDuration {
        TokioDuration::from_millis(
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(u32::from(attempt))),
        )
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::Calendar(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("connection reset")
        }
        _ => false,
    }
}

/// Google Calendar backed busy-time source and event sink.
pub struct GoogleCalendarGateway<S, E, C>
where
    S: CredentialStore,
    E: TokenEndpoint,
    C: GoogleCalendarClient,
{
    oauth: Arc<OAuthManager<S, E>>,
    calendar_client: Arc<C>,
    calendar_id: String,
    retry_policy: RetryPolicy,
}

impl<S, E, C> GoogleCalendarGateway<S, E, C>
where
    S: CredentialStore,
    E: TokenEndpoint,
    C: GoogleCalendarClient,
{
    pub fn new(oauth: Arc<OAuthManager<S, E>>, calendar_client: Arc<C>, calendar_id: impl Into<String>) -> Self {
        Self {
            oauth,
            calendar_client,
            calendar_id: calendar_id.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn access_token(&self, user_id: &str) -> Result<Option<String>, InfraError> {
        let result = self.oauth.ensure_access_token(user_id).await?;
        if let EnsureTokenResult::Refreshed(_) = &result {
            tracing::debug!(user_id, "refreshed google access token");
        }
        Ok(result.access_token().map(ToOwned::to_owned))
    }

    async fn query_free_busy_with_retry(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyPeriod>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;
        loop {
            match self
                .calendar_client
                .query_free_busy(access_token, &self.calendar_id, time_min, time_max)
                .await
            {
                Ok(periods) => return Ok(periods),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    tracing::warn!(attempt, %error, "free/busy query failed; retrying");
                    sleep(self.retry_policy.delay_for(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl<S, E, C> BusyTimeSource for GoogleCalendarGateway<S, E, C>
where
    S: CredentialStore + 'static,
    E: TokenEndpoint + 'static,
    C: GoogleCalendarClient + 'static,
{
    async fn busy_intervals(
        &self,
        user_id: &str,
        date: NaiveDate,
        time_zone: Tz,
    ) -> Result<BusyTime, InfraError> {
        let Some(access_token) = self.access_token(user_id).await? else {
            return Ok(BusyTime::NotConnected);
        };
        let (time_min, time_max) = local_day_bounds(date, time_zone);
        let periods = self
            .query_free_busy_with_retry(&access_token, time_min, time_max)
            .await?;
        Ok(BusyTime::Connected(to_local_intervals(&periods, time_zone)))
    }
}

#[async_trait]
impl<S, E, C> CalendarPush for GoogleCalendarGateway<S, E, C>
where
    S: CredentialStore + 'static,
    E: TokenEndpoint + 'static,
    C: GoogleCalendarClient + 'static,
{
    async fn push_block(
        &self,
        block: &ScheduledBlock,
        goal_type: GoalType,
        style: &EventStyle,
    ) -> Result<String, InfraError> {
        let access_token = self
            .access_token(&block.user_id)
            .await?
            .ok_or_else(|| InfraError::CalendarNotConnected(block.user_id.clone()))?;
        let event = encode_block_event(block, goal_type, style);
        match block.calendar_event_id.as_deref() {
            Some(event_id) => {
                self.calendar_client
                    .update_event(&access_token, &self.calendar_id, event_id, &event)
                    .await?;
                Ok(event_id.to_string())
            }
            None => {
                self.calendar_client
                    .create_event(&access_token, &self.calendar_id, &event)
                    .await
            }
        }
    }

    async fn retract_block(&self, block: &ScheduledBlock) -> Result<(), InfraError> {
        let Some(event_id) = block.calendar_event_id.as_deref() else {
            return Ok(());
        };
        let access_token = self
            .access_token(&block.user_id)
            .await?
            .ok_or_else(|| InfraError::CalendarNotConnected(block.user_id.clone()))?;
        self.calendar_client
            .delete_event(&access_token, &self.calendar_id, event_id)
            .await
    }
}

/// UTC bounds of the local calendar day `[00:00, next 00:00)`.
pub fn local_day_bounds(date: NaiveDate, time_zone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN);
    (
        local_to_utc(start, time_zone),
        local_to_utc(start + Duration::days(1), time_zone),
    )
}

// Local midnight can fall in a DST gap; the first valid instant after it is used.
fn local_to_utc(value: NaiveDateTime, time_zone: Tz) -> DateTime<Utc> {
    time_zone
        .from_local_datetime(&value)
        .earliest()
        .or_else(|| time_zone.from_local_datetime(&(value + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&value))
}

pub fn to_local_intervals(periods: &[BusyPeriod], time_zone: Tz) -> Vec<Interval> {
    periods
        .iter()
        .filter_map(|period| {
            Interval::new(
                period.start.with_timezone(&time_zone).naive_local(),
                period.end.with_timezone(&time_zone).naive_local(),
            )
        })
        .collect()
}
