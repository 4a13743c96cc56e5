use crate::application::bootstrap::bootstrap_workspace;
use crate::application::calendar_gateway::{BusyTime, BusyTimeSource, CalendarPush, GoogleCalendarGateway};
use crate::application::oauth::{EnsureTokenResult, OAuthConfig, OAuthManager, DEFAULT_SCOPES};
use crate::application::scheduler::{BatchReport, ScheduleOrchestrator, ScheduleOutcome};
use crate::domain::free_slots::FreeSlot;
use crate::domain::models::{Goal, GoalType, ScheduledBlock, Shift};
use crate::infrastructure::config::{load_scheduler_settings, SchedulerSettings};
use crate::infrastructure::credential_store::KeyringCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::EventStyle;
use crate::infrastructure::goal_repository::{GoalStore, SqliteGoalRepository};
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::oauth_client::GoogleTokenEndpoint;
use crate::infrastructure::schedule_repository::{SchedulePersistence, SqliteScheduleRepository};
use crate::infrastructure::shift_repository::{ShiftStore, SqliteShiftRepository};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/oauth2/callback";
const GENERATION_TARGET_MS: u128 = 30_000;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Google OAuth client registration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    google: Option<GoogleOAuthSettings>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let google = match load_google_settings_from_env() {
            Ok(settings) => Some(settings),
            Err(error) => {
                tracing::info!(%error, "google oauth client not configured; calendar features disabled");
                None
            }
        };

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            google,
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_google_settings(mut self, google: Option<GoogleOAuthSettings>) -> Self {
        self.google = google;
        self
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn goal_store(&self) -> SqliteGoalRepository {
        SqliteGoalRepository::new(&self.database_path)
    }

    fn shift_store(&self) -> SqliteShiftRepository {
        SqliteShiftRepository::new(&self.database_path)
    }

    fn schedule_store(&self) -> SqliteScheduleRepository {
        SqliteScheduleRepository::new(&self.database_path)
    }
}

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub user_id: String,
    pub goal_type: String,
    pub name: String,
    pub weekly_target: u32,
    pub daily_hours: Option<f64>,
    pub preferred_times: Vec<String>,
    pub priority: i32,
    pub relaxation_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectGoogleResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

pub fn add_goal_impl(state: &AppState, input: NewGoal) -> Result<Goal, InfraError> {
    let goal_type = GoalType::parse(&input.goal_type).map_err(InfraError::InvalidInput)?;
    let goal = Goal {
        id: next_id("goal"),
        user_id: input.user_id.trim().to_string(),
        goal_type,
        name: input.name.trim().to_string(),
        weekly_target: input.weekly_target,
        daily_hours: input.daily_hours,
        preferred_times: input
            .preferred_times
            .iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect(),
        priority: input.priority,
        active: true,
        relaxation_time_after: input.relaxation_minutes,
    };
    state.goal_store().save_goal(&goal)?;
    state.log_info("add_goal", &format!("user={} goal={} type={}", goal.user_id, goal.id, goal_type.as_str()));
    Ok(goal)
}

pub fn list_goals_impl(state: &AppState, user_id: &str) -> Result<Vec<Goal>, InfraError> {
    state.goal_store().list_goals(user_id.trim())
}

pub fn set_goal_active_impl(state: &AppState, user_id: &str, goal_id: &str, active: bool) -> Result<bool, InfraError> {
    let changed = state.goal_store().set_active(user_id.trim(), goal_id.trim(), active)?;
    if changed {
        state.log_info("set_goal_active", &format!("user={user_id} goal={goal_id} active={active}"));
    }
    Ok(changed)
}

pub fn add_shift_impl(
    state: &AppState,
    user_id: &str,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> Result<Shift, InfraError> {
    let shift = Shift {
        id: next_id("shift"),
        user_id: user_id.trim().to_string(),
        date: parse_date_input(date)?,
        start_time: start_time.trim().to_string(),
        end_time: end_time.trim().to_string(),
        source: "manual".to_string(),
    };
    state.shift_store().save_shift(&shift)?;
    state.log_info(
        "add_shift",
        &format!("user={} date={} {}-{}", shift.user_id, shift.date, shift.start_time, shift.end_time),
    );
    Ok(shift)
}

pub fn list_shifts_impl(state: &AppState, user_id: &str, date: Option<&str>) -> Result<Vec<Shift>, InfraError> {
    let settings = load_scheduler_settings(&state.config_dir)?;
    let date = resolve_date(date, settings.time_zone)?;
    state.shift_store().list_shifts_for_date(user_id.trim(), date)
}

pub fn list_schedule_impl(state: &AppState, user_id: &str, date: Option<&str>) -> Result<Vec<ScheduledBlock>, InfraError> {
    let settings = load_scheduler_settings(&state.config_dir)?;
    let date = resolve_date(date, settings.time_zone)?;
    state.schedule_store().list_blocks_for_date(user_id.trim(), date)
}

pub async fn preview_free_slots_impl(
    state: &AppState,
    user_id: &str,
    date: Option<&str>,
) -> Result<Vec<FreeSlot>, InfraError> {
    let orchestrator = build_orchestrator(state)?;
    let date = resolve_date(date, orchestrator.settings().time_zone)?;
    orchestrator.preview_free_slots(user_id.trim(), date).await
}

pub async fn generate_schedule_impl(
    state: &AppState,
    user_id: &str,
    date: Option<&str>,
) -> Result<ScheduleOutcome, InfraError> {
    let started = Instant::now();
    let orchestrator = build_orchestrator(state)?;
    let date = resolve_date(date, orchestrator.settings().time_zone)?;
    let outcome = orchestrator.generate(user_id.trim(), date).await?;

    let elapsed_ms = started.elapsed().as_millis();
    state.log_info(
        "generate_schedule",
        &format!(
            "user={} date={} status={:?} blocks={} unscheduled={} elapsed_ms={elapsed_ms}",
            outcome.user_id,
            outcome.date,
            outcome.status,
            outcome.blocks.len(),
            outcome.unscheduled_goal_ids.len()
        ),
    );
    if elapsed_ms > GENERATION_TARGET_MS {
        state.log_error(
            "generate_schedule",
            &format!("generation exceeded target: elapsed_ms={elapsed_ms} target_ms={GENERATION_TARGET_MS}"),
        );
    }
    Ok(outcome)
}

/// Daily run over every user who owns an active goal.
pub async fn generate_all_impl(state: &AppState, date: Option<&str>) -> Result<BatchReport, InfraError> {
    let orchestrator = build_orchestrator(state)?;
    let date = resolve_date(date, orchestrator.settings().time_zone)?;
    let users = state.goal_store().list_users_with_active_goals()?;
    let report = orchestrator.generate_for_all(&users, date).await;

    state.log_info(
        "generate_all",
        &format!("date={date} users={} failed={}", users.len(), report.failures.len()),
    );
    for failure in &report.failures {
        state.log_error("generate_all", &format!("user={} error={}", failure.user_id, failure.error));
    }
    Ok(report)
}

pub async fn connect_google_impl(
    state: &AppState,
    user_id: &str,
    authorization_code: Option<String>,
) -> Result<ConnectGoogleResponse, InfraError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(InfraError::InvalidInput("user id must not be empty".to_string()));
    }
    let google = state.google.clone().ok_or_else(|| {
        InfraError::InvalidConfig("google oauth client is not configured".to_string())
    })?;
    let manager = oauth_manager(&google);

    if let Some(code) = authorization_code {
        let token = manager.authenticate_with_code(user_id, &code).await?;
        state.log_info("connect_google", &format!("stored google token for user={user_id}"));
        return Ok(ConnectGoogleResponse {
            status: "authenticated".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        });
    }

    match manager.ensure_access_token(user_id).await? {
        EnsureTokenResult::Existing(token) => Ok(ConnectGoogleResponse {
            status: "existing".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::Refreshed(token) => Ok(ConnectGoogleResponse {
            status: "refreshed".to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }),
        EnsureTokenResult::ReauthenticationRequired => Ok(ConnectGoogleResponse {
            status: "reauthentication_required".to_string(),
            authorization_url: Some(manager.build_authorization_url(user_id)?),
            expires_at: None,
        }),
    }
}

pub fn disconnect_google_impl(state: &AppState, user_id: &str) -> Result<(), InfraError> {
    let google = state.google.clone().ok_or_else(|| {
        InfraError::InvalidConfig("google oauth client is not configured".to_string())
    })?;
    oauth_manager(&google).disconnect(user_id.trim())?;
    state.log_info("disconnect_google", &format!("removed google token for user={}", user_id.trim()));
    Ok(())
}

fn oauth_manager(google: &GoogleOAuthSettings) -> OAuthManager<KeyringCredentialStore, GoogleTokenEndpoint> {
    OAuthManager::new(
        OAuthConfig::new(google.client_id.clone(), google.redirect_uri.clone(), google.scopes.clone()),
        Arc::new(KeyringCredentialStore::default()),
        Arc::new(GoogleTokenEndpoint::new(google.client_id.clone(), google.client_secret.clone())),
    )
}

fn build_orchestrator(state: &AppState) -> Result<ScheduleOrchestrator, InfraError> {
    let settings = load_scheduler_settings(&state.config_dir)?;
    let (busy_source, calendar): (Arc<dyn BusyTimeSource>, Arc<dyn CalendarPush>) = match &state.google {
        Some(google) => {
            let gateway = Arc::new(GoogleCalendarGateway::new(
                Arc::new(oauth_manager(google)),
                Arc::new(ReqwestGoogleCalendarClient::new()),
                settings.calendar_id.clone(),
            ));
            (Arc::clone(&gateway) as Arc<dyn BusyTimeSource>, gateway as Arc<dyn CalendarPush>)
        }
        None => (Arc::new(NoCalendar), Arc::new(NoCalendar)),
    };

    Ok(ScheduleOrchestrator::new(
        Arc::new(state.goal_store()) as Arc<dyn GoalStore>,
        Arc::new(state.shift_store()) as Arc<dyn ShiftStore>,
        Arc::new(state.schedule_store()) as Arc<dyn SchedulePersistence>,
        busy_source,
        calendar,
        settings,
    ))
}

/// Stand-in when no OAuth client is registered: every user is disconnected.
struct NoCalendar;

#[async_trait]
impl BusyTimeSource for NoCalendar {
    async fn busy_intervals(&self, _user_id: &str, _date: NaiveDate, _time_zone: Tz) -> Result<BusyTime, InfraError> {
        Ok(BusyTime::NotConnected)
    }
}

#[async_trait]
impl CalendarPush for NoCalendar {
    async fn push_block(&self, block: &ScheduledBlock, _goal_type: GoalType, _style: &EventStyle) -> Result<String, InfraError> {
        Err(InfraError::CalendarNotConnected(block.user_id.clone()))
    }

    async fn retract_block(&self, block: &ScheduledBlock) -> Result<(), InfraError> {
        match block.calendar_event_id {
            Some(_) => Err(InfraError::CalendarNotConnected(block.user_id.clone())),
            None => Ok(()),
        }
    }
}

fn resolve_date(date: Option<&str>, time_zone: Tz) -> Result<NaiveDate, InfraError> {
    match date.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date_input(value),
        None => Ok(Utc::now().with_timezone(&time_zone).date_naive()),
    }
}

fn parse_date_input(value: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| InfraError::InvalidInput(format!("date must be YYYY-MM-DD (got '{value}'): {error}")))
}

fn load_google_settings_from_env() -> Result<GoogleOAuthSettings, InfraError> {
    load_google_settings_from_lookup(|key| std::env::var(key).ok())
}

fn load_google_settings_from_lookup<F>(lookup: F) -> Result<GoogleOAuthSettings, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = required_lookup_value(
        &lookup,
        &["DAILYBLOCK_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
        "google client id",
    )?;
    let client_secret = required_lookup_value(
        &lookup,
        &["DAILYBLOCK_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
        "google client secret",
    )?;
    let redirect_uri = optional_lookup_value(&lookup, &["DAILYBLOCK_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"])
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scopes = optional_lookup_value(&lookup, &["DAILYBLOCK_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
        .map(|raw| parse_scope_list(&raw))
        .filter(|scopes| !scopes.is_empty())
        .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect());

    Ok(GoogleOAuthSettings {
        client_id,
        client_secret,
        redirect_uri,
        scopes,
    })
}

fn required_lookup_value<F>(lookup: &F, keys: &[&str], field_name: &str) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!("missing {} (set one of: {})", field_name, keys.join(", ")))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
