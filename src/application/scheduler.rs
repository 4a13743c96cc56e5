use crate::application::calendar_gateway::{BusyTime, BusyTimeSource, CalendarPush};
use crate::domain::busy_time::aggregate_busy;
use crate::domain::day_plan::{free_slots_for_day, plan_day};
use crate::domain::free_slots::FreeSlot;
use crate::domain::interval::Interval;
use crate::domain::models::{BlockStatus, GoalType, ScheduledBlock};
use crate::domain::rules::PlacementRules;
use crate::infrastructure::config::SchedulerSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goal_repository::GoalStore;
use crate::infrastructure::schedule_repository::SchedulePersistence;
use crate::infrastructure::shift_repository::ShiftStore;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// At least one block was placed and stored.
    Scheduled,
    /// Goals exist but nothing could be placed or stored.
    NothingPlaced,
    NoActiveGoals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub user_id: String,
    pub date: NaiveDate,
    pub status: ScheduleStatus,
    pub calendar_connected: bool,
    pub blocks: Vec<ScheduledBlock>,
    pub unscheduled_goal_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchFailure {
    pub user_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ScheduleOutcome>,
    pub failures: Vec<BatchFailure>,
}

/// Runs one scheduling pass per user and day against the configured stores
/// and calendar.
pub struct ScheduleOrchestrator {
    goals: Arc<dyn GoalStore>,
    shifts: Arc<dyn ShiftStore>,
    persistence: Arc<dyn SchedulePersistence>,
    busy_source: Arc<dyn BusyTimeSource>,
    calendar: Arc<dyn CalendarPush>,
    settings: SchedulerSettings,
    rules: PlacementRules,
}

struct RemoteBusy {
    intervals: Vec<Interval>,
    connected: bool,
}

impl ScheduleOrchestrator {
    pub fn new(
        goals: Arc<dyn GoalStore>,
        shifts: Arc<dyn ShiftStore>,
        persistence: Arc<dyn SchedulePersistence>,
        busy_source: Arc<dyn BusyTimeSource>,
        calendar: Arc<dyn CalendarPush>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            goals,
            shifts,
            persistence,
            busy_source,
            calendar,
            settings,
            rules: PlacementRules::standard(),
        }
    }

    pub fn with_rules(mut self, rules: PlacementRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub async fn generate(&self, user_id: &str, date: NaiveDate) -> Result<ScheduleOutcome, InfraError> {
        let goals = self.goals.list_active_goals(user_id)?;
        if goals.is_empty() {
            tracing::info!(user_id, %date, "no active goals; nothing to schedule");
            return Ok(ScheduleOutcome {
                user_id: user_id.to_string(),
                date,
                status: ScheduleStatus::NoActiveGoals,
                calendar_connected: false,
                blocks: Vec::new(),
                unscheduled_goal_ids: Vec::new(),
            });
        }

        let remote = self.remote_busy(user_id, date).await?;
        let shifts = self.shifts.list_shifts_for_date(user_id, date)?;
        let (settled, previous): (Vec<_>, Vec<_>) = self
            .persistence
            .list_blocks_for_date(user_id, date)?
            .into_iter()
            .partition(|block| block.status != BlockStatus::Scheduled);

        // Settled blocks keep their place and are not planned again.
        let open_goals = goals
            .into_iter()
            .filter(|goal| !settled.iter().any(|block| block.goal_id == goal.id))
            .collect::<Vec<_>>();
        let mut busy = aggregate_busy(&remote.intervals, &shifts, date);
        busy.extend(settled.iter().filter_map(occupied_span));
        let plan = plan_day(&open_goals, &busy, date, &self.settings.planning, &self.rules);

        let mut drafts = plan
            .placements
            .iter()
            .map(|placement| {
                let mut block = ScheduledBlock {
                    id: block_id(user_id, &placement.goal_id, date),
                    user_id: user_id.to_string(),
                    goal_id: placement.goal_id.clone(),
                    title: placement.title.clone(),
                    date,
                    start_at: placement.start,
                    end_at: placement.end,
                    relaxation_minutes: placement.relaxation_minutes,
                    calendar_event_id: None,
                    calendar_synced: false,
                    status: BlockStatus::Scheduled,
                };
                if let Some(prior) = previous.iter().find(|prior| prior.goal_id == placement.goal_id) {
                    block.calendar_event_id = prior.calendar_event_id.clone();
                    block.calendar_synced =
                        prior.calendar_synced && prior.calendar_event_id.is_some() && same_event(prior, &block);
                }
                (block, placement.goal_type)
            })
            .collect::<Vec<_>>();

        if remote.connected {
            self.push_blocks(&mut drafts).await;
        }

        let mut blocks = Vec::with_capacity(drafts.len());
        for (mut block, _) in drafts {
            match self.persistence.save_scheduled_block(&block) {
                Ok(stored_id) => {
                    block.id = stored_id;
                    blocks.push(block);
                }
                Err(error) => {
                    tracing::error!(user_id, goal_id = %block.goal_id, %error, "failed to store scheduled block; dropping it");
                }
            }
        }

        let stale = previous
            .iter()
            .filter(|prior| !plan.placements.iter().any(|placement| placement.goal_id == prior.goal_id))
            .collect::<Vec<_>>();
        self.drop_stale_blocks(&stale, remote.connected).await;

        let status = if blocks.is_empty() {
            ScheduleStatus::NothingPlaced
        } else {
            ScheduleStatus::Scheduled
        };
        tracing::info!(
            user_id,
            %date,
            scheduled = blocks.len(),
            unscheduled = plan.unplaced.len(),
            calendar_connected = remote.connected,
            "schedule generated"
        );

        Ok(ScheduleOutcome {
            user_id: user_id.to_string(),
            date,
            status,
            calendar_connected: remote.connected,
            blocks,
            unscheduled_goal_ids: plan.unplaced,
        })
    }

    /// Free time for the day after remote busy time and shifts. Nothing is written.
    pub async fn preview_free_slots(&self, user_id: &str, date: NaiveDate) -> Result<Vec<FreeSlot>, InfraError> {
        let remote = self.remote_busy(user_id, date).await?;
        let shifts = self.shifts.list_shifts_for_date(user_id, date)?;
        let busy = aggregate_busy(&remote.intervals, &shifts, date);
        Ok(free_slots_for_day(&busy, date, &self.settings.planning))
    }

    /// Daily batch. One user's failure is recorded and the batch moves on.
    pub async fn generate_for_all(&self, user_ids: &[String], date: NaiveDate) -> BatchReport {
        let mut report = BatchReport::default();
        for user_id in user_ids {
            match self.generate(user_id, date).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    tracing::error!(user_id = %user_id, %date, %error, "scheduling run failed");
                    report.failures.push(BatchFailure {
                        user_id: user_id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            %date,
            users = user_ids.len(),
            failed = report.failures.len(),
            "daily scheduling batch finished"
        );
        report
    }

    async fn remote_busy(&self, user_id: &str, date: NaiveDate) -> Result<RemoteBusy, InfraError> {
        match self
            .busy_source
            .busy_intervals(user_id, date, self.settings.time_zone)
            .await?
        {
            BusyTime::Connected(intervals) => Ok(RemoteBusy {
                intervals,
                connected: true,
            }),
            BusyTime::NotConnected if self.settings.require_calendar_connection => {
                Err(InfraError::CalendarNotConnected(user_id.to_string()))
            }
            BusyTime::NotConnected => {
                tracing::warn!(user_id, "calendar not connected; planning without remote busy time");
                Ok(RemoteBusy {
                    intervals: Vec::new(),
                    connected: false,
                })
            }
        }
    }

    /// Removes rows for goals that are no longer placed on the day, along
    /// with their calendar events. A row whose event cannot be removed is
    /// kept so a later run can retry.
    async fn drop_stale_blocks(&self, stale: &[&ScheduledBlock], connected: bool) {
        for block in stale {
            if block.calendar_event_id.is_some() {
                if !connected {
                    tracing::warn!(goal_id = %block.goal_id, "calendar not connected; keeping stale block until its event can be removed");
                    continue;
                }
                if let Err(error) = self.calendar.retract_block(block).await {
                    tracing::warn!(goal_id = %block.goal_id, %error, "failed to remove calendar event; keeping stale block");
                    continue;
                }
            }
            match self.persistence.delete_block(&block.user_id, &block.goal_id, block.date) {
                Ok(_) => tracing::info!(goal_id = %block.goal_id, date = %block.date, "removed block for goal no longer placed"),
                Err(error) => tracing::error!(goal_id = %block.goal_id, %error, "failed to remove stale block"),
            }
        }
    }

    /// Pushes every block whose event is missing or out of date. Blocks that
    /// fail keep their previous event id and stay unsynced.
    async fn push_blocks(&self, drafts: &mut [(ScheduledBlock, GoalType)]) {
        let style = Arc::new(self.settings.event_style());
        let concurrency = self.settings.push_concurrency.max(1);
        let mut tasks: JoinSet<(usize, Result<String, InfraError>)> = JoinSet::new();
        let mut event_ids: Vec<Option<String>> = vec![None; drafts.len()];

        for (index, (block, goal_type)) in drafts.iter().enumerate() {
            if block.calendar_synced {
                continue;
            }
            let calendar = Arc::clone(&self.calendar);
            let style = Arc::clone(&style);
            let block = block.clone();
            let goal_type = *goal_type;
            tasks.spawn(async move { (index, calendar.push_block(&block, goal_type, &style).await) });

            if tasks.len() >= concurrency {
                collect_push_result(&mut tasks, drafts, &mut event_ids).await;
            }
        }
        while !tasks.is_empty() {
            collect_push_result(&mut tasks, drafts, &mut event_ids).await;
        }

        for ((block, _), event_id) in drafts.iter_mut().zip(event_ids) {
            if let Some(event_id) = event_id {
                block.calendar_event_id = Some(event_id);
                block.calendar_synced = true;
            }
        }
    }
}

async fn collect_push_result(
    tasks: &mut JoinSet<(usize, Result<String, InfraError>)>,
    drafts: &[(ScheduledBlock, GoalType)],
    event_ids: &mut [Option<String>],
) {
    let Some(joined) = tasks.join_next().await else {
        return;
    };
    match joined {
        Ok((index, Ok(event_id))) => {
            if let Some(slot) = event_ids.get_mut(index) {
                *slot = Some(event_id);
            }
        }
        Ok((index, Err(error))) => {
            let goal_id = drafts.get(index).map(|(block, _)| block.goal_id.as_str()).unwrap_or("?");
            tracing::warn!(goal_id, %error, "calendar push failed; block stays unsynced");
        }
        Err(error) => tracing::warn!(%error, "calendar push task did not complete"),
    }
}

fn same_event(left: &ScheduledBlock, right: &ScheduledBlock) -> bool {
    left.start_at == right.start_at && left.end_at == right.end_at && left.title == right.title
}

/// A settled block plus its relaxation buffer.
fn occupied_span(block: &ScheduledBlock) -> Option<Interval> {
    Interval::new(
        block.start_at,
        block.end_at + Duration::minutes(i64::from(block.relaxation_minutes)),
    )
}

fn block_id(user_id: &str, goal_id: &str, date: NaiveDate) -> String {
    format!("blk:{user_id}:{goal_id}:{date}")
}
