use crate::domain::models::{BlockStatus, ScheduledBlock};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_date, format_date_time, parse_date, parse_date_time};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage for generated blocks. One block per (user, goal, date); saving a
/// second block for the same key replaces the first, except that a status
/// other than `scheduled` is never overwritten.
pub trait SchedulePersistence: Send + Sync {
    /// Returns the id the stored row ends up with.
    fn save_scheduled_block(&self, block: &ScheduledBlock) -> Result<String, InfraError>;
    fn list_blocks_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledBlock>, InfraError>;
    /// Returns whether a row was removed.
    fn delete_block(&self, user_id: &str, goal_id: &str, date: NaiveDate) -> Result<bool, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteScheduleRepository {
    db_path: PathBuf,
}

impl SqliteScheduleRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl SchedulePersistence for SqliteScheduleRepository {
    fn save_scheduled_block(&self, block: &ScheduledBlock) -> Result<String, InfraError> {
        block.validate().map_err(InfraError::InvalidInput)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO scheduled_blocks (id, user_id, goal_id, title, date, start_at, end_at,
                                           relaxation_minutes, calendar_event_id, calendar_synced,
                                           status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(user_id, goal_id, date) DO UPDATE SET
               title = excluded.title,
               start_at = excluded.start_at,
               end_at = excluded.end_at,
               relaxation_minutes = excluded.relaxation_minutes,
               calendar_event_id = excluded.calendar_event_id,
               calendar_synced = excluded.calendar_synced,
               status = CASE scheduled_blocks.status
                          WHEN 'scheduled' THEN excluded.status
                          ELSE scheduled_blocks.status
                        END",
            params![
                block.id,
                block.user_id,
                block.goal_id,
                block.title,
                format_date(block.date),
                format_date_time(block.start_at),
                format_date_time(block.end_at),
                block.relaxation_minutes,
                block.calendar_event_id,
                block.calendar_synced,
                block.status.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        let stored_id = connection.query_row(
            "SELECT id FROM scheduled_blocks WHERE user_id = ?1 AND goal_id = ?2 AND date = ?3",
            params![block.user_id, block.goal_id, format_date(block.date)],
            |row| row.get::<_, String>(0),
        )?;
        Ok(stored_id)
    }

    fn delete_block(&self, user_id: &str, goal_id: &str, date: NaiveDate) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let removed = connection.execute(
            "DELETE FROM scheduled_blocks WHERE user_id = ?1 AND goal_id = ?2 AND date = ?3",
            params![user_id, goal_id, format_date(date)],
        )?;
        Ok(removed > 0)
    }

    fn list_blocks_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledBlock>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, goal_id, title, date, start_at, end_at, relaxation_minutes,
                    calendar_event_id, calendar_synced, status
             FROM scheduled_blocks
             WHERE user_id = ?1 AND date = ?2
             ORDER BY start_at",
        )?;
        let rows = statement.query_map(params![user_id, format_date(date)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, bool>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            let (id, user_id, goal_id, title, raw_date, start_at, end_at, relaxation_minutes, event_id, synced, status) =
                row?;
            blocks.push(ScheduledBlock {
                id,
                user_id,
                goal_id,
                title,
                date: parse_date(&raw_date, "scheduled_blocks.date")?,
                start_at: parse_date_time(&start_at, "scheduled_blocks.start_at")?,
                end_at: parse_date_time(&end_at, "scheduled_blocks.end_at")?,
                relaxation_minutes,
                calendar_event_id: event_id,
                calendar_synced: synced,
                status: BlockStatus::parse(&status).map_err(InfraError::InvalidConfig)?,
            });
        }
        Ok(blocks)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleRepository {
    blocks: Mutex<Vec<ScheduledBlock>>,
}

impl InMemoryScheduleRepository {
    pub fn blocks(&self) -> Vec<ScheduledBlock> {
        self.blocks
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl SchedulePersistence for InMemoryScheduleRepository {
    fn save_scheduled_block(&self, block: &ScheduledBlock) -> Result<String, InfraError> {
        block.validate().map_err(InfraError::InvalidInput)?;
        let mut guard = self
            .blocks
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("schedule store lock poisoned: {error}")))?;
        if let Some(existing) = guard.iter_mut().find(|existing| {
            existing.user_id == block.user_id
                && existing.goal_id == block.goal_id
                && existing.date == block.date
        }) {
            let id = existing.id.clone();
            let status = match existing.status {
                BlockStatus::Scheduled => block.status,
                settled => settled,
            };
            *existing = ScheduledBlock {
                id: id.clone(),
                status,
                ..block.clone()
            };
            return Ok(id);
        }
        guard.push(block.clone());
        Ok(block.id.clone())
    }

    fn list_blocks_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledBlock>, InfraError> {
        let guard = self
            .blocks
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("schedule store lock poisoned: {error}")))?;
        let mut blocks = guard
            .iter()
            .filter(|block| block.user_id == user_id && block.date == date)
            .cloned()
            .collect::<Vec<_>>();
        blocks.sort_by_key(|block| block.start_at);
        Ok(blocks)
    }

    fn delete_block(&self, user_id: &str, goal_id: &str, date: NaiveDate) -> Result<bool, InfraError> {
        let mut guard = self
            .blocks
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("schedule store lock poisoned: {error}")))?;
        let before = guard.len();
        guard.retain(|block| !(block.user_id == user_id && block.goal_id == goal_id && block.date == date));
        Ok(guard.len() < before)
    }
}
