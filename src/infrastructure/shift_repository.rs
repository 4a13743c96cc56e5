use crate::domain::models::Shift;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_date, parse_date};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait ShiftStore: Send + Sync {
    fn list_shifts_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Shift>, InfraError>;
    fn save_shift(&self, shift: &Shift) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteShiftRepository {
    db_path: PathBuf,
}

impl SqliteShiftRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl ShiftStore for SqliteShiftRepository {
    fn list_shifts_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Shift>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, date, start_time, end_time, source
             FROM shifts
             WHERE user_id = ?1 AND date = ?2
             ORDER BY start_time",
        )?;
        let rows = statement.query_map(params![user_id, format_date(date)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut shifts = Vec::new();
        for row in rows {
            let (id, user_id, raw_date, start_time, end_time, source) = row?;
            shifts.push(Shift {
                id,
                user_id,
                date: parse_date(&raw_date, "shifts.date")?,
                start_time,
                end_time,
                source,
            });
        }
        Ok(shifts)
    }

    fn save_shift(&self, shift: &Shift) -> Result<(), InfraError> {
        shift.validate().map_err(InfraError::InvalidInput)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO shifts (id, user_id, date, start_time, end_time, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, date, start_time) DO UPDATE SET
               end_time = excluded.end_time,
               source = excluded.source",
            params![
                shift.id,
                shift.user_id,
                format_date(shift.date),
                shift.start_time.trim(),
                shift.end_time.trim(),
                shift.source,
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryShiftRepository {
    shifts: Mutex<Vec<Shift>>,
}

impl InMemoryShiftRepository {
    pub fn with_shifts(shifts: Vec<Shift>) -> Self {
        Self {
            shifts: Mutex::new(shifts),
        }
    }
}

impl ShiftStore for InMemoryShiftRepository {
    fn list_shifts_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Shift>, InfraError> {
        let guard = self
            .shifts
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("shift store lock poisoned: {error}")))?;
        Ok(guard
            .iter()
            .filter(|shift| shift.user_id == user_id && shift.date == date)
            .cloned()
            .collect())
    }

    fn save_shift(&self, shift: &Shift) -> Result<(), InfraError> {
        shift.validate().map_err(InfraError::InvalidInput)?;
        let mut guard = self
            .shifts
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("shift store lock poisoned: {error}")))?;
        guard.retain(|existing| {
            !(existing.user_id == shift.user_id
                && existing.date == shift.date
                && existing.start_time == shift.start_time)
        });
        guard.push(shift.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::test_support::TempDatabase;

    fn day(value: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, value).expect("valid date")
    }

    fn shift(id: &str, date: NaiveDate, start: &str, end: &str) -> Shift {
        Shift {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            date,
            start_time: start.to_string(),
            end_time: end.to_string(),
            source: "manual".to_string(),
        }
    }

    #[test]
    fn sqlite_lists_only_requested_date() {
        let database = TempDatabase::new("shifts");
        let repository = SqliteShiftRepository::new(&database.path);
        repository
            .save_shift(&shift("s1", day(16), "09:00:00", "17:00:00"))
            .expect("save");
        repository
            .save_shift(&shift("s2", day(17), "22:00:00", "06:00:00"))
            .expect("save");

        let shifts = repository.list_shifts_for_date("user-1", day(16)).expect("list");
        assert_eq!(shifts, vec![shift("s1", day(16), "09:00:00", "17:00:00")]);
        assert!(repository
            .list_shifts_for_date("user-2", day(16))
            .expect("list")
            .is_empty());
    }

    #[test]
    fn sqlite_same_start_replaces_end_time() {
        let database = TempDatabase::new("shifts");
        let repository = SqliteShiftRepository::new(&database.path);
        repository
            .save_shift(&shift("s1", day(16), "09:00:00", "17:00:00"))
            .expect("save");
        repository
            .save_shift(&shift("s9", day(16), "09:00:00", "13:00:00"))
            .expect("save");

        let shifts = repository.list_shifts_for_date("user-1", day(16)).expect("list");
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].end_time, "13:00:00");
    }

    #[test]
    fn invalid_clock_times_are_rejected() {
        let repository = InMemoryShiftRepository::default();
        assert!(matches!(
            repository.save_shift(&shift("s1", day(16), "9am", "17:00")),
            Err(InfraError::InvalidInput(_))
        ));
    }
}
