use crate::domain::models::{Goal, GoalType};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait GoalStore: Send + Sync {
    /// Active goals for the user, in no particular order.
    fn list_active_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError>;
    fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError>;
    fn save_goal(&self, goal: &Goal) -> Result<(), InfraError>;
    fn set_active(&self, user_id: &str, goal_id: &str, active: bool) -> Result<bool, InfraError>;
    /// Users owning at least one active goal.
    fn list_users_with_active_goals(&self) -> Result<Vec<String>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteGoalRepository {
    db_path: PathBuf,
}

impl SqliteGoalRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn query_goals(&self, sql: &str, user_id: &str) -> Result<Vec<Goal>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(sql)?;
        let rows = statement.query_map(params![user_id], |row| {
            Ok(GoalRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                goal_type: row.get(2)?,
                name: row.get(3)?,
                weekly_target: row.get(4)?,
                daily_hours: row.get(5)?,
                preferred_times: row.get(6)?,
                priority: row.get(7)?,
                active: row.get(8)?,
                relaxation_time_after: row.get(9)?,
            })
        })?;

        let mut goals = Vec::new();
        for row in rows {
            goals.push(row?.into_goal()?);
        }
        Ok(goals)
    }
}

const GOAL_COLUMNS: &str = "id, user_id, goal_type, name, weekly_target, daily_hours, \
     preferred_times, priority, active, relaxation_time_after";

struct GoalRow {
    id: String,
    user_id: String,
    goal_type: String,
    name: String,
    weekly_target: i64,
    daily_hours: Option<f64>,
    preferred_times: String,
    priority: i64,
    active: bool,
    relaxation_time_after: Option<i64>,
}

impl GoalRow {
    fn into_goal(self) -> Result<Goal, InfraError> {
        let goal_type = GoalType::parse(&self.goal_type).map_err(InfraError::InvalidConfig)?;
        let preferred_times: Vec<String> = serde_json::from_str(&self.preferred_times)?;
        Ok(Goal {
            id: self.id,
            user_id: self.user_id,
            goal_type,
            name: self.name,
            weekly_target: u32::try_from(self.weekly_target).unwrap_or(0),
            daily_hours: self.daily_hours,
            preferred_times,
            priority: i32::try_from(self.priority).unwrap_or(0),
            active: self.active,
            relaxation_time_after: self
                .relaxation_time_after
                .and_then(|value| u32::try_from(value).ok()),
        })
    }
}

impl GoalStore for SqliteGoalRepository {
    fn list_active_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError> {
        self.query_goals(
            &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 AND active = 1"),
            user_id,
        )
    }

    fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError> {
        self.query_goals(
            &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 ORDER BY created_at, id"),
            user_id,
        )
    }

    fn save_goal(&self, goal: &Goal) -> Result<(), InfraError> {
        goal.validate().map_err(InfraError::InvalidInput)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO goals (id, user_id, goal_type, name, weekly_target, daily_hours,
                                preferred_times, priority, active, relaxation_time_after, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
               goal_type = excluded.goal_type,
               name = excluded.name,
               weekly_target = excluded.weekly_target,
               daily_hours = excluded.daily_hours,
               preferred_times = excluded.preferred_times,
               priority = excluded.priority,
               active = excluded.active,
               relaxation_time_after = excluded.relaxation_time_after",
            params![
                goal.id,
                goal.user_id,
                goal.goal_type.as_str(),
                goal.name,
                goal.weekly_target,
                goal.daily_hours,
                serde_json::to_string(&goal.preferred_times)?,
                goal.priority,
                goal.active,
                goal.relaxation_time_after,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn set_active(&self, user_id: &str, goal_id: &str, active: bool) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE goals SET active = ?1 WHERE id = ?2 AND user_id = ?3",
            params![active, goal_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn list_users_with_active_goals(&self) -> Result<Vec<String>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT DISTINCT user_id FROM goals WHERE active = 1 ORDER BY user_id")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(InfraError::from)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGoalRepository {
    goals: Mutex<Vec<Goal>>,
}

impl InMemoryGoalRepository {
    pub fn with_goals(goals: Vec<Goal>) -> Self {
        Self {
            goals: Mutex::new(goals),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Goal>>, InfraError> {
        self.goals
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("goal store lock poisoned: {error}")))
    }
}

impl GoalStore for InMemoryGoalRepository {
    fn list_active_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|goal| goal.user_id == user_id && goal.active)
            .cloned()
            .collect())
    }

    fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, InfraError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|goal| goal.user_id == user_id)
            .cloned()
            .collect())
    }

    fn save_goal(&self, goal: &Goal) -> Result<(), InfraError> {
        goal.validate().map_err(InfraError::InvalidInput)?;
        let mut goals = self.lock()?;
        match goals.iter_mut().find(|candidate| candidate.id == goal.id) {
            Some(existing) => *existing = goal.clone(),
            None => goals.push(goal.clone()),
        }
        Ok(())
    }

    fn set_active(&self, user_id: &str, goal_id: &str, active: bool) -> Result<bool, InfraError> {
        let mut goals = self.lock()?;
        let Some(goal) = goals
            .iter_mut()
            .find(|goal| goal.id == goal_id && goal.user_id == user_id)
        else {
            return Ok(false);
        };
        goal.active = active;
        Ok(true)
    }

    fn list_users_with_active_goals(&self) -> Result<Vec<String>, InfraError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|goal| goal.active)
            .map(|goal| goal.user_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}
