use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{self, db_err, now_ts, SqlitePool, SqlitePooledConn};
use crate::error::{CreatorPilotError, Result};
use crate::youtube::ChannelSnapshot;

mod schema;
use schema::goals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Subscribers,
    Views,
    Engagement,
    Revenue,
    Custom,
}

impl GoalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribers => "subscribers",
            Self::Views => "views",
            Self::Engagement => "engagement",
            Self::Revenue => "revenue",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "subscribers" => Ok(Self::Subscribers),
            "views" => Ok(Self::Views),
            "engagement" => Ok(Self::Engagement),
            "revenue" => Ok(Self::Revenue),
            "custom" => Ok(Self::Custom),
            other => Err(CreatorPilotError::Validation(format!(
                "unknown goal type '{other}'"
            ))),
        }
    }

    /// Metric this goal tracks in a channel snapshot; `None` for manual goals.
    fn snapshot_value(self, snapshot: &ChannelSnapshot) -> Option<f64> {
        match self {
            Self::Subscribers => snapshot.subscribers,
            Self::Views => snapshot.views,
            Self::Engagement => snapshot.engagement_rate,
            Self::Revenue | Self::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub goal_type: GoalType,
    pub target_value: f64,
    pub current_value: f64,
    pub target_date: Option<String>,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub last_synced_at: Option<i64>,
    pub progress_percent: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
    pub title: String,
    pub goal_type: GoalType,
    pub target_value: f64,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub target_date: Option<String>,
}

/// Partial update. An empty `target_date` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalPatch {
    pub title: Option<String>,
    pub target_value: Option<f64>,
    pub target_date: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalStatus {
    Active,
    Completed,
    All,
}

impl GoalStatus {
    /// Query-string filter; absent or `all` lists everything.
    pub fn from_option(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") | Some("all") => Ok(Self::All),
            Some("completed") => Ok(Self::Completed),
            Some("active") => Ok(Self::Active),
            Some(other) => Err(CreatorPilotError::Validation(format!(
                "unknown goal status '{other}'"
            ))),
        }
    }
}

#[derive(Queryable)]
struct GoalRow {
    id: i32,
    user_id: String,
    title: String,
    goal_type: String,
    target_value: f64,
    current_value: f64,
    target_date: Option<String>,
    completed: bool,
    completed_at: Option<i64>,
    last_synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = goals)]
struct NewGoalRow<'a> {
    user_id: &'a str,
    title: &'a str,
    goal_type: &'a str,
    target_value: f64,
    current_value: f64,
    target_date: Option<&'a str>,
    completed: bool,
    completed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

pub struct GoalStore {
    pool: SqlitePool,
}

impl GoalStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let pool = db::connect_pool(sqlite_path.as_ref()).await?;
        Ok(Self { pool })
    }

    pub async fn create_goal(&self, user_id: &str, goal: NewGoal) -> Result<Goal> {
        let title = goal.title.trim();
        if title.is_empty() {
            return Err(CreatorPilotError::Validation(
                "goal title is required".to_string(),
            ));
        }
        let target_value = validate_target(goal.target_value)?;
        let current_value = validate_current(goal.current_value.unwrap_or(0.0))?;
        let target_date = goal
            .target_date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(db::normalize_date)
            .transpose()?;
        let now = now_ts();
        let completed = current_value >= target_value;

        let new = NewGoalRow {
            user_id,
            title,
            goal_type: goal.goal_type.as_str(),
            target_value,
            current_value,
            target_date: target_date.as_deref(),
            completed,
            completed_at: completed.then_some(now),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn().await?;
        let row: GoalRow = diesel::insert_into(goals::table)
            .values(&new)
            .get_result(&mut conn)
            .await
            .map_err(db_err)?;
        map_row(row)
    }

    pub async fn get_goal(&self, user_id: &str, id: i32) -> Result<Goal> {
        let mut conn = self.conn().await?;
        load_goal(&mut conn, user_id, id).await
    }

    pub async fn list_goals(&self, user_id: &str, status: GoalStatus) -> Result<Vec<Goal>> {
        let mut conn = self.conn().await?;
        let mut query = goals::table.filter(goals::user_id.eq(user_id)).into_boxed();
        match status {
            GoalStatus::Active => query = query.filter(goals::completed.eq(false)),
            GoalStatus::Completed => query = query.filter(goals::completed.eq(true)),
            GoalStatus::All => {}
        }
        let rows: Vec<GoalRow> = query
            .order((goals::completed.asc(), goals::id.asc()))
            .load(&mut conn)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(map_row).collect()
    }

    /// Records a new current value; reaching the target completes the goal.
    pub async fn update_progress(&self, user_id: &str, id: i32, current_value: f64) -> Result<Goal> {
        let current_value = validate_current(current_value)?;
        let mut conn = self.conn().await?;
        let goal = load_goal(&mut conn, user_id, id).await?;
        write_progress(&mut conn, &goal, current_value, None).await?;
        load_goal(&mut conn, user_id, id).await
    }

    pub async fn update_goal(&self, user_id: &str, id: i32, patch: GoalPatch) -> Result<Goal> {
        let mut conn = self.conn().await?;
        let mut goal = load_goal(&mut conn, user_id, id).await?;
        if let Some(title) = patch.title.as_deref() {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(CreatorPilotError::Validation(
                    "goal title is required".to_string(),
                ));
            }
            goal.title = trimmed.to_string();
        }
        if let Some(target) = patch.target_value {
            goal.target_value = validate_target(target)?;
        }
        if let Some(date) = patch.target_date.as_deref() {
            goal.target_date = if date.trim().is_empty() {
                None
            } else {
                Some(db::normalize_date(date)?)
            };
        }

        diesel::update(goals::table.filter(goals::id.eq(id)).filter(goals::user_id.eq(user_id)))
            .set((
                goals::title.eq(goal.title.as_str()),
                goals::target_value.eq(goal.target_value),
                goals::target_date.eq(goal.target_date.as_deref()),
                goals::updated_at.eq(now_ts()),
            ))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;

        // A lowered target may already be met.
        if patch.target_value.is_some() && !goal.completed {
            write_progress(&mut conn, &goal, goal.current_value, None).await?;
        }
        load_goal(&mut conn, user_id, id).await
    }

    pub async fn set_completed(&self, user_id: &str, id: i32, completed: bool) -> Result<Goal> {
        let mut conn = self.conn().await?;
        let goal = load_goal(&mut conn, user_id, id).await?;
        let now = now_ts();
        let completed_at = if completed {
            Some(goal.completed_at.unwrap_or(now))
        } else {
            None
        };
        diesel::update(goals::table.filter(goals::id.eq(id)))
            .set((
                goals::completed.eq(completed),
                goals::completed_at.eq(completed_at),
                goals::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        load_goal(&mut conn, user_id, id).await
    }

    /// Copies snapshot metrics into every active goal that tracks one.
    /// Revenue and custom goals are left for manual updates.
    pub async fn sync_goals(&self, user_id: &str, snapshot: &ChannelSnapshot) -> Result<Vec<Goal>> {
        let active = self.list_goals(user_id, GoalStatus::Active).await?;
        let mut conn = self.conn().await?;
        let now = now_ts();
        let mut updated = Vec::new();
        for goal in active {
            let Some(value) = goal.goal_type.snapshot_value(snapshot) else {
                continue;
            };
            if !value.is_finite() || value < 0.0 {
                continue;
            }
            write_progress(&mut conn, &goal, value, Some(now)).await?;
            updated.push(load_goal(&mut conn, user_id, goal.id).await?);
        }
        tracing::debug!(user_id, updated = updated.len(), "Synced goals from channel snapshot");
        Ok(updated)
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        db::checkout(&self.pool).await
    }
}

async fn write_progress(
    conn: &mut SqlitePooledConn<'_>,
    goal: &Goal,
    current_value: f64,
    synced_at: Option<i64>,
) -> Result<()> {
    let now = now_ts();
    let reached = current_value >= goal.target_value;
    let completed = goal.completed || reached;
    let completed_at = if completed {
        Some(goal.completed_at.unwrap_or(now))
    } else {
        None
    };
    if reached && !goal.completed {
        tracing::info!(goal_id = goal.id, user_id = %goal.user_id, "Goal reached its target");
    }
    diesel::update(goals::table.filter(goals::id.eq(goal.id)))
        .set((
            goals::current_value.eq(current_value),
            goals::completed.eq(completed),
            goals::completed_at.eq(completed_at),
            goals::last_synced_at.eq(synced_at.or(goal.last_synced_at)),
            goals::updated_at.eq(now),
        ))
        .execute(conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn load_goal(conn: &mut SqlitePooledConn<'_>, user_id: &str, id: i32) -> Result<Goal> {
    let row: Option<GoalRow> = goals::table
        .filter(goals::id.eq(id))
        .filter(goals::user_id.eq(user_id))
        .first(conn)
        .await
        .optional()
        .map_err(db_err)?;
    row.map(map_row)
        .transpose()?
        .ok_or_else(|| CreatorPilotError::NotFound(format!("goal {id}")))
}

fn validate_target(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CreatorPilotError::Validation(
            "goal target must be a positive number".to_string(),
        ))
    }
}

fn validate_current(value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CreatorPilotError::Validation(
            "goal progress must be a non-negative number".to_string(),
        ))
    }
}

pub fn progress_percent(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    let percent = (current / target * 100.0).clamp(0.0, 100.0);
    (percent * 10.0).round() / 10.0
}

fn map_row(row: GoalRow) -> Result<Goal> {
    Ok(Goal {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        goal_type: GoalType::parse(&row.goal_type)?,
        target_value: row.target_value,
        current_value: row.current_value,
        target_date: row.target_date,
        completed: row.completed,
        completed_at: row.completed_at,
        last_synced_at: row.last_synced_at,
        progress_percent: progress_percent(row.current_value, row.target_value),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_is_clamped_and_rounded() {
        assert_eq!(progress_percent(250.0, 1000.0), 25.0);
        assert_eq!(progress_percent(1.0, 3.0), 33.3);
        assert_eq!(progress_percent(5000.0, 1000.0), 100.0);
        assert_eq!(progress_percent(10.0, 0.0), 0.0);
    }

    #[test]
    fn only_metric_goals_read_snapshots() {
        let snapshot = ChannelSnapshot {
            subscribers: Some(1200.0),
            views: Some(50_000.0),
            engagement_rate: Some(4.2),
        };
        assert_eq!(GoalType::Subscribers.snapshot_value(&snapshot), Some(1200.0));
        assert_eq!(GoalType::Engagement.snapshot_value(&snapshot), Some(4.2));
        assert_eq!(GoalType::Revenue.snapshot_value(&snapshot), None);
        assert_eq!(GoalType::Custom.snapshot_value(&snapshot), None);
    }

    #[test]
    fn status_filter_rejects_unknown_values() {
        assert_eq!(GoalStatus::from_option(Some("active")).unwrap(), GoalStatus::Active);
        assert_eq!(GoalStatus::from_option(Some("all")).unwrap(), GoalStatus::All);
        assert_eq!(GoalStatus::from_option(None).unwrap(), GoalStatus::All);
        assert!(matches!(
            GoalStatus::from_option(Some("complete")),
            Err(CreatorPilotError::Validation(_))
        ));
    }
}
