use std::fmt;

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{self, db_err, SqlitePool, SqlitePooledConn};
use crate::error::{CreatorPilotError, Result};

mod schema;
mod writes;
use schema::content_cards;

const MAX_TITLE_CHARS: usize = 200;
const MAX_LIST_LIMIT: i64 = 500;
const COLUMN_RANK_SQL: &str =
    "CASE status WHEN 'ideas' THEN 0 WHEN 'planning' THEN 1 WHEN 'inProgress' THEN 2 ELSE 3 END";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardStatus {
    #[serde(rename = "ideas")]
    Ideas,
    #[serde(rename = "planning")]
    Planning,
    #[serde(rename = "inProgress")]
    InProgress,
    #[serde(rename = "ready")]
    Ready,
}

impl CardStatus {
    /// Board columns, left to right.
    pub const ALL: [CardStatus; 4] = [
        CardStatus::Ideas,
        CardStatus::Planning,
        CardStatus::InProgress,
        CardStatus::Ready,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ideas => "ideas",
            Self::Planning => "planning",
            Self::InProgress => "inProgress",
            Self::Ready => "ready",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| CreatorPilotError::Validation(format!("unknown card status '{value}'")))
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pillar {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentCard {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: CardStatus,
    pub pillars: Vec<Pillar>,
    pub due_date: Option<String>,
    pub progress: i32,
    pub archived: bool,
    pub order_index: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCard {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<CardStatus>,
    #[serde(default)]
    pub pillars: Vec<Pillar>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub progress: Option<i32>,
}

/// Partial update. An empty `description` or `due_date` clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub pillars: Option<Vec<Pillar>>,
    pub due_date: Option<String>,
    pub progress: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CardFilter {
    pub status: Option<CardStatus>,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub status: CardStatus,
    pub cards: Vec<ContentCard>,
}

#[derive(Queryable)]
struct CardRow {
    id: i32,
    user_id: String,
    title: String,
    description: Option<String>,
    status: String,
    pillars_json: String,
    due_date: Option<String>,
    progress: i32,
    archived: bool,
    order_index: i32,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = content_cards)]
struct NewCardRow<'a> {
    user_id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    status: &'a str,
    pillars_json: &'a str,
    due_date: Option<&'a str>,
    progress: i32,
    archived: bool,
    order_index: i32,
    created_at: i64,
    updated_at: i64,
}

pub struct CardStore {
    pool: SqlitePool,
    sqlite_path: String,
}

impl CardStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref().to_string();
        let pool = db::connect_pool(&sqlite_path).await?;
        Ok(Self { pool, sqlite_path })
    }

    pub async fn create_card(&self, user_id: &str, card: NewCard) -> Result<ContentCard> {
        let title = validate_title(&card.title)?;
        let status = card.status.unwrap_or(CardStatus::Ideas);
        let progress = validate_progress(card.progress.unwrap_or(0))?;
        let due_date = card
            .due_date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(db::normalize_date)
            .transpose()?;
        let insert = writes::CardInsert {
            user_id: user_id.to_string(),
            title,
            description: card
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            status,
            pillars_json: encode_pillars(&card.pillars)?,
            due_date,
            progress,
        };

        let created = db::write_transaction(&self.sqlite_path, move |conn| {
            writes::insert_card(conn, &insert)
        })
        .await?;
        tracing::debug!(card_id = created.id, user_id, status = %status, "Created content card");
        Ok(created)
    }

    pub async fn get_card(&self, user_id: &str, id: i32) -> Result<ContentCard> {
        let mut conn = self.conn().await?;
        let row: Option<CardRow> = content_cards::table
            .filter(content_cards::id.eq(id))
            .filter(content_cards::user_id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(db_err)?;
        row.map(map_row)
            .transpose()?
            .ok_or_else(|| CreatorPilotError::NotFound(format!("content card {id}")))
    }

    pub async fn list_cards(&self, user_id: &str, filter: CardFilter) -> Result<Vec<ContentCard>> {
        self.load_cards(user_id, filter, Some(MAX_LIST_LIMIT)).await
    }

    pub async fn board(&self, user_id: &str) -> Result<Vec<BoardColumn>> {
        let cards = self.load_cards(user_id, CardFilter::default(), None).await?;
        Ok(CardStatus::ALL
            .into_iter()
            .map(|status| BoardColumn {
                status,
                cards: cards
                    .iter()
                    .filter(|card| card.status == status)
                    .cloned()
                    .collect(),
            })
            .collect())
    }

    async fn load_cards(
        &self,
        user_id: &str,
        filter: CardFilter,
        limit: Option<i64>,
    ) -> Result<Vec<ContentCard>> {
        let mut conn = self.conn().await?;
        let mut query = content_cards::table
            .filter(content_cards::user_id.eq(user_id))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(content_cards::status.eq(status.as_str()));
        }
        if !filter.include_archived {
            query = query.filter(content_cards::archived.eq(false));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let rows: Vec<CardRow> = query
            .order((
                content_cards::archived.asc(),
                sql::<Integer>(COLUMN_RANK_SQL).asc(),
                content_cards::order_index.asc(),
                content_cards::id.asc(),
            ))
            .load(&mut conn)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(map_row).collect()
    }

    /// Cards touched at or after `since`, archived ones included so pollers can drop them.
    pub async fn changes_since(&self, user_id: &str, since: i64) -> Result<Vec<ContentCard>> {
        let mut conn = self.conn().await?;
        let rows: Vec<CardRow> = content_cards::table
            .filter(content_cards::user_id.eq(user_id))
            .filter(content_cards::updated_at.ge(since))
            .order(content_cards::updated_at.asc())
            .limit(MAX_LIST_LIMIT)
            .load(&mut conn)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(map_row).collect()
    }

    pub async fn update_card(&self, user_id: &str, id: i32, patch: CardPatch) -> Result<ContentCard> {
        let user_id = user_id.to_string();
        db::write_transaction(&self.sqlite_path, move |conn| {
            writes::patch_card(conn, &user_id, id, patch)
        })
        .await
    }

    /// Drag-and-drop: moves the card into `status` at `position` (appended
    /// when omitted) and renumbers both affected columns from 0.
    pub async fn move_card(
        &self,
        user_id: &str,
        id: i32,
        status: CardStatus,
        position: Option<usize>,
    ) -> Result<ContentCard> {
        let owner = user_id.to_string();
        let (card, from) = db::write_transaction(&self.sqlite_path, move |conn| {
            writes::move_card(conn, &owner, id, status, position)
        })
        .await?;
        tracing::debug!(
            card_id = id,
            from = %from,
            to = %status,
            order_index = card.order_index,
            "Moved content card"
        );
        Ok(card)
    }

    /// Applies a manual ordering to one column. Ids missing from
    /// `ordered_ids` keep their relative order after the listed ones.
    pub async fn reorder_column(
        &self,
        user_id: &str,
        status: CardStatus,
        ordered_ids: &[i32],
    ) -> Result<Vec<ContentCard>> {
        let owner = user_id.to_string();
        let ordered_ids = ordered_ids.to_vec();
        db::write_transaction(&self.sqlite_path, move |conn| {
            writes::reorder_column(conn, &owner, status, &ordered_ids)
        })
        .await?;

        self.list_cards(
            user_id,
            CardFilter {
                status: Some(status),
                include_archived: false,
            },
        )
        .await
    }

    pub async fn archive_card(&self, user_id: &str, id: i32) -> Result<ContentCard> {
        self.set_archived(user_id, id, true).await
    }

    pub async fn restore_card(&self, user_id: &str, id: i32) -> Result<ContentCard> {
        self.set_archived(user_id, id, false).await
    }

    async fn set_archived(&self, user_id: &str, id: i32, archived: bool) -> Result<ContentCard> {
        let user_id = user_id.to_string();
        db::write_transaction(&self.sqlite_path, move |conn| {
            writes::set_archived(conn, &user_id, id, archived)
        })
        .await
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        db::checkout(&self.pool).await
    }
}

fn map_row(row: CardRow) -> Result<ContentCard> {
    let pillars: Vec<Pillar> = serde_json::from_str(&row.pillars_json).unwrap_or_else(|err| {
        tracing::warn!(card_id = row.id, "Ignoring unreadable pillars: {}", err);
        Vec::new()
    });
    Ok(ContentCard {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        description: row.description,
        status: CardStatus::parse(&row.status)?,
        pillars,
        due_date: row.due_date,
        progress: row.progress,
        archived: row.archived,
        order_index: row.order_index,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CreatorPilotError::Validation(
            "card title is required".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(CreatorPilotError::Validation(format!(
            "card title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_progress(progress: i32) -> Result<i32> {
    if (0..=100).contains(&progress) {
        Ok(progress)
    } else {
        Err(CreatorPilotError::Validation(format!(
            "progress must be between 0 and 100, got {progress}"
        )))
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn normalize_pillars(pillars: &[Pillar]) -> Vec<Pillar> {
    let mut out: Vec<Pillar> = Vec::new();
    for pillar in pillars {
        let name = pillar.name.trim();
        if name.is_empty() {
            continue;
        }
        let id = if pillar.id.trim().is_empty() {
            slugify(name)
        } else {
            pillar.id.trim().to_string()
        };
        if out.iter().any(|existing| existing.id.eq_ignore_ascii_case(&id)) {
            continue;
        }
        out.push(Pillar {
            id,
            name: name.to_string(),
            color: pillar
                .color
                .as_deref()
                .map(str::trim)
                .filter(|color| !color.is_empty())
                .map(str::to_string),
        });
    }
    out
}

fn encode_pillars(pillars: &[Pillar]) -> Result<String> {
    serde_json::to_string(&normalize_pillars(pillars))
        .map_err(|e| CreatorPilotError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_match_dashboard() {
        assert_eq!(
            serde_json::to_string(&CardStatus::InProgress).unwrap(),
            "\"inProgress\""
        );
        assert_eq!(CardStatus::parse("ready").unwrap(), CardStatus::Ready);
        assert!(CardStatus::parse("in_progress").is_err());
    }

    #[test]
    fn pillars_get_slug_ids_and_dedupe() {
        let pillars = normalize_pillars(&[
            Pillar {
                id: String::new(),
                name: "  Gear Reviews ".to_string(),
                color: Some("#ff0000".to_string()),
            },
            Pillar {
                id: "GEAR-REVIEWS".to_string(),
                name: "Duplicate".to_string(),
                color: None,
            },
            Pillar {
                id: "x".to_string(),
                name: "   ".to_string(),
                color: None,
            },
        ]);
        assert_eq!(pillars.len(), 1);
        assert_eq!(pillars[0].id, "gear-reviews");
        assert_eq!(pillars[0].name, "Gear Reviews");
    }

    #[test]
    fn rejects_out_of_range_progress_and_blank_titles() {
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
        assert_eq!(validate_progress(100).unwrap(), 100);
        assert!(validate_title("   ").is_err());
        assert_eq!(validate_title("  Vlog #3 ").unwrap(), "Vlog #3");
    }
}
