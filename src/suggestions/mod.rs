use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::{self, db_err, now_ts, SqlitePool, SqlitePooledConn};
use crate::error::{CreatorPilotError, Result};

mod schema;
use schema::saved_suggestions;

const MAX_CONTENT_CHARS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    ContentIdea,
    Title,
    Script,
    Hook,
    General,
}

impl SuggestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentIdea => "content_idea",
            Self::Title => "title",
            Self::Script => "script",
            Self::Hook => "hook",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "content_idea" => Ok(Self::ContentIdea),
            "title" => Ok(Self::Title),
            "script" => Ok(Self::Script),
            "hook" => Ok(Self::Hook),
            "general" => Ok(Self::General),
            other => Err(CreatorPilotError::Validation(format!(
                "unknown suggestion type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::NotHelpful => "not_helpful",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "helpful" => Some(Self::Helpful),
            "not_helpful" => Some(Self::NotHelpful),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSuggestion {
    pub id: i32,
    pub user_id: String,
    pub suggestion_type: SuggestionType,
    pub content: String,
    pub agent: Option<String>,
    pub implemented: bool,
    pub implemented_at: Option<i64>,
    pub feedback: Option<Feedback>,
    pub feedback_note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSuggestion {
    pub content: String,
    /// Inferred from the content when omitted.
    #[serde(default)]
    pub suggestion_type: Option<SuggestionType>,
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SuggestionFilter {
    pub suggestion_type: Option<SuggestionType>,
    pub implemented: Option<bool>,
}

#[derive(Queryable)]
struct SuggestionRow {
    id: i32,
    user_id: String,
    suggestion_type: String,
    content: String,
    agent: Option<String>,
    implemented: bool,
    implemented_at: Option<i64>,
    feedback: Option<String>,
    feedback_note: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = saved_suggestions)]
struct NewSuggestionRow<'a> {
    user_id: &'a str,
    suggestion_type: &'a str,
    content: &'a str,
    agent: Option<&'a str>,
    implemented: bool,
    created_at: i64,
    updated_at: i64,
}

pub struct SuggestionStore {
    pool: SqlitePool,
}

impl SuggestionStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let pool = db::connect_pool(sqlite_path.as_ref()).await?;
        Ok(Self { pool })
    }

    pub async fn save_suggestion(
        &self,
        user_id: &str,
        suggestion: NewSuggestion,
    ) -> Result<SavedSuggestion> {
        let content = suggestion.content.trim();
        if content.is_empty() {
            return Err(CreatorPilotError::Validation(
                "suggestion content is required".to_string(),
            ));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CreatorPilotError::Validation(format!(
                "suggestion content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        let suggestion_type = suggestion
            .suggestion_type
            .unwrap_or_else(|| infer_suggestion_type(content));
        let now = now_ts();
        let new = NewSuggestionRow {
            user_id,
            suggestion_type: suggestion_type.as_str(),
            content,
            agent: suggestion
                .agent
                .as_deref()
                .map(str::trim)
                .filter(|agent| !agent.is_empty()),
            implemented: false,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn().await?;
        let row: SuggestionRow = diesel::insert_into(saved_suggestions::table)
            .values(&new)
            .get_result(&mut conn)
            .await
            .map_err(db_err)?;
        map_row(row)
    }

    pub async fn list_suggestions(
        &self,
        user_id: &str,
        filter: SuggestionFilter,
        limit: usize,
    ) -> Result<Vec<SavedSuggestion>> {
        let mut conn = self.conn().await?;
        let mut query = saved_suggestions::table
            .filter(saved_suggestions::user_id.eq(user_id))
            .into_boxed();
        if let Some(kind) = filter.suggestion_type {
            query = query.filter(saved_suggestions::suggestion_type.eq(kind.as_str()));
        }
        if let Some(implemented) = filter.implemented {
            query = query.filter(saved_suggestions::implemented.eq(implemented));
        }
        let rows: Vec<SuggestionRow> = query
            .order(saved_suggestions::id.desc())
            .limit(limit.clamp(1, 500) as i64)
            .load(&mut conn)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(map_row).collect()
    }

    pub async fn mark_implemented(
        &self,
        user_id: &str,
        id: i32,
        implemented: bool,
    ) -> Result<SavedSuggestion> {
        let mut conn = self.conn().await?;
        let existing = load_suggestion(&mut conn, user_id, id).await?;
        let now = now_ts();
        let implemented_at = if implemented {
            Some(existing.implemented_at.unwrap_or(now))
        } else {
            None
        };
        diesel::update(saved_suggestions::table.filter(saved_suggestions::id.eq(id)))
            .set((
                saved_suggestions::implemented.eq(implemented),
                saved_suggestions::implemented_at.eq(implemented_at),
                saved_suggestions::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        load_suggestion(&mut conn, user_id, id).await
    }

    /// Latest feedback wins; a missing note clears any previous one.
    pub async fn record_feedback(
        &self,
        user_id: &str,
        id: i32,
        feedback: Feedback,
        note: Option<&str>,
    ) -> Result<SavedSuggestion> {
        let mut conn = self.conn().await?;
        load_suggestion(&mut conn, user_id, id).await?;
        let note = note.map(str::trim).filter(|note| !note.is_empty());
        diesel::update(saved_suggestions::table.filter(saved_suggestions::id.eq(id)))
            .set((
                saved_suggestions::feedback.eq(Some(feedback.as_str())),
                saved_suggestions::feedback_note.eq(note),
                saved_suggestions::updated_at.eq(now_ts()),
            ))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        load_suggestion(&mut conn, user_id, id).await
    }

    pub async fn delete_suggestion(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count = diesel::delete(
            saved_suggestions::table
                .filter(saved_suggestions::id.eq(id))
                .filter(saved_suggestions::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await
        .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        db::checkout(&self.pool).await
    }
}

async fn load_suggestion(
    conn: &mut SqlitePooledConn<'_>,
    user_id: &str,
    id: i32,
) -> Result<SavedSuggestion> {
    let row: Option<SuggestionRow> = saved_suggestions::table
        .filter(saved_suggestions::id.eq(id))
        .filter(saved_suggestions::user_id.eq(user_id))
        .first(conn)
        .await
        .optional()
        .map_err(db_err)?;
    row.map(map_row)
        .transpose()?
        .ok_or_else(|| CreatorPilotError::NotFound(format!("suggestion {id}")))
}

fn map_row(row: SuggestionRow) -> Result<SavedSuggestion> {
    Ok(SavedSuggestion {
        id: row.id,
        user_id: row.user_id,
        suggestion_type: SuggestionType::parse(&row.suggestion_type)?,
        content: row.content,
        agent: row.agent,
        implemented: row.implemented,
        implemented_at: row.implemented_at,
        feedback: row.feedback.as_deref().and_then(Feedback::parse),
        feedback_note: row.feedback_note,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(\[?(intro|outro|scene|b-roll|cut to)\]?\s*[:\-]|script\b)").unwrap()
});
static HOOK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(hook|opening line|first (3|three|5|five) seconds)\b").unwrap());
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(title|headline|thumbnail text)s?\b").unwrap());
static IDEA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(video idea|content idea|idea|series|episode|topic)s?\b").unwrap()
});

/// Best-effort classification of saved chat output.
pub fn infer_suggestion_type(text: &str) -> SuggestionType {
    if SCRIPT_RE.is_match(text) {
        SuggestionType::Script
    } else if HOOK_RE.is_match(text) {
        SuggestionType::Hook
    } else if TITLE_RE.is_match(text) {
        SuggestionType::Title
    } else if IDEA_RE.is_match(text) {
        SuggestionType::ContentIdea
    } else {
        SuggestionType::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_types_from_chat_output() {
        assert_eq!(
            infer_suggestion_type("INTRO: cold open on the finished desk\nSCENE: unboxing"),
            SuggestionType::Script
        );
        assert_eq!(
            infer_suggestion_type("Hook: \"I wasted $3,000 so you don't have to\""),
            SuggestionType::Hook
        );
        assert_eq!(
            infer_suggestion_type("Title options: 1. I Tried Every Budget Mic"),
            SuggestionType::Title
        );
        assert_eq!(
            infer_suggestion_type("Video idea: a 30-day editing challenge series"),
            SuggestionType::ContentIdea
        );
        assert_eq!(
            infer_suggestion_type("Post twice a week on Tuesdays."),
            SuggestionType::General
        );
    }

    #[test]
    fn feedback_wire_names() {
        assert_eq!(
            serde_json::to_string(&Feedback::NotHelpful).unwrap(),
            "\"not_helpful\""
        );
        assert_eq!(Feedback::parse("helpful"), Some(Feedback::Helpful));
        assert_eq!(SuggestionType::parse("content_idea").unwrap(), SuggestionType::ContentIdea);
    }
}
