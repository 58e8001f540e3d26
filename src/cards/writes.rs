//! Board mutations. Each function runs inside one immediate transaction
//! (see [`crate::db::write_transaction`]), so column reads and the
//! renumbering that follows them see a stable column.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::schema::content_cards;
use super::{
    encode_pillars, map_row, normalize_pillars, validate_progress, validate_title, CardPatch,
    CardRow, CardStatus, ContentCard, NewCardRow,
};
use crate::db::{self, now_ts};
use crate::error::{CreatorPilotError, Result};

pub(super) struct CardInsert {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: CardStatus,
    pub pillars_json: String,
    pub due_date: Option<String>,
    pub progress: i32,
}

pub(super) fn insert_card(conn: &mut SqliteConnection, card: &CardInsert) -> Result<ContentCard> {
    let order_index = column_ids(conn, &card.user_id, card.status)?.len() as i32;
    let now = now_ts();
    let row: CardRow = diesel::insert_into(content_cards::table)
        .values(&NewCardRow {
            user_id: &card.user_id,
            title: &card.title,
            description: card.description.as_deref(),
            status: card.status.as_str(),
            pillars_json: &card.pillars_json,
            due_date: card.due_date.as_deref(),
            progress: card.progress,
            archived: false,
            order_index,
            created_at: now,
            updated_at: now,
        })
        .get_result(conn)?;
    map_row(row)
}

pub(super) fn patch_card(
    conn: &mut SqliteConnection,
    user_id: &str,
    id: i32,
    patch: CardPatch,
) -> Result<ContentCard> {
    let mut card = load_card(conn, user_id, id)?;
    if let Some(title) = patch.title.as_deref() {
        card.title = validate_title(title)?;
    }
    if let Some(description) = patch.description {
        let trimmed = description.trim();
        card.description = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    if let Some(pillars) = patch.pillars {
        card.pillars = normalize_pillars(&pillars);
    }
    if let Some(due_date) = patch.due_date.as_deref() {
        card.due_date = if due_date.trim().is_empty() {
            None
        } else {
            Some(db::normalize_date(due_date)?)
        };
    }
    if let Some(progress) = patch.progress {
        card.progress = validate_progress(progress)?;
    }

    let pillars_json = encode_pillars(&card.pillars)?;
    diesel::update(
        content_cards::table
            .filter(content_cards::id.eq(id))
            .filter(content_cards::user_id.eq(user_id)),
    )
    .set((
        content_cards::title.eq(card.title.as_str()),
        content_cards::description.eq(card.description.as_deref()),
        content_cards::pillars_json.eq(pillars_json.as_str()),
        content_cards::due_date.eq(card.due_date.as_deref()),
        content_cards::progress.eq(card.progress),
        content_cards::updated_at.eq(now_ts()),
    ))
    .execute(conn)?;

    load_card(conn, user_id, id)
}

pub(super) fn move_card(
    conn: &mut SqliteConnection,
    user_id: &str,
    id: i32,
    status: CardStatus,
    position: Option<usize>,
) -> Result<(ContentCard, CardStatus)> {
    let card = load_card(conn, user_id, id)?;
    if card.archived {
        return Err(CreatorPilotError::Validation(format!(
            "card {id} is archived; restore it before moving"
        )));
    }

    let mut destination: Vec<i32> = column_ids(conn, user_id, status)?
        .into_iter()
        .filter(|existing| *existing != id)
        .collect();
    let position = position.unwrap_or(destination.len()).min(destination.len());
    destination.insert(position, id);

    diesel::update(content_cards::table.filter(content_cards::id.eq(id)))
        .set(content_cards::status.eq(status.as_str()))
        .execute(conn)?;
    renumber(conn, user_id, &destination)?;

    if card.status != status {
        let source = column_ids(conn, user_id, card.status)?;
        renumber(conn, user_id, &source)?;
    }
    Ok((load_card(conn, user_id, id)?, card.status))
}

pub(super) fn reorder_column(
    conn: &mut SqliteConnection,
    user_id: &str,
    status: CardStatus,
    ordered_ids: &[i32],
) -> Result<()> {
    let current = column_ids(conn, user_id, status)?;
    if let Some(stray) = ordered_ids.iter().find(|id| !current.contains(id)) {
        return Err(CreatorPilotError::Validation(format!(
            "card {stray} is not in the {status} column"
        )));
    }

    let mut ordered: Vec<i32> = Vec::with_capacity(current.len());
    for id in ordered_ids {
        if !ordered.contains(id) {
            ordered.push(*id);
        }
    }
    for id in current {
        if !ordered.contains(&id) {
            ordered.push(id);
        }
    }
    renumber(conn, user_id, &ordered)
}

pub(super) fn set_archived(
    conn: &mut SqliteConnection,
    user_id: &str,
    id: i32,
    archived: bool,
) -> Result<ContentCard> {
    let card = load_card(conn, user_id, id)?;
    if card.archived == archived {
        return Ok(card);
    }

    let order_index = if archived {
        card.order_index
    } else {
        column_ids(conn, user_id, card.status)?.len() as i32
    };
    diesel::update(content_cards::table.filter(content_cards::id.eq(id)))
        .set((
            content_cards::archived.eq(archived),
            content_cards::order_index.eq(order_index),
            content_cards::updated_at.eq(now_ts()),
        ))
        .execute(conn)?;

    if archived {
        let remaining = column_ids(conn, user_id, card.status)?;
        renumber(conn, user_id, &remaining)?;
    }
    load_card(conn, user_id, id)
}

fn load_card(conn: &mut SqliteConnection, user_id: &str, id: i32) -> Result<ContentCard> {
    let row: Option<CardRow> = content_cards::table
        .filter(content_cards::id.eq(id))
        .filter(content_cards::user_id.eq(user_id))
        .first(conn)
        .optional()?;
    row.map(map_row)
        .transpose()?
        .ok_or_else(|| CreatorPilotError::NotFound(format!("content card {id}")))
}

/// Unarchived card ids of one column in display order.
fn column_ids(conn: &mut SqliteConnection, user_id: &str, status: CardStatus) -> Result<Vec<i32>> {
    Ok(content_cards::table
        .filter(content_cards::user_id.eq(user_id))
        .filter(content_cards::status.eq(status.as_str()))
        .filter(content_cards::archived.eq(false))
        .order((content_cards::order_index.asc(), content_cards::id.asc()))
        .select(content_cards::id)
        .load(conn)?)
}

fn renumber(conn: &mut SqliteConnection, user_id: &str, ordered_ids: &[i32]) -> Result<()> {
    let now = now_ts();
    for (idx, id) in ordered_ids.iter().enumerate() {
        diesel::update(
            content_cards::table
                .filter(content_cards::user_id.eq(user_id))
                .filter(content_cards::id.eq(*id)),
        )
        .set((
            content_cards::order_index.eq(idx as i32),
            content_cards::updated_at.eq(now),
        ))
        .execute(conn)?;
    }
    Ok(())
}
