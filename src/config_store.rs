use diesel::prelude::*;
use diesel_migrations::MigrationHarness;

use crate::config::Config;
use crate::db::{db_err, ensure_parent_dir, now_ts, open_connection_sync, MIGRATIONS};
use crate::error::{CreatorPilotError, Result};

mod schema {
    diesel::table! {
        app_config (id) {
            id -> Integer,
            config_json -> Text,
            updated_at -> BigInt,
        }
    }
}

use schema::app_config;

const CONFIG_ROW_ID: i32 = 1;

fn open_migrated(db_path: &str) -> Result<SqliteConnection> {
    ensure_parent_dir(db_path)?;
    let mut conn = open_connection_sync(db_path)?;
    conn.run_pending_migrations(MIGRATIONS).map_err(db_err)?;
    Ok(conn)
}

pub fn load_config(db_path: &str) -> Result<Config> {
    let mut conn = open_migrated(db_path)?;
    let raw: Option<String> = app_config::table
        .filter(app_config::id.eq(CONFIG_ROW_ID))
        .select(app_config::config_json)
        .first(&mut conn)
        .optional()
        .map_err(db_err)?;
    let raw = raw.ok_or_else(|| {
        CreatorPilotError::Config(format!("no config stored in {db_path}"))
    })?;
    serde_json::from_str(&raw).map_err(|e| CreatorPilotError::Config(e.to_string()))
}

pub fn save_config(db_path: &str, config: &Config) -> Result<()> {
    let json =
        serde_json::to_string(config).map_err(|e| CreatorPilotError::Serialization(e.to_string()))?;
    let mut conn = open_migrated(db_path)?;
    diesel::replace_into(app_config::table)
        .values((
            app_config::id.eq(CONFIG_ROW_ID),
            app_config::config_json.eq(json),
            app_config::updated_at.eq(now_ts()),
        ))
        .execute(&mut conn)
        .map_err(db_err)?;
    tracing::debug!(db = db_path, "Saved config");
    Ok(())
}

/// Loads the stored config, writing convention defaults on first run.
pub fn load_or_init(db_path: &str) -> Result<Config> {
    match load_config(db_path) {
        Ok(config) => Ok(config),
        Err(CreatorPilotError::Config(message)) if message.starts_with("no config stored") => {
            tracing::warn!("No config in store; writing defaults to {}", db_path);
            let config = Config::convention_defaults();
            save_config(db_path, &config)?;
            Ok(config)
        }
        Err(err) => Err(err),
    }
}

/// [`load_or_init`] on the blocking pool.
pub async fn load_or_init_async(db_path: &str) -> Result<Config> {
    let db_path = db_path.to_string();
    tokio::task::spawn_blocking(move || load_or_init(&db_path))
        .await
        .map_err(db_err)?
}
