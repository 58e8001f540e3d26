use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use creator_pilot::config::Config;
use creator_pilot::config_store;
use creator_pilot::daemon;
use creator_pilot::error::{CreatorPilotError, Result};

const STORABLE_SECRETS: [&str; 4] = [
    "openai_api_key",
    "anthropic_api_key",
    "google_api_key",
    "youtube_client_secret",
];

#[derive(Parser, Debug)]
#[command(name = "creator-pilotd")]
#[command(about = "Creator Pilot local daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7879)]
    port: u16,

    /// Runtime directory for data and secrets.
    #[arg(long, env = "CREATOR_PILOT_HOME")]
    home: Option<PathBuf>,

    /// Defaults to `<home>/data/creator-pilot.db`.
    #[arg(long)]
    db: Option<String>,

    /// Imports a JSON config file into the database before starting.
    #[arg(long, env = "CREATOR_PILOT_CONFIG")]
    config: Option<String>,

    /// Reads a secret value from stdin, stores it, and exits.
    #[arg(long, value_name = "NAME", value_parser = clap::builder::PossibleValuesParser::new(STORABLE_SECRETS))]
    store_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    creator_pilot::logging::init_tracing("creator_pilotd");
    let cli = Cli::parse();
    if cli.home.is_some() {
        creator_pilot::runtime_paths::set_app_root_override(cli.home.clone());
    }

    if let Some(name) = cli.store_secret.as_deref() {
        let mut value = String::new();
        std::io::stdin()
            .read_to_string(&mut value)
            .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(CreatorPilotError::Validation(format!("no value given for {name}")));
        }
        creator_pilot::vault::set_secret(name, value)?;
        tracing::info!(name, "Stored secret");
        return Ok(());
    }

    let db = cli
        .db
        .unwrap_or_else(creator_pilot::runtime_paths::default_db_path);
    if let Some(path) = cli.config.as_deref() {
        let config = Config::from_file(path)?;
        config_store::save_config(&db, &config)?;
        tracing::info!(path, "Imported config file");
    }
    let token = creator_pilot::vault::ensure_daemon_auth_token()?;

    daemon::run(&cli.host, cli.port, &db, &token).await
}
