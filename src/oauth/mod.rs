//! YouTube OAuth2 authorization-code flow with PKCE, token storage and refresh.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::OAuthConfig;
use crate::db::{self, db_err, now_ts, SqlitePool, SqlitePooledConn};
use crate::error::{CreatorPilotError, Result};
use crate::vault;

pub mod fsm;
mod schema;

pub use fsm::{AuthEvent, AuthState};
use schema::{oauth_sessions, oauth_tokens};

const VERIFIER_BYTES: usize = 48;
const STATE_BYTES: usize = 24;
const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthStatus {
    pub user_id: String,
    pub authenticated: bool,
    pub state: AuthState,
    pub expires_at: Option<i64>,
    pub scopes: Vec<String>,
    pub needs_refresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthToken {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Queryable)]
struct SessionRow {
    #[allow(dead_code)]
    id: i32,
    user_id: String,
    #[allow(dead_code)]
    state: String,
    code_verifier: String,
    #[allow(dead_code)]
    created_at: i64,
    expires_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = oauth_sessions)]
struct NewSessionRow<'a> {
    user_id: &'a str,
    state: &'a str,
    code_verifier: &'a str,
    created_at: i64,
    expires_at: i64,
}

#[derive(Queryable)]
struct TokenRow {
    #[allow(dead_code)]
    id: i32,
    user_id: String,
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    scopes: String,
    expires_at: i64,
    #[allow(dead_code)]
    created_at: i64,
    #[allow(dead_code)]
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = oauth_tokens)]
struct NewTokenRow<'a> {
    user_id: &'a str,
    access_token: &'a str,
    refresh_token: Option<&'a str>,
    token_type: &'a str,
    scopes: &'a str,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
}

pub struct OAuthManager {
    pool: SqlitePool,
    config: OAuthConfig,
    http: reqwest::Client,
    refresh_margin_seconds: i64,
}

impl OAuthManager {
    pub async fn new(
        sqlite_path: impl AsRef<str>,
        config: OAuthConfig,
        refresh_margin_seconds: i64,
    ) -> Result<Self> {
        let pool = db::connect_pool(sqlite_path.as_ref()).await?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CreatorPilotError::Http(e.to_string()))?;
        Ok(Self {
            pool,
            config,
            http,
            refresh_margin_seconds: refresh_margin_seconds.max(0),
        })
    }

    /// Starts a consent round: persists a pending session and returns the
    /// URL the creator must visit.
    pub async fn initiate(&self, user_id: &str) -> Result<AuthorizationRequest> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CreatorPilotError::Validation("user_id is required".to_string()));
        }
        if self.config.client_id.trim().is_empty() {
            return Err(CreatorPilotError::Config(
                "oauth client_id is not configured".to_string(),
            ));
        }

        let current = self.current_state(user_id).await?;
        expect_transition(current, AuthEvent::Initiate)?;

        let state = vault::random_token(STATE_BYTES)?;
        let verifier = vault::random_token(VERIFIER_BYTES)?;
        let challenge = pkce_challenge(&verifier);
        let now = now_ts();
        let expires_at = now + self.config.session_ttl_seconds;

        let mut conn = self.conn().await?;
        // One consent round per user; a new request supersedes older ones.
        diesel::delete(oauth_sessions::table.filter(oauth_sessions::user_id.eq(user_id)))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        diesel::insert_into(oauth_sessions::table)
            .values(&NewSessionRow {
                user_id,
                state: &state,
                code_verifier: &verifier,
                created_at: now,
                expires_at,
            })
            .execute(&mut conn)
            .await
            .map_err(db_err)?;

        let scopes = self.config.scopes.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scopes.as_str()),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
            ],
        )
        .map_err(|e| CreatorPilotError::Config(format!("invalid oauth auth_url: {e}")))?;

        info!(user_id, expires_at, "Started OAuth consent");
        Ok(AuthorizationRequest {
            authorization_url: url.to_string(),
            state,
            expires_at,
        })
    }

    /// Handles the provider callback. Unknown or expired states are rejected
    /// before any network call is made.
    pub async fn complete(&self, state: &str, code: &str) -> Result<AuthStatus> {
        let state = state.trim();
        let code = code.trim();
        if state.is_empty() || code.is_empty() {
            return Err(CreatorPilotError::Validation(
                "both state and code are required".to_string(),
            ));
        }

        // Deleting with RETURNING claims the state; a replayed or concurrent
        // callback with the same state finds nothing.
        let mut conn = self.conn().await?;
        let claimed: Option<SessionRow> =
            diesel::delete(oauth_sessions::table.filter(oauth_sessions::state.eq(state)))
                .get_result(&mut conn)
                .await
                .optional()
                .map_err(db_err)?;
        drop(conn);
        let Some(session) = claimed else {
            return Err(CreatorPilotError::Validation(
                "unknown or already used authorization state".to_string(),
            ));
        };

        let user_id = session.user_id.as_str();
        if session.expires_at <= now_ts() {
            warn!(user_id, "OAuth callback arrived after the session expired");
            return Err(CreatorPilotError::Validation(
                "authorization request expired; start again".to_string(),
            ));
        }
        let current = match self.current_state(user_id).await? {
            AuthState::Authenticated => AuthState::Authenticated,
            _ => AuthState::Pending,
        };
        expect_transition(current, AuthEvent::Complete)?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", session.code_verifier.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = match self.token_request(&form).await {
            Ok(response) => response,
            Err(err) => {
                let next = fsm::transition(current, AuthEvent::Fail).unwrap_or(current);
                warn!(user_id, state = next.as_str(), "OAuth code exchange failed: {}", err);
                return Err(err);
            }
        };
        self.store_token(user_id, response).await?;
        info!(user_id, "OAuth consent completed");
        self.status(user_id).await
    }

    pub async fn status(&self, user_id: &str) -> Result<AuthStatus> {
        let token = self.load_token(user_id).await?;
        let state = self.current_state(user_id).await?;
        let now = now_ts();
        Ok(match token {
            Some(token) => AuthStatus {
                user_id: user_id.to_string(),
                authenticated: true,
                state,
                expires_at: Some(token.expires_at),
                needs_refresh: token.expires_at - now <= self.refresh_margin_seconds,
                scopes: token.scopes,
            },
            None => AuthStatus {
                user_id: user_id.to_string(),
                authenticated: false,
                state,
                expires_at: None,
                scopes: Vec::new(),
                needs_refresh: false,
            },
        })
    }

    /// Refresh-token grant. A grant the provider rejects with `invalid_grant`
    /// is cleared so the creator is asked to reconnect.
    pub async fn refresh(&self, user_id: &str) -> Result<AuthStatus> {
        let Some(token) = self.load_token(user_id).await? else {
            return Err(CreatorPilotError::Unauthorized(format!(
                "{user_id} has not connected a YouTube account"
            )));
        };
        expect_transition(AuthState::Authenticated, AuthEvent::Refresh)?;
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(CreatorPilotError::Unauthorized(
                "no refresh token stored; reconnect the YouTube account".to_string(),
            ));
        };

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        match self.token_request(&form).await {
            Ok(response) => {
                self.store_token(user_id, response).await?;
                info!(user_id, "Refreshed OAuth token");
                self.status(user_id).await
            }
            Err(CreatorPilotError::Unauthorized(message)) if message.contains("invalid_grant") => {
                expect_transition(AuthState::Authenticated, AuthEvent::RefreshRejected)?;
                warn!(user_id, "Refresh token rejected; clearing stored grant");
                self.clear(user_id).await?;
                Err(CreatorPilotError::Unauthorized(message))
            }
            Err(err) => Err(err),
        }
    }

    /// Returns a usable access token, refreshing first when it is inside the
    /// refresh margin.
    pub async fn access_token(&self, user_id: &str) -> Result<String> {
        let Some(token) = self.load_token(user_id).await? else {
            return Err(CreatorPilotError::Unauthorized(format!(
                "{user_id} has not connected a YouTube account"
            )));
        };
        let now = now_ts();
        if token.expires_at - now > self.refresh_margin_seconds {
            return Ok(token.access_token);
        }
        if token.refresh_token.is_none() {
            if token.expires_at > now {
                return Ok(token.access_token);
            }
            return Err(CreatorPilotError::Unauthorized(
                "access token expired; reconnect the YouTube account".to_string(),
            ));
        }
        self.refresh(user_id).await?;
        self.load_token(user_id)
            .await?
            .map(|token| token.access_token)
            .ok_or_else(|| CreatorPilotError::Unauthorized("token missing after refresh".to_string()))
    }

    /// Called when an upstream API answered 401 with our current token.
    pub async fn handle_unauthorized(&self, user_id: &str) -> Result<String> {
        warn!(user_id, "Upstream rejected access token; forcing refresh");
        self.refresh(user_id).await?;
        self.load_token(user_id)
            .await?
            .map(|token| token.access_token)
            .ok_or_else(|| CreatorPilotError::Unauthorized("token missing after refresh".to_string()))
    }

    /// Best-effort revocation at the provider, then local cleanup.
    pub async fn revoke(&self, user_id: &str) -> Result<AuthStatus> {
        let current = self.current_state(user_id).await?;
        expect_transition(current, AuthEvent::Revoke)?;
        if let Some(token) = self.load_token(user_id).await? {
            let secret = token
                .refresh_token
                .as_deref()
                .unwrap_or(token.access_token.as_str());
            match self
                .http
                .post(&self.config.revoke_url)
                .form(&[("token", secret)])
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(user_id, status = %response.status(), "Token revocation was not accepted");
                }
                Err(err) => warn!(user_id, "Token revocation request failed: {}", err),
            }
        }
        self.clear(user_id).await?;
        info!(user_id, "Disconnected YouTube account");
        self.status(user_id).await
    }

    /// Drops stored tokens and pending sessions without contacting the provider.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(oauth_tokens::table.filter(oauth_tokens::user_id.eq(user_id)))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        diesel::delete(oauth_sessions::table.filter(oauth_sessions::user_id.eq(user_id)))
            .execute(&mut conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Refreshes every refreshable token expiring within `within_secs`.
    /// Returns how many were refreshed; individual failures are logged.
    pub async fn refresh_expiring(&self, within_secs: i64) -> Result<usize> {
        let cutoff = now_ts() + within_secs.max(0);
        let users: Vec<String> = {
            let mut conn = self.conn().await?;
            oauth_tokens::table
                .filter(oauth_tokens::expires_at.le(cutoff))
                .filter(oauth_tokens::refresh_token.is_not_null())
                .select(oauth_tokens::user_id)
                .load(&mut conn)
                .await
                .map_err(db_err)?
        };

        let mut refreshed = 0;
        for user_id in users {
            match self.refresh(&user_id).await {
                Ok(_) => refreshed += 1,
                Err(err) => warn!(user_id = %user_id, "Scheduled token refresh failed: {}", err),
            }
        }
        Ok(refreshed)
    }

    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        diesel::delete(oauth_sessions::table.filter(oauth_sessions::expires_at.le(now_ts())))
            .execute(&mut conn)
            .await
            .map_err(db_err)
    }

    pub async fn connected_users(&self) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        oauth_tokens::table
            .select(oauth_tokens::user_id)
            .order(oauth_tokens::user_id.asc())
            .load(&mut conn)
            .await
            .map_err(db_err)
    }

    async fn current_state(&self, user_id: &str) -> Result<AuthState> {
        let mut conn = self.conn().await?;
        let has_token: i64 = oauth_tokens::table
            .filter(oauth_tokens::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(db_err)?;
        if has_token > 0 {
            return Ok(AuthState::Authenticated);
        }
        let live_sessions: i64 = oauth_sessions::table
            .filter(oauth_sessions::user_id.eq(user_id))
            .filter(oauth_sessions::expires_at.gt(now_ts()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(db_err)?;
        Ok(if live_sessions > 0 {
            AuthState::Pending
        } else {
            AuthState::Unauthenticated
        })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("token endpoint unreachable: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("token response read failed: {e}")))?;
        if !status.is_success() {
            return Err(token_endpoint_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| CreatorPilotError::Serialization(format!("token response: {e}")))
    }

    async fn store_token(&self, user_id: &str, response: TokenResponse) -> Result<()> {
        let now = now_ts();
        let expires_at = now + response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN).max(0);
        let scopes = response
            .scope
            .unwrap_or_else(|| self.config.scopes.join(" "));
        let token_type = response.token_type.unwrap_or_else(|| "Bearer".to_string());

        let mut conn = self.conn().await?;
        let existing: Option<TokenRow> = oauth_tokens::table
            .filter(oauth_tokens::user_id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(db_err)?;

        match existing {
            Some(existing) => {
                // Providers often omit the refresh token on refresh; keep the old one.
                let refresh_token = response.refresh_token.or(existing.refresh_token);
                diesel::update(oauth_tokens::table.filter(oauth_tokens::user_id.eq(user_id)))
                    .set((
                        oauth_tokens::access_token.eq(response.access_token.as_str()),
                        oauth_tokens::refresh_token.eq(refresh_token.as_deref()),
                        oauth_tokens::token_type.eq(token_type.as_str()),
                        oauth_tokens::scopes.eq(scopes.as_str()),
                        oauth_tokens::expires_at.eq(expires_at),
                        oauth_tokens::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
                    .map_err(db_err)?;
            }
            None => {
                diesel::insert_into(oauth_tokens::table)
                    .values(&NewTokenRow {
                        user_id,
                        access_token: &response.access_token,
                        refresh_token: response.refresh_token.as_deref(),
                        token_type: &token_type,
                        scopes: &scopes,
                        expires_at,
                        created_at: now,
                        updated_at: now,
                    })
                    .execute(&mut conn)
                    .await
                    .map_err(db_err)?;
            }
        }
        Ok(())
    }

    pub async fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>> {
        let mut conn = self.conn().await?;
        let row: Option<TokenRow> = oauth_tokens::table
            .filter(oauth_tokens::user_id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(db_err)?;
        Ok(row.map(|row| OAuthToken {
            user_id: row.user_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_type: row.token_type,
            scopes: split_scopes(&row.scopes),
            expires_at: row.expires_at,
        }))
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        db::checkout(&self.pool).await
    }
}

fn expect_transition(current: AuthState, event: AuthEvent) -> Result<AuthState> {
    fsm::transition(current, event).ok_or_else(|| {
        CreatorPilotError::Validation(format!(
            "cannot {event:?} while {}",
            current.as_str()
        ))
    })
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn token_endpoint_error(status: reqwest::StatusCode, body: &str) -> CreatorPilotError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let description = parsed
        .as_ref()
        .and_then(|value| value.get("error_description"))
        .and_then(|value| value.as_str())
        .unwrap_or(body);
    let message = if code.is_empty() {
        format!("token endpoint returned {status}: {description}")
    } else {
        format!("{code}: {description}")
    };
    match code {
        "invalid_grant" | "invalid_client" | "unauthorized_client" => {
            CreatorPilotError::Unauthorized(message)
        }
        _ if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            CreatorPilotError::RateLimited(message)
        }
        _ if status.is_client_error() => CreatorPilotError::Validation(message),
        _ => CreatorPilotError::Http(message),
    }
}
