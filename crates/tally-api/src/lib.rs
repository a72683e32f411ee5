//! JSON REST API for Tally.
//!
//! Exposes an axum [`Router`] backed by any
//! [`tally_core::store::EvaluationStore`]. Every route lives under `/api`;
//! the session cookie established by `POST /api/login` authorises the rest.

pub mod admin;
pub mod auth;
pub mod error;
pub mod evaluations;
pub mod items;
pub mod members;
pub mod session;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post, put},
};
use serde::Deserialize;
use tally_core::{
  member::{Member, NewMember, Role},
  store::EvaluationStore,
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use session::SessionStore;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_session_ttl() -> u64 { 24 * 60 * 60 }

/// Runtime server configuration, deserialised from `config.toml` and
/// `TALLY__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  #[serde(default = "default_session_ttl")]
  pub session_ttl_secs: u64,
  /// Administrator account created at startup when its username is free.
  #[serde(default)]
  pub admin:            Option<AdminBootstrap>,
}

impl ServerConfig {
  pub fn session_ttl(&self) -> Duration { Duration::from_secs(self.session_ttl_secs) }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminBootstrap {
  pub username:      String,
  pub name:          String,
  #[serde(default)]
  pub team:          String,
  /// argon2 PHC string, as printed by `server --hash-password`.
  pub password_hash: String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub sessions: SessionStore,
  pub config:   Arc<ServerConfig>,
}

impl<S> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Self {
    Self {
      store:    Arc::new(store),
      sessions: SessionStore::new(config.session_ttl()),
      config:   Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API routes, un-nested.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    // Session
    .route("/login", post(auth::login::<S>))
    .route("/logout", post(auth::logout::<S>))
    .route("/me", get(auth::me))
    // Roster
    .route("/members", get(members::list::<S>).post(members::create::<S>))
    .route("/members/{id}", put(members::update::<S>).delete(members::delete::<S>))
    .route("/team-members", get(members::team::<S>))
    // Rubric
    .route("/items", get(items::list::<S>).post(items::create::<S>))
    .route("/items/{id}", put(items::update::<S>).delete(items::delete::<S>))
    // Evaluations
    .route("/evaluations", post(evaluations::submit::<S>))
    .route("/evaluations/bulk", post(evaluations::bulk::<S>))
    .route("/evaluations/my", get(evaluations::my::<S>))
    .route("/evaluations/previous", get(evaluations::previous::<S>))
    .route("/evaluations/summary", get(evaluations::summary::<S>))
    .route("/evaluations/monthly", get(evaluations::monthly::<S>))
    // Administration
    .route("/admin/evaluations", get(admin::matrix::<S>))
    .route("/admin/evaluations/{id}", put(admin::adjust::<S>))
    .route("/admin/teams/{team}/summary", get(admin::team_summary::<S>))
    .with_state(state)
}

/// The full application: [`api_router`] mounted at `/api` with request
/// tracing.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

/// Create the configured administrator unless the username already exists.
/// Returns the member that was created, if any.
pub async fn ensure_admin<S>(
  store: &S,
  admin: &AdminBootstrap,
) -> Result<Option<Member>, S::Error>
where
  S: EvaluationStore,
{
  if store.find_credentials(admin.username.clone()).await?.is_some() {
    return Ok(None);
  }
  let member = store
    .add_member(NewMember {
      username:      admin.username.clone(),
      name:          admin.name.clone(),
      team:          admin.team.clone(),
      role:          Role::Admin,
      password_hash: Some(admin.password_hash.clone()),
    })
    .await?;
  tracing::info!(member_id = member.id, username = %member.username, "administrator created");
  Ok(Some(member))
}

#[cfg(test)]
mod tests;
