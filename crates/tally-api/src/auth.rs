//! Handlers for login, logout and the current-member lookup.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/login` | Body: `{"username":"...","password":"..."}`; sets the session cookie |
//! | `POST` | `/logout` | Revokes the session and clears the cookie |
//! | `GET`  | `/me` | The logged-in member |

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  Json,
  extract::State,
  http::{HeaderMap, header},
  response::IntoResponse,
};
use rand_core::OsRng;
use serde::Deserialize;
use serde_json::json;
use tally_core::store::EvaluationStore;

use crate::{
  AppState,
  error::ApiError,
  session::{CurrentUser, expired_cookie, session_cookie, session_token},
};

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

/// Check `password` against a stored PHC string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}

// ─── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginBody {
  pub username: Option<String>,
  pub password: Option<String>,
}

/// `POST /login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let username = body
    .username
    .filter(|u| !u.is_empty())
    .ok_or_else(|| ApiError::BadRequest("username is required".into()))?;

  let creds = state
    .store
    .find_credentials(username.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("user {username:?} not found")))?;

  let password = body
    .password
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ApiError::BadRequest("password is required".into()))?;

  let verified = creds
    .password_hash
    .as_deref()
    .is_some_and(|phc| verify_password(&password, phc));
  if !verified {
    tracing::warn!(%username, "failed login");
    return Err(ApiError::Unauthorized("incorrect password".into()));
  }

  let member = creds.member;
  let token = state.sessions.create(member.id).await;
  tracing::info!(member_id = member.id, role = member.role.as_str(), "login");

  Ok((
    [(header::SET_COOKIE, session_cookie(&token, state.sessions.ttl()))],
    Json(json!({ "success": true, "user": member })),
  ))
}

// ─── Logout ───────────────────────────────────────────────────────────────────

/// `POST /logout` — succeeds whether or not a session was present.
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
) -> impl IntoResponse
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  if let Some(token) = session_token(&headers) {
    state.sessions.revoke(&token).await;
  }
  (
    [(header::SET_COOKIE, expired_cookie())],
    Json(json!({ "success": true })),
  )
}

// ─── Me ───────────────────────────────────────────────────────────────────────

/// `GET /me`
pub async fn me(CurrentUser(member): CurrentUser) -> impl IntoResponse {
  Json(json!({ "user": member }))
}
