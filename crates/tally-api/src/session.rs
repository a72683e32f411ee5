//! Server-side sessions and the extractors that resolve them.
//!
//! The browser only ever holds an opaque random token in the
//! [`SESSION_COOKIE`] cookie. The server keeps the SHA-256 of that token
//! mapped to a member id, and reloads the member from the store on every
//! request, so role and team always come from the database.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, TimeDelta, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tally_core::{
  member::{Member, MemberId},
  store::EvaluationStore,
};
use tokio::sync::RwLock;

use crate::{AppState, error::ApiError};

pub const SESSION_COOKIE: &str = "tally_session";

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Session {
  member_id:  MemberId,
  expires_at: DateTime<Utc>,
}

/// In-process session table keyed by token digest.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct SessionStore {
  sessions: Arc<RwLock<HashMap<String, Session>>>,
  ttl:      Duration,
}

impl SessionStore {
  pub fn new(ttl: Duration) -> Self {
    Self { sessions: Arc::default(), ttl }
  }

  pub fn ttl(&self) -> Duration { self.ttl }

  /// Start a session for `member_id` and return the token to hand to the
  /// client.
  pub async fn create(&self, member_id: MemberId) -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let now = Utc::now();
    let expires_at = TimeDelta::from_std(self.ttl)
      .ok()
      .and_then(|ttl| now.checked_add_signed(ttl))
      .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut sessions = self.sessions.write().await;
    // Sessions whose owner never came back are only reclaimed here.
    sessions.retain(|_, s| s.expires_at > now);
    sessions.insert(digest(&token), Session { member_id, expires_at });
    token
  }

  /// The member a live token belongs to. Expired sessions are dropped.
  pub async fn resolve(&self, token: &str) -> Option<MemberId> {
    let key = digest(token);
    let session = self.sessions.read().await.get(&key).copied()?;
    if session.expires_at <= Utc::now() {
      self.sessions.write().await.remove(&key);
      return None;
    }
    Some(session.member_id)
  }

  pub async fn revoke(&self, token: &str) {
    self.sessions.write().await.remove(&digest(token));
  }
}

fn digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

// ─── Cookies ─────────────────────────────────────────────────────────────────

/// Value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == SESSION_COOKIE)
    .map(|(_, value)| value.to_owned())
}

/// `Set-Cookie` value that installs `token`.
pub fn session_cookie(token: &str, ttl: Duration) -> String {
  format!(
    "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
    ttl.as_secs()
  )
}

/// `Set-Cookie` value that clears the session cookie.
pub fn expired_cookie() -> String {
  format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// Any logged-in member.
pub struct CurrentUser(pub Member);

/// A logged-in member with the `admin` role.
pub struct AdminUser(pub Member);

impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = session_token(&parts.headers).ok_or_else(ApiError::unauthenticated)?;
    let member_id = state
      .sessions
      .resolve(&token)
      .await
      .ok_or_else(ApiError::unauthenticated)?;

    // The member may have been deleted since logging in.
    let member = state
      .store
      .get_member(member_id)
      .await
      .map_err(ApiError::store)?
      .ok_or_else(ApiError::unauthenticated)?;
    Ok(CurrentUser(member))
  }
}

impl<S> FromRequestParts<AppState<S>> for AdminUser
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let CurrentUser(member) = CurrentUser::from_request_parts(parts, state).await?;
    if !member.role.is_admin() {
      tracing::warn!(member_id = member.id, "non-admin attempted an admin operation");
      return Err(ApiError::Forbidden);
    }
    Ok(AdminUser(member))
  }
}
