//! Handlers for roster endpoints. Administrator only, except
//! `/team-members`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/members` | All members, by team then name |
//! | `POST`   | `/members` | Body: [`CreateBody`]; 409 if the username is taken |
//! | `PUT`    | `/members/:id` | Body: `{"name":"...","team":"..."}` |
//! | `DELETE` | `/members/:id` | Also removes the member's evaluations |
//! | `GET`    | `/team-members` | `user`-role members of the caller's team |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tally_core::{
  member::{MemberId, MemberUpdate, NewMember, Role},
  store::EvaluationStore,
};

use crate::{
  AppState,
  auth::hash_password,
  error::ApiError,
  session::{AdminUser, CurrentUser},
};

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
  field
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
    .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /members`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let members = state.store.list_members().await.map_err(ApiError::store)?;
  Ok(Json(json!({ "members": members })))
}

/// `GET /team-members`
pub async fn team<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let members = state
    .store
    .list_team_members(me.team)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "members": members })))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateBody {
  pub username: Option<String>,
  pub name:     Option<String>,
  pub team:     Option<String>,
  /// Defaults to `user`.
  pub role:     Option<Role>,
  /// Plaintext; stored only as an argon2 hash. Without one the member
  /// cannot log in.
  pub password: Option<String>,
}

/// `POST /members` — returns 201 + the stored member.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  AdminUser(admin): AdminUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let username = required(body.username, "username")?;
  let name = required(body.name, "name")?;
  let team = required(body.team, "team")?;

  let taken = state
    .store
    .find_credentials(username.clone())
    .await
    .map_err(ApiError::store)?
    .is_some();
  if taken {
    return Err(ApiError::Conflict(format!("username {username:?} is already in use")));
  }

  let password_hash = body
    .password
    .filter(|p| !p.is_empty())
    .map(|p| hash_password(&p))
    .transpose()?;

  let member = state
    .store
    .add_member(NewMember {
      username,
      name,
      team,
      role: body.role.unwrap_or_default(),
      password_hash,
    })
    .await
    .map_err(ApiError::store)?;

  tracing::info!(admin_id = admin.id, member_id = member.id, "member added");
  Ok((StatusCode::CREATED, Json(json!({ "success": true, "member": member }))))
}

// ─── Update ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateBody {
  pub name: Option<String>,
  pub team: Option<String>,
}

/// `PUT /members/:id`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<MemberId>,
  Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let update = MemberUpdate {
    name: required(body.name, "name")?,
    team: required(body.team, "team")?,
  };

  let member = state
    .store
    .update_member(id, update)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("member {id} not found")))?;
  Ok(Json(json!({ "success": true, "member": member })))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /members/:id` — administrator accounts cannot be deleted.
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  AdminUser(admin): AdminUser,
  Path(id): Path<MemberId>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let member = state
    .store
    .get_member(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("member {id} not found")))?;

  if member.role.is_admin() {
    return Err(ApiError::BadRequest("administrator accounts cannot be deleted".into()));
  }

  state.store.delete_member(id).await.map_err(ApiError::store)?;
  tracing::info!(admin_id = admin.id, member_id = id, "member deleted");
  Ok(Json(json!({ "success": true })))
}
