//! Handlers for rubric item endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/items` | Any member; ordered by display order |
//! | `POST`   | `/items` | Admin. Body: [`ItemBody`] |
//! | `PUT`    | `/items/:id` | Admin. Body: [`ItemBody`] |
//! | `DELETE` | `/items/:id` | Admin. Also removes scores recorded against the item |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tally_core::{
  item::{DEFAULT_DISPLAY_ORDER, ItemId, NewItem},
  store::EvaluationStore,
};

use crate::{
  AppState,
  error::ApiError,
  session::{AdminUser, CurrentUser},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ItemBody {
  pub major_category: Option<String>,
  pub minor_category: Option<String>,
  pub description:    Option<String>,
  pub display_order:  Option<i64>,
}

impl TryFrom<ItemBody> for NewItem {
  type Error = ApiError;

  fn try_from(b: ItemBody) -> Result<Self, ApiError> {
    let present = |v: Option<String>| v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
    match (present(b.major_category), present(b.minor_category)) {
      (Some(major_category), Some(minor_category)) => Ok(NewItem {
        major_category,
        minor_category,
        description: b.description.unwrap_or_default(),
        display_order: b.display_order.unwrap_or(DEFAULT_DISPLAY_ORDER),
      }),
      _ => Err(ApiError::BadRequest(
        "major_category and minor_category are required".into(),
      )),
    }
  }
}

/// `GET /items`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let items = state.store.list_items().await.map_err(ApiError::store)?;
  Ok(Json(json!({ "items": items })))
}

/// `POST /items` — returns 201 + the stored item.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Json(body): Json<ItemBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let item = state
    .store
    .add_item(NewItem::try_from(body)?)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(item_id = item.id, name = %item.name, "rubric item added");
  Ok((StatusCode::CREATED, Json(json!({ "success": true, "item": item }))))
}

/// `PUT /items/:id`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<ItemId>,
  Json(body): Json<ItemBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let item = state
    .store
    .update_item(id, NewItem::try_from(body)?)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("item {id} not found")))?;
  Ok(Json(json!({ "success": true, "item": item })))
}

/// `DELETE /items/:id`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let removed = state.store.delete_item(id).await.map_err(ApiError::store)?;
  if !removed {
    return Err(ApiError::NotFound(format!("item {id} not found")));
  }
  tracing::info!(item_id = id, "rubric item deleted");
  Ok(Json(json!({ "success": true })))
}
