//! Administrator views over every recorded score.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/admin/evaluations` | Full matrix: team → evaluator → evaluated member → scores |
//! | `PUT`  | `/admin/evaluations/:id` | Body: `{"score":4}` |
//! | `GET`  | `/admin/teams/:team/summary` | Per-member standings; optional `?period=YYYY-MM` |

use axum::{
  Json,
  extract::{Path, Query, State},
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::{
  aggregate,
  evaluation::{FactId, Period, Score},
  store::{EvaluationQuery, EvaluationStore},
};

use crate::{AppState, error::ApiError, session::AdminUser};

/// `GET /admin/evaluations`
pub async fn matrix<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let facts = state
    .store
    .list_evaluations(&EvaluationQuery::default())
    .await
    .map_err(ApiError::store)?;
  let members = state.store.list_members().await.map_err(ApiError::store)?;
  let items = state.store.list_items().await.map_err(ApiError::store)?;

  let teams = aggregate::admin_score_matrix(&facts, &members, &items)?;
  Ok(Json(json!({ "teams": teams })))
}

/// `PUT /admin/evaluations/:id`
pub async fn adjust<S>(
  State(state): State<AppState<S>>,
  AdminUser(admin): AdminUser,
  Path(id): Path<FactId>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let score = match body.get("score") {
    None | Some(Value::Null) => return Err(tally_core::Error::MissingField("score").into()),
    Some(v) => Score::from_json(v)?,
  };

  let fact = state
    .store
    .adjust_score(id, score)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("evaluation {id} not found")))?;

  tracing::info!(admin_id = admin.id, fact_id = id, %score, "score adjusted");
  Ok(Json(json!({ "success": true, "evaluation": fact })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
  pub period: Option<String>,
}

/// `GET /admin/teams/:team/summary`
pub async fn team_summary<S>(
  State(state): State<AppState<S>>,
  _admin: AdminUser,
  Path(team): Path<String>,
  Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let period = match params.period.as_deref() {
    Some(raw) => raw.parse::<Period>()?,
    None => Period::current(),
  };

  let members = state
    .store
    .list_team_members(team.clone())
    .await
    .map_err(ApiError::store)?;
  let facts = state
    .store
    .list_evaluations(&EvaluationQuery::team(team.clone(), period))
    .await
    .map_err(ApiError::store)?;
  let items = state.store.list_items().await.map_err(ApiError::store)?;

  let overview = aggregate::team_overview(&facts, &members, &items, period);
  Ok(Json(json!({ "team": team, "period": period, "members": overview })))
}
