//! Handlers for the rater-facing evaluation endpoints.
//!
//! The evaluator is always the logged-in member and the period is always
//! resolved from the server clock; neither is accepted from the payload.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/evaluations/my` | Scores the caller gave this month, grouped by recipient |
//! | `GET`  | `/evaluations/previous` | Same, for last month |
//! | `POST` | `/evaluations` | Body: `{"evaluated_id":1,"item_id":2,"score":7}` |
//! | `POST` | `/evaluations/bulk` | Body: `{"evaluations":[...]}`; invalid rows are skipped |
//! | `GET`  | `/evaluations/summary` | Caller's standing in their team this month |
//! | `GET`  | `/evaluations/monthly` | Caller's per-month history |

use std::collections::HashSet;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::{Value, json};
use tally_core::{
  aggregate,
  evaluation::{Period, ScoreSubmission, validate_bulk},
  item::ItemId,
  member::{Member, MemberId},
  store::{EvaluationQuery, EvaluationStore},
};

use crate::{AppState, error::ApiError, session::CurrentUser};

/// Scores `me` gave during `period`.
async fn given_in<S>(
  state: &AppState<S>,
  me: &Member,
  period: Period,
) -> Result<Vec<aggregate::PersonalResultGroup>, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let query = EvaluationQuery::given_by(me.id, period);
  let facts = state.store.list_evaluations(&query).await.map_err(ApiError::store)?;
  let members = state.store.list_members().await.map_err(ApiError::store)?;
  let items = state.store.list_items().await.map_err(ApiError::store)?;
  Ok(aggregate::monthly_personal_results(&facts, &members, &items, me.id, period)?)
}

// ─── Reading back ─────────────────────────────────────────────────────────────

/// `GET /evaluations/my`
pub async fn my<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let period = Period::current();
  let evaluations = given_in(&state, &me, period).await?;
  Ok(Json(json!({ "period": period, "evaluations": evaluations })))
}

/// `GET /evaluations/previous` — used to pre-fill this month's form.
pub async fn previous<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let period = Period::current().previous();
  let evaluations = given_in(&state, &me, period).await?;
  Ok(Json(json!({ "period": period, "previousEvaluations": evaluations })))
}

// ─── Submission ───────────────────────────────────────────────────────────────

/// `POST /evaluations`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let submission = ScoreSubmission::from_json(&body)?;

  if state
    .store
    .get_member(submission.evaluated_id)
    .await
    .map_err(ApiError::store)?
    .is_none()
  {
    return Err(ApiError::NotFound(format!(
      "member {} not found",
      submission.evaluated_id
    )));
  }
  let items = state.store.list_items().await.map_err(ApiError::store)?;
  if !items.iter().any(|i| i.id == submission.item_id) {
    return Err(ApiError::NotFound(format!("item {} not found", submission.item_id)));
  }

  let fact = state
    .store
    .upsert_evaluation(me.id, submission, Period::current())
    .await
    .map_err(ApiError::store)?;
  tracing::debug!(fact_id = fact.id, evaluator_id = me.id, "score recorded");
  Ok(Json(json!({ "success": true, "evaluation": fact })))
}

/// `POST /evaluations/bulk`
///
/// Rows that fail validation, or that name a member or item which does not
/// exist, are dropped. The response only reports how many rows were stored.
pub async fn bulk<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let entries = body
    .get("evaluations")
    .and_then(Value::as_array)
    .ok_or_else(|| ApiError::BadRequest("evaluations must be an array".into()))?;

  let accepted = validate_bulk(entries);

  let members: HashSet<MemberId> = state
    .store
    .list_members()
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|m| m.id)
    .collect();
  let items: HashSet<ItemId> = state
    .store
    .list_items()
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|i| i.id)
    .collect();

  let period = Period::current();
  let mut count = 0usize;
  for submission in accepted
    .into_iter()
    .filter(|s| members.contains(&s.evaluated_id) && items.contains(&s.item_id))
  {
    match state.store.upsert_evaluation(me.id, submission, period).await {
      Ok(_) => count += 1,
      Err(e) => tracing::warn!(
        error = %e,
        evaluated_id = submission.evaluated_id,
        item_id = submission.item_id,
        "skipping bulk row"
      ),
    }
  }

  tracing::info!(
    evaluator_id = me.id,
    received = entries.len(),
    stored = count,
    %period,
    "bulk submission"
  );
  Ok(Json(json!({ "success": true, "count": count })))
}

// ─── Aggregates ───────────────────────────────────────────────────────────────

/// `GET /evaluations/summary`
pub async fn summary<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let period = Period::current();
  let team_ids: Vec<MemberId> = state
    .store
    .list_team_members(me.team.clone())
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|m| m.id)
    .collect();
  let query = EvaluationQuery::team(me.team.clone(), period);
  let facts = state.store.list_evaluations(&query).await.map_err(ApiError::store)?;
  let items = state.store.list_items().await.map_err(ApiError::store)?;

  let rows = aggregate::team_summary(&facts, me.id, &team_ids, &items, period);
  Ok(Json(json!({ "period": period, "summary": rows })))
}

/// `GET /evaluations/monthly`
pub async fn monthly<S>(
  State(state): State<AppState<S>>,
  CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let query = EvaluationQuery::received_by(me.id);
  let facts = state.store.list_evaluations(&query).await.map_err(ApiError::store)?;
  let items = state.store.list_items().await.map_err(ApiError::store)?;

  let trend = aggregate::monthly_trend(&facts, me.id, &items);
  Ok(Json(json!({ "periods": trend.periods, "monthlyData": trend.rows })))
}
