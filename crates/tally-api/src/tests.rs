//! End-to-end tests driving the router with `tower::ServiceExt::oneshot`
//! against an in-memory SQLite store.

use std::sync::OnceLock;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tally_core::{
  item::{ItemId, NewItem},
  member::{MemberId, NewMember, Role},
  store::EvaluationStore,
};
use tally_store_sqlite::SqliteStore;
use tower::ServiceExt as _;

use super::*;

const PASSWORD: &str = "secret";

/// argon2 is slow in debug builds; hash once and share it across members.
fn password_hash() -> String {
  static HASH: OnceLock<String> = OnceLock::new();
  HASH
    .get_or_init(|| auth::hash_password(PASSWORD).unwrap())
    .clone()
}

struct Fixture {
  state: AppState<SqliteStore>,
  a:     MemberId,
  b:     MemberId,
  c:     MemberId,
  x:     ItemId,
  y:     ItemId,
}

fn config() -> ServerConfig {
  ServerConfig {
    host:             "127.0.0.1".to_string(),
    port:             3000,
    store_path:       PathBuf::from(":memory:"),
    session_ttl_secs: 3600,
    admin:            Some(AdminBootstrap {
      username:      "root".to_string(),
      name:          "Root".to_string(),
      team:          String::new(),
      password_hash: password_hash(),
    }),
  }
}

async fn fixture() -> Fixture {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let cfg = config();
  ensure_admin(&store, cfg.admin.as_ref().unwrap()).await.unwrap();

  let mut ids = Vec::new();
  for (username, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
    let mut input = NewMember::user(username, name, "T");
    input.password_hash = Some(password_hash());
    ids.push(store.add_member(input).await.unwrap().id);
  }
  let mut other = NewMember::user("d", "D", "U");
  other.password_hash = Some(password_hash());
  store.add_member(other).await.unwrap();

  let mut x = NewItem::new("Work", "Quality");
  x.display_order = 1;
  let mut y = NewItem::new("Work", "Speed");
  y.display_order = 2;
  let x = store.add_item(x).await.unwrap().id;
  let y = store.add_item(y).await.unwrap().id;

  Fixture { state: AppState::new(store, cfg), a: ids[0], b: ids[1], c: ids[2], x, y }
}

async fn send(
  state: &AppState<SqliteStore>,
  method: &str,
  uri: &str,
  cookie: Option<&str>,
  body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(cookie) = cookie {
    builder = builder.header(header::COOKIE, cookie);
  }
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let resp = router(state.clone()).oneshot(req).await.unwrap();
  let status = resp.status();
  let set_cookie = resp
    .headers()
    .get(header::SET_COOKIE)
    .map(|v| v.to_str().unwrap().to_string());
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let json = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, set_cookie, json)
}

/// Log in and return a `Cookie` header value carrying the session.
async fn login(state: &AppState<SqliteStore>, username: &str) -> String {
  let (status, set_cookie, _) = send(
    state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": username, "password": PASSWORD })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let set_cookie = set_cookie.expect("login sets a cookie");
  set_cookie.split(';').next().unwrap().to_string()
}

async fn rate(
  state: &AppState<SqliteStore>,
  cookie: &str,
  evaluated_id: MemberId,
  item_id: ItemId,
  score: i64,
) {
  let (status, _, body) = send(
    state,
    "POST",
    "/api/evaluations",
    Some(cookie),
    Some(json!({ "evaluated_id": evaluated_id, "item_id": item_id, "score": score })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_then_me() {
  let f = fixture().await;
  let cookie = login(&f.state, "a").await;
  assert!(cookie.starts_with("tally_session="));

  let (status, _, body) = send(&f.state, "GET", "/api/me", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["user"]["username"], "a");
  assert_eq!(body["user"]["role"], "user");
  assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn login_failures() {
  let f = fixture().await;

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": "a", "password": "wrong" })),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(body["error"].is_string());

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "username": "nobody", "password": PASSWORD })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/login",
    None,
    Some(json!({ "password": PASSWORD })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requests_without_a_session_are_rejected() {
  let f = fixture().await;
  let (status, ..) = send(&f.state, "GET", "/api/items", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  // A client-authored cookie carries no authority.
  let forged = r#"tally_session={"id":1,"role":"admin"}"#;
  let (status, ..) = send(&f.state, "GET", "/api/admin/evaluations", Some(forged), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_session() {
  let f = fixture().await;
  let cookie = login(&f.state, "a").await;

  let (status, set_cookie, _) = send(&f.state, "POST", "/api/logout", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(set_cookie.unwrap().contains("Max-Age=0"));

  let (status, ..) = send(&f.state, "GET", "/api/me", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_member_loses_session() {
  let f = fixture().await;
  let cookie = login(&f.state, "c").await;
  f.state.store.delete_member(f.c).await.unwrap();

  let (status, ..) = send(&f.state, "GET", "/api/me", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
  let f = fixture().await;
  let user = login(&f.state, "a").await;
  let (status, ..) = send(&f.state, "GET", "/api/admin/evaluations", Some(&user), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, ..) = send(&f.state, "GET", "/api/members", Some(&user), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let admin = login(&f.state, "root").await;
  let (status, _, body) = send(&f.state, "GET", "/api/members", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["members"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn ensure_admin_is_idempotent() {
  let f = fixture().await;
  let created = ensure_admin(f.state.store.as_ref(), config().admin.as_ref().unwrap())
    .await
    .unwrap();
  assert!(created.is_none());

  let creds = f.state.store.find_credentials("root".into()).await.unwrap().unwrap();
  assert_eq!(creds.member.role, Role::Admin);
}

// ─── Roster and rubric ────────────────────────────────────────────────────────

#[tokio::test]
async fn member_management() {
  let f = fixture().await;
  let admin = login(&f.state, "root").await;

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/members",
    Some(&admin),
    Some(json!({ "username": "e", "name": "E", "team": "T", "password": "pw" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["member"]["role"], "user");
  let id = body["member"]["id"].as_i64().unwrap();

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/members",
    Some(&admin),
    Some(json!({ "username": "e", "name": "E again", "team": "T" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, _, body) = send(
    &f.state,
    "PUT",
    &format!("/api/members/{id}"),
    Some(&admin),
    Some(json!({ "name": "Eve", "team": "U" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["member"]["team"], "U");

  let (status, ..) = send(&f.state, "DELETE", &format!("/api/members/{id}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, ..) = send(&f.state, "DELETE", &format!("/api/members/{id}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let root_id = f.state.store.find_credentials("root".into()).await.unwrap().unwrap().member.id;
  let (status, ..) =
    send(&f.state, "DELETE", &format!("/api/members/{root_id}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_members_lists_callers_team() {
  let f = fixture().await;
  let cookie = login(&f.state, "b").await;
  let (status, _, body) = send(&f.state, "GET", "/api/team-members", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::OK);
  let names: Vec<&str> = body["members"]
    .as_array()
    .unwrap()
    .iter()
    .map(|m| m["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn item_management() {
  let f = fixture().await;
  let admin = login(&f.state, "root").await;

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/items",
    Some(&admin),
    Some(json!({ "major_category": "Attitude" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/items",
    Some(&admin),
    Some(json!({ "major_category": "Attitude", "minor_category": "Candour", "display_order": 0 })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["item"]["name"], "Attitude - Candour");

  let user = login(&f.state, "a").await;
  let (_, _, body) = send(&f.state, "GET", "/api/items", Some(&user), None).await;
  let names: Vec<&str> = body["items"]
    .as_array()
    .unwrap()
    .iter()
    .map(|i| i["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["Attitude - Candour", "Work - Quality", "Work - Speed"]);

  let (status, ..) = send(
    &f.state,
    "PUT",
    "/api/items/999",
    Some(&admin),
    Some(json!({ "major_category": "a", "minor_category": "b" })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, ..) = send(&f.state, "DELETE", &format!("/api/items/{}", f.y), Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
}

// ─── Evaluations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_submission_validation() {
  let f = fixture().await;
  let cookie = login(&f.state, "a").await;

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/evaluations",
    Some(&cookie),
    Some(json!({ "evaluated_id": f.b, "item_id": f.x, "score": 11 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "score must be between 1 and 10, got 11");

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/evaluations",
    Some(&cookie),
    Some(json!({ "evaluated_id": f.b, "item_id": f.x, "score": "abc" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "score must be an integer");

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/evaluations",
    Some(&cookie),
    Some(json!({ "evaluated_id": 999, "item_id": f.x, "score": 5 })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resubmission_keeps_one_fact() {
  let f = fixture().await;
  let cookie = login(&f.state, "a").await;
  rate(&f.state, &cookie, f.b, f.x, 4).await;
  rate(&f.state, &cookie, f.b, f.x, 9).await;

  let (status, _, body) = send(&f.state, "GET", "/api/evaluations/my", Some(&cookie), None).await;
  assert_eq!(status, StatusCode::OK);
  let groups = body["evaluations"].as_array().unwrap();
  assert_eq!(groups.len(), 1);
  assert_eq!(groups[0]["evaluated_name"], "B");
  assert_eq!(groups[0]["scores"].as_array().unwrap().len(), 1);
  assert_eq!(groups[0]["scores"][0]["score"], 9);

  let (_, _, body) = send(&f.state, "GET", "/api/evaluations/previous", Some(&cookie), None).await;
  assert_eq!(body["previousEvaluations"], json!([]));
}

#[tokio::test]
async fn bulk_skips_invalid_rows() {
  let f = fixture().await;
  let cookie = login(&f.state, "a").await;

  let (status, _, body) = send(
    &f.state,
    "POST",
    "/api/evaluations/bulk",
    Some(&cookie),
    Some(json!({ "evaluations": [
      { "evaluated_id": f.b, "item_id": f.x, "score": 8 },
      { "evaluated_id": f.b, "item_id": f.y, "score": 15 },
      { "evaluated_id": f.a, "item_id": f.x, "score": -1 },
      { "evaluated_id": 999, "item_id": f.x, "score": 5 },
    ] })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "success": true, "count": 1 }));

  let (status, ..) = send(
    &f.state,
    "POST",
    "/api/evaluations/bulk",
    Some(&cookie),
    Some(json!({ "evaluations": "nope" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_summary_excludes_self_scores() {
  let f = fixture().await;
  let a = login(&f.state, "a").await;
  let b = login(&f.state, "b").await;
  let c = login(&f.state, "c").await;

  rate(&f.state, &a, f.b, f.x, 8).await;
  rate(&f.state, &c, f.b, f.x, 6).await;
  rate(&f.state, &b, f.b, f.x, 9).await;
  rate(&f.state, &b, f.a, f.x, 5).await;
  rate(&f.state, &a, f.c, f.x, 7).await;

  let (status, _, body) = send(&f.state, "GET", "/api/evaluations/summary", Some(&b), None).await;
  assert_eq!(status, StatusCode::OK);
  let rows = body["summary"].as_array().unwrap();
  assert_eq!(rows.len(), 2);

  let x = &rows[0];
  assert_eq!(x["item_id"], f.x);
  assert_eq!(x["others_avg"], 7.0);
  assert_eq!(x["self_score"], 9.0);
  assert_eq!(x["count"], 2);
  assert!((x["team_avg"].as_f64().unwrap() - 19.0 / 3.0).abs() < 1e-9);
  assert_eq!(x["rank"], 1);
  assert_eq!(x["team_total"], 3);

  let y = &rows[1];
  assert_eq!(y["others_avg"], Value::Null);
  assert_eq!(y["rank"], Value::Null);

  let (_, _, body) = send(&f.state, "GET", "/api/evaluations/summary", Some(&a), None).await;
  assert_eq!(body["summary"][0]["rank"], 3);
}

#[tokio::test]
async fn monthly_trend_for_caller() {
  let f = fixture().await;
  let a = login(&f.state, "a").await;
  let c = login(&f.state, "c").await;
  rate(&f.state, &a, f.b, f.x, 8).await;
  rate(&f.state, &c, f.b, f.x, 6).await;

  let b = login(&f.state, "b").await;
  let (status, _, body) = send(&f.state, "GET", "/api/evaluations/monthly", Some(&b), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["periods"].as_array().unwrap().len(), 1);
  let row = &body["monthlyData"][0];
  assert_eq!(row["others_avg"], 7.0);
  assert_eq!(row["count"], 2);
  assert_eq!(row["direction"], Value::Null);
}

// ─── Administration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_matrix_and_adjustment() {
  let f = fixture().await;
  let a = login(&f.state, "a").await;
  rate(&f.state, &a, f.b, f.x, 8).await;

  let admin = login(&f.state, "root").await;
  let (status, _, body) = send(&f.state, "GET", "/api/admin/evaluations", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  let team = &body["teams"][0];
  assert_eq!(team["team"], "T");
  let evaluator = &team["evaluators"][0];
  assert_eq!(evaluator["evaluator_name"], "A");
  let cell = &evaluator["subjects"][0]["cells"][0];
  assert_eq!(cell["score"], 8);
  let fact_id = cell["fact_id"].as_i64().unwrap();

  let uri = format!("/api/admin/evaluations/{fact_id}");
  let (status, ..) = send(&f.state, "PUT", &uri, Some(&admin), Some(json!({ "score": 0 }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _, body) = send(&f.state, "PUT", &uri, Some(&admin), Some(json!({ "score": 3 }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["evaluation"]["score"], 3);

  let (status, ..) = send(
    &f.state,
    "PUT",
    "/api/admin/evaluations/999",
    Some(&admin),
    Some(json!({ "score": 3 })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_team_summary() {
  let f = fixture().await;
  let a = login(&f.state, "a").await;
  rate(&f.state, &a, f.b, f.x, 8).await;

  let admin = login(&f.state, "root").await;
  let (status, _, body) = send(&f.state, "GET", "/api/admin/teams/T/summary", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  let members = body["members"].as_array().unwrap();
  assert_eq!(members.len(), 3);
  let b = members.iter().find(|m| m["member_id"] == f.b).unwrap();
  assert_eq!(b["rows"][0]["others_avg"], 8.0);

  let (status, ..) = send(
    &f.state,
    "GET",
    "/api/admin/teams/T/summary?period=2024-13",
    Some(&admin),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
