// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PostgREST user store tests.
//!
//! These tests run `SupabaseDb` against a local fake of the REST endpoint and
//! verify:
//! 1. The table route, filters and service-key headers on every call
//! 2. HTTP 409 on insert surfaces as `AppError::Conflict`
//! 3. An empty PATCH result surfaces as `AppError::NotFound`
//! 4. The reconciler survives a lost insert race against the real backend

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use learnpoints_api::config::Config;
use learnpoints_api::db::SupabaseDb;
use learnpoints_api::error::AppError;
use learnpoints_api::models::{
    IdentitySource, NewUser, ProfileAttributes, ThirdPartyIdentity, UserUpdate,
};
use learnpoints_api::services::IdentityReconciler;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One request as the fake endpoint saw it.
#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    query: HashMap<String, String>,
    apikey: Option<String>,
    authorization: Option<String>,
    prefer: Option<String>,
    body: Option<Value>,
}

#[derive(Clone, Default)]
struct FakeRest {
    requests: Arc<Mutex<Vec<Recorded>>>,
    /// Lookups of race@example.com so far; the first one finds nothing.
    race_lookups: Arc<AtomicUsize>,
}

impl FakeRest {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn row(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "name": "Ann",
        "username": null,
        "identity_source": "google",
        "role": "user",
        "is_active": true,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn users_table(
    State(fake): State<FakeRest>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Option<Value> = serde_json::from_slice(&body).ok();
    fake.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        query: query.clone(),
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        prefer: header(&headers, "prefer"),
        body: body.clone(),
    });

    let filter = |key: &str| query.get(key).map(String::as_str);

    match method {
        Method::GET => {
            let rows = match (filter("email"), filter("id")) {
                (Some("eq.boom@example.com"), _) => {
                    return (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response();
                }
                (Some("eq.ann@example.com"), _) | (_, Some("eq.user-1")) => {
                    vec![row("user-1", "ann@example.com")]
                }
                (Some("eq.race@example.com"), _) => {
                    if fake.race_lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                        vec![]
                    } else {
                        vec![row("user-race", "race@example.com")]
                    }
                }
                _ => vec![],
            };

            let rows: Vec<Value> = if filter("select") == Some("id") {
                rows.iter().map(|r| json!({ "id": r["id"] })).collect()
            } else {
                rows
            };
            Json(rows).into_response()
        }
        Method::POST => {
            let body = body.unwrap_or(Value::Null);
            match body["email"].as_str() {
                Some("taken@example.com") | Some("race@example.com") => (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "code": "23505",
                        "message": "duplicate key value violates unique constraint",
                    })),
                )
                    .into_response(),
                _ => (StatusCode::CREATED, Json(json!([body]))).into_response(),
            }
        }
        Method::PATCH => {
            let Some(id) = filter("id").and_then(|f| f.strip_prefix("eq.")) else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            if id == "missing" {
                return Json(json!([])).into_response();
            }

            let email = if id == "user-race" {
                "race@example.com"
            } else {
                "ann@example.com"
            };
            let mut updated = row(id, email);
            if let Some(Value::Object(patch)) = body {
                for (key, value) in patch {
                    updated[key] = value;
                }
            }
            Json(json!([updated])).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Start the fake endpoint and point a store at it.
async fn rest_db() -> (SupabaseDb, FakeRest, Config) {
    let fake = FakeRest::default();
    let app = Router::new()
        .route("/rest/v1/users", any(users_table))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = Config::test_default();
    config.supabase_url = format!("http://{addr}/");

    (SupabaseDb::new(&config).unwrap(), fake, config)
}

fn assert_service_auth(request: &Recorded) {
    assert_eq!(request.apikey.as_deref(), Some("test_service_key"));
    assert_eq!(
        request.authorization.as_deref(),
        Some("Bearer test_service_key")
    );
}

#[tokio::test]
async fn test_find_by_email_filters_and_auth() {
    let (db, fake, _) = rest_db().await;

    let user = db
        .find_user_by_email("ann@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.id, "user-1");
    assert_eq!(user.identity_source, IdentitySource::Google);

    assert!(db
        .find_user_by_email("nobody@example.com")
        .await
        .unwrap()
        .is_none());

    let requests = fake.requests();
    assert_eq!(requests.len(), 2);
    let request = &requests[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.query["email"], "eq.ann@example.com");
    assert_eq!(request.query["limit"], "1");
    assert_eq!(request.query["select"], "*");
    assert_service_auth(request);
}

#[tokio::test]
async fn test_get_user_and_count() {
    let (db, fake, _) = rest_db().await;

    let user = db.get_user("user-1").await.unwrap().unwrap();
    assert_eq!(user.email, "ann@example.com");
    assert!(db.get_user("user-2").await.unwrap().is_none());

    assert_eq!(db.count_users_by_email("ann@example.com").await.unwrap(), 1);
    assert_eq!(db.count_users_by_email("nobody@example.com").await.unwrap(), 0);

    let requests = fake.requests();
    assert_eq!(requests[0].query["id"], "eq.user-1");
    let count = &requests[2];
    assert_eq!(count.query["email"], "eq.ann@example.com");
    assert_eq!(count.query["select"], "id");
    assert_service_auth(count);
}

#[tokio::test]
async fn test_insert_returns_representation() {
    let (db, fake, _) = rest_db().await;

    let new_user = NewUser::new(
        "new@example.com".to_string(),
        "Nia".to_string(),
        IdentitySource::Password,
    );
    let user = db.insert_user(&new_user).await.unwrap();
    assert_eq!(user.id, new_user.id);
    assert_eq!(user.email, "new@example.com");

    let request = &fake.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.prefer.as_deref(), Some("return=representation"));
    assert_service_auth(request);
    let body = request.body.as_ref().unwrap();
    assert_eq!(body["email"], "new@example.com");
    assert_eq!(body["identity_source"], "password");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_insert_conflict_maps_to_conflict() {
    let (db, _, _) = rest_db().await;

    let new_user = NewUser::new(
        "taken@example.com".to_string(),
        "Ann".to_string(),
        IdentitySource::Google,
    );
    let err = db.insert_user(&new_user).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn test_update_patches_by_id() {
    let (db, fake, _) = rest_db().await;

    let update = UserUpdate {
        username: Some("ann".to_string()),
        ..Default::default()
    };
    let user = db.update_user("user-1", &update).await.unwrap();
    assert_eq!(user.username.as_deref(), Some("ann"));

    let request = &fake.requests()[0];
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.query["id"], "eq.user-1");
    assert_eq!(request.prefer.as_deref(), Some("return=representation"));
    assert_service_auth(request);

    // Only supplied fields travel, plus the refreshed timestamp.
    let body = request.body.as_ref().unwrap();
    assert_eq!(body["username"], "ann");
    assert!(body.get("updated_at").is_some());
    assert!(body.get("name").is_none());
    assert!(body.get("is_active").is_none());
}

#[tokio::test]
async fn test_update_with_no_rows_is_not_found() {
    let (db, _, _) = rest_db().await;

    let err = db
        .update_user("missing", &UserUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_server_error_maps_to_database() {
    let (db, _, _) = rest_db().await;

    let err = db.find_user_by_email("boom@example.com").await.unwrap_err();
    match err {
        AppError::Database(msg) => assert!(msg.contains("503"), "got {msg}"),
        other => panic!("expected Database error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconcile_recovers_from_lost_insert_race() {
    let (db, fake, config) = rest_db().await;
    let reconciler = IdentityReconciler::new(db, &config);

    let identity = ThirdPartyIdentity {
        external_user_id: "google-sub-race".to_string(),
        email: Some("Race@Example.com".to_string()),
        profile: ProfileAttributes {
            full_name: Some("Racer".to_string()),
            ..Default::default()
        },
        provider: IdentitySource::Google,
    };

    let user = reconciler.reconcile(&identity).await.unwrap();
    assert_eq!(user.id, "user-race");
    assert_eq!(user.name, "Racer");

    let methods: Vec<Method> = fake.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(
        methods,
        vec![Method::GET, Method::POST, Method::GET, Method::PATCH]
    );
}
