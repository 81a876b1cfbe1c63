//! In-memory stand-in for the subset of the CouchDB/Cloudant REST API the
//! client uses: server info, database lifecycle, document CRUD with
//! revisions, bulk writes and `_all_docs`.
//!
//! Deleted documents leave a tombstone so reads can tell `deleted` from
//! `missing`, matching the real service.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const VERSION: &str = "2.1.1";
pub const BUILD: &str = "mock";

#[derive(Clone, Debug)]
struct StoredDoc {
    rev: String,
    /// `None` marks a deleted document.
    body: Option<Map<String, Value>>,
}

type Database = BTreeMap<String, StoredDoc>;

pub type Db = Arc<RwLock<HashMap<String, Database>>>;

#[derive(Clone)]
struct AppState {
    db: Db,
    /// Expected `Authorization` header value, when auth is enforced.
    authorization: Option<Arc<str>>,
}

/// Router without authentication.
pub fn app() -> Router {
    router(AppState {
        db: Db::default(),
        authorization: None,
    })
}

/// Router that rejects requests whose basic credentials differ.
pub fn app_with_credentials(name: &str, secret: &str) -> Router {
    let expected = format!("Basic {}", BASE64_STANDARD.encode(format!("{name}:{secret}")));
    router(AppState {
        db: Db::default(),
        authorization: Some(expected.into()),
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_info))
        .route("/_all_dbs", get(all_dbs))
        .route(
            "/{db}",
            get(database_info)
                .put(create_database)
                .delete(delete_database)
                .post(post_document),
        )
        .route("/{db}/_all_docs", get(all_docs))
        .route("/{db}/_bulk_docs", axum::routing::post(bulk_docs))
        .route(
            "/{db}/_design/{name}",
            get(get_design).put(put_design).delete(delete_design),
        )
        .route(
            "/{db}/{id}",
            get(get_document).put(put_document).delete(delete_document),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, error: &str, reason: &str) -> Response {
    (status, Json(json!({ "error": error, "reason": reason }))).into_response()
}

fn db_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "Database does not exist.")
}

fn conflict() -> Response {
    error_response(StatusCode::CONFLICT, "conflict", "Document update conflict.")
}

fn etag(rev: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{rev}\"")).unwrap_or_else(|_| HeaderValue::from_static("\"\""))
}

fn next_rev(previous: Option<&str>) -> String {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.authorization {
        let given = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_ref()) {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Name or password is incorrect.",
            );
        }
    }
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Server and databases
// ---------------------------------------------------------------------------

async fn server_info() -> Json<Value> {
    Json(json!({
        "couchdb": "Welcome",
        "version": VERSION,
        "cloudant_build": BUILD,
    }))
}

async fn all_dbs(State(state): State<AppState>) -> Json<Vec<String>> {
    let dbs = state.db.read().await;
    let mut names: Vec<String> = dbs.keys().cloned().collect();
    names.sort();
    Json(names)
}

async fn database_info(State(state): State<AppState>, Path(db): Path<String>) -> Response {
    let dbs = state.db.read().await;
    match dbs.get(&db) {
        Some(docs) => Json(json!({
            "db_name": db,
            "doc_count": docs.values().filter(|d| d.body.is_some()).count(),
        }))
        .into_response(),
        None => db_not_found(),
    }
}

async fn create_database(State(state): State<AppState>, Path(db): Path<String>) -> Response {
    let mut dbs = state.db.write().await;
    if dbs.contains_key(&db) {
        return error_response(
            StatusCode::PRECONDITION_FAILED,
            "file_exists",
            "The database could not be created, the file already exists.",
        );
    }
    dbs.insert(db, Database::new());
    (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response()
}

async fn delete_database(State(state): State<AppState>, Path(db): Path<String>) -> Response {
    match state.db.write().await.remove(&db) {
        Some(_) => Json(json!({ "ok": true })).into_response(),
        None => db_not_found(),
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Store `body` under `id`, checking `_rev` against the live revision.
fn write_document(
    docs: &mut Database,
    id: &str,
    mut body: Map<String, Value>,
) -> Result<String, Response> {
    let given_rev = body.remove("_rev").and_then(|v| v.as_str().map(str::to_string));
    body.remove("_id");
    let deleted = body
        .remove("_deleted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let current = docs.get(id);
    let live_rev = current.filter(|d| d.body.is_some()).map(|d| d.rev.as_str());
    if live_rev != given_rev.as_deref() {
        return Err(conflict());
    }

    let rev = next_rev(current.map(|d| d.rev.as_str()));
    docs.insert(
        id.to_string(),
        StoredDoc {
            rev: rev.clone(),
            body: (!deleted).then_some(body),
        },
    );
    Ok(rev)
}

fn document_json(id: &str, doc: &StoredDoc) -> Option<Value> {
    let body = doc.body.as_ref()?;
    let mut out = Map::new();
    out.insert("_id".to_string(), Value::from(id));
    out.insert("_rev".to_string(), Value::from(doc.rev.as_str()));
    out.extend(body.clone());
    Some(Value::Object(out))
}

fn object(value: Value) -> Result<Map<String, Value>, Response> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Document must be a JSON object",
        )),
    }
}

async fn post_document(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Json(input): Json<Value>,
) -> Response {
    let body = match object(input) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let id = body
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    store(&state, &db, &id, body).await
}

async fn store(state: &AppState, db: &str, id: &str, body: Map<String, Value>) -> Response {
    let mut dbs = state.db.write().await;
    let Some(docs) = dbs.get_mut(db) else {
        return db_not_found();
    };
    match write_document(docs, id, body) {
        Ok(rev) => (
            StatusCode::CREATED,
            [(header::ETAG, etag(&rev))],
            Json(json!({ "ok": true, "id": id, "rev": rev })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

async fn put_document(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Response {
    match object(input) {
        Ok(body) => store(&state, &db, &id, body).await,
        Err(resp) => resp,
    }
}

/// Serves GET and HEAD; axum strips the body for HEAD.
async fn get_document(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
) -> Response {
    read(&state, &db, &id).await
}

async fn read(state: &AppState, db: &str, id: &str) -> Response {
    let dbs = state.db.read().await;
    let Some(docs) = dbs.get(db) else {
        return db_not_found();
    };
    match docs.get(id) {
        Some(doc) => match document_json(id, doc) {
            Some(value) => ([(header::ETAG, etag(&doc.rev))], Json(value)).into_response(),
            None => error_response(StatusCode::NOT_FOUND, "not_found", "deleted"),
        },
        None => error_response(StatusCode::NOT_FOUND, "not_found", "missing"),
    }
}

#[derive(Deserialize)]
struct RevQuery {
    rev: Option<String>,
}

async fn delete_document(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    Query(query): Query<RevQuery>,
    headers: HeaderMap,
) -> Response {
    remove(&state, &db, &id, query.rev, &headers).await
}

async fn remove(
    state: &AppState,
    db: &str,
    id: &str,
    rev: Option<String>,
    headers: &HeaderMap,
) -> Response {
    // CouchDB also accepts the revision in If-Match.
    let rev = rev.or_else(|| {
        headers
            .get(header::IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
    });

    let mut dbs = state.db.write().await;
    let Some(docs) = dbs.get_mut(db) else {
        return db_not_found();
    };
    match docs.get(id) {
        Some(doc) if doc.body.is_some() => {}
        Some(_) => return error_response(StatusCode::NOT_FOUND, "not_found", "deleted"),
        None => return error_response(StatusCode::NOT_FOUND, "not_found", "missing"),
    }

    let mut tombstone = Map::new();
    if let Some(rev) = rev {
        tombstone.insert("_rev".to_string(), Value::from(rev));
    }
    tombstone.insert("_deleted".to_string(), Value::Bool(true));
    match write_document(docs, id, tombstone) {
        Ok(rev) => Json(json!({ "ok": true, "id": id, "rev": rev })).into_response(),
        Err(resp) => resp,
    }
}

async fn get_design(
    State(state): State<AppState>,
    Path((db, name)): Path<(String, String)>,
) -> Response {
    read(&state, &db, &format!("_design/{name}")).await
}

async fn put_design(
    State(state): State<AppState>,
    Path((db, name)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Response {
    match object(input) {
        Ok(body) => store(&state, &db, &format!("_design/{name}"), body).await,
        Err(resp) => resp,
    }
}

async fn delete_design(
    State(state): State<AppState>,
    Path((db, name)): Path<(String, String)>,
    Query(query): Query<RevQuery>,
    headers: HeaderMap,
) -> Response {
    remove(&state, &db, &format!("_design/{name}"), query.rev, &headers).await
}

#[derive(Deserialize)]
struct BulkDocs {
    docs: Vec<Value>,
}

async fn bulk_docs(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Json(input): Json<BulkDocs>,
) -> Response {
    let mut dbs = state.db.write().await;
    let Some(docs) = dbs.get_mut(&db) else {
        return db_not_found();
    };

    let results: Vec<Value> = input
        .docs
        .into_iter()
        .map(|doc| {
            let Value::Object(body) = doc else {
                return json!({ "error": "bad_request", "reason": "Document must be a JSON object" });
            };
            let id = body
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            match write_document(docs, &id, body) {
                Ok(rev) => json!({ "ok": true, "id": id, "rev": rev }),
                Err(_) => json!({
                    "id": id,
                    "error": "conflict",
                    "reason": "Document update conflict.",
                }),
            }
        })
        .collect();
    (StatusCode::CREATED, Json(results)).into_response()
}

// ---------------------------------------------------------------------------
// _all_docs
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
struct AllDocsQuery {
    startkey: Option<String>,
    endkey: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
    include_docs: Option<bool>,
}

fn json_key(raw: Option<String>) -> Result<Option<String>, Response> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::String(key)) => Ok(Some(key)),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "invalid UTF-8 JSON",
        )),
    }
}

async fn all_docs(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(query): Query<AllDocsQuery>,
) -> Response {
    let (start, end) = match (json_key(query.startkey), json_key(query.endkey)) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let dbs = state.db.read().await;
    let Some(docs) = dbs.get(&db) else {
        return db_not_found();
    };

    let live = || docs.iter().filter(|(_, d)| d.body.is_some());
    let total_rows = live().count();

    if let (Some(start), Some(end)) = (&start, &end) {
        if start > end {
            return Json(json!({ "total_rows": total_rows, "offset": total_rows, "rows": [] }))
                .into_response();
        }
    }

    let lower = start.map_or(Bound::Unbounded, Bound::Included);
    let upper = end.map_or(Bound::Unbounded, Bound::Included);
    let offset = match &lower {
        Bound::Included(start) => live().filter(|(id, _)| id.as_str() < start.as_str()).count(),
        _ => 0,
    };
    let skip = query.skip.unwrap_or(0);
    let include_docs = query.include_docs.unwrap_or(false);

    let rows: Vec<Value> = docs
        .range::<String, _>((lower, upper))
        .filter(|(_, d)| d.body.is_some())
        .skip(skip)
        .take(query.limit.unwrap_or(usize::MAX))
        .map(|(id, doc)| {
            let mut row = json!({ "id": id, "key": id, "value": { "rev": doc.rev } });
            if include_docs {
                row["doc"] = document_json(id, doc).unwrap_or(Value::Null);
            }
            row
        })
        .collect();

    Json(json!({
        "total_rows": total_rows,
        "offset": offset + skip,
        "rows": rows,
    }))
    .into_response()
}
