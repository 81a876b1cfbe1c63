//! Full database/document lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port in a background runtime, then
//! drives every `Cloudant` operation over real HTTP with the default ureq
//! transport, so URL building, auth headers, body encoding and response
//! parsing are all exercised together.

use cloudant::{ClientConfig, Cloudant, CloudantError, Document, QueryParams};
use serde_json::{json, Value};

const USER: &str = "alice";
const SECRET: &str = "s3cret";

/// Serve `app` on a random local port and return its base URL.
fn spawn_server(app: axum::Router) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, app).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn connect(database: Option<&str>) -> Cloudant {
    let base_url = spawn_server(mock_server::app_with_credentials(USER, SECRET));
    let mut config = ClientConfig::new(USER, SECRET).with_base_url(base_url);
    config.database = database.map(str::to_string);
    Cloudant::from_config(config)
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

#[test]
fn document_lifecycle() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = connect(Some("t1"));

    // Step 1: version and an empty server.
    let version = db.version().unwrap();
    assert_eq!(version.version, mock_server::VERSION);
    assert_eq!(version.build, mock_server::BUILD);
    assert!(db.list_databases().unwrap().is_empty());

    // Step 2: create the bound database.
    db.create_database(None).unwrap();
    assert_eq!(db.list_databases().unwrap(), vec!["t1".to_string()]);

    // Step 3: insert with a caller-chosen key and read it back.
    let inserted = db.insert_one(&doc(json!({"a": 1})), Some("x")).unwrap();
    assert!(inserted.ok);
    assert_eq!(inserted.id, "x");

    let mut read = db.read_document("x").unwrap();
    assert_eq!(read.remove("_id"), Some(json!("x")));
    let rev = read.remove("_rev").unwrap();
    assert_eq!(Some(rev.as_str().unwrap()), inserted.rev.as_deref());
    assert_eq!(read, doc(json!({"a": 1})));

    // Step 4: delete without a revision (HEAD then DELETE).
    let deleted = db.delete_document("x", None).unwrap();
    assert!(deleted.ok);

    // Step 5: the document is gone, with the service's reason attached.
    let err = db.read_document("x").unwrap_err();
    assert!(err.is_not_found());
    let app = err.application_error().unwrap();
    assert_eq!(app.error, "not_found");
    assert_eq!(app.reason, "deleted");

    // Step 6: drop the database.
    db.delete_database(None).unwrap();
    assert!(db.list_databases().unwrap().is_empty());
}

#[test]
fn server_assigned_ids_and_listing() {
    let db = connect(Some("cars"));
    db.create_database(None).unwrap();

    let season = doc(json!({"season": "summer", "weather": "usually warm and sunny"}));
    let created = db.insert_one(&season, None).unwrap();
    let mut stored = db.read_document(&created.id).unwrap();
    stored.remove("_id");
    stored.remove("_rev");
    assert_eq!(stored, season);

    let results = db
        .insert_many(&[doc(json!({"_id": "b", "n": 2})), doc(json!({"_id": "c", "n": 3}))])
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.ok));

    let page = db.list_all_documents(None, &QueryParams::new().limit(1)).unwrap();
    assert_eq!(page.total_rows, 3);
    assert_eq!(page.offset, Some(0));
    assert_eq!(page.rows.len(), 1);

    let explicit = db
        .list_all_documents(Some("cars"), &QueryParams::new().include_docs(true))
        .unwrap();
    assert_eq!(explicit.rows.len(), 3);
    assert!(explicit.rows.iter().all(|row| row.doc.is_some()));
}

#[test]
fn bulk_conflicts_are_reported_per_document() {
    let db = connect(Some("cars"));
    db.create_database(None).unwrap();
    db.insert_one(&doc(json!({"n": 1})), Some("taken")).unwrap();

    let results = db
        .insert_many(&[doc(json!({"_id": "taken", "n": 2})), doc(json!({"_id": "free"}))])
        .unwrap();
    assert_eq!(results[0].error.as_deref(), Some("conflict"));
    assert!(results[1].ok);
}

#[test]
fn overwrite_needs_current_revision() {
    let db = connect(Some("cars"));
    db.create_database(None).unwrap();
    let first = db.insert_one(&doc(json!({"make": "Volvo"})), Some("v70")).unwrap();

    let err = db
        .insert_one(&doc(json!({"make": "Saab"})), Some("v70"))
        .unwrap_err();
    assert!(err.is_conflict());

    let update = doc(json!({"make": "Saab", "_rev": first.rev.unwrap()}));
    let second = db.insert_one(&update, Some("v70")).unwrap();
    assert!(second.rev.unwrap().starts_with("2-"));
    assert_eq!(db.fetch_revision("v70").unwrap(), db.read_document("v70").unwrap()["_rev"]);
}

#[test]
fn stale_revision_delete_conflicts() {
    let db = connect(Some("cars"));
    db.create_database(None).unwrap();
    let first = db.insert_one(&doc(json!({"n": 1})), Some("k")).unwrap();
    let stale = first.rev.unwrap();
    db.insert_one(&doc(json!({"n": 2, "_rev": stale.clone()})), Some("k")).unwrap();

    let err = db.delete_document("k", Some(&stale)).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.application_error().unwrap().error, "conflict");
}

#[test]
fn design_documents() {
    let db = connect(Some("cars"));
    db.create_database(None).unwrap();
    db.insert_one(&doc(json!({"n": 1})), Some("plain")).unwrap();
    db.insert_one(
        &doc(json!({"views": {"by_make": {"map": "function(doc){ emit(doc.make, null); }"}}})),
        Some("_design/cars"),
    )
    .unwrap();

    let indexes = db.secondary_indexes().unwrap();
    assert_eq!(indexes.rows.len(), 1);
    let row = &indexes.rows[0];
    assert_eq!(row.id.as_deref(), Some("_design/cars"));
    assert!(row.doc.as_ref().unwrap()["views"]["by_make"].is_object());

    let design = db.read_design_document("cars").unwrap();
    assert_eq!(design["_id"], "_design/cars");
}

#[test]
fn generic_verbs_reach_the_service() {
    let db = connect(None);
    assert_eq!(db.put("/boats", None).unwrap(), json!({"ok": true}));
    let created = db.post("/boats", Some(&json!({"hull": "wood"}))).unwrap();
    let id = created["id"].as_str().unwrap();

    let headers = db.head(&format!("/boats/{id}")).unwrap();
    assert!(headers.contains_key("etag"));

    let fetched = db.get(&format!("/boats/{id}")).unwrap();
    assert_eq!(fetched["hull"], "wood");
    assert_eq!(db.delete("/boats", None).unwrap()["ok"], true);
}

#[test]
fn missing_database_issues_no_request() {
    let db = connect(None);
    assert!(matches!(db.create_database(None), Err(CloudantError::NoDatabase)));
    assert!(matches!(db.delete_database(None), Err(CloudantError::NoDatabase)));
    assert!(matches!(db.read_document("x"), Err(CloudantError::NoDatabase)));
}

#[test]
fn wrong_credentials_are_http_failures() {
    let base_url = spawn_server(mock_server::app_with_credentials(USER, SECRET));
    let db = Cloudant::from_config(ClientConfig::new(USER, "wrong").with_base_url(base_url));

    let err = db.list_databases().unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.application_error().unwrap().error, "unauthorized");
    assert!(err.to_string().contains("Name or password is incorrect."));
}

#[test]
fn creating_existing_database_fails() {
    let db = connect(Some("dup"));
    db.create_database(None).unwrap();
    let err = db.create_database(Some("dup")).unwrap_err();
    assert_eq!(err.status(), Some(412));
    assert_eq!(err.application_error().unwrap().error, "file_exists");
}
