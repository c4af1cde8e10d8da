use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use taskrunner::engine::database::Database;
use taskrunner::engine::types::Document;
use taskrunner::storage::arangodb_store::ArangoDocumentStore;
use taskrunner::storage::{ConnectOptions, DocumentStore};
use tokio::sync::Mutex;

/// Server-side page size, small so cursor paging gets exercised.
const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct MockArango {
    collections: HashSet<String>,
    documents: HashMap<String, Vec<serde_json::Value>>,
    cursors: HashMap<String, Vec<serde_json::Value>>,
    next_key: u64,
    databases_seen: HashSet<String>,
    saw_authorization: bool,
}

type Shared = Arc<Mutex<MockArango>>;
type Reply = (StatusCode, Json<serde_json::Value>);

fn not_found(num: i64, message: &str) -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": true, "errorNum": num, "errorMessage": message })),
    )
}

fn note_request(state: &mut MockArango, db: &str, headers: &HeaderMap) {
    state.databases_seen.insert(db.to_string());
    if headers.contains_key(axum::http::header::AUTHORIZATION) {
        state.saw_authorization = true;
    }
}

async fn version(
    Path(db): Path<String>,
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Reply {
    note_request(&mut *state.lock().await, &db, &headers);
    (StatusCode::OK, Json(serde_json::json!({ "server": "arango", "version": "3.11.0" })))
}

async fn create_collection(
    Path(db): Path<String>,
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Reply {
    let mut state = state.lock().await;
    note_request(&mut state, &db, &headers);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state.collections.insert(name.clone());
    (StatusCode::OK, Json(serde_json::json!({ "name": name })))
}

fn store_document(state: &mut MockArango, collection: &str, mut body: serde_json::Value) -> Reply {
    let key = match body.get("_key").and_then(|v| v.as_str()) {
        Some(k) => k.to_string(),
        None => {
            state.next_key += 1;
            state.next_key.to_string()
        }
    };
    let id = format!("{}/{}", collection, key);
    body["_key"] = serde_json::json!(key);
    body["_id"] = serde_json::json!(id);
    body["_rev"] = serde_json::json!("_rev1");

    let docs = state.documents.entry(collection.to_string()).or_default();
    docs.retain(|d| d["_key"] != body["_key"]);
    docs.push(body);

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "_id": id, "_key": key, "_rev": "_rev1" })),
    )
}

async fn insert_document(
    Path((db, collection)): Path<(String, String)>,
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Reply {
    let mut state = state.lock().await;
    note_request(&mut state, &db, &headers);
    if !state.collections.contains(&collection) {
        return not_found(1203, "collection or view not found");
    }
    store_document(&mut state, &collection, body)
}

async fn replace_document(
    Path((db, collection, key)): Path<(String, String, String)>,
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(mut body): Json<serde_json::Value>,
) -> Reply {
    let mut state = state.lock().await;
    note_request(&mut state, &db, &headers);
    if !state.collections.contains(&collection) {
        return not_found(1203, "collection or view not found");
    }
    let exists = state
        .documents
        .get(&collection)
        .is_some_and(|docs| docs.iter().any(|d| d["_key"] == key));
    if !exists {
        return not_found(1202, "document not found");
    }
    body["_key"] = serde_json::json!(key);
    store_document(&mut state, &collection, body)
}

fn page(state: &mut MockArango, mut results: Vec<serde_json::Value>) -> Reply {
    let rest = if results.len() > PAGE_SIZE {
        results.split_off(PAGE_SIZE)
    } else {
        Vec::new()
    };

    let mut body = serde_json::json!({ "result": results, "hasMore": !rest.is_empty() });
    if !rest.is_empty() {
        let id = format!("c{}", state.cursors.len() + 1);
        body["id"] = serde_json::json!(id);
        state.cursors.insert(id, rest);
    }
    (StatusCode::CREATED, Json(body))
}

async fn create_cursor(
    Path(db): Path<String>,
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Reply {
    let mut state = state.lock().await;
    note_request(&mut state, &db, &headers);

    let collection = body["bindVars"]["@collection"].as_str().unwrap_or_default();
    if !state.collections.contains(collection) {
        return not_found(1203, "collection or view not found");
    }
    let criteria = body["bindVars"]["criteria"].as_object().cloned().unwrap_or_default();

    let results: Vec<serde_json::Value> = state
        .documents
        .get(collection)
        .map(|docs| {
            docs.iter()
                .filter(|d| criteria.iter().all(|(k, v)| d.get(k) == Some(v)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    page(&mut state, results)
}

async fn next_batch(
    Path((db, id)): Path<(String, String)>,
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Reply {
    let mut state = state.lock().await;
    note_request(&mut state, &db, &headers);
    match state.cursors.remove(&id) {
        Some(rest) => page(&mut state, rest),
        None => not_found(1600, "cursor not found"),
    }
}

async fn start_mock_server() -> (String, tokio::task::JoinHandle<()>, Shared) {
    let state: Shared = Arc::new(Mutex::new(MockArango::default()));

    let app = Router::new()
        .route("/_db/{db}/_api/version", get(version))
        .route("/_db/{db}/_api/collection", post(create_collection))
        .route("/_db/{db}/_api/document/{collection}", post(insert_document))
        .route("/_db/{db}/_api/document/{collection}/{key}", put(replace_document))
        .route("/_db/{db}/_api/cursor", post(create_cursor))
        .route("/_db/{db}/_api/cursor/{id}", put(next_batch))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), handle, state)
}

fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn options_with_token() -> ConnectOptions {
    ConnectOptions {
        timeout: Duration::from_secs(5),
        token: Some("secret-token".to_string()),
        ..ConnectOptions::default()
    }
}

#[tokio::test]
async fn arangodb_store_inserts_and_finds_with_paging() {
    let (url, handle, state) = start_mock_server().await;
    let store = ArangoDocumentStore::new(&url, "realtime", &options_with_token()).unwrap();

    store.ping().await.unwrap();
    assert!(store.find("votes", &Document::new()).await.unwrap().is_empty());

    for roll in ["s1", "s2", "s3"] {
        let id = store
            .insert("votes", doc(serde_json::json!({ "roll_id": roll, "chamber": "senate" })))
            .await
            .unwrap();
        assert!(id.starts_with("votes/"));
    }
    store
        .insert("votes", doc(serde_json::json!({ "roll_id": "h1", "chamber": "house" })))
        .await
        .unwrap();

    let senate = store
        .find("votes", &doc(serde_json::json!({ "chamber": "senate" })))
        .await
        .unwrap();
    assert_eq!(senate.len(), 3);
    assert_eq!(senate[2]["roll_id"], "s3");

    let state = state.lock().await;
    assert!(state.collections.contains("votes"));
    assert!(state.databases_seen.contains("realtime"));
    assert!(state.saw_authorization);

    handle.abort();
}

#[tokio::test]
async fn arangodb_store_save_replaces_or_inserts() {
    let (url, handle, _state) = start_mock_server().await;
    let store = ArangoDocumentStore::new(&url, "realtime", &options_with_token()).unwrap();

    // Unknown key: falls back to insert with that key
    let id = store
        .save("checkpoints", doc(serde_json::json!({ "_id": "abc", "value": 1 })))
        .await
        .unwrap();
    assert_eq!(id, "checkpoints/abc");

    let mut found = store
        .find("checkpoints", &Document::new())
        .await
        .unwrap()
        .remove(0);
    found.insert("value".to_string(), serde_json::json!(2));
    let id = store.save("checkpoints", found).await.unwrap();
    assert_eq!(id, "checkpoints/abc");

    let all = store.find("checkpoints", &Document::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["value"], 2);

    handle.abort();
}

#[tokio::test]
async fn database_reports_through_arangodb() {
    let (url, handle, _state) = start_mock_server().await;
    let db = Database::open("votes_senate", &url, "realtime", &options_with_token())
        .await
        .unwrap();

    db.success("synced 3 votes", None).await.unwrap();
    db.get_or_create(
        "checkpoints",
        &doc(serde_json::json!({ "name": "votes" })),
        doc(serde_json::json!({ "value": "s3" })),
    )
    .await
    .unwrap();
    db.get_or_create(
        "checkpoints",
        &doc(serde_json::json!({ "name": "votes" })),
        doc(serde_json::json!({ "value": "s4" })),
    )
    .await
    .unwrap();

    let reports = db.collection("reports").find_all().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["source"], "VotesSenate");
    assert_eq!(reports[0]["read"], false);

    let checkpoints = db.collection("checkpoints").find_all().await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0]["value"], "s4");

    handle.abort();
}

#[tokio::test]
async fn arangodb_store_creates_collections_and_rejects_bad_endpoint() {
    let (url, handle, _state) = start_mock_server().await;
    let store = ArangoDocumentStore::new(&url, "realtime", &options_with_token()).unwrap();

    let result = store.save("missing", doc(serde_json::json!({ "_key": "k" }))).await;
    // Collection is created on demand, so a save into a new collection succeeds
    assert!(result.is_ok());

    let bad = ArangoDocumentStore::new(
        &format!("{}/nope", url),
        "realtime",
        &options_with_token(),
    )
    .unwrap();
    assert!(bad.ping().await.is_err());

    handle.abort();
}
