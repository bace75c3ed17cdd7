#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::NamedTempFile;

use shortmirror::error::{Error, Result};
use shortmirror::model::Entry;
use shortmirror::route::create_app;
use shortmirror::state::AppState;
use shortmirror::store::{RecordStore, RedbStore};

pub const BASE_URL: &str = "https://sho.rt";

/// Test application over a temporary redb file
pub fn setup_test_app() -> (axum::Router, Arc<RedbStore>, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let store = Arc::new(
        RedbStore::open(temp_db.path().to_str().unwrap())
            .expect("Failed to initialize test database"),
    );
    let state = AppState::new(store.clone(), BASE_URL);
    (create_app(state), store, temp_db)
}

/// Helper function to parse response body as JSON
pub async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

/// Backend that is always down
pub struct UnavailableStore;

fn down<T>() -> Result<T> {
    Err(Error::StorageUnavailable("connection refused".to_string()))
}

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn get(&self, _code: &str) -> Result<Option<Entry>> {
        down()
    }

    async fn put(&self, _entry: Entry) -> Result<()> {
        down()
    }

    async fn put_many(&self, _entries: Vec<Entry>) -> Result<usize> {
        down()
    }

    async fn enumerate(&self) -> Result<Vec<Entry>> {
        down()
    }

    async fn count(&self) -> Result<usize> {
        down()
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
