//! Shared helpers for HTTP-level tests.
//!
//! Every test gets a fresh router over an in-memory store, so no database is
//! needed and tests do not share state.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use djvote_api::handlers::CALLER_HEADER;
use djvote_api::memory::MemoryStore;
use djvote_api::store::{DocumentStore, Filter, StoreError, StoreResult};
use djvote_api::users::FixedActiveUsers;
use djvote_api::{app, AppState};

pub const DJ: &str = "dj-1";

/// Router with a fixed active-user count for skip thresholds.
pub fn build_test_app(active_users: u64) -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(FixedActiveUsers(active_users)),
        Duration::from_secs(600),
    );
    app(state)
}

/// Store whose every call fails as if the database were unreachable.
pub struct UnreachableStore;

fn refused<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn find(&self, _: &str, _: &Filter) -> StoreResult<Vec<Value>> {
        refused()
    }

    async fn find_one(&self, _: &str, _: &Filter) -> StoreResult<Option<Value>> {
        refused()
    }

    async fn insert(&self, _: &str, _: &str, _: Value) -> StoreResult<()> {
        refused()
    }

    async fn replace(&self, _: &str, _: &Filter, _: Value) -> StoreResult<bool> {
        refused()
    }

    async fn delete(&self, _: &str, _: &Filter) -> StoreResult<u64> {
        refused()
    }

    async fn paginate(&self, _: &str, _: &Filter, _: u32, _: u32) -> StoreResult<Vec<Value>> {
        refused()
    }

    async fn count(&self, _: &str, _: &Filter) -> StoreResult<u64> {
        refused()
    }

    async fn group_count(&self, _: &str, _: &str) -> StoreResult<HashMap<String, u64>> {
        refused()
    }

    async fn modify(
        &self,
        _: &str,
        _: &str,
        _: &mut (dyn for<'v> FnMut(&'v mut Value) -> bool + Send),
    ) -> StoreResult<bool> {
        refused()
    }
}

/// Router whose storage is down.
pub fn build_unreachable_app() -> Router {
    let state = AppState::new(
        Arc::new(UnreachableStore),
        Arc::new(FixedActiveUsers(1)),
        Duration::from_secs(600),
    );
    app(state)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(CALLER_HEADER, caller);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_as(app: &Router, uri: &str, caller: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(caller), None).await
}

pub async fn post_json(app: &Router, uri: &str, caller: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(caller), Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, caller: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(caller), Some(body)).await
}

pub async fn post_empty(app: &Router, uri: &str, caller: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(caller), None).await
}

pub async fn delete(app: &Router, uri: &str, caller: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(caller), None).await
}

pub async fn delete_json(app: &Router, uri: &str, caller: &str, body: Value) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(caller), Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Creates an event owned by [`DJ`] and returns its id.
pub async fn create_event(app: &Router, active: bool, recommendations: bool) -> String {
    let response = post_json(
        app,
        "/api/events",
        DJ,
        json!({
            "name": "Friday Night",
            "date": "2026-10-16T21:00:00Z",
            "location": "Warehouse",
            "active": active,
            "enableUserRecommendation": recommendations,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

/// Adds a track as the DJ and returns the new entry.
pub async fn add_track(
    app: &Router,
    event_id: &str,
    name: &str,
    artist: &str,
    genre: &str,
) -> Value {
    let response = post_json(
        app,
        &format!("/api/events/{event_id}/music"),
        DJ,
        json!({ "name": name, "artist": artist, "genre": genre }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}
