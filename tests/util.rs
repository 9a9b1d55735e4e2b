#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request, StatusCode},
    Router,
};
use linkup_lib::{config::Config, db, http::build_router, migrate, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub async fn temp_pool() -> SqlitePool {
    let pool = db::open_pool("sqlite::memory:")
        .await
        .expect("open sqlite::memory:");
    migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    pool
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("sqlite::memory:".to_string()),
        "LINKUP_BCRYPT_COST" => Some("4".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

pub async fn test_app() -> TestApp {
    let pool = temp_pool().await;
    let state = AppState::new(pool.clone(), test_config());
    TestApp {
        router: build_router(state),
        pool,
    }
}

impl TestApp {
    /// Send one request and decode the JSON body (`Value::Null` when empty).
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send_request(request).await
    }

    pub async fn send_raw(&self, method: Method, uri: &str, raw: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        self.send_request(request).await
    }

    /// Send a body-less request with extra headers and keep the response headers.
    pub async fn send_headers(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, HeaderMap) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response.headers().clone())
    }

    async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, None).await
    }

    /// Create a draft event for the configured organizer and return its id.
    pub async fn create_event(&self, title: &str) -> i64 {
        let (status, body) = self
            .post("/api/v1/organizer/events", serde_json::json!({ "title": title }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    /// Insert an event owned by someone else, bypassing the API.
    pub async fn foreign_event(&self, organizer_id: i64) -> i64 {
        sqlx::query(
            "INSERT INTO events (organizer_id, title, start_time, end_time, cover_image, created_at, updated_at) \
             VALUES (?, 'Not yours', 0, 0, 'x', 0, 0)",
        )
        .bind(organizer_id)
        .execute(&self.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }
}
