use std::collections::HashMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    error::{CrashId, GENERIC_FAIL_MESSAGE, JSON_INVALID_BODY},
    AppError, AppResult,
};

#[derive(Serialize)]
struct SuccessBody<T> {
    status: &'static str,
    data: T,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crash_id: Option<String>,
}

/// `{"status":"success","data":...}` with the given status code.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(SuccessBody {
            status: "success",
            data,
        }),
    )
        .into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    success(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> Response {
    success(StatusCode::CREATED, data)
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// HTTP status for an `AREA/KIND` error code.
pub fn status_for(code: &str) -> StatusCode {
    let (area, kind) = code.split_once('/').unwrap_or((code, ""));
    match (area, kind) {
        ("VALIDATION", _) | ("JSON", _) => StatusCode::BAD_REQUEST,
        ("AUTH", "INVALID_CREDENTIALS") => StatusCode::UNAUTHORIZED,
        ("SQLX", "ROW_NOT_FOUND") => StatusCode::NOT_FOUND,
        (_, kind) if kind.ends_with("NOT_FOUND") => StatusCode::NOT_FOUND,
        ("CART", "INSUFFICIENT_STOCK" | "SOLD_OUT" | "DUPLICATE_EVENT_TICKET") => {
            StatusCode::CONFLICT
        }
        ("Sqlite", "2067" | "1555") => StatusCode::CONFLICT,
        (_, "CONFLICT") => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Unwrap an axum JSON extraction, turning any rejection into `JSON/INVALID_BODY`.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::new(
            JSON_INVALID_BODY,
            "Request body is not valid JSON for this endpoint",
        )
        .with_context("reason", rejection.body_text())),
    }
}

impl IntoResponse for AppError {
    fn into_response(mut self) -> Response {
        let status = status_for(self.code());
        if status.is_server_error() {
            if self.crash_id().is_none() {
                self.set_crash_id(CrashId::new());
            }
            self.log_with_event("http_internal_error");
            let body = ErrorBody {
                status: "error",
                code: self.code(),
                message: GENERIC_FAIL_MESSAGE,
                context: None,
                crash_id: self.crash_id().map(ToString::to_string),
            };
            return (status, Json(body)).into_response();
        }

        tracing::debug!(
            target: "linkup",
            event = "http_client_error",
            code = %self.code(),
            status = status.as_u16()
        );
        let body = ErrorBody {
            status: "error",
            code: self.code(),
            message: self.message(),
            context: Some(self.context()).filter(|c| !c.is_empty()),
            crash_id: None,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(status_for("VALIDATION/MISSING_FIELD"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("JSON/INVALID_BODY"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("AUTH/INVALID_CREDENTIALS"), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for("EVENTS/NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("PRODUCTS/VARIANT_NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("CART/ITEM_NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("SQLX/ROW_NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("GUESTS/CONFLICT"), StatusCode::CONFLICT);
        assert_eq!(status_for("CART/SOLD_OUT"), StatusCode::CONFLICT);
        assert_eq!(status_for("Sqlite/2067"), StatusCode::CONFLICT);
        assert_eq!(status_for("Sqlite/787"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for("APP/UNKNOWN"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for("RUNTIME/PANIC"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn internal_errors_hide_details_behind_crash_id() {
        let err = AppError::new("Sqlite/1", "no such table: secrets").with_context("sql", "SELECT");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], GENERIC_FAIL_MESSAGE);
        assert!(json.get("context").is_none());
        assert!(json["crash_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn client_errors_keep_message_and_context() {
        let response = AppError::missing_field("title").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "VALIDATION/MISSING_FIELD");
        assert_eq!(json["context"]["field"], "title");
        assert!(json.get("crash_id").is_none());
    }
}
