use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use super::response::json_body;
use crate::{
    state::AppState,
    users::{self, AuthResponse, LoginRequest, RegisterRequest},
    AppResult,
};

/// `/register` and `/login`; mounted at `/api` and at `/api/v1/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = json_body(payload)?;
    let user_id = users::register(&state.pool, state.config.bcrypt_cost, request).await?;
    let body = AuthResponse {
        message: "Registration successful".into(),
        user_id,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = json_body(payload)?;
    let user_id = users::login(&state.pool, request).await?;
    let body = AuthResponse {
        message: "Login successful".into(),
        user_id,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
