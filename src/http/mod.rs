use std::any::Any;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    db,
    error::{panic_payload, CrashId},
    state::AppState,
    AppError, AppResult,
};

mod auth;
mod organizer;
pub mod response;
mod shop;

pub const WELCOME_MESSAGE: &str = "Love from the LinkUp server! 🚀";

/// The full application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .route("/api/test", get(welcome))
        .route("/api/health", get(health))
        .nest("/api", auth::router())
        .nest("/api/v1/auth", auth::router())
        .nest("/api/v1/organizer", organizer::router())
        .nest("/api/v1/products", shop::products_router())
        .nest("/api/v1/cart", shop::cart_router())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => AllowOrigin::exact(value),
            Err(err) => {
                tracing::warn!(target: "linkup", event = "cors_origin_invalid", origin, error = %err);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let crash_id = CrashId::new();
    let mut err = AppError::new("RUNTIME/PANIC", "Request handler panicked")
        .with_context("payload", panic_payload(&*payload));
    err.set_crash_id(crash_id);
    err.into_response()
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

async fn health(State(state): State<AppState>) -> AppResult<Response> {
    db::ping(&state.pool).await.map_err(|err| {
        AppError::new("DB/UNAVAILABLE", "Database is not reachable").with_cause(AppError::from(err))
    })?;
    Ok((StatusCode::OK, Json(json!({ "status": "ok", "database": "ok" }))).into_response())
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let local = listener.local_addr().context("read bound address")?;
    info!(target: "linkup", event = "server_listening", addr = %local);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!(target: "linkup", event = "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "linkup", event = "signal_install_failed", error = %err);
            std::future::pending::<()>().await;
        }
        info!(target: "linkup", event = "shutdown_requested", signal = "ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!(target: "linkup", event = "shutdown_requested", signal = "sigterm");
            }
            Err(err) => {
                tracing::error!(target: "linkup", event = "signal_install_failed", error = %err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
