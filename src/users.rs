use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::run_in_tx,
    error::map_unique_violation,
    security::{password, redact_email},
    time::now_ms,
    validation, AppError, AppResult,
};

pub const AUTH_AREA: &str = "AUTH";
pub const AUTH_INVALID_CREDENTIALS: &str = "AUTH/INVALID_CREDENTIALS";

const DUPLICATE_EMAIL: &str = "An account with this email already exists";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Body returned by register and login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

fn required_password(raw: Option<String>) -> AppResult<String> {
    match raw {
        Some(p) if !p.is_empty() => Ok(p),
        _ => Err(AppError::missing_field("password")),
    }
}

fn invalid_credentials() -> AppError {
    AppError::new(AUTH_INVALID_CREDENTIALS, "Invalid email or password")
}

/// Create a user and an empty profile. Returns the new user id.
pub async fn register(pool: &SqlitePool, bcrypt_cost: u32, request: RegisterRequest) -> AppResult<i64> {
    let raw_email = validation::required_text(request.email.as_deref(), "email")?;
    let email = validation::email(&raw_email, "email")?;
    let plain = required_password(request.password)?;
    let name = request
        .name
        .map(|n| n.trim().to_string())
        .unwrap_or_default();

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "users_lookup"))?;
    if exists.is_some() {
        return Err(AppError::conflict(AUTH_AREA, DUPLICATE_EMAIL));
    }

    let password_hash = password::hash(plain, bcrypt_cost).await?;
    let email_token = redact_email(&email);

    let user_id = run_in_tx(pool, move |tx| {
        async move {
            let now = now_ms();
            let res = sqlx::query(
                "INSERT INTO users (email, password_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            )
            .bind(&email)
            .bind(&password_hash)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(|err| map_unique_violation(err, AUTH_AREA, DUPLICATE_EMAIL))?;
            let user_id = res.last_insert_rowid();
            sqlx::query(
                "INSERT INTO user_profiles (user_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            )
            .bind(user_id)
            .bind(&name)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "user_profiles_create"))?;
            Ok::<_, AppError>(user_id)
        }
        .boxed()
    })
    .await?;

    tracing::info!(target: "linkup", event = "user_registered", user_id, email = %email_token);
    Ok(user_id)
}

/// Check credentials. Unknown email and wrong password fail the same way.
pub async fn login(pool: &SqlitePool, request: LoginRequest) -> AppResult<i64> {
    let raw_email = validation::required_text(request.email.as_deref(), "email")?;
    let email = validation::normalize_email(&raw_email);
    let plain = required_password(request.password)?;

    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "users_lookup"))?;

    let Some((user_id, stored_hash)) = row else {
        tracing::info!(target: "linkup", event = "login_failed", email = %redact_email(&email));
        return Err(invalid_credentials());
    };
    if !password::verify(plain, stored_hash).await? {
        tracing::info!(target: "linkup", event = "login_failed", user_id);
        return Err(invalid_credentials());
    }
    tracing::info!(target: "linkup", event = "login_succeeded", user_id);
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VALIDATION_MISSING_FIELD;

    #[test]
    fn empty_password_counts_as_missing() {
        assert_eq!(
            required_password(Some(String::new())).unwrap_err().code(),
            VALIDATION_MISSING_FIELD
        );
        assert_eq!(required_password(None).unwrap_err().code(), VALIDATION_MISSING_FIELD);
        assert_eq!(required_password(Some(" pw ".into())).unwrap(), " pw ");
    }

    #[test]
    fn auth_response_uses_camel_case_user_id() {
        let body = AuthResponse {
            message: "Login successful".into(),
            user_id: 4,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["userId"], 4);
        assert!(json.get("user_id").is_none());
    }
}
