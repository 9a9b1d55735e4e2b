use crate::{AppError, AppResult};

pub const AUTH_HASH_FAILED: &str = "AUTH/HASH_FAILED";

fn hash_error(err: bcrypt::BcryptError) -> AppError {
    AppError::new(AUTH_HASH_FAILED, "Password hashing failed").with_cause(AppError::from(err.to_string()))
}

fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::new("RUNTIME/JOIN", "Background task failed").with_cause(AppError::from(err.to_string()))
}

/// Hash on the blocking pool.
pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(join_error)?
        .map_err(hash_error)
}

/// `Ok(false)` for a wrong password or a malformed stored hash.
pub async fn verify(password: String, stored_hash: String) -> AppResult<bool> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
        .await
        .map_err(join_error)?;
    match outcome {
        Ok(matches) => Ok(matches),
        Err(err) => {
            tracing::warn!(target: "linkup", event = "password_hash_unreadable", error = %err);
            Ok(false)
        }
    }
}
