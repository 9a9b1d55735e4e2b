use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;

mod crash_id;

pub use crash_id::{panic_payload, CrashId};

/// A structured application error that is serialized into every failed API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Machine readable error code, `AREA/KIND`.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
    /// Correlates an internal failure with its log record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_id: Option<CrashId>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;
pub type Result<T> = AppResult<T>;

pub const VALIDATION_MISSING_FIELD: &str = "VALIDATION/MISSING_FIELD";
pub const VALIDATION_INVALID_FIELD: &str = "VALIDATION/INVALID_FIELD";
pub const VALIDATION_INVALID_ID: &str = "VALIDATION/INVALID_ID";
pub const VALIDATION_TIME_RANGE: &str = "VALIDATION/TIME_RANGE";
pub const JSON_INVALID_BODY: &str = "JSON/INVALID_BODY";
pub const GENERIC_FAIL_MESSAGE: &str = "Something went wrong, please try again.";

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
            crash_id: None,
        }
    }

    /// A required request field was absent or blank.
    pub fn missing_field(field: &str) -> Self {
        AppError::new(
            VALIDATION_MISSING_FIELD,
            format!("Missing required field '{field}'"),
        )
        .with_context("field", field)
    }

    /// A request field was present but failed validation.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppError::new(VALIDATION_INVALID_FIELD, message).with_context("field", field)
    }

    /// A path parameter did not parse as a positive integer id.
    pub fn invalid_id(field: &str, raw: &str) -> Self {
        AppError::new(VALIDATION_INVALID_ID, format!("Invalid {field}"))
            .with_context("field", field)
            .with_context("value", raw)
    }

    pub fn not_found(area: &str, message: impl Into<String>) -> Self {
        AppError::new(format!("{area}/NOT_FOUND"), message)
    }

    pub fn conflict(area: &str, message: impl Into<String>) -> Self {
        AppError::new(format!("{area}/CONFLICT"), message)
    }

    /// Returns the error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the contextual metadata associated with the error.
    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Returns the nested cause if one is present.
    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn crash_id(&self) -> Option<&CrashId> {
        self.crash_id.as_ref()
    }

    pub fn set_crash_id(&mut self, crash_id: CrashId) {
        self.crash_id = Some(crash_id);
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Extends the context map with additional key/value pairs.
    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// True when the root or any cause is a SQLite unique/primary key violation.
    pub fn is_unique_violation(&self) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.code == "Sqlite/2067" || err.code == "Sqlite/1555" {
                return true;
            }
            current = err.cause();
        }
        false
    }

    /// Emit the full error chain as a structured log record.
    pub fn log_with_event(&self, event: &'static str) {
        let chain = self.chain_summary();
        tracing::error!(
            target: "linkup",
            event = event,
            code = %self.code,
            crash_id = self.crash_id.as_ref().map(|id| id.to_string()).as_deref(),
            context = ?self.context,
            chain = %chain,
            "{}",
            self.message
        );
    }

    fn chain_summary(&self) -> String {
        let mut parts = Vec::new();
        let mut current = Some(self);
        while let Some(err) = current {
            parts.push(format!("[{}] {}", err.code, err.message));
            current = err.cause();
        }
        parts.join(" <- ")
    }
}

/// Rewrite a unique-constraint failure into an `AREA/CONFLICT` error, leave others untouched.
pub fn map_unique_violation(err: SqlxError, area: &str, message: &str) -> AppError {
    let is_unique = matches!(&err, SqlxError::Database(db) if db.is_unique_violation());
    let app_error = AppError::from(err);
    if is_unique {
        AppError::conflict(area, message).with_cause(app_error)
    } else {
        app_error
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

// `From<AppError> for anyhow::Error` is provided by anyhow's blanket impl.

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_NOT_FOUND", format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}
