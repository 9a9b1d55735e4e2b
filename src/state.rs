use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn organizer_id(&self) -> i64 {
        self.config.mock_organizer_id
    }

    pub fn user_id(&self) -> i64 {
        self.config.mock_user_id
    }
}
