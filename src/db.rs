use anyhow::{Context, Result as AnyResult};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::str::FromStr;

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open the application pool for a `sqlite:` URL, creating the file if needed.
pub async fn open_pool(url: &str) -> AnyResult<Pool<Sqlite>> {
    let memory = is_memory_url(url);
    let mut opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parse database url {url}"))?
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_millis(5000));

    if !memory {
        let path = opts.get_filename().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(
                    target: "linkup",
                    error = %e,
                    event = "db_dir_create_failed",
                    path = %parent.display()
                );
                e
            })?;
        }
        tracing::info!(target: "linkup", event = "db_path", path = %path.display());
        opts = opts
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
    }

    // Each in-memory connection is its own database.
    let max_connections = if memory { 1 } else { 8 };

    let mut pool_opts = SqlitePoolOptions::new().max_connections(max_connections);
    if memory {
        pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_opts
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys=ON;")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("PRAGMA busy_timeout = 5000;")
                    .execute(&mut *conn)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(opts)
        .await
        .context("connect to sqlite")?;

    log_effective_pragmas(&pool, memory).await;

    Ok(pool)
}

async fn log_effective_pragmas(pool: &Pool<Sqlite>, memory: bool) {
    use tracing::{info, warn};

    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "linkup",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        foreign_keys = %fks.0,
        memory
    );

    if !memory && !jm.0.eq_ignore_ascii_case("wal") {
        warn!(
            target: "linkup",
            event = "db_open_warning",
            msg = "journal_mode != WAL; running with reduced crash safety"
        );
    }
}

/// Liveness probe used by the health endpoint.
pub async fn ping(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

/// Run work inside a transaction. Commits on success, rolls back on error.
///
/// The closure receives the open transaction and must return a boxed future
/// that only borrows from it; move owned inputs into the closure.
pub async fn run_in_tx<R, E, F>(pool: &Pool<Sqlite>, f: F) -> Result<R, E>
where
    E: From<sqlx::Error>,
    F: for<'c> FnOnce(&'c mut Transaction<'static, Sqlite>) -> BoxFuture<'c, Result<R, E>>,
{
    use tracing::{debug, error, warn};

    let mut tx = pool.begin().await.map_err(E::from)?;
    debug!(target: "linkup", event = "db_tx_begin");
    match f(&mut tx).await {
        Ok(val) => {
            tx.commit().await.map_err(E::from)?;
            debug!(target: "linkup", event = "db_tx_commit");
            Ok(val)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "linkup", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "linkup", event = "db_tx_rollback");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://file:linkup?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite:///tmp/linkup.sqlite3"));
    }

    #[tokio::test]
    async fn run_in_tx_rolls_back_on_error() {
        let pool = open_pool("sqlite::memory:").await.expect("pool");
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .expect("create");

        let result: Result<(), sqlx::Error> = run_in_tx(&pool, |tx| {
            async move {
                sqlx::query("INSERT INTO t (id) VALUES (1)")
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("INSERT INTO t (id) VALUES (1)")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            }
            .boxed()
        })
        .await;
        assert!(result.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn file_pool_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("linkup.sqlite3");
        let url = format!("sqlite://{}", path.display());
        let pool = open_pool(&url).await.expect("pool");
        ping(&pool).await.expect("ping");
        pool.close().await;
        assert!(path.exists());
    }
}
