use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashMap;

use crate::time::now_ms;
use tracing::{error, info};

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let head: String = trimmed.chars().take(160).collect();
        format!("{head}…")
    } else {
        trimmed.to_string()
    }
}

static MIGRATIONS: &[(&str, &str)] = &[
    (
        "202510010900_initial.sql",
        include_str!("../migrations/202510010900_initial.sql"),
    ),
    (
        "202510021200_commerce.sql",
        include_str!("../migrations/202510021200_commerce.sql"),
    ),
];

#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub version: String,
    pub applied_at: i64,
    pub checksum: String,
}

fn strip_comments(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn checksum(cleaned: &str) -> String {
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

async fn ensure_ledger(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;
    Ok(())
}

/// Apply every embedded migration that has not been recorded yet.
///
/// Returns the number of files applied. Fails if a recorded file no longer
/// matches its stored checksum.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<usize> {
    ensure_ledger(pool).await?;

    let mut applied: HashMap<String, String> = HashMap::new();
    for m in applied_versions(pool).await? {
        applied.insert(m.version, m.checksum);
    }

    let mut count = 0;
    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = strip_comments(raw_sql);
        let sum = checksum(&cleaned);

        if let Some(stored) = applied.get(*filename) {
            if stored != &sum {
                anyhow::bail!("migration {} edited after application", filename);
            }
            info!(target: "linkup", event = "migration_skip_file", file = %filename);
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            let upper = s.to_ascii_uppercase();
            if upper == "BEGIN" || upper == "COMMIT" {
                continue;
            }
            info!(target: "linkup", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "linkup", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&sum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        count += 1;
        info!(target: "linkup", event = "migration_file_applied", file = %filename);
    }

    Ok(count)
}

pub async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<Vec<AppliedMigration>> {
    ensure_ledger(pool).await?;
    let rows = sqlx::query(
        "SELECT version, applied_at, checksum FROM schema_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(AppliedMigration {
            version: r.try_get("version")?,
            applied_at: r.try_get("applied_at")?,
            checksum: r.try_get("checksum")?,
        });
    }
    Ok(out)
}

pub fn embedded_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_do_not_affect_checksum() {
        let a = "-- header\nCREATE TABLE x (id INTEGER);\n\n";
        let b = "CREATE TABLE x (id INTEGER);";
        assert_eq!(checksum(&strip_comments(a)), checksum(&strip_comments(b)));
    }

    #[test]
    fn preview_truncates_long_statements() {
        let long = "SELECT ".to_string() + &"x, ".repeat(100);
        let p = preview(&long);
        assert!(p.ends_with('…'));
        assert_eq!(p.chars().count(), 161);
    }

    #[test]
    fn embedded_migrations_are_ordered() {
        let names: Vec<_> = embedded_versions().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
