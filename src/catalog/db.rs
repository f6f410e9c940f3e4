//! Postgres pool plus the bundled schema migrations.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::util::env::env_parse;

/// Embedded, ordered schema migrations. Names are append-only.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init",
    include_str!("../../migrations/0001_init.sql"),
)];

/// Shared database handle for the catalog schema.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    /// Connects and brings the schema up to date.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = Self::connect_no_migrate(database_url).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    #[instrument(skip(database_url))]
    pub async fn connect_no_migrate(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(env_parse("DB_MAX_CONNECTIONS", 5))
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("connecting to catalog database")?;
        Ok(Self { pool })
    }

    /// Applies pending migrations in order. Each file runs once inside its
    /// own transaction; applied names are tracked in `_stocksync_migrations`.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _stocksync_migrations (
                name text PRIMARY KEY,
                applied_at timestamptz NOT NULL DEFAULT now()
            )",
        )
        .persistent(false)
        .execute(&self.pool)
        .await
        .context("creating migrations table")?;

        for (name, sql) in MIGRATIONS {
            let applied: Option<String> =
                sqlx::query_scalar("SELECT name FROM _stocksync_migrations WHERE name = $1")
                    .bind(name)
                    .persistent(false)
                    .fetch_optional(&self.pool)
                    .await?;
            if applied.is_some() {
                continue;
            }

            info!(migration = name, "applying migration");
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("applying migration {name}"))?;
            sqlx::query("INSERT INTO _stocksync_migrations (name) VALUES ($1)")
                .bind(name)
                .persistent(false)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }
}
