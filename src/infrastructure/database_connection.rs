// Database connection and pool management
// This module handles SQLite database connections using sqlx

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use anyhow::Result;
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        let in_memory = db_path.contains(":memory:") || db_path.contains("mode=memory");
        if !in_memory {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        // Every pooled connection to an in-memory database would get its
        // own empty database, so in-memory URLs pin the pool to one.
        let max_connections = if in_memory { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_categories_sql = r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_apps_sql = r#"
            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                developer TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '[]',
                icon_url TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                category_id TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories (id) ON DELETE SET NULL
            )
        "#;

        let create_releases_sql = r#"
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                version_name TEXT NOT NULL,
                version_code INTEGER NOT NULL,
                changelog TEXT NOT NULL DEFAULT '',
                download_url TEXT NOT NULL DEFAULT '',
                upstream_url TEXT NOT NULL DEFAULT '',
                apk_sha256 TEXT NOT NULL DEFAULT '',
                apk_size INTEGER NOT NULL DEFAULT 0,
                published_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (app_id) REFERENCES apps (id) ON DELETE CASCADE,
                UNIQUE (app_id, apk_sha256)
            )
        "#;

        let create_sync_logs_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_logs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                stats TEXT,
                started_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_apps_status ON apps (status);
            CREATE INDEX IF NOT EXISTS idx_apps_category_id ON apps (category_id);
            CREATE INDEX IF NOT EXISTS idx_releases_app_id ON releases (app_id);
            CREATE INDEX IF NOT EXISTS idx_releases_version_code ON releases (app_id, version_code);
            CREATE INDEX IF NOT EXISTS idx_sync_logs_started_at ON sync_logs (started_at);
        "#;

        sqlx::query(create_categories_sql).execute(&self.pool).await?;
        sqlx::query(create_apps_sql).execute(&self.pool).await?;
        sqlx::query(create_releases_sql).execute(&self.pool).await?;
        sqlx::query(create_sync_logs_sql).execute(&self.pool).await?;

        // sqlx executes one statement per query; split the index batch.
        for statement in create_indexes_sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
