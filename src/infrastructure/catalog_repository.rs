//! Repository implementations for the mirrored catalog
//!
//! SQLite-backed persistence for categories, apps and releases. Upserts key
//! on slug so repeated sync runs converge on the same rows, and app updates
//! only touch pipeline-owned columns.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::domain::entities::{App, Category, Release};
use crate::domain::repositories::{
    AppRepository, AppUpsert, CategoryRepository, NewRelease, ReleaseRepository,
};

const APP_COLUMNS: &str = "id, name, slug, description, developer, tags, icon_url, status, \
                           category_id, created_at, updated_at";
const RELEASE_COLUMNS: &str = "id, app_id, version_name, version_code, changelog, download_url, \
                               upstream_url, apk_sha256, apk_size, published_at, created_at";

#[derive(Clone)]
pub struct SqliteCategoryRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn upsert(&self, name: &str, slug: &str) -> Result<Category> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, slug)
            VALUES (?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(slug)
        .execute(&*self.pool)
        .await?;

        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| anyhow!("category row missing after upsert: {slug}"))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, sort_order, created_at, updated_at
            FROM categories WHERE slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.as_ref().map(map_category))
    }
}

#[derive(Clone)]
pub struct SqliteAppRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteAppRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl AppRepository for SqliteAppRepository {
    async fn find_slug_candidates(&self, name: &str, canonical_slug: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT slug FROM apps
            WHERE slug = ? OR name = ? OR name LIKE '%' || ? || '%'
            LIMIT 5
            "#,
        )
        .bind(canonical_slug)
        .bind(name)
        .bind(name)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("slug")).collect())
    }

    async fn upsert(&self, fields: &AppUpsert) -> Result<App> {
        sqlx::query(
            r#"
            INSERT INTO apps (id, name, slug, description, category_id, status)
            VALUES (?, ?, ?, ?, ?, 'ACTIVE')
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category_id = excluded.category_id,
                status = 'ACTIVE',
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&fields.name)
        .bind(&fields.slug)
        .bind(&fields.description)
        .bind(&fields.category_id)
        .execute(&*self.pool)
        .await?;

        self.find_by_slug(&fields.slug)
            .await?
            .ok_or_else(|| anyhow!("app row missing after upsert: {}", fields.slug))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<App>> {
        let sql = format!("SELECT {APP_COLUMNS} FROM apps WHERE slug = ?");
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.as_ref().map(map_app))
    }

    async fn update_icon_url(&self, app_id: &str, icon_url: &str) -> Result<()> {
        sqlx::query("UPDATE apps SET icon_url = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(icon_url)
            .bind(app_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_missing(&self, seen_slugs: &[String]) -> Result<u64> {
        if seen_slugs.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; seen_slugs.len()].join(", ");
        let sql = format!(
            "UPDATE apps SET status = 'INACTIVE', updated_at = CURRENT_TIMESTAMP \
             WHERE status = 'ACTIVE' AND slug NOT IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for slug in seen_slugs {
            query = query.bind(slug);
        }
        let result = query.execute(&*self.pool).await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct SqliteReleaseRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteReleaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Release>> {
        let sql = format!("SELECT {RELEASE_COLUMNS} FROM releases WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.as_ref().map(map_release))
    }
}

#[async_trait]
impl ReleaseRepository for SqliteReleaseRepository {
    async fn exists_by_digest(&self, app_id: &str, apk_sha256: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM releases WHERE app_id = ? AND apk_sha256 = ? LIMIT 1")
            .bind(app_id)
            .bind(apk_sha256)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn max_version_code(&self, app_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(version_code) AS max_code FROM releases WHERE app_id = ?")
            .bind(app_id)
            .fetch_one(&*self.pool)
            .await?;

        Ok(row.get("max_code"))
    }

    async fn create(&self, release: &NewRelease) -> Result<Release> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO releases
            (id, app_id, version_name, version_code, changelog, download_url,
             upstream_url, apk_sha256, apk_size, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&release.app_id)
        .bind(&release.version_name)
        .bind(release.version_code)
        .bind(&release.changelog)
        .bind(&release.download_url)
        .bind(&release.upstream_url)
        .bind(&release.apk_sha256)
        .bind(release.apk_size)
        .bind(release.published_at)
        .execute(&*self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("release row missing after insert: {id}"))
    }

    async fn find_by_app(&self, app_id: &str) -> Result<Vec<Release>> {
        let sql = format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE app_id = ? ORDER BY version_code DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(app_id)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.iter().map(map_release).collect())
    }
}

fn map_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_app(row: &SqliteRow) -> App {
    let tags_json: String = row.get("tags");
    App {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        developer: row.get("developer"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        icon_url: row.get("icon_url"),
        status: row.get("status"),
        category_id: row.get("category_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_release(row: &SqliteRow) -> Release {
    Release {
        id: row.get("id"),
        app_id: row.get("app_id"),
        version_name: row.get("version_name"),
        version_code: row.get("version_code"),
        changelog: row.get("changelog"),
        download_url: row.get("download_url"),
        upstream_url: row.get("upstream_url"),
        apk_sha256: row.get("apk_sha256"),
        apk_size: row.get("apk_size"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AppStatus;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::Utc;

    async fn test_pool() -> SqlitePool {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.pool().clone()
    }

    fn upsert_fields(name: &str, slug: &str) -> AppUpsert {
        AppUpsert {
            name: name.to_string(),
            slug: slug.to_string(),
            description: "desc".to_string(),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_category_upsert_converges_on_slug() {
        let repo = SqliteCategoryRepository::new(test_pool().await);

        let first = repo.upsert("应用", "cat-apps").await.unwrap();
        let second = repo.upsert("工具", "cat-apps").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "工具");
        assert_eq!(second.slug, "cat-apps");
    }

    #[tokio::test]
    async fn test_app_upsert_preserves_admin_fields() {
        let pool = test_pool().await;
        let repo = SqliteAppRepository::new(pool.clone());

        let created = repo.upsert(&upsert_fields("AI助手", "ai")).await.unwrap();
        assert_eq!(created.status, AppStatus::Active);
        assert_eq!(created.icon_url, "");

        // Simulate admin edits the pipeline must not clobber.
        sqlx::query(
            "UPDATE apps SET developer = 'Yunwei', tags = '[\"chat\"]', \
             icon_url = 'https://cdn.example.com/i.png', status = 'INACTIVE' WHERE id = ?",
        )
        .bind(&created.id)
        .execute(&pool)
        .await
        .unwrap();

        let mut fields = upsert_fields("AI助手", "ai");
        fields.description = "updated".to_string();
        let updated = repo.upsert(&fields).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.description, "updated");
        assert_eq!(updated.developer, "Yunwei");
        assert_eq!(updated.tags, vec!["chat".to_string()]);
        assert_eq!(updated.icon_url, "https://cdn.example.com/i.png");
        // The upsert reactivates apps that reappear upstream.
        assert_eq!(updated.status, AppStatus::Active);
    }

    #[tokio::test]
    async fn test_find_slug_candidates_matches_slug_name_and_containment() {
        let repo = SqliteAppRepository::new(test_pool().await);

        repo.upsert(&upsert_fields("AI助手", "ai-legacy")).await.unwrap();
        repo.upsert(&upsert_fields("AI助手 → 智能客服", "app-x1")).await.unwrap();
        repo.upsert(&upsert_fields("别的", "other")).await.unwrap();

        let candidates = repo.find_slug_candidates("AI助手", "ai").await.unwrap();
        assert!(candidates.contains(&"ai-legacy".to_string()));
        assert!(candidates.contains(&"app-x1".to_string()));
        assert!(!candidates.contains(&"other".to_string()));
    }

    #[tokio::test]
    async fn test_deactivate_missing_only_touches_unseen_active_apps() {
        let repo = SqliteAppRepository::new(test_pool().await);

        repo.upsert(&upsert_fields("甲", "a")).await.unwrap();
        repo.upsert(&upsert_fields("乙", "b")).await.unwrap();

        let changed = repo.deactivate_missing(&["a".to_string()]).await.unwrap();
        assert_eq!(changed, 1);

        let a = repo.find_by_slug("a").await.unwrap().unwrap();
        let b = repo.find_by_slug("b").await.unwrap().unwrap();
        assert_eq!(a.status, AppStatus::Active);
        assert_eq!(b.status, AppStatus::Inactive);

        // Already inactive rows are not counted again.
        let changed = repo.deactivate_missing(&["a".to_string()]).await.unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn test_release_dedup_and_version_ordering() {
        let pool = test_pool().await;
        let apps = SqliteAppRepository::new(pool.clone());
        let releases = SqliteReleaseRepository::new(pool);

        let app = apps.upsert(&upsert_fields("AI助手", "ai")).await.unwrap();
        assert_eq!(releases.max_version_code(&app.id).await.unwrap(), None);

        let new_release = |code: i64, sha: &str| NewRelease {
            app_id: app.id.clone(),
            version_name: format!("v{code}"),
            version_code: code,
            changelog: String::new(),
            download_url: format!("https://cdn.example.com/{code}.apk"),
            upstream_url: "https://up.example.com/d/1".to_string(),
            apk_sha256: sha.to_string(),
            apk_size: 1024,
            published_at: Utc::now(),
        };

        releases.create(&new_release(1, "aaa")).await.unwrap();
        releases.create(&new_release(3, "ccc")).await.unwrap();
        releases.create(&new_release(2, "bbb")).await.unwrap();

        assert!(releases.exists_by_digest(&app.id, "aaa").await.unwrap());
        assert!(!releases.exists_by_digest(&app.id, "zzz").await.unwrap());
        assert_eq!(releases.max_version_code(&app.id).await.unwrap(), Some(3));

        let listed = releases.find_by_app(&app.id).await.unwrap();
        let codes: Vec<i64> = listed.iter().map(|r| r.version_code).collect();
        assert_eq!(codes, vec![3, 2, 1]);
    }
}
