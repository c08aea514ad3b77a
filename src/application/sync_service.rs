//! Upstream sync orchestration
//!
//! One `run_once` call mirrors the upstream catalog end to end: fetch the
//! listing, upsert categories and apps, mirror icons and APKs into object
//! storage, then deactivate apps that disappeared upstream. Every run is
//! book-ended by a sync-log record.
//!
//! Failure policy: listing extraction, catalog upserts and reconciliation
//! abort the run; per-asset work (one icon, one APK) never does. Icon
//! problems are silently skipped, release problems are counted in
//! `stats.errors`, and a rejected upload switches the rest of the run to
//! upstream-URL passthrough instead of failing app after app.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::entities::{App, SyncStats, SyncStatus, UpstreamApp};
use crate::domain::repositories::{
    AppRepository, AppUpsert, CategoryRepository, NewRelease, ReleaseRepository,
    SyncLogRepository,
};
use crate::domain::services::{DownloadNaming, ObjectStore, UpstreamFetcher};
use crate::domain::slug::safe_slug;
use crate::domain::version::infer_from_filename;
use crate::infrastructure::hashing::sha256_file;
use crate::infrastructure::html_parser::ListingExtractor;
use crate::infrastructure::object_storage::{
    APK_CONTENT_TYPE, apk_object_key, content_type_for_ext, icon_object_key,
};

/// Category assigned when the upstream card carries no label.
const DEFAULT_CATEGORY_NAME: &str = "应用";

const SUCCESS_MESSAGE: &str = "sync success";
const SUCCESS_DEGRADED_MESSAGE: &str =
    "sync success (应用列表已同步，但跳过了APK上传，因为OSS未配置)";

/// Orchestrates one catalog sync against the upstream site.
pub struct SyncService {
    upstream_url: String,
    fetcher: Arc<dyn UpstreamFetcher>,
    storage: Option<Arc<dyn ObjectStore>>,
    extractor: ListingExtractor,
    categories: Arc<dyn CategoryRepository>,
    apps: Arc<dyn AppRepository>,
    releases: Arc<dyn ReleaseRepository>,
    sync_logs: Arc<dyn SyncLogRepository>,
}

/// Mutable state of one run. Storage lives here rather than on the service
/// so a mid-run failure can disable uploads for this run only.
struct RunContext {
    stats: SyncStats,
    storage: Option<Arc<dyn ObjectStore>>,
    icon_url_counts: HashMap<String, u32>,
}

impl RunContext {
    fn storage_available(&self) -> bool {
        self.storage.is_some()
    }

    fn disable_storage(&mut self, reason: String) {
        warn!("Object storage disabled for the rest of this run: {}", reason);
        self.storage = None;
        self.stats.oss_available = false;
        self.stats.oss_upload_disabled_reason = reason;
    }
}

impl SyncService {
    pub fn new(
        upstream_url: String,
        fetcher: Arc<dyn UpstreamFetcher>,
        storage: Option<Arc<dyn ObjectStore>>,
        categories: Arc<dyn CategoryRepository>,
        apps: Arc<dyn AppRepository>,
        releases: Arc<dyn ReleaseRepository>,
        sync_logs: Arc<dyn SyncLogRepository>,
    ) -> Result<Self> {
        Ok(Self {
            upstream_url,
            fetcher,
            storage,
            extractor: ListingExtractor::new()?,
            categories,
            apps,
            releases,
            sync_logs,
        })
    }

    /// Run one full sync. Returns the final run statistics; the same
    /// statistics are persisted on the sync log either way.
    pub async fn run_once(&self) -> Result<SyncStats> {
        let log = self
            .sync_logs
            .create_running(&format!("sync start: {}", self.upstream_url))
            .await?;

        let mut ctx = RunContext {
            stats: SyncStats::new(&self.upstream_url, self.storage.is_some()),
            storage: self.storage.clone(),
            icon_url_counts: HashMap::new(),
        };

        match self.sync_catalog(&mut ctx).await {
            Ok(()) => {
                let message = if ctx.storage_available() {
                    SUCCESS_MESSAGE
                } else {
                    SUCCESS_DEGRADED_MESSAGE
                };
                self.sync_logs
                    .finish(&log.id, SyncStatus::Success, message, &ctx.stats)
                    .await?;
                info!(
                    "Sync finished: {} seen, {} upserted, {} releases created, {} errors",
                    ctx.stats.apps_seen,
                    ctx.stats.apps_upserted,
                    ctx.stats.releases_created,
                    ctx.stats.errors
                );
                Ok(ctx.stats)
            }
            Err(e) => {
                ctx.stats.errors += 1;
                self.sync_logs
                    .finish(&log.id, SyncStatus::Failed, &format!("{e:#}"), &ctx.stats)
                    .await?;
                Err(e)
            }
        }
    }

    async fn sync_catalog(&self, ctx: &mut RunContext) -> Result<()> {
        let html = self
            .fetcher
            .fetch_text(&self.upstream_url)
            .await
            .context("Failed to fetch upstream listing")?;
        let upstream_apps = self.extractor.extract_apps(&html, &self.upstream_url);
        ctx.stats.apps_seen = upstream_apps.len() as u32;
        info!("Upstream listing: {} apps", upstream_apps.len());

        for app in &upstream_apps {
            if let Some(icon) = &app.icon_url {
                *ctx.icon_url_counts.entry(icon.clone()).or_insert(0) += 1;
            }
        }

        let mut seen_slugs: HashSet<String> = HashSet::new();
        for app in &upstream_apps {
            let slug = self.sync_app(ctx, app).await?;
            seen_slugs.insert(slug);
        }

        // Strict alignment with upstream: anything we did not see this run
        // goes INACTIVE. Skipped entirely when the listing came up empty,
        // so a broken upstream page cannot wipe the catalog.
        if !seen_slugs.is_empty() {
            let slugs: Vec<String> = seen_slugs.into_iter().collect();
            let deactivated = self
                .apps
                .deactivate_missing(&slugs)
                .await
                .context("Failed to deactivate missing apps")?;
            ctx.stats.apps_deactivated = deactivated as u32;
        }

        Ok(())
    }

    /// Sync one upstream app. Returns the slug the app settled on.
    async fn sync_app(&self, ctx: &mut RunContext, upstream: &UpstreamApp) -> Result<String> {
        let category_name = upstream
            .label
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY_NAME.to_string());
        let category_slug = safe_slug(&category_name, "cat");
        let canonical_slug = safe_slug(&upstream.name, "app");

        // Prefer an existing row's slug so manually assigned slugs survive
        // renames upstream.
        let candidates = self
            .apps
            .find_slug_candidates(&upstream.name, &canonical_slug)
            .await
            .with_context(|| format!("Failed to look up slug candidates for {}", upstream.name))?;
        let app_slug = preferred_slug(&candidates, &canonical_slug);

        let category = self
            .categories
            .upsert(&category_name, &category_slug)
            .await
            .with_context(|| format!("Failed to upsert category {category_name}"))?;

        let app = self
            .apps
            .upsert(&AppUpsert {
                name: upstream.name.clone(),
                slug: app_slug.clone(),
                description: upstream.description.clone().unwrap_or_default(),
                category_id: Some(category.id),
            })
            .await
            .with_context(|| format!("Failed to upsert app {app_slug}"))?;
        ctx.stats.apps_upserted += 1;

        // Icon sync is best-effort; a bad icon never blocks the app.
        if let Err(e) = self.sync_icon(ctx, upstream, &app).await {
            debug!("Icon sync skipped for {}: {:#}", app.slug, e);
        }

        if let (Some(detail_url), Some(storage)) =
            (upstream.detail_url.as_deref(), ctx.storage.clone())
        {
            if let Err(e) = self
                .sync_release(ctx, &app, detail_url, storage.as_ref())
                .await
            {
                warn!("Release sync failed for {}: {:#}", app.slug, e);
                ctx.stats.errors += 1;
            }
        }

        Ok(app_slug)
    }

    async fn sync_icon(
        &self,
        ctx: &mut RunContext,
        upstream: &UpstreamApp,
        app: &App,
    ) -> Result<()> {
        let mut icon_url = upstream.icon_url.clone();

        // A list icon shared by several apps is usually a placeholder;
        // prefer the detail page's own icon in that case.
        if let Some(detail_url) = &upstream.detail_url {
            let shared = icon_url
                .as_ref()
                .map(|u| ctx.icon_url_counts.get(u).copied().unwrap_or(0) > 1)
                .unwrap_or(false);
            if icon_url.is_none() || shared {
                let detail_html = self.fetcher.fetch_text(detail_url).await?;
                if let Some(found) =
                    self.extractor
                        .find_icon_link(&detail_html, detail_url, &upstream.name)
                {
                    icon_url = Some(found);
                }
            }
        }

        let Some(icon_url) = icon_url else {
            return Ok(());
        };

        if let Some(storage) = ctx.storage.clone() {
            self.upload_icon(ctx, app, &icon_url, storage.as_ref()).await?;
        } else if app.icon_url != icon_url {
            // No storage: point the catalog at the upstream icon directly.
            self.apps.update_icon_url(&app.id, &icon_url).await?;
            ctx.stats.icons_updated += 1;
        }

        Ok(())
    }

    async fn upload_icon(
        &self,
        ctx: &mut RunContext,
        app: &App,
        icon_url: &str,
        storage: &dyn ObjectStore,
    ) -> Result<()> {
        let ext = icon_extension(icon_url)?;
        let download = self
            .fetcher
            .download(
                icon_url,
                DownloadNaming {
                    fallback_ext: Some(ext.clone()),
                    fallback_basename: Some(format!("icon-{}", app.slug)),
                },
            )
            .await?;
        let digest = sha256_file(download.path()).await?;
        let object_key = icon_object_key(&app.slug, &digest.sha256, &ext);

        match storage
            .upload(&object_key, download.path(), content_type_for_ext(&ext))
            .await
        {
            Ok(stored) => {
                if app.icon_url != stored.url {
                    self.apps.update_icon_url(&app.id, &stored.url).await?;
                    ctx.stats.icons_updated += 1;
                }
                ctx.stats.icons_uploaded += 1;
            }
            Err(e) => {
                // Storage looked configured but is not usable (wrong bucket,
                // stale keys). Disable it for this run and fall back to the
                // upstream URL.
                ctx.disable_storage(e.code());
                if app.icon_url != icon_url {
                    self.apps.update_icon_url(&app.id, icon_url).await?;
                    ctx.stats.icons_updated += 1;
                }
            }
        }

        Ok(())
    }

    async fn sync_release(
        &self,
        ctx: &mut RunContext,
        app: &App,
        detail_url: &str,
        storage: &dyn ObjectStore,
    ) -> Result<()> {
        let detail_html = self
            .fetcher
            .fetch_text(detail_url)
            .await
            .with_context(|| format!("Failed to fetch detail page {detail_url}"))?;
        let Some(apk_url) = self.extractor.find_apk_link(&detail_html, detail_url) else {
            debug!("No APK link on {}", detail_url);
            return Ok(());
        };

        let download = self
            .fetcher
            .download(
                &apk_url,
                DownloadNaming {
                    fallback_ext: Some(".apk".to_string()),
                    fallback_basename: None,
                },
            )
            .await
            .with_context(|| format!("Failed to download {apk_url}"))?;

        let digest = sha256_file(download.path()).await?;
        if self.releases.exists_by_digest(&app.id, &digest.sha256).await? {
            ctx.stats.releases_skipped += 1;
            debug!("Release already mirrored for {}", app.slug);
            return Ok(());
        }

        let inferred = infer_from_filename(download.filename());
        let version_code = match inferred.version_code {
            Some(code) => code,
            None => self.releases.max_version_code(&app.id).await?.unwrap_or(0) + 1,
        };
        let version_name = inferred
            .version_name
            .unwrap_or_else(|| format!("v{version_code}"));
        let object_key = apk_object_key(&app.slug, &version_name, version_code, &digest.sha256);

        let stored = match storage
            .upload(&object_key, download.path(), APK_CONTENT_TYPE)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                ctx.disable_storage(e.code());
                ctx.stats.releases_skipped += 1;
                return Ok(());
            }
        };

        let release = self
            .releases
            .create(&NewRelease {
                app_id: app.id.clone(),
                version_name,
                version_code,
                changelog: String::new(),
                download_url: stored.url,
                upstream_url: apk_url,
                apk_sha256: digest.sha256,
                apk_size: digest.size as i64,
                published_at: Utc::now(),
            })
            .await
            .with_context(|| format!("Failed to record release for {}", app.slug))?;
        ctx.stats.releases_created += 1;
        info!(
            "Mirrored release {} {} ({} bytes) for {}",
            release.version_name, release.version_code, release.apk_size, app.slug
        );

        Ok(())
    }
}

/// Pick the slug an upstream app lands on.
///
/// An existing human-assigned slug (anything not auto-generated with the
/// `app-` fallback prefix) wins over the canonical slug; an existing
/// canonical row wins over other matches.
fn preferred_slug(candidates: &[String], canonical: &str) -> String {
    candidates
        .iter()
        .find(|s| !s.is_empty() && !s.starts_with("app-"))
        .cloned()
        .or_else(|| candidates.iter().find(|s| s.as_str() == canonical).cloned())
        .or_else(|| candidates.first().cloned())
        .unwrap_or_else(|| canonical.to_string())
}

/// Extension (with dot) of an icon URL's path, defaulting to `.png`.
fn icon_extension(icon_url: &str) -> Result<String> {
    let parsed = Url::parse(icon_url).with_context(|| format!("Invalid icon URL: {icon_url}"))?;
    Ok(Path::new(parsed.path())
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".png".to_string()))
}
