//! HTML parsing and data extraction for the upstream app catalog
//!
//! The upstream site is plain server-rendered HTML with no stable API, so
//! extraction works through layered strategies: the known card markup first,
//! then looser structures for when the markup shifts.

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::domain::entities::UpstreamApp;

// Short category markers the upstream prints inside each card.
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("官方开发|第三方工具|root必备").expect("label regex"));

/// Extracts apps and asset links from upstream listing and detail pages.
pub struct ListingExtractor {
    app_card: Selector,
    app_name: Selector,
    app_icon_img: Selector,
    app_tag: Selector,
    app_description: Selector,
    paragraph: Selector,
    anchor: Selector,
    heading: Selector,
    img: Selector,
    apk_anchor: Selector,
}

impl ListingExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            app_card: parse_selector(".app-card")?,
            app_name: parse_selector(".app-name")?,
            app_icon_img: parse_selector(".app-icon img")?,
            app_tag: parse_selector(".app-tag,.tag,.label")?,
            app_description: parse_selector(".app-description")?,
            paragraph: parse_selector("p")?,
            anchor: parse_selector("a")?,
            heading: parse_selector("h1,h2,h3,h4,strong")?,
            img: parse_selector("img")?,
            apk_anchor: parse_selector("a[href$='.apk']")?,
        })
    }

    /// Extract apps from the listing page.
    ///
    /// Strategy 1 reads the upstream's `.app-card` markup, which scopes icon
    /// lookups to the card and avoids picking up global images such as QR
    /// codes. When no cards exist, "查看详情" detail links are used, and as a
    /// last resort headings are treated as app names. Results are de-duped
    /// by name, first occurrence wins.
    pub fn extract_apps(&self, html: &str, base_url: &str) -> Vec<UpstreamApp> {
        let doc = Html::parse_document(html);
        let mut apps = Vec::new();

        let cards: Vec<ElementRef<'_>> = doc.select(&self.app_card).collect();
        if !cards.is_empty() {
            for card in cards {
                if let Some(app) = self.extract_from_card(card, base_url) {
                    apps.push(app);
                }
            }
        } else {
            for anchor in doc.select(&self.anchor) {
                let text: String = anchor.text().collect();
                if !text.contains("查看详情") {
                    continue;
                }
                if let Some(app) = self.extract_from_detail_anchor(anchor, base_url) {
                    apps.push(app);
                }
            }
        }

        if apps.is_empty() {
            for heading in doc.select(&self.heading) {
                if let Some(app) = self.extract_from_heading(heading, base_url) {
                    apps.push(app);
                }
            }
        }

        let mut seen = HashSet::new();
        apps.retain(|a: &UpstreamApp| seen.insert(a.name.clone()));

        debug!("Extracted {} apps from listing page", apps.len());
        apps
    }

    fn extract_from_card(&self, card: ElementRef<'_>, base_url: &str) -> Option<UpstreamApp> {
        let name = first_text(card, &self.app_name)?;

        let icon_url = self.first_image_url(card, &self.app_icon_img, base_url);

        let label_text =
            first_text(card, &self.app_tag).unwrap_or_else(|| collapsed_text(card));
        let label = find_label(&label_text);

        let description = first_text(card, &self.app_description)
            .or_else(|| first_text(card, &self.paragraph));

        let detail_url = card
            .value()
            .attr("href")
            .filter(|h| !h.is_empty())
            .and_then(|h| abs_url(h, base_url));

        Some(UpstreamApp {
            name,
            label,
            description,
            detail_url,
            icon_url,
        })
    }

    fn extract_from_detail_anchor(
        &self,
        anchor: ElementRef<'_>,
        base_url: &str,
    ) -> Option<UpstreamApp> {
        // Prefer the closest card-like container over the whole page wrapper.
        let card = closest_with_class(anchor, &["app-card", "card", "item"])
            .or_else(|| closest_tag(anchor, "a"))
            .unwrap_or(anchor);

        let icon_url = self.first_image_url(card, &self.img, base_url);

        let name = first_text(card, &self.heading).or_else(|| {
            let scope = closest_tag(anchor, "a").unwrap_or(anchor);
            let text: String = scope.text().collect();
            let stripped = text.replacen("查看详情", "", 1).trim().to_string();
            (!stripped.is_empty()).then_some(stripped)
        })?;

        let text = collapsed_text(card);
        let label = find_label(&text);

        let description = first_text(card, &self.paragraph)
            .or_else(|| (!text.is_empty()).then_some(text));

        let detail_url = anchor
            .value()
            .attr("href")
            .filter(|h| !h.is_empty())
            .and_then(|h| abs_url(h, base_url));

        Some(UpstreamApp {
            name,
            label,
            description,
            detail_url,
            icon_url,
        })
    }

    fn extract_from_heading(
        &self,
        heading: ElementRef<'_>,
        base_url: &str,
    ) -> Option<UpstreamApp> {
        let name = heading.text().collect::<String>().trim().to_string();
        if name.is_empty() {
            return None;
        }

        let card = closest_tag(heading, "div");
        let text = card.map(collapsed_text).unwrap_or_default();
        let label = find_label(&text);
        let icon_url = card.and_then(|c| self.first_image_url(c, &self.img, base_url));
        let description = (!text.is_empty()).then_some(text);

        Some(UpstreamApp {
            name,
            label,
            description,
            // Heading-only pages carry no per-app link.
            detail_url: None,
            icon_url,
        })
    }

    /// Find the APK download link on a detail page.
    ///
    /// Exact `.apk` suffix match first, then any href containing `.apk`
    /// (query strings, mixed case).
    pub fn find_apk_link(&self, html: &str, detail_url: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let link = doc
            .select(&self.apk_anchor)
            .filter_map(|a| a.value().attr("href"))
            .next()
            .map(ToString::to_string)
            .or_else(|| {
                doc.select(&self.anchor)
                    .filter_map(|a| a.value().attr("href"))
                    .find(|h| h.to_lowercase().contains(".apk"))
                    .map(ToString::to_string)
            })?;
        abs_url(&link, detail_url)
    }

    /// Find the most icon-looking image on a detail page.
    ///
    /// Candidates are scored by URL hints (icon, logo, the app's own name,
    /// vector/PNG formats); the first highest-scoring one wins.
    pub fn find_icon_link(&self, html: &str, detail_url: &str, app_name: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let candidates: Vec<String> = doc
            .select(&self.img)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|h| !h.is_empty() && is_likely_image_url(h))
            .map(ToString::to_string)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let lower_name = app_name.trim().to_lowercase();
        let mut best: Option<(&String, i32)> = None;
        for href in &candidates {
            let l = href.to_lowercase();
            let mut score = 0;
            if l.contains("icon") {
                score += 3;
            }
            if l.contains("logo") {
                score += 2;
            }
            if !lower_name.is_empty() && l.contains(&lower_name) {
                score += 2;
            }
            if l.contains(".svg") {
                score += 1;
            }
            if l.contains(".png") {
                score += 1;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((href, score));
            }
        }

        best.and_then(|(href, _)| abs_url(href, detail_url))
    }

    /// First image under `scope` matching `selector`, resolved to an
    /// absolute URL. Lazy-loading attribute variants are checked in order.
    fn first_image_url(
        &self,
        scope: ElementRef<'_>,
        selector: &Selector,
        base_url: &str,
    ) -> Option<String> {
        let img = scope.select(selector).next()?;
        let value = img.value();
        let raw = value
            .attr("src")
            .filter(|s| !s.is_empty())
            .or_else(|| value.attr("data-src").filter(|s| !s.is_empty()))
            .or_else(|| value.attr("data-original").filter(|s| !s.is_empty()))?;
        if is_likely_image_url(raw) {
            abs_url(raw, base_url)
        } else {
            None
        }
    }
}

/// Heuristic filter for image URLs. Rejects inline data URIs outright.
pub fn is_likely_image_url(href: &str) -> bool {
    let h = href.trim();
    if h.is_empty() || h.starts_with("data:") {
        return false;
    }
    let lower = h.to_lowercase();
    lower.contains(".png")
        || lower.contains(".jpg")
        || lower.contains(".jpeg")
        || lower.contains(".webp")
        || lower.contains(".gif")
        || lower.contains(".svg")
        || lower.contains("icon")
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{css}': {e}"))
}

/// Resolve `href` against `base`. Malformed URLs yield `None` so a single
/// bad link cannot take down a whole listing pass.
fn abs_url(href: &str, base: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

fn find_label(text: &str) -> Option<String> {
    LABEL_RE.find(text).map(|m| m.as_str().to_string())
}

/// First non-empty trimmed text under `scope` matching `selector`.
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Full text of `scope` with whitespace runs collapsed to single spaces.
fn collapsed_text(scope: ElementRef<'_>) -> String {
    scope
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Nearest ancestor-or-self carrying one of `classes`.
fn closest_with_class<'a>(el: ElementRef<'a>, classes: &[&str]) -> Option<ElementRef<'a>> {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|e| {
            let value = e.value();
            classes.iter().any(|c| value.classes().any(|have| have == *c))
        })
}

/// Nearest ancestor-or-self with the given tag name.
fn closest_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .find(|e| e.value().name() == tag)
}
