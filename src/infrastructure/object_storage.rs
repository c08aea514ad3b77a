//! Aliyun OSS object storage client
//!
//! Uploads go through plain HTTP PUT with OSS V4 request signing
//! (OSS4-HMAC-SHA256). Object keys are content-addressed: a digest prefix
//! in the key means re-uploading identical bytes lands on the same key,
//! which keeps uploads idempotent without a remote existence check.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use sha2::{Digest, Sha256};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::domain::services::{ObjectStore, StorageError, StoredObject};
use crate::infrastructure::config::ObjectStoreConfig;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "OSS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SIGNING_PRODUCT: &str = "oss";
const SIGNING_TERMINATOR: &str = "aliyun_v4_request";

/// MIME type OSS serves APKs with so browsers download instead of render.
pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// Content type for an icon file extension (with leading dot).
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".webp" => "image/webp",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Object key for an app icon, addressed by content digest.
///
/// Keys stay URI-safe by construction: slugs are `[a-z0-9-]`, the digest is
/// hex, and the extension comes from a fixed table.
pub fn icon_object_key(slug: &str, sha256: &str, ext: &str) -> String {
    let short = &sha256[..sha256.len().min(16)];
    format!("icons/{slug}/{short}{ext}")
}

/// Object key for an APK, carrying version and a digest suffix.
pub fn apk_object_key(slug: &str, version_name: &str, version_code: i64, sha256: &str) -> String {
    let short = &sha256[..sha256.len().min(8)];
    format!("apks/{slug}/{version_name}-{version_code}-{short}.apk")
}

/// OSS client for a single bucket.
pub struct OssClient {
    config: ObjectStoreConfig,
    http: reqwest::Client,
}

impl OssClient {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        // APK uploads can run long; this timeout is independent of the
        // upstream client's per-request timeout.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create OSS HTTP client")?;
        Ok(Self { config, http })
    }

    /// Public URL for an object key.
    ///
    /// A configured CDN base wins; otherwise the bucket endpoint is used,
    /// which is not always publicly readable but still useful.
    pub fn public_url(&self, object_key: &str) -> String {
        let key = object_key.trim_start_matches('/');
        match &self.config.public_base_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => format!(
                "https://{}.{}.aliyuncs.com/{key}",
                self.config.bucket, self.config.region
            ),
        }
    }

    fn endpoint_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}.aliyuncs.com/{key}",
            self.config.bucket, self.config.region
        )
    }

    fn authorization_header(
        &self,
        key: &str,
        content_type: &str,
        datetime: &str,
        date: &str,
    ) -> String {
        let region = signing_region(&self.config.region);
        let scope = format!("{date}/{region}/{SIGNING_PRODUCT}/{SIGNING_TERMINATOR}");
        let canonical = canonical_put_request(&self.config.bucket, key, content_type, datetime);
        let string_to_sign = format!(
            "{SIGNATURE_VERSION}\n{datetime}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let signature = sign(
            &self.config.access_key_secret,
            date,
            region,
            &string_to_sign,
        );
        format!(
            "{SIGNATURE_VERSION} Credential={}/{scope},Signature={signature}",
            self.config.access_key_id
        )
    }
}

#[async_trait]
impl ObjectStore for OssClient {
    async fn upload(
        &self,
        object_key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = object_key.trim_start_matches('/');
        let now = Utc::now();
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let authorization = self.authorization_header(key, content_type, &datetime, &date);

        let file = tokio::fs::File::open(file_path).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        debug!("Uploading {} bytes to oss://{}/{}", length, self.config.bucket, key);

        let response = self
            .http
            .put(self.endpoint_url(key))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .header("x-oss-date", &datetime)
            .header("x-oss-content-sha256", UNSIGNED_PAYLOAD)
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                code: parse_error_code(&body_text),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim_matches('"');
        debug!(
            "Upload complete: oss://{}/{} etag {}",
            self.config.bucket, key, etag
        );

        Ok(StoredObject {
            object_key: key.to_string(),
            url: self.public_url(key),
        })
    }
}

/// Region id used inside the signing scope, without the service prefix.
fn signing_region(region: &str) -> &str {
    region.strip_prefix("oss-").unwrap_or(region)
}

/// Canonical request for a PUT with unsigned payload and no query string.
///
/// Signed headers are fixed: content-type, x-oss-content-sha256, x-oss-date,
/// already in sorted order. The additional-headers line stays empty.
fn canonical_put_request(bucket: &str, key: &str, content_type: &str, datetime: &str) -> String {
    format!(
        "PUT\n/{bucket}/{key}\n\ncontent-type:{content_type}\nx-oss-content-sha256:{UNSIGNED_PAYLOAD}\nx-oss-date:{datetime}\n\n\n{UNSIGNED_PAYLOAD}"
    )
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Derive the V4 signing key and sign the string-to-sign.
fn sign(secret: &str, date: &str, region: &str, string_to_sign: &str) -> String {
    let k_date = hmac_sha256(format!("aliyun_v4{secret}").as_bytes(), date);
    let k_region = hmac_sha256(&k_date, region);
    let k_product = hmac_sha256(&k_region, SIGNING_PRODUCT);
    let k_signing = hmac_sha256(&k_product, SIGNING_TERMINATOR);
    hex::encode(hmac_sha256(&k_signing, string_to_sign))
}

/// Pull the `<Code>` element out of an OSS error response body.
fn parse_error_code(body: &str) -> String {
    body.split("<Code>")
        .nth(1)
        .and_then(|rest| rest.split("</Code>").next())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(public_base_url: Option<&str>) -> ObjectStoreConfig {
        ObjectStoreConfig {
            region: "oss-cn-shanghai".to_string(),
            bucket: "mirror-bucket".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            access_key_secret: "secret".to_string(),
            public_base_url: public_base_url.map(ToString::to_string),
        }
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for_ext(".png"), "image/png");
        assert_eq!(content_type_for_ext(".JPG"), "image/jpeg");
        assert_eq!(content_type_for_ext(".jpeg"), "image/jpeg");
        assert_eq!(content_type_for_ext(".svg"), "image/svg+xml");
        assert_eq!(content_type_for_ext(".bin"), "application/octet-stream");
        assert_eq!(APK_CONTENT_TYPE, "application/vnd.android.package-archive");
    }

    #[test]
    fn test_icon_object_key_uses_digest_prefix() {
        let digest = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        assert_eq!(
            icon_object_key("ai", digest, ".png"),
            "icons/ai/0123456789abcdef.png"
        );
    }

    #[test]
    fn test_apk_object_key_shape() {
        let digest = "feedfacefeedfacefeedfacefeedfacefeedfacefeedfacefeedfacefeedface";
        assert_eq!(
            apk_object_key("ai", "6.19.07", 61907, digest),
            "apks/ai/6.19.07-61907-feedface.apk"
        );
    }

    #[test]
    fn test_object_keys_survive_short_digests() {
        assert_eq!(icon_object_key("ai", "abc", ".png"), "icons/ai/abc.png");
        assert_eq!(apk_object_key("ai", "v1", 1, "abc"), "apks/ai/v1-1-abc.apk");
    }

    #[test]
    fn test_public_url_prefers_base() {
        let client = OssClient::new(test_config(Some("https://cdn.example.com/apps/"))).unwrap();
        assert_eq!(
            client.public_url("/icons/ai/abcd.png"),
            "https://cdn.example.com/apps/icons/ai/abcd.png"
        );
    }

    #[test]
    fn test_public_url_falls_back_to_bucket_endpoint() {
        let client = OssClient::new(test_config(None)).unwrap();
        assert_eq!(
            client.public_url("icons/ai/abcd.png"),
            "https://mirror-bucket.oss-cn-shanghai.aliyuncs.com/icons/ai/abcd.png"
        );
    }

    #[test]
    fn test_signing_region_strips_service_prefix() {
        assert_eq!(signing_region("oss-cn-shanghai"), "cn-shanghai");
        assert_eq!(signing_region("cn-shanghai"), "cn-shanghai");
    }

    #[test]
    fn test_canonical_request_layout() {
        let canonical =
            canonical_put_request("b", "icons/ai/x.png", "image/png", "20250101T000000Z");
        let lines: Vec<&str> = canonical.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[1], "/b/icons/ai/x.png");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "content-type:image/png");
        assert_eq!(lines[4], "x-oss-content-sha256:UNSIGNED-PAYLOAD");
        assert_eq!(lines[5], "x-oss-date:20250101T000000Z");
        assert_eq!(lines.last(), Some(&"UNSIGNED-PAYLOAD"));
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let a = sign("secret", "20250101", "cn-shanghai", "payload");
        let b = sign("secret", "20250101", "cn-shanghai", "payload");
        let c = sign("other", "20250101", "cn-shanghai", "payload");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_authorization_header_shape() {
        let client = OssClient::new(test_config(None)).unwrap();
        let auth = client.authorization_header(
            "icons/ai/x.png",
            "image/png",
            "20250101T000000Z",
            "20250101",
        );
        assert!(auth.starts_with(
            "OSS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20250101/cn-shanghai/oss/aliyun_v4_request,Signature="
        ));
    }

    #[test]
    fn test_parse_error_code() {
        let body = "<?xml version=\"1.0\"?><Error><Code>NoSuchBucket</Code><Message>gone</Message></Error>";
        assert_eq!(parse_error_code(body), "NoSuchBucket");
        assert_eq!(parse_error_code("not xml"), "");
    }
}
