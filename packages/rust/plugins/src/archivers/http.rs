//! Generic HTTP archiver: downloads the URL itself into the scratch dir.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use archivist_core::{ArchiveItem, Archiver, CaptureError};
use archivist_shared::{ArchivistError, Media, Metadata, PluginConfig, Result, hash_bytes};

use crate::html;
use crate::scope::{UrlFilter, is_ssrf_target};

/// User-Agent string for capture requests.
const USER_AGENT: &str = concat!("Archivist/", env!("CARGO_PKG_VERSION"));

/// `[plugins.http_archiver]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpArchiverSettings {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Bodies larger than this fail the capture.
    pub max_bytes: u64,
    pub user_agent: Option<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Allow localhost/private targets.
    pub allow_private: bool,
}

impl Default for HttpArchiverSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 5,
            max_bytes: 50 * 1024 * 1024,
            user_agent: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            allow_private: false,
        }
    }
}

/// Captures any public `http(s)` URL as a single file.
pub struct HttpArchiver {
    client: Client,
    filter: UrlFilter,
    max_bytes: u64,
}

impl HttpArchiver {
    pub const NAME: &'static str = "http_archiver";

    pub fn new(settings: HttpArchiverSettings) -> Result<Self> {
        Self::with_client_builder(settings, Client::builder())
    }

    fn with_client_builder(settings: HttpArchiverSettings, builder: ClientBuilder) -> Result<Self> {
        let client = builder
            .user_agent(settings.user_agent.as_deref().unwrap_or(USER_AGENT))
            .redirect(redirect_policy(settings.max_redirects, settings.allow_private))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ArchivistError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            filter: UrlFilter::new(
                &settings.include_patterns,
                &settings.exclude_patterns,
                settings.allow_private,
            ),
            max_bytes: settings.max_bytes,
        })
    }

    pub fn from_config(config: &PluginConfig) -> Result<Arc<dyn Archiver>> {
        Ok(Arc::new(Self::new(config.parse()?)?))
    }
}

#[async_trait]
impl Archiver for HttpArchiver {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip_all, fields(url = %item.url))]
    async fn download(&self, item: &ArchiveItem) -> std::result::Result<Metadata, CaptureError> {
        let Ok(url) = Url::parse(&item.url) else {
            return Err(CaptureError::NotApplicable);
        };
        if !self.filter.accepts(&url) {
            return Err(CaptureError::NotApplicable);
        }

        debug!("fetching");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| CaptureError::failed(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::failed(format!("{url}: HTTP {status}")));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(CaptureError::failed(format!(
                "{url}: body exceeds {} bytes",
                self.max_bytes
            )));
        }

        let final_url = response.url().clone();
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| CaptureError::failed(format!("{url}: body read failed: {e}")))?;
        if body.len() as u64 > self.max_bytes {
            return Err(CaptureError::failed(format!(
                "{url}: body exceeds {} bytes",
                self.max_bytes
            )));
        }

        let path = item
            .scratch_dir
            .join(url_to_file_name(&final_url, mime.as_deref()));
        tokio::fs::create_dir_all(&item.scratch_dir)
            .await
            .map_err(|e| ArchivistError::io(&item.scratch_dir, e))?;
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| ArchivistError::io(&path, e))?;

        let mut media = Media::new(&path, hash_bytes(&body));
        if let Some(mime) = &mime {
            media = media.with_mime_type(mime.as_str());
        }

        let mut metadata = Metadata::new(&item.url)
            .with("http_status", i64::from(status.as_u16()))
            .with("final_url", final_url.as_str())
            .with("content_length", body.len() as i64);
        if let Some(mime) = &mime {
            metadata.set("content_type", mime.as_str());
        }
        if html::is_html(mime.as_deref()) {
            let doc = Html::parse_document(&String::from_utf8_lossy(&body));
            if let Some(title) = html::page_title(&doc)? {
                metadata.set_title(title);
            }
        }
        metadata.set_timestamp(Utc::now());
        metadata.set_main_file(media);

        debug!(status = status.as_u16(), bytes = body.len(), "captured");
        Ok(metadata.success())
    }
}

/// Follow at most `max_redirects` hops, re-checking every hop against the
/// SSRF guard unless private targets are allowed.
fn redirect_policy(max_redirects: usize, allow_private: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_redirects {
            attempt.error(format!("too many redirects (max {max_redirects})"))
        } else if !allow_private && is_ssrf_target(attempt.url()) {
            let blocked = format!("redirect to blocked target {}", attempt.url());
            tracing::warn!(target_url = %attempt.url(), "SSRF protection: redirect blocked");
            attempt.error(blocked)
        } else {
            attempt.follow()
        }
    })
}

/// Derive a filesystem-safe file name from the URL's last path segment.
pub fn url_to_file_name(url: &Url, mime: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("")
        .trim_end_matches('/');

    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            (stem.to_string(), Some(ext.to_string()))
        }
        _ => (cleaned.clone(), None),
    };
    let stem = if stem.is_empty() { "index".to_string() } else { stem };

    let ext = ext.or_else(|| {
        mime.and_then(|m| {
            if html::is_html(Some(m)) {
                Some("html".to_string())
            } else {
                mime_guess::get_mime_extensions_str(m)
                    .and_then(|exts| exts.first())
                    .map(|e| e.to_string())
            }
        })
    });

    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
