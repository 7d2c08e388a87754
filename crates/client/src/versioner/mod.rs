//! Cache-busting rewrites of stylesheet and script references.
//!
//! Every same-origin `link[rel=stylesheet]` and `script[src]` gets its `v`
//! query parameter set to a fresh millisecond timestamp, once on load and
//! then on a fixed interval. The versioner's own script and cross-origin
//! resources are left alone.

use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use techtalks_core::AppConfig;
use tokio::task::JoinHandle;
use url::Url;

use crate::ClientError;
use crate::fetch::same_origin;

static STYLESHEETS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="stylesheet"][href]"#).expect("invalid selector"));
static SCRIPTS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script[src]").expect("invalid selector"));

const PARAM: &str = "v";

/// Kind of versioned reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Stylesheet,
    Script,
}

impl RefKind {
    fn attr(self) -> &'static str {
        match self {
            RefKind::Stylesheet => "href",
            RefKind::Script => "src",
        }
    }
}

/// A reference found in a document and its rewritten URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRef {
    pub kind: RefKind,
    /// Attribute value as written in the document.
    pub raw: String,
    pub rewritten: Url,
}

/// Result of rewriting one document.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub html: String,
    pub refs: Vec<VersionedRef>,
}

/// Millisecond timestamp used as the `v` value.
pub fn version_token(now: DateTime<Utc>) -> String {
    now.timestamp_millis().to_string()
}

#[derive(Debug, Clone)]
pub struct ResourceVersioner {
    origin: Url,
    own_script: String,
}

impl ResourceVersioner {
    pub fn new(origin: Url, own_script: impl Into<String>) -> Self {
        Self { origin, own_script: own_script.into() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(config.origin_url()?, &config.versioner_script))
    }

    /// `raw` resolved against the origin with `v` set to `token`, or None if
    /// the reference is cross-origin, unparsable, or the versioner itself.
    pub fn rewrite_url(&self, kind: RefKind, raw: &str, token: &str) -> Option<Url> {
        let mut url = self.origin.join(raw.trim()).ok()?;
        if !same_origin(&url, &self.origin) {
            return None;
        }
        if kind == RefKind::Script && url.as_str().contains(&self.own_script) {
            return None;
        }

        let kept: Vec<(String, String)> =
            url.query_pairs().filter(|(k, _)| k != PARAM).map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        url.query_pairs_mut().clear().extend_pairs(kept).append_pair(PARAM, token);
        Some(url)
    }

    /// References in `html` that would be rewritten with `token`.
    pub fn collect(&self, html: &str, token: &str) -> Vec<VersionedRef> {
        self.rewrite_html(html, token).refs
    }

    /// Rewrite every versionable reference in `html`.
    ///
    /// Only the `href`/`src` value inside each matching start tag is
    /// replaced; other elements pointing at the same URL and the rest of the
    /// markup are left as is. Comments and script bodies are skipped.
    pub fn rewrite_html(&self, html: &str, token: &str) -> Rewrite {
        let mut out = String::with_capacity(html.len());
        let mut refs = Vec::new();
        let mut seen = HashSet::new();
        let mut copied = 0;
        let mut pos = 0;

        while let Some(found) = html[pos..].find('<') {
            let start = pos + found;
            if html[start..].starts_with("<!--") {
                pos = html[start..].find("-->").map_or(html.len(), |end| start + end + 3);
                continue;
            }
            let Some(end) = tag_end(html, start) else {
                break;
            };
            pos = end;

            let tag = &html[start..end];
            let kind = match tag_name(tag).as_str() {
                "link" => RefKind::Stylesheet,
                "script" => {
                    pos = html[end..].to_ascii_lowercase().find("</script").map_or(html.len(), |close| end + close);
                    RefKind::Script
                }
                _ => continue,
            };
            let Some((raw, value)) = matching_value(kind, tag) else {
                continue;
            };
            let Some(rewritten) = self.rewrite_url(kind, &raw, token) else {
                continue;
            };

            out.push_str(&html[copied..start + value.start]);
            out.push_str(&rewritten.as_str().replace('&', "&amp;"));
            copied = start + value.end;

            if seen.insert((kind, raw.clone())) {
                refs.push(VersionedRef { kind, raw, rewritten });
            }
        }
        out.push_str(&html[copied..]);

        Rewrite { html: out, refs }
    }

    /// Load, rewrite and store one target. Returns how many references were
    /// rewritten.
    pub async fn run_once<T: VersionTarget + ?Sized>(&self, target: &T, now: DateTime<Utc>) -> Result<usize, ClientError> {
        let html = target.load().await?;
        let rewrite = self.rewrite_html(&html, &version_token(now));
        if rewrite.html != html {
            target.store(rewrite.html).await?;
        }
        Ok(rewrite.refs.len())
    }

    /// Rewrite `target` now and then every `interval`.
    pub fn spawn_periodic<T>(self: Arc<Self>, target: Arc<T>, interval: Duration) -> JoinHandle<()>
    where
        T: VersionTarget + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.run_once(target.as_ref(), Utc::now()).await {
                    Ok(count) => tracing::debug!(count, "versioned page resources"),
                    Err(e) => tracing::warn!("resource versioning failed: {e}"),
                }
            }
        })
    }
}

/// Decoded attribute value and its byte range in `tag`, when the start tag
/// is a stylesheet link or external script.
fn matching_value(kind: RefKind, tag: &str) -> Option<(String, Range<usize>)> {
    let selector = match kind {
        RefKind::Stylesheet => &*STYLESHEETS,
        RefKind::Script => &*SCRIPTS,
    };
    let fragment = Html::parse_fragment(tag);
    let element = fragment.select(selector).next()?;
    let raw = element.value().attr(kind.attr())?.to_string();
    let (_, value) = attributes(tag).into_iter().find(|(name, _)| name == kind.attr())?;
    Some((raw, value))
}

fn tag_name(tag: &str) -> String {
    tag[1..].split(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/').next().unwrap_or("").to_ascii_lowercase()
}

/// Index just past the `>` closing the tag opened at `start`.
fn tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, b) in html.bytes().enumerate().skip(start + 1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Lowercased attribute names of a start tag with the byte range of each
/// value, unquoted.
fn attributes(tag: &str) -> Vec<(String, Range<usize>)> {
    let bytes = tag.as_bytes();
    let len = bytes.len();
    let space = |b: u8| b.is_ascii_whitespace();
    let mut attrs = Vec::new();

    let mut i = 1;
    while i < len && !space(bytes[i]) && !matches!(bytes[i], b'>' | b'/') {
        i += 1;
    }
    loop {
        while i < len && (space(bytes[i]) || bytes[i] == b'/') {
            i += 1;
        }
        if i >= len || bytes[i] == b'>' {
            break;
        }

        let name_start = i;
        while i < len && !space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let name = tag[name_start..i].to_ascii_lowercase();
        while i < len && space(bytes[i]) {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((name, i..i));
            continue;
        }
        i += 1;
        while i < len && space(bytes[i]) {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(&q @ (b'"' | b'\'')) => {
                let start = i + 1;
                let end = tag[start..].find(q as char).map_or(len, |n| start + n);
                i = (end + 1).min(len);
                start..end
            }
            _ => {
                let start = i;
                while i < len && !space(bytes[i]) && bytes[i] != b'>' {
                    i += 1;
                }
                start..i
            }
        };
        attrs.push((name, value));
    }
    attrs
}

/// A document the versioner rewrites in place.
#[async_trait]
pub trait VersionTarget: Send + Sync {
    async fn load(&self) -> Result<String, ClientError>;
    async fn store(&self, html: String) -> Result<(), ClientError>;
}

/// An HTML file on disk.
#[derive(Debug, Clone)]
pub struct HtmlFile {
    path: PathBuf,
}

impl HtmlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VersionTarget for HtmlFile {
    async fn load(&self) -> Result<String, ClientError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    async fn store(&self, html: String) -> Result<(), ClientError> {
        Ok(tokio::fs::write(&self.path, html).await?)
    }
}
