//! Portal page loader: throttled GET, legacy Thai charset decoding, and a
//! sanitizing pass that makes every link absolute before the page is mapped.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::error::{PortalError, Result};
use crate::parser::text::element_text;

static CHARSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*"?([^;"\s]+)"#).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Tried in order after the server's declared charset. `tis-620` and
/// `iso-8859-11` labels resolve to windows-874.
const FALLBACK_ENCODINGS: &[&str] = &["utf-8", "windows-874"];

const STRIPPED_ATTRS: &[&str] = &["background", "bgcolor", "width", "height"];
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_TAGS: &[&str] = &["style", "xmp", "iframe", "noembed", "noframes", "noscript"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalScript {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A fetched, decoded and sanitized page. Holds markup rather than a parsed
/// document so it can be shared across tasks.
#[derive(Debug, Clone, Serialize)]
pub struct PortalPage {
    pub url: String,
    pub html: String,
    pub title: String,
    pub scripts: Vec<PortalScript>,
    pub encoding: String,
    pub fetched_at: DateTime<Utc>,
}

impl PortalPage {
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

// ── Decoding ──

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    /// Label of the candidate that decoded cleanly.
    pub encoding: String,
}

pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    CHARSET_RE
        .captures(content_type)
        .map(|c| c[1].trim().to_ascii_lowercase())
}

/// Declared charset first, then the fallbacks, one entry per distinct encoding.
fn candidate_encodings(declared: Option<&str>) -> Vec<&'static Encoding> {
    let mut candidates: Vec<&'static Encoding> = Vec::new();
    for label in declared.into_iter().chain(FALLBACK_ENCODINGS.iter().copied()) {
        let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) else {
            debug!(label = %label, "unknown charset label");
            continue;
        };
        if !candidates.contains(&encoding) {
            candidates.push(encoding);
        }
    }
    candidates
}

/// First candidate that decodes without a single malformed sequence wins;
/// lossy UTF-8 when none does.
pub fn decode(bytes: &[u8], declared: Option<&str>) -> Decoded {
    let candidates = candidate_encodings(declared);

    for encoding in &candidates {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            if !text.is_empty() {
                return Decoded {
                    text: text.into_owned(),
                    encoding: encoding.name().to_ascii_lowercase(),
                };
            }
        }
    }

    if !bytes.is_empty() {
        let tried: Vec<&str> = candidates.iter().map(|e| e.name()).collect();
        warn!(?tried, "no charset decoded cleanly, using lossy utf-8");
    }
    Decoded {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: "utf-8".to_string(),
    }
}

// ── Sanitizing ──

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub html: String,
    pub title: String,
    pub scripts: Vec<PortalScript>,
}

/// Absolute URL for a link attribute, or `None` for empty and `javascript:`
/// values and anything that does not join.
pub(crate) fn resolve(base: &Url, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("javascript") {
        return None;
    }
    base.join(trimmed).ok().map(String::from)
}

fn is_link_attr(tag: &str, attr: &str) -> bool {
    matches!(
        (tag, attr),
        ("a" | "link", "href") | ("form", "action") | ("img" | "script" | "iframe", "src")
    )
}

/// Re-serializes the document with absolute links, presentational attributes
/// removed, and scripts and stylesheets pulled out.
pub fn sanitize(html: &str, base: &Url) -> Sanitized {
    let doc = Html::parse_document(html);
    let mut out = String::with_capacity(html.len());
    let mut scripts = Vec::new();

    out.push_str("<!DOCTYPE html>");
    write_element(doc.root_element(), base, &mut out, &mut scripts);

    Sanitized {
        html: out,
        title: doc.select(&TITLE).next().map(element_text).unwrap_or_default(),
        scripts,
    }
}

fn write_element(el: ElementRef<'_>, base: &Url, out: &mut String, scripts: &mut Vec<PortalScript>) {
    let element = el.value();
    let tag = element.name();

    if tag == "script" {
        let src = element.attr("src").filter(|s| !s.trim().is_empty());
        if let Some(src) = src {
            scripts.push(PortalScript {
                src: Some(resolve(base, src).unwrap_or_else(|| src.to_string())),
                content: None,
            });
        } else {
            let content: String = el.text().collect();
            if !content.trim().is_empty() {
                scripts.push(PortalScript {
                    src: None,
                    content: Some(content),
                });
            }
        }
        return;
    }
    if tag == "link"
        && element
            .attr("rel")
            .is_some_and(|rel| rel.to_ascii_lowercase().contains("stylesheet"))
    {
        return;
    }

    out.push('<');
    out.push_str(tag);
    for (name, value) in element.attrs() {
        if STRIPPED_ATTRS.contains(&name) {
            continue;
        }
        let value = if is_link_attr(tag, name) {
            resolve(base, value).unwrap_or_else(|| value.to_string())
        } else {
            value.to_string()
        };
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(&value, true));
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&tag) {
        return;
    }

    let raw = RAW_TEXT_TAGS.contains(&tag);
    for child in el.children() {
        match child.value() {
            Node::Text(text) if raw => out.push_str(&text.text),
            Node::Text(text) => out.push_str(&escape(&text.text, false)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, base, out, scripts);
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Fetcher ──

type PageCell = Arc<OnceCell<Arc<PortalPage>>>;

/// Loads portal pages. Loads of the same absolute URL share one request and
/// its result; failed loads are retried by the next caller.
pub struct Fetcher {
    client: reqwest::Client,
    cookie: Option<String>,
    throttle: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    base: Option<Url>,
    pages: Mutex<HashMap<String, PageCell>>,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Fetcher {
            client,
            cookie: settings.cookie.clone(),
            throttle: Duration::from_millis(settings.throttle_ms),
            last_request: tokio::sync::Mutex::new(None),
            base: None,
            pages: Mutex::new(HashMap::new()),
        })
    }

    /// Relative URLs passed to `load` are joined onto this base.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn absolute_url(&self, url: &str) -> Result<Url> {
        match &self.base {
            Some(base) => Ok(base.join(url)?),
            None => Ok(Url::parse(url)?),
        }
    }

    pub async fn load(&self, url: &str) -> Result<Arc<PortalPage>> {
        let url = self.absolute_url(url)?;
        let key = url.to_string();
        let cell = {
            let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(pages.entry(key.clone()).or_default())
        };
        match cell.get_or_try_init(|| self.fetch(url.clone())).await {
            Ok(page) => Ok(Arc::clone(page)),
            Err(e) => {
                self.forget_failed(&key, &cell);
                Err(e)
            }
        }
    }

    /// Drops the entry for a failed load unless another caller has since
    /// filled or replaced it.
    fn forget_failed(&self, key: &str, cell: &PageCell) {
        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        let stale = pages
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            pages.remove(key);
        }
    }

    /// Number of pages held in the cache.
    pub fn cached(&self) -> usize {
        let pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        pages.values().filter(|c| c.initialized()).count()
    }

    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.throttle {
                tokio::time::sleep(self.throttle - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch(&self, url: Url) -> Result<Arc<PortalPage>> {
        self.wait_turn().await;

        let mut request = self.client.get(url.clone());
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "portal returned an error status");
            return Err(PortalError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);
        let bytes = response.bytes().await?;

        let decoded = decode(&bytes, declared.as_deref());
        let sanitized = sanitize(&decoded.text, &url);
        info!(
            url = %url,
            encoding = %decoded.encoding,
            bytes = bytes.len(),
            scripts = sanitized.scripts.len(),
            "fetched page"
        );

        Ok(Arc::new(PortalPage {
            url: url.to_string(),
            html: sanitized.html,
            title: sanitized.title,
            scripts: sanitized.scripts,
            encoding: decoded.encoding,
            fetched_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn decodes_declared_then_fallbacks() {
        let (bytes, _, _) = encoding_rs::WINDOWS_874.encode("ภาคเรียน");
        let decoded = decode(&bytes, None);
        assert_eq!(decoded.text, "ภาคเรียน");
        assert_eq!(decoded.encoding, "windows-874");

        // A wrong declaration falls through to the next candidate.
        let mislabeled = decode(&bytes, Some("UTF-8"));
        assert_eq!(mislabeled.text, "ภาคเรียน");
        assert_eq!(mislabeled.encoding, "windows-874");

        let utf8 = decode("ภาคเรียน".as_bytes(), None);
        assert_eq!(utf8.encoding, "utf-8");

        let plain = decode("hello".as_bytes(), Some("bogus-charset"));
        assert_eq!(plain.text, "hello");
        assert_eq!(plain.encoding, "utf-8");
    }

    #[test]
    fn thai_aliases_share_one_candidate() {
        let candidates = candidate_encodings(Some("TIS-620"));
        assert_eq!(
            candidates,
            vec![encoding_rs::WINDOWS_874, encoding_rs::UTF_8]
        );
        assert_eq!(candidate_encodings(Some("iso-8859-11")).len(), 2);
        assert_eq!(candidate_encodings(None), vec![encoding_rs::UTF_8, encoding_rs::WINDOWS_874]);

        let (bytes, _, _) = encoding_rs::WINDOWS_874.encode("ภาคเรียน");
        let decoded = decode(&bytes, Some("tis-620"));
        assert_eq!(decoded.text, "ภาคเรียน");
        assert_eq!(decoded.encoding, "windows-874");
    }

    #[test]
    fn lossy_when_nothing_fits() {
        // 0xFF is unmapped in windows-874 and invalid UTF-8.
        let decoded = decode(&[b'a', 0xFF], None);
        assert_eq!(decoded.encoding, "utf-8");
        assert_eq!(decoded.text, "a\u{FFFD}");
    }

    #[test]
    fn links_resolve_against_base() {
        let base = Url::parse("https://reg.test/registrar/home.php").unwrap();
        assert_eq!(
            resolve(&base, "news.php").as_deref(),
            Some("https://reg.test/registrar/news.php")
        );
        assert_eq!(resolve(&base, "JavaScript:void(0)"), None);
        assert_eq!(resolve(&base, "  "), None);
    }

    #[test]
    fn charset_header() {
        assert_eq!(
            charset_from_content_type("text/html; charset=TIS-620").as_deref(),
            Some("tis-620")
        );
        assert_eq!(
            charset_from_content_type("text/html; charset=\"utf-8\"").as_deref(),
            Some("utf-8")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn sanitize_rewrites_links() {
        let base = Url::parse("https://reg.test/registrar/home.php").unwrap();
        let sanitized = sanitize(
            r##"<html><head><title>หน้าแรก</title>
               <link rel="stylesheet" href="style.css"><link rel="icon" href="favicon.ico">
               <script src="js/app.js"></script><script>server_date('2025-01-01 10:00:00');</script>
               </head><body background="bg.gif">
               <table width="100%" bgcolor="#fff"><tr><td height="1">x &amp; y</td></tr></table>
               <a href="news.php?id=1">n</a><a href="javascript:open()">j</a>
               <form action="save.php"></form><img src="/img/logo.png">
               </body></html>"##,
            &base,
        );
        assert_eq!(sanitized.title, "หน้าแรก");
        assert_eq!(
            sanitized.scripts,
            vec![
                PortalScript {
                    src: Some("https://reg.test/registrar/js/app.js".into()),
                    content: None,
                },
                PortalScript {
                    src: None,
                    content: Some("server_date('2025-01-01 10:00:00');".into()),
                },
            ]
        );
        let html = &sanitized.html;
        assert!(!html.contains("<script"));
        assert!(!html.contains("style.css"));
        assert!(html.contains(r#"href="https://reg.test/registrar/favicon.ico""#));
        assert!(html.contains(r#"href="https://reg.test/registrar/news.php?id=1""#));
        assert!(html.contains(r#"href="javascript:open()""#));
        assert!(html.contains(r#"action="https://reg.test/registrar/save.php""#));
        assert!(html.contains(r#"src="https://reg.test/img/logo.png""#));
        assert!(html.contains("x &amp; y"));
        for attr in ["background=", "bgcolor=", "width=", "height="] {
            assert!(!html.contains(attr), "{attr} survived");
        }

        // The sanitized markup parses back to the same content.
        let doc = Html::parse_document(html);
        let cell = doc.select(&Selector::parse("td").unwrap()).next().unwrap();
        assert_eq!(element_text(cell), "x & y");
    }

    /// Minimal HTTP server counting accepted connections.
    async fn serve(hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    tokio::time::sleep(Duration::from_millis(50)).await;

                    let (status, body) = if request.starts_with("GET /fail") {
                        ("500 Internal Server Error", b"oops".to_vec())
                    } else {
                        let (bytes, _, _) = encoding_rs::WINDOWS_874
                            .encode("<html><head><title>ข่าว</title></head><body><a href=\"x.php\">ลิงก์</a></body></html>");
                        ("200 OK", bytes.into_owned())
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=windows-874\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn test_settings() -> Settings {
        Settings {
            throttle_ms: 0,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(Arc::clone(&hits)).await;
        let fetcher = Fetcher::new(&test_settings()).unwrap();
        let url = format!("{base}/news.php");

        let (a, b) = tokio::join!(fetcher.load(&url), fetcher.load(&url));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(a.title, "ข่าว");
        assert_eq!(a.encoding, "windows-874");
        assert!(a.html.contains(&format!("href=\"{base}/x.php\"")));

        let again = fetcher.load(&url).await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.cached(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(Arc::clone(&hits)).await;
        let fetcher = Fetcher::new(&test_settings()).unwrap();
        let url = format!("{base}/fail.php");

        let first = fetcher.load(&url).await.unwrap_err();
        assert!(matches!(first, PortalError::Http { status: 500, .. }));
        assert!(fetcher.load(&url).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.cached(), 0);
        assert!(fetcher.pages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relative_urls_need_a_base() {
        let fetcher = Fetcher::new(&test_settings()).unwrap();
        assert!(matches!(
            fetcher.load("news.php").await,
            Err(PortalError::InvalidUrl(_))
        ));
        let based = fetcher.with_base(Url::parse("https://reg.test/a/").unwrap());
        assert_eq!(
            based.absolute_url("news.php").unwrap().as_str(),
            "https://reg.test/a/news.php"
        );
    }
}
