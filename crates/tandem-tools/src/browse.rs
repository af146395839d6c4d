//! Browse tool: fetch a web page and reduce it to readable text.
//!
//! Also serves as the URL fetcher for content inclusion, so URLs typed by
//! the user and URLs the model browses go through the same client.

use scraper::{Html, Selector};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tandem_types::{
    Message, Tool, ToolContext, ToolError, ToolSpec, ToolUse, UrlFetcher, codeblock, truncate_str,
};

const USER_AGENT: &str = concat!("tandem/", env!("CARGO_PKG_VERSION"));

/// Maximum characters of extracted text returned.
const MAX_OUTPUT_CHARS: usize = 16_000;

/// Maximum bytes of the response body considered.
const MAX_DOWNLOAD_BYTES: usize = 512_000;

const TIMEOUT: Duration = Duration::from_secs(15);

/// Content regions tried before falling back to the whole body.
const CONTENT_SELECTORS: [&str; 5] = [
    "article",
    "main",
    "[role=\"main\"]",
    ".post-content",
    ".entry-content",
];

/// Fetches pages over HTTP(S).
pub struct BrowseTool {
    client: reqwest::Client,
}

impl BrowseTool {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch `url` and return its readable text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, ToolError> {
        let fail = |message: String| ToolError::Fetch {
            url: url.to_string(),
            message,
        };

        tracing::debug!("Fetching {}", url);
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                fail("request timed out".into())
            } else if e.is_connect() {
                fail(format!("connection failed: {e}"))
            } else {
                fail(format!("request error: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let kind = ContentKind::from_header(&content_type)
            .ok_or_else(|| fail(format!("unsupported content type: {content_type}")))?;

        let body = resp
            .text()
            .await
            .map_err(|e| fail(format!("failed to read body: {e}")))?;
        let body = truncate_str(&body, MAX_DOWNLOAD_BYTES);

        let text = match kind {
            ContentKind::Html => html_to_text(body),
            ContentKind::Text => truncate_text(body.trim(), MAX_OUTPUT_CHARS),
        };
        if text.is_empty() {
            return Err(fail("no extractable content".into()));
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    Text,
}

impl ContentKind {
    fn from_header(content_type: &str) -> Option<Self> {
        if content_type.contains("text/html") || content_type.contains("application/xhtml") {
            Some(Self::Html)
        } else if content_type.is_empty()
            || content_type.starts_with("text/")
            || content_type.contains("json")
            || content_type.contains("xml")
        {
            Some(Self::Text)
        } else {
            None
        }
    }
}

impl Tool for BrowseTool {
    fn name(&self) -> &str {
        "browse"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "browse".to_string(),
            description: "Fetch a web page and return its readable text. HTML is reduced to \
                          the page title and main content; plain text is returned as is."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to fetch"
                    }
                }
            }),
            arg_fields: vec!["url".to_string()],
            body_field: None,
        }
    }

    fn execute(
        &self,
        tool_use: ToolUse,
        _ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let url = tool_use
                .args
                .first()
                .map(String::as_str)
                .unwrap_or_else(|| tool_use.content.trim());
            if !looks_like_url(url) {
                return Err(ToolError::InvalidInput {
                    tool: "browse".into(),
                    message: format!("expected an http(s) URL, got '{url}'"),
                });
            }
            let text = self.fetch_text(url).await?;
            Ok(vec![Message::system(codeblock(url, &text))])
        })
    }
}

impl UrlFetcher for BrowseTool {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(self.fetch_text(url))
    }
}

fn looks_like_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && !s.contains(char::is_whitespace)
}

/// Title plus main content of an HTML document.
fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();

    if let Ok(sel) = Selector::parse("title") {
        if let Some(el) = doc.select(&sel).next() {
            let title = element_text(el);
            if !title.is_empty() {
                out.push_str(&format!("Title: {title}\n\n"));
            }
        }
    }
    out.push_str(&extract_body_text(&doc, MAX_OUTPUT_CHARS));
    out.trim().to_string()
}

/// Readable text from article/main regions, falling back to the body.
fn extract_body_text(doc: &Html, max_chars: usize) -> String {
    for sel_str in CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&sel).next() {
                let text = element_text(el);
                if text.len() >= 80 {
                    return truncate_text(&text, max_chars);
                }
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            let text = element_text(body);
            return truncate_text(&text, max_chars);
        }
    }
    String::new()
}

/// Text nodes of `el` joined by spaces, whitespace collapsed.
fn element_text(el: scraper::ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Collapse runs of whitespace into single spaces and trim.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to a byte budget, preferring a word boundary.
fn truncate_text(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let head = truncate_str(s, max);
    let end = head.rfind(' ').unwrap_or(head.len());
    format!("{}...", &head[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_types::AutoConfirm;

    #[test]
    fn spec_renders_url_on_info_line() {
        let tool = BrowseTool::new().unwrap();
        let rendered = tool
            .spec()
            .render_call(&serde_json::json!({"url": "https://example.com"}));
        assert_eq!(rendered, "```browse https://example.com\n\n```");
    }

    #[test]
    fn content_kinds() {
        assert_eq!(
            ContentKind::from_header("text/html; charset=utf-8"),
            Some(ContentKind::Html)
        );
        assert_eq!(ContentKind::from_header("text/markdown"), Some(ContentKind::Text));
        assert_eq!(ContentKind::from_header("application/json"), Some(ContentKind::Text));
        assert_eq!(ContentKind::from_header("image/png"), None);
    }

    #[test]
    fn html_prefers_article_over_body() {
        let article = "Real content. ".repeat(10);
        let html = format!(
            "<html><head><title> Docs  Page </title></head><body><nav>Menu</nav>\
             <article>{article}</article></body></html>"
        );
        let text = html_to_text(&html);
        assert!(text.starts_with("Title: Docs Page\n\nReal content."));
        assert!(!text.contains("Menu"));
    }

    #[test]
    fn html_falls_back_to_body() {
        let text = html_to_text("<html><body><p>short</p><p>page</p></body></html>");
        assert_eq!(text, "short page");
    }

    #[test]
    fn truncate_text_prefers_word_boundary() {
        assert_eq!(truncate_text("hello world again", 13), "hello world...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[tokio::test]
    async fn rejects_non_url() {
        let tool = BrowseTool::new().unwrap();
        let use_ = ToolUse {
            tool: "browse".into(),
            args: vec!["not-a-url".into()],
            content: String::new(),
        };
        let ctx = ToolContext {
            cwd: std::env::temp_dir(),
            confirm: Arc::new(AutoConfirm),
        };
        let result = tool.execute(use_, ctx).await;
        assert!(matches!(result, Err(ToolError::InvalidInput { .. })));
    }
}
