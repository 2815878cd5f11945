//! Web tools
//!
//! `web_fetch` downloads a page and reduces it to readable text;
//! `web_search` scrapes an HTML search results page. Both frame their output
//! with the source URLs and an instruction to cite them.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use sdk::{EngineError, Tool, ToolInput};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::context::ToolContext;

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_LIMIT: usize = 20;

const FETCH_CITATION: &str =
    "IMPORTANT: If you use information from this page, cite it as the source with its URL.";
const SEARCH_CITATION: &str =
    "IMPORTANT: If you use any of these results, cite the URL of each source you rely on.";

struct HtmlPatterns {
    script_style: Regex,
    block_end: Regex,
    tag: Regex,
    numeric_entity: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        script_style: Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
            .expect("Invalid script pattern"),
        block_end: Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|section|article|header|footer|pre|blockquote)\s*>")
            .expect("Invalid block pattern"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("Invalid tag pattern"),
        numeric_entity: Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("Invalid entity pattern"),
        spaces: Regex::new(r"[ \t\u{a0}]+").expect("Invalid whitespace pattern"),
        blank_lines: Regex::new(r"\n{3,}").expect("Invalid newline pattern"),
    })
}

/// Reduce an HTML document to plain text.
pub fn html_to_text(html: &str) -> String {
    let p = html_patterns();
    let text = p.script_style.replace_all(html, " ");
    let text = p.block_end.replace_all(&text, "\n");
    let text = p.tag.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = p.spaces.replace_all(&text, " ");

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    p.blank_lines.replace_all(joined.trim(), "\n\n").into_owned()
}

fn decode_entities(text: &str) -> String {
    let numeric = html_patterns().numeric_entity.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so "&amp;lt;" stays "&lt;"
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!(
            "{}\n\n[Content truncated at {} characters]",
            &text[..cut],
            max
        ),
        None => text.to_string(),
    }
}

fn parse_http_url(raw: &str) -> Result<Url, EngineError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| EngineError::InvalidArguments(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EngineError::InvalidArguments(format!(
            "Unsupported URL scheme '{}'",
            other
        ))),
    }
}

async fn get_text(ctx: &ToolContext, request: reqwest::RequestBuilder) -> Result<(String, bool), EngineError> {
    let response = request
        .timeout(ctx.settings.web_timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout(ctx.settings.web_timeout.as_secs())
            } else {
                EngineError::Http(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        warn!("HTTP {} from {}", status, response.url());
        return Err(EngineError::Http(format!("{} for {}", status, response.url())));
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("html"));
    let body = response
        .text()
        .await
        .map_err(|e| EngineError::Http(format!("Failed to read body: {}", e)))?;
    Ok((body, is_html))
}

// ---------------------------------------------------------------------------
// web_fetch
// ---------------------------------------------------------------------------

pub struct WebFetchTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct WebFetchArgs {
    url: String,
}

impl WebFetchTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) and return its readable text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute http(s) URL"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: WebFetchArgs = input.parse()?;
        let url = parse_http_url(&args.url)?;
        info!("Fetching {}", url);

        let (body, is_html) = get_text(&self.ctx, self.ctx.http.get(url.clone())).await?;
        let text = if is_html || body.trim_start().starts_with('<') {
            html_to_text(&body)
        } else {
            body.trim().to_string()
        };
        debug!("Fetched {} chars of text from {}", text.len(), url);

        let text = truncate_chars(&text, self.ctx.settings.max_fetch_chars);
        Ok(format!("Source: {}\n\n{}\n\n---\n{}", url, text, FETCH_CITATION))
    }
}

// ---------------------------------------------------------------------------
// web_search
// ---------------------------------------------------------------------------

pub struct WebSearchTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

struct ResultPatterns {
    anchor: Regex,
    href: Regex,
    snippet: Regex,
}

fn result_patterns() -> &'static ResultPatterns {
    static PATTERNS: OnceLock<ResultPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ResultPatterns {
        anchor: Regex::new(r#"(?is)<a\b([^>]*\bclass="[^"]*\bresult__a\b[^"]*"[^>]*)>(.*?)</a>"#)
            .expect("Invalid result pattern"),
        href: Regex::new(r#"(?i)\bhref="([^"]*)""#).expect("Invalid href pattern"),
        snippet: Regex::new(
            r#"(?is)<(?:a|td|div|span)\b[^>]*\bclass="[^"]*\bresult__snippet\b[^"]*"[^>]*>(.*?)</(?:a|td|div|span)>"#,
        )
        .expect("Invalid snippet pattern"),
    })
}

/// Unwrap search-engine redirect links to the target URL.
fn clean_result_url(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    };

    if let Ok(url) = Url::parse(&absolute) {
        if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
            return target.into_owned();
        }
    }
    absolute
}

/// Extract results from a DuckDuckGo-style HTML results page.
pub fn parse_search_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let p = result_patterns();
    let snippets: Vec<String> = p
        .snippet
        .captures_iter(html)
        .map(|c| html_to_text(&c[1]))
        .collect();

    p.anchor
        .captures_iter(html)
        .filter_map(|c| {
            let href = p.href.captures(&c[1])?;
            Some((clean_result_url(&href[1]), html_to_text(&c[2])))
        })
        .enumerate()
        .map(|(i, (url, title))| SearchResult {
            title,
            url,
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .take(limit)
        .collect()
}

impl WebSearchTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results with title, URL and snippet."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "max_results": {
                    "type": "integer",
                    "description": format!("Number of results (default {})", DEFAULT_MAX_RESULTS)
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: WebSearchArgs = input.parse()?;
        if args.query.trim().is_empty() {
            return Err(EngineError::InvalidArguments("query must not be empty".into()));
        }
        let limit = args
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);

        let endpoint = parse_http_url(&self.ctx.settings.search_url)?;
        info!("Searching the web for '{}'", args.query);

        let request = self.ctx.http.get(endpoint).query(&[("q", args.query.as_str())]);
        let (body, _) = get_text(&self.ctx, request).await?;

        let results = parse_search_results(&body, limit);
        if results.is_empty() {
            return Ok(format!("No results found for '{}'", args.query));
        }

        let mut out = format!("Search results for '{}':\n", args.query);
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("\n{}. {}\n   URL: {}\n", i + 1, r.title, r.url));
            if !r.snippet.is_empty() {
                out.push_str(&format!("   {}\n", r.snippet));
            }
        }
        out.push_str(&format!("\n---\n{}", SEARCH_CITATION));
        Ok(out)
    }
}
