//! Fallback connector for web articles.
//!
//! Fetches the page, converts the body to markdown and produces the fields `Title`,
//! `Subtitle` (meta description), `Content` and `language`. The platform
//! is the link's host.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::Connector;
use crate::models::{Author, RawContent, SourceKind};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Elements whose content never reaches the index.
const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "noscript", "iframe", "svg"];

#[derive(Default)]
pub struct ArticleConnector;

impl ArticleConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for ArticleConnector {
    fn name(&self) -> &str {
        "article"
    }

    fn description(&self) -> &str {
        "Any web page, converted to plain text"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Article
    }

    fn matches(&self, _link: &str) -> bool {
        true
    }

    async fn fetch(&self, link: &str, author: &Author) -> Result<RawContent> {
        let url = reqwest::Url::parse(link).map_err(|e| anyhow!("invalid link '{}': {}", link, e))?;
        let platform = url.host_str().unwrap_or_default().to_string();

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("wiz-harness/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let resp = client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("fetching {} failed with status {}", link, status);
        }
        let html = resp.text().await?;
        let page = html_to_text(&html);

        Ok(RawContent::new(platform, author)
            .with_field("Title", page.title)
            .with_field("Subtitle", page.description)
            .with_field("Content", page.text)
            .with_field("language", page.language))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct PageText {
    pub title: String,
    pub description: String,
    pub language: String,
    pub text: String,
}

/// Plain text and metadata of an HTML page.
///
/// The body is converted to markdown with `htmd`, so headings, lists and
/// code spans keep their structure and every HTML entity is decoded.
pub fn html_to_text(html: &str) -> PageText {
    let lower = html.to_ascii_lowercase();

    let title = element_text(html, &lower, "title").unwrap_or_default();
    let language = tag_attr(html, &lower, "<html", "lang").unwrap_or_default();
    let description = meta_description(html, &lower).unwrap_or_default();

    PageText {
        title: inline_text(&title),
        description: inline_text(&description),
        language: language.trim().to_string(),
        text: tidy_lines(&to_markdown(html)),
    }
}

fn to_markdown(html: &str) -> String {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();
    converter.convert(html).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "markdown conversion failed, stripping tags");
        strip_tags(html)
    })
}

/// Decoded single-line text of a small fragment (title, attribute value).
fn inline_text(fragment: &str) -> String {
    let text = htmd::convert(fragment).unwrap_or_else(|_| strip_tags(fragment));
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(html: &str, lower: &str, tag: &str) -> Option<String> {
    let start = lower.find(&format!("<{}", tag))?;
    let open_end = start + lower[start..].find('>')? + 1;
    let close = open_end + lower[open_end..].find(&format!("</{}>", tag))?;
    Some(html[open_end..close].to_string())
}

fn tag_attr(html: &str, lower: &str, tag_open: &str, attr: &str) -> Option<String> {
    let start = lower.find(tag_open)?;
    let end = start + lower[start..].find('>')?;
    attr_value(&html[start..end], &lower[start..end], attr)
}

fn attr_value(tag: &str, lower_tag: &str, attr: &str) -> Option<String> {
    let key = format!("{}=", attr);
    let mut from = 0;
    while let Some(found) = lower_tag[from..].find(&key) {
        let at = from + found;
        let preceded_by_space = at == 0 || lower_tag[..at].ends_with(char::is_whitespace);
        let value_start = at + key.len();
        if preceded_by_space {
            let rest = &tag[value_start..];
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &rest[1..];
                return inner.find(quote).map(|q| inner[..q].to_string());
            }
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '/')
                .unwrap_or(rest.len());
            return Some(rest[..end].to_string());
        }
        from = value_start;
    }
    None
}

fn meta_description(html: &str, lower: &str) -> Option<String> {
    let mut from = 0;
    while let Some(found) = lower[from..].find("<meta") {
        let start = from + found;
        let end = start + lower[start..].find('>')?;
        let (tag, lower_tag) = (&html[start..end], &lower[start..end]);
        if attr_value(tag, lower_tag, "name").as_deref() == Some("description") {
            return attr_value(tag, lower_tag, "content");
        }
        from = end;
    }
    None
}

/// Last resort when `htmd` cannot parse the page: drop everything between
/// angle brackets.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Trim every line and keep at most one blank line between paragraphs.
fn tidy_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
