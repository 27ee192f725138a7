//! Storage seams for the sweep: the link table and the page content store.
//!
//! The sweep core never talks to the wiki directly; it goes through these
//! traits so the production MediaWiki client and the in-memory test doubles
//! are interchangeable.

use anyhow::Result;

/// One stored outbound link: owning page id and destination URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub page_id: i64,
    pub target_url: String,
}

/// Current content of a page as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub page_id: i64,
    pub title: String,
    pub is_redirect: bool,
    pub text: String,
}

/// Attribution and visibility settings for a saved revision.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub summary: String,
    pub author: String,
    pub suppress_recent_changes: bool,
}

/// Yields the ordered set of stored external links.
pub trait LinkSource {
    fn external_links(&mut self) -> Result<Vec<LinkRecord>>;
}

/// Read and write access to page content.
pub trait ContentStore {
    fn page_by_id(&mut self, page_id: i64) -> Result<Option<PageDocument>>;
    fn page_by_title(&mut self, title: &str) -> Result<Option<PageDocument>>;
    fn save_text(&mut self, page: &PageDocument, text: &str, options: &SaveOptions) -> Result<()>;
}

/// Extract the target title from redirect wikitext (`#REDIRECT [[Target]]`).
///
/// Tolerates leading whitespace, lowercase keywords, and a piped link label;
/// returns `None` when the text is not a well-formed redirect.
pub fn redirect_target(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    let rest = strip_prefix_ignore_case(trimmed, "#REDIRECT")?;
    let rest = rest.trim_start_matches([' ', ':']).trim_start();
    let rest = rest.strip_prefix("[[")?;
    let end = rest.find("]]")?;
    let inner = &rest[..end];
    let target = inner.split('|').next().unwrap_or(inner);
    let target = target.split('#').next().unwrap_or(target);
    let target = target.replace('_', " ").trim().to_string();
    if target.is_empty() { None } else { Some(target) }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}
