use super::{Processor, RawPayload};
use crate::error::AggregatorError;
use crate::types::PageContent;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid title selector");
    static ref NAMED_META: Selector =
        Selector::parse("meta[name]").expect("valid meta selector");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
    static ref KEYWORD_SEPARATOR: Regex = Regex::new(r"[,;]").expect("valid separator regex");
}

/// Extracts the title, meta description and meta keywords of an HTML page.
///
/// Parsing is lenient: malformed markup is repaired by the parser. A
/// document that yields neither a title nor a description is rejected as
/// invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlProcessor;

impl HtmlProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extract content from an HTML document.
    pub fn extract(&self, html: &str) -> Result<PageContent, AggregatorError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
            .unwrap_or_default();

        let mut description = String::new();
        let mut keywords = Vec::new();

        for meta in document.select(&NAMED_META) {
            let element = meta.value();
            let (Some(name), Some(content)) = (element.attr("name"), element.attr("content"))
            else {
                continue;
            };

            if name.eq_ignore_ascii_case("description") && description.is_empty() {
                description = collapse_whitespace(content);
            } else if name.eq_ignore_ascii_case("keywords") && keywords.is_empty() {
                keywords = split_keywords(content);
            }
        }

        if title.is_empty() && description.is_empty() {
            return Err(AggregatorError::process("invalid HTML"));
        }

        Ok(PageContent {
            title,
            description,
            keywords,
        })
    }
}

#[async_trait]
impl Processor for HtmlProcessor {
    async fn process(
        &self,
        cancel: &CancellationToken,
        payload: RawPayload,
    ) -> Result<PageContent, AggregatorError> {
        if cancel.is_cancelled() {
            return Err(AggregatorError::cancelled("HTML processing"));
        }
        if payload.is_empty() {
            return Err(AggregatorError::process("empty HTML"));
        }

        let html = String::from_utf8_lossy(&payload);
        self.extract(&html)
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn split_keywords(content: &str) -> Vec<String> {
    KEYWORD_SEPARATOR
        .split(content)
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .map(String::from)
        .collect()
}
