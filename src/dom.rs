//! Small helpers over `scraper` so extraction code only deals in
//! "first match", "all matches", trimmed text and attribute values.

use scraper::{ElementRef, Selector};

use crate::config::ConfigError;

/// Compile a selector string, mapping the parse error into config space:
/// selector strings are configuration, and a bad one is a config mistake.
pub fn compile(name: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// First element under `root` matching `selector`.
#[must_use]
pub fn select_first<'a>(root: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    root.select(selector).next()
}

/// Trimmed text content of an element, `None` when empty.
#[must_use]
pub fn text_of(element: &ElementRef) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Text content preserving rough block structure, `None` when empty.
#[must_use]
pub fn block_text_of(element: &ElementRef) -> Option<String> {
    let parts: Vec<String> = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Trimmed attribute value, `None` when absent or empty.
#[must_use]
pub fn attr_of(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
