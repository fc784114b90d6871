//! Recovering JSON documents from model output.
//!
//! Models asked for "only JSON" still wrap it in code fences, prefix it with
//! prose, or leave comments and trailing commas in it. Each [`TryParse`]
//! strategy handles one of those habits; [`parse_with_repair`] runs them in
//! order and stops at the first one that yields a valid document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

/// One way of turning model output into a `T`.
pub trait TryParse<T> {
    fn name(&self) -> &'static str;

    fn try_parse(&self, text: &str) -> Option<T>;
}

/// The whole text is the document.
pub struct DirectParse;

/// The first fenced code block holding an object.
pub struct FencedBlock;

/// The first balanced `{...}` span that parses after cleaning.
pub struct BalancedBraces;

/// The whole text with comments and trailing commas removed.
pub struct CleanedRaw;

impl<T: DeserializeOwned> TryParse<T> for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn try_parse(&self, text: &str) -> Option<T> {
        serde_json::from_str(text.trim()).ok()
    }
}

impl<T: DeserializeOwned> TryParse<T> for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn try_parse(&self, text: &str) -> Option<T> {
        let block = FENCED_BLOCK.captures(text)?.get(1)?.as_str();
        serde_json::from_str(&clean_json(block)).ok()
    }
}

impl<T: DeserializeOwned> TryParse<T> for BalancedBraces {
    fn name(&self) -> &'static str {
        "balanced_braces"
    }

    fn try_parse(&self, text: &str) -> Option<T> {
        balanced_spans(text).find_map(|span| serde_json::from_str(&clean_json(span)).ok())
    }
}

impl<T: DeserializeOwned> TryParse<T> for CleanedRaw {
    fn name(&self) -> &'static str {
        "cleaned_raw"
    }

    fn try_parse(&self, text: &str) -> Option<T> {
        serde_json::from_str(&clean_json(text)).ok()
    }
}

/// Try every strategy in order and return the first success.
pub fn parse_with_repair<T: DeserializeOwned>(text: &str) -> Option<T> {
    let strategies: [&dyn TryParse<T>; 4] = [&DirectParse, &FencedBlock, &BalancedBraces, &CleanedRaw];
    strategies.iter().find_map(|strategy| {
        let parsed = strategy.try_parse(text);
        if parsed.is_some() {
            debug!(strategy = strategy.name(), "Parsed model output");
        }
        parsed
    })
}

/// Top-level `{...}` spans in order of appearance. Braces inside string
/// literals are ignored.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if depth > 0 && in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    spans.into_iter()
}

/// Strip `/* */` and `//` comments and trailing commas.
///
/// One pass over the text that tracks string literals, so comment markers
/// and `, }` inside values are left alone.
pub fn clean_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    // Byte offset in `out` of a comma that may turn out to be trailing.
    let mut pending_comma: Option<usize> = None;

    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        match c {
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ',' => {
                pending_comma = Some(out.len());
                out.push(c);
            }
            '}' | ']' => {
                if let Some(at) = pending_comma.take() {
                    out.remove(at);
                }
                out.push(c);
            }
            _ if c.is_whitespace() => out.push(c),
            _ => {
                if c == '"' {
                    in_string = true;
                }
                pending_comma = None;
                out.push(c);
            }
        }
    }

    out.trim().to_string()
}
