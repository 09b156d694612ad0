//! Fixed-token template substitution.
//!
//! Placeholders look like `{{ token }}`, where `token` is made of ASCII letters,
//! digits, hyphens and underscores. There are no conditionals, loops or filters.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The only token inserted verbatim. It carries HTML that has been sanitized already.
pub const BODY_TOKEN: &str = "body";

lazy_static::lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\{\{\s*([a-zA-Z0-9_\-]+)\s*\}\}").expect("valid token pattern");
}

/// A scalar value available to templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    /// `true` or `false`.
    Bool(bool),
    /// Integer or floating point number.
    Number(serde_json::Number),
    /// Arbitrary text, escaped on substitution.
    Text(String),
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Number(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Token name to value mapping used during rendering.
pub type TemplateContext = HashMap<String, TemplateValue>;

/// Escapes the five characters significant in HTML text and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Replaces every `{{ token }}` in `template` with its value from `context`.
///
/// Values are HTML-escaped, except for [`BODY_TOKEN`]. Tokens missing from the
/// context become empty strings.
pub fn substitute(template: &str, context: &TemplateContext) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            let token = &caps[1];
            match context.get(token) {
                None => String::new(),
                Some(value) if token == BODY_TOKEN => value.to_string(),
                Some(value) => escape_html(&value.to_string()),
            }
        })
        .into_owned()
}

/// Whether `template` has at least one `{{ token }}` placeholder named `name`.
pub fn has_token(template: &str, name: &str) -> bool {
    TOKEN.captures_iter(template).any(|caps| &caps[1] == name)
}
