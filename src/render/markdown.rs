//! Markdown to sanitized HTML.

use pulldown_cmark::{html, Options, Parser};
use std::collections::{HashMap, HashSet};

const ALLOWED_TAGS: &[&str] = &[
    "address", "article", "aside", "footer", "header", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "main", "nav", "section", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "hr", "li", "ol", "p", "pre", "ul", "a", "abbr", "b", "bdi", "bdo", "br", "cite",
    "code", "data", "dfn", "em", "i", "kbd", "mark", "q", "s", "samp", "small", "span",
    "strong", "sub", "sup", "time", "u", "var", "wbr", "caption", "col", "colgroup", "table",
    "tbody", "td", "tfoot", "th", "thead", "tr", "del", "img",
];

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "data"];

/// Strips the indentation shared by every non-blank line.
///
/// Bodies written as indented string literals would otherwise be parsed
/// as code blocks.
pub fn dedent(source: &str) -> String {
    let indent = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return source.to_string();
    }
    source
        .lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitizer() -> ammonia::Builder<'static> {
    let mut tag_attributes = HashMap::new();
    tag_attributes.insert("a", HashSet::from(["href", "name", "target", "title"]));
    tag_attributes.insert("img", HashSet::from(["src", "alt", "title", "width", "height"]));
    tag_attributes.insert("ol", HashSet::from(["start"]));
    tag_attributes.insert("td", HashSet::from(["align"]));
    tag_attributes.insert("th", HashSet::from(["align"]));

    let mut builder = ammonia::Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .url_schemes(ALLOWED_SCHEMES.iter().copied().collect());
    builder
}

/// Renders markdown and drops every tag, attribute and URL scheme not on the allow-list.
///
/// Malformed markdown degrades to literal text, this never fails.
pub fn render_markdown(source: &str) -> String {
    let source = dedent(source);
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut raw = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut raw, Parser::new_ext(&source, options));
    sanitizer().clean(&raw).to_string()
}
