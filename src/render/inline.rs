use super::template::{substitute, TemplateContext, TemplateValue, BODY_TOKEN};
use super::RenderError;

const PLAIN_TEXT_WIDTH: usize = 130;

const WRAPPER_CLASS: &str = "pgm-body";

const WRAPPER_STYLE: &str = "font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,'Helvetica Neue',Arial,sans-serif;\
color:#111827;font-size:16px;line-height:1.5;";

const RESET_RULES: &str = ".pgm-body h1, .pgm-body h2, .pgm-body h3, .pgm-body h4 { margin:0 0 12px; line-height:1.25; color:#111827; }\
.pgm-body p { margin:0 0 12px; }\
.pgm-body ul, .pgm-body ol { margin:0 0 12px; padding-left:24px; }\
.pgm-body li { margin:0 0 4px; }\
.pgm-body a { color:#2545e0; text-decoration:underline; }\
.pgm-body img { max-width:100%; height:auto; border:0; }";

/// Wraps a sanitized fragment into the page `template` and inlines all CSS.
///
/// `context` supplies the other tokens of the page. Its `body` entry, if any,
/// is replaced by the wrapped fragment.
pub fn wrap_for_email(
    body_html: &str,
    template: &str,
    context: &TemplateContext,
) -> Result<String, RenderError> {
    let wrapped = format!(
        r#"<div class="{WRAPPER_CLASS}" style="{WRAPPER_STYLE}"><style>{RESET_RULES}</style>{body_html}</div>"#
    );
    let mut context = context.clone();
    context.insert(BODY_TOKEN.to_string(), TemplateValue::Text(wrapped));
    inline_css(&substitute(template, &context))
}

/// Moves every `<style>` rule onto the matching elements' `style` attributes.
///
/// Remote stylesheets are never fetched.
pub fn inline_css(html: &str) -> Result<String, RenderError> {
    let inliner = css_inline::CSSInliner::options()
        .load_remote_stylesheets(false)
        .build();
    inliner
        .inline(html)
        .map_err(|e| RenderError::Inline(e.to_string()))
}

/// Plain text fallback wrapped at 130 columns.
pub fn to_plain_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), PLAIN_TEXT_WIDTH)
}
