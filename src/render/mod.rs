//! Content rendering.
//!
//! Turns the optional `markdown`, `html`, `text` and `template` parts of a
//! notification into the final HTML and plain-text bodies. Nothing here does
//! I/O and the same input always renders to the same output.

mod inline;
mod markdown;
mod template;

pub use inline::{inline_css, to_plain_text, wrap_for_email};
pub use markdown::{dedent, render_markdown};
pub use template::{escape_html, has_token, substitute, TemplateContext, TemplateValue, BODY_TOKEN};

/// Footer used when neither configuration nor template data provide one.
pub const DEFAULT_FOOTER: &str = "If you did not ask for this, ignore it.";

/// Page shell used for markdown bodies when no template is given.
pub const DEFAULT_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <style>
    body { margin:0; padding:0; background:#f4f6f8; font-family:-apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif; }
    .page { width:100%; padding:30px 0; }
    .sheet { max-width:600px; margin:0 auto; background:#ffffff; border-radius:6px; }
    .logo { padding:24px; text-align:center; }
    .main { padding:24px; }
    .btn { display:inline-block; padding:12px 20px; background:#2545e0; color:#ffffff; text-decoration:none; border-radius:6px; font-weight:600; }
    .footer { padding:18px; font-size:13px; color:#6b7280; text-align:center; }
  </style>
</head>
<body>
  <table class="page" width="100%" cellpadding="0" cellspacing="0" role="presentation">
    <tr>
      <td align="center">
        <table class="sheet" width="600" cellpadding="0" cellspacing="0" role="presentation">
          <tr><td class="logo"><img src="{{logoUrl}}" width="140" alt="Logo" style="display:block;margin:0 auto;"/></td></tr>
          <tr><td class="main">{{body}}</td></tr>
          <tr><td class="footer">{{footerText}}</td></tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const LOGO_URL_TOKEN: &str = "logoUrl";
const FOOTER_TOKEN: &str = "footerText";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RenderError {
    /// The page template cannot carry the rendered body.
    #[error("template: {0}")]
    Template(String),

    /// CSS could not be inlined.
    #[error("css inlining: {0}")]
    Inline(String),

    /// There is nothing to send.
    #[error("message has neither markdown, html, text nor template")]
    Empty,
}

/// Source parts of a message, all optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct Content<'a> {
    pub markdown: Option<&'a str>,
    pub html: Option<&'a str>,
    pub text: Option<&'a str>,
    pub template: Option<&'a str>,
    pub data: Option<&'a TemplateContext>,
}

/// Final bodies of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// `None` for text-only messages.
    pub html: Option<String>,
    pub text: String,
}

/// Renders [`Content`] using the process-wide defaults for the page tokens.
#[derive(Debug, Clone)]
pub struct Renderer {
    logo_url: String,
    footer_text: String,
    template: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new("", DEFAULT_FOOTER)
    }
}

impl Renderer {
    pub fn new<L, F>(logo_url: L, footer_text: F) -> Self
    where
        L: Into<String>,
        F: Into<String>,
    {
        Self {
            logo_url: logo_url.into(),
            footer_text: footer_text.into(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Use another page shell for markdown bodies that do not bring their own.
    pub fn with_template<T>(mut self, template: T) -> Self
    where
        T: Into<String>,
    {
        self.template = template.into();
        self
    }

    fn context(&self, data: Option<&TemplateContext>) -> TemplateContext {
        let mut context = TemplateContext::new();
        context.insert(LOGO_URL_TOKEN.to_string(), self.logo_url.as_str().into());
        context.insert(FOOTER_TOKEN.to_string(), self.footer_text.as_str().into());
        if let Some(data) = data {
            context.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        context.remove(BODY_TOKEN);
        context
    }

    /// Produces the HTML and text bodies.
    ///
    /// Markdown wins over `html`, which wins over a bare `template`. A message
    /// with only `text` renders to a text-only message.
    pub fn render(&self, content: &Content<'_>) -> Result<Rendered, RenderError> {
        if let Some(source) = content.markdown {
            let template = content.template.unwrap_or(&self.template);
            if !has_token(template, BODY_TOKEN) {
                return Err(RenderError::Template(format!(
                    "no {{{{{}}}}} placeholder for the markdown body",
                    BODY_TOKEN
                )));
            }
            let body = render_markdown(source);
            let html = wrap_for_email(&body, template, &self.context(content.data))?;
            let text = to_plain_text(&html);
            return Ok(Rendered {
                html: Some(html),
                text,
            });
        }

        match (content.html, content.text, content.template) {
            (Some(html), None, _) => {
                let html = inline_css(html)?;
                let text = to_plain_text(&html);
                Ok(Rendered {
                    html: Some(html),
                    text,
                })
            }
            (Some(html), Some(text), _) => Ok(Rendered {
                html: Some(html.to_string()),
                text: text.to_string(),
            }),
            (None, text, Some(template)) => {
                let mut context = self.context(content.data);
                context.insert(BODY_TOKEN.to_string(), TemplateValue::Text(String::new()));
                let html = inline_css(&substitute(template, &context))?;
                let text = match text {
                    Some(text) => text.to_string(),
                    None => to_plain_text(&html),
                };
                Ok(Rendered {
                    html: Some(html),
                    text,
                })
            }
            (None, Some(text), None) => Ok(Rendered {
                html: None,
                text: text.to_string(),
            }),
            (None, None, None) => Err(RenderError::Empty),
        }
    }
}
