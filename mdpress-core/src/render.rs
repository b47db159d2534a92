//! Markdown to sanitized HTML, with math protected from the parser
//!
//! Pipeline, in order: extract math placeholders, parse with pulldown-cmark
//! (restoring placeholders as the events go by), sanitize with ammonia,
//! typeset.

use std::borrow::Cow;
use std::time::Instant;

use ammonia::Builder;
use log::{debug, warn};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use pulldown_cmark_escape::escape_html_body_text;

use crate::doc::DocumentStats;
use crate::placeholder::{self, MathPlaceholder, KIND_ATTRIBUTE};
use crate::typeset::{PassthroughTypesetter, Typesetter, DELIMITERS};

/// Output of one render pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderResult {
    /// Sanitized, typeset HTML; safe to insert into the preview
    pub html: String,
    /// Counts computed from the raw text
    pub stats: DocumentStats,
}

/// Parser options: GitHub-flavoured extensions
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

/// Parse marker-protected Markdown to HTML, putting math back on the way.
/// Soft line breaks are rendered as `<br />`.
///
/// Markers in running text and raw HTML become tagged math elements. Where
/// the parser only carries plain text (code, image alt text, link
/// destinations and titles) the original delimited source goes back instead.
pub fn markdown_to_html(markdown: &str, placeholders: &[MathPlaceholder]) -> String {
    let source = |text| plain_source(text, placeholders);
    let mut in_code_block = false;
    let mut image_depth = 0usize;

    let parser = TextMergeStream::new(Parser::new_ext(markdown, parser_options()));
    let events = parser.map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        Event::Start(Tag::CodeBlock(kind)) => {
            in_code_block = true;
            Event::Start(Tag::CodeBlock(kind))
        }
        Event::End(TagEnd::CodeBlock) => {
            in_code_block = false;
            event
        }
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            image_depth += 1;
            Event::Start(Tag::Image {
                link_type,
                dest_url: source(dest_url),
                title: source(title),
                id,
            })
        }
        Event::End(TagEnd::Image) => {
            image_depth = image_depth.saturating_sub(1);
            event
        }
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: source(dest_url),
            title: source(title),
            id,
        }),
        Event::Code(code) => Event::Code(source(code)),
        Event::Text(text) if in_code_block || image_depth > 0 => Event::Text(source(text)),
        Event::Text(text) if placeholder::has_marker(&text, placeholders) => {
            let mut escaped = String::with_capacity(text.len());
            // Writing to a String cannot fail
            let _ = escape_html_body_text(&mut escaped, &text);
            Event::InlineHtml(placeholder::restore(&escaped, placeholders).into())
        }
        Event::Html(html) => Event::Html(placeholder::restore(&html, placeholders).into()),
        Event::InlineHtml(html) => {
            Event::InlineHtml(placeholder::restore(&html, placeholders).into())
        }
        other => other,
    });

    let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut html_output, events);
    html_output
}

fn plain_source<'a>(text: CowStr<'a>, placeholders: &[MathPlaceholder]) -> CowStr<'a> {
    let restored = match placeholder::restore_source(&text, placeholders) {
        Cow::Owned(restored) => Some(restored),
        Cow::Borrowed(_) => None,
    };
    restored.map_or(text, CowStr::from)
}

/// Sanitizer policy: ammonia's defaults plus the math kind attribute on `span`
pub fn sanitizer() -> Builder<'static> {
    let mut builder = Builder::default();
    builder.add_tag_attributes("span", &[KIND_ATTRIBUTE]);
    builder
}

/// Render pipeline
pub struct Renderer {
    sanitizer: Builder<'static>,
    typesetter: Box<dyn Typesetter>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Renderer with the default typesetter: MathML when the `math` feature
    /// is enabled, otherwise math is left for a client-side engine.
    pub fn new() -> Self {
        #[cfg(feature = "math")]
        let typesetter: Box<dyn Typesetter> = Box::new(crate::typeset::MathmlTypesetter::new());
        #[cfg(not(feature = "math"))]
        let typesetter: Box<dyn Typesetter> = Box::new(PassthroughTypesetter);
        Self::with_typesetter(typesetter)
    }

    /// Renderer that leaves math source in the tagged spans
    pub fn passthrough() -> Self {
        Self::with_typesetter(Box::new(PassthroughTypesetter))
    }

    pub fn with_typesetter(typesetter: Box<dyn Typesetter>) -> Self {
        Self {
            sanitizer: sanitizer(),
            typesetter,
        }
    }

    /// Render raw Markdown to safe HTML.
    ///
    /// Typesetting errors are logged and the untypeset (still sanitized)
    /// HTML is returned in their place.
    pub fn render(&self, raw: &str) -> RenderResult {
        let start = Instant::now();

        let extracted = placeholder::extract(raw);
        let parsed = markdown_to_html(&extracted.text, &extracted.placeholders);
        let sanitized = self.sanitizer.clean(&parsed).to_string();

        let html = match self.typesetter.typeset(&sanitized, &DELIMITERS) {
            Ok(html) => html,
            Err(e) => {
                warn!("render: typesetting failed, showing math source: {e:#}");
                sanitized
            }
        };

        debug!(
            "render: completed in {:.1}ms (input: {} bytes, math spans: {}, output: {} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            raw.len(),
            extracted.placeholders.len(),
            html.len()
        );

        RenderResult {
            html,
            stats: DocumentStats::of(raw),
        }
    }
}
