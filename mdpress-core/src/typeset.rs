//! Math typesetting of sanitized HTML
//!
//! The render pipeline hands its sanitized output to a [`Typesetter`] along
//! with the delimiter sets it registered. Typesetters must tolerate bad input:
//! the pipeline logs and discards any error they return.

use anyhow::Result;

/// A math delimiter pair the typesetter should recognise
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delimiter {
    pub left: &'static str,
    pub right: &'static str,
    pub display: bool,
}

/// Delimiters produced by the placeholder codec
pub const DELIMITERS: [Delimiter; 2] = [
    Delimiter {
        left: "$$",
        right: "$$",
        display: true,
    },
    Delimiter {
        left: "\\(",
        right: "\\)",
        display: false,
    },
];

/// Turns delimited math source in rendered HTML into typeset notation
pub trait Typesetter {
    fn typeset(&self, html: &str, delimiters: &[Delimiter]) -> Result<String>;
}

/// Leaves math source in place for a client-side engine to pick up
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughTypesetter;

impl Typesetter for PassthroughTypesetter {
    fn typeset(&self, html: &str, _delimiters: &[Delimiter]) -> Result<String> {
        Ok(html.to_string())
    }
}

#[cfg(feature = "math")]
pub use mathml::MathmlTypesetter;

#[cfg(feature = "math")]
mod mathml {
    use std::borrow::Cow;
    use std::collections::HashSet;
    use std::sync::LazyLock;

    use ammonia::Builder;
    use anyhow::Result;
    use log::{debug, warn};
    use pulldown_cmark_escape::escape_html_body_text;
    use pulldown_latex::{
        config::DisplayMode, config::RenderConfig, event::Content, event::Event,
        mathml::push_mathml, Parser, Storage,
    };
    use regex::Regex;

    use super::{Delimiter, Typesetter};
    use crate::placeholder::KIND_ATTRIBUTE;

    /// Tagged math elements as they come out of the sanitizer
    static MATH_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?s)<span data-math-kind="(display|inline)">(.*?)</span>"#).unwrap()
    });

    /// Elements pulldown-latex writes
    const MATHML_TAGS: [&str; 26] = [
        "math", "semantics", "annotation", "mrow", "mi", "mn", "mo", "ms", "mtext", "mspace",
        "mfrac", "msqrt", "mroot", "msub", "msup", "msubsup", "munder", "mover", "munderover",
        "mtable", "mtr", "mtd", "merror", "mstyle", "mpadded", "mphantom",
    ];

    const MATHML_ATTRIBUTES: [&str; 16] = [
        "class",
        "display",
        "displaystyle",
        "encoding",
        "height",
        "largeop",
        "linethickness",
        "mathvariant",
        "maxsize",
        "minsize",
        "movablelimits",
        "scriptlevel",
        "stretchy",
        "style",
        "symmetric",
        "width",
    ];

    const STYLE_PROPERTIES: [&str; 6] = [
        "background-color",
        "border",
        "border-color",
        "color",
        "height",
        "margin-left",
    ];

    /// Renders tagged math spans to MathML with pulldown-latex.
    ///
    /// A span that fails to parse is left as-is, delimiters and all, and the
    /// error is logged. Rendered MathML runs through its own allow-list
    /// before it is spliced in, since it is produced after the document was
    /// sanitized.
    #[derive(Debug)]
    pub struct MathmlTypesetter {
        sanitizer: Builder<'static>,
    }

    impl Default for MathmlTypesetter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MathmlTypesetter {
        pub fn new() -> Self {
            let mut sanitizer = Builder::empty();
            sanitizer
                .add_tags(MATHML_TAGS)
                .add_generic_attributes(MATHML_ATTRIBUTES)
                .filter_style_properties(HashSet::from(STYLE_PROPERTIES));
            Self { sanitizer }
        }
    }

    impl Typesetter for MathmlTypesetter {
        fn typeset(&self, html: &str, delimiters: &[Delimiter]) -> Result<String> {
            let mut out = String::with_capacity(html.len());
            let mut last = 0;
            let mut rendered = 0usize;

            for caps in MATH_SPAN_RE.captures_iter(html) {
                let (Some(whole), Some(kind), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                let display = kind.as_str() == "display";
                let Some(latex) = strip_delimiters(body.as_str(), display, delimiters) else {
                    continue;
                };

                match render_mathml(&unescape_html(latex), display) {
                    Ok(mathml) => {
                        let mathml = self.sanitizer.clean(&mathml);
                        out.push_str(&html[last..whole.start()]);
                        out.push_str(&format!(
                            r#"<span {KIND_ATTRIBUTE}="{}">{mathml}</span>"#,
                            kind.as_str()
                        ));
                        last = whole.end();
                        rendered += 1;
                    }
                    Err(message) => {
                        warn!("typeset: leaving {} math as source: {message}", kind.as_str());
                    }
                }
            }

            out.push_str(&html[last..]);
            debug!("typeset: rendered {rendered} math span(s) to MathML");
            Ok(out)
        }
    }

    /// Strip the registered delimiters of the given kind. Spans holding markup
    /// rather than plain text were not produced by the codec and are skipped.
    fn strip_delimiters<'a>(
        body: &'a str,
        display: bool,
        delimiters: &[Delimiter],
    ) -> Option<&'a str> {
        if body.contains('<') {
            return None;
        }
        delimiters
            .iter()
            .filter(|d| d.display == display)
            .find_map(|d| body.strip_prefix(d.left)?.strip_suffix(d.right))
    }

    /// Undo the escaping the sanitizer's serializer applies to text nodes.
    fn unescape_html(text: &str) -> Cow<'_, str> {
        if !text.contains('&') {
            return Cow::Borrowed(text);
        }
        Cow::Owned(
            text.replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&quot;", "\"")
                .replace("&#39;", "'")
                .replace("&nbsp;", "\u{a0}")
                .replace("&amp;", "&"),
        )
    }

    /// Escaped copy of the text carried by `\text{}`, `\operatorname{}` and
    /// numbers; pulldown-latex writes these into the MathML as they are.
    fn escaped_text(event: &Event<'_>) -> Option<String> {
        let Event::Content(Content::Text(text) | Content::Number(text) | Content::Function(text)) =
            event
        else {
            return None;
        };
        if !text.contains(['<', '>', '&']) {
            return None;
        }
        let mut escaped = String::with_capacity(text.len());
        // Writing to a String cannot fail
        let _ = escape_html_body_text(&mut escaped, text);
        Some(escaped)
    }

    fn with_text<'a>(content: Content<'a>, text: &'a str) -> Content<'a> {
        match content {
            Content::Text(_) => Content::Text(text),
            Content::Number(_) => Content::Number(text),
            Content::Function(_) => Content::Function(text),
            other => other,
        }
    }

    fn render_mathml(latex: &str, display: bool) -> std::result::Result<String, String> {
        let storage = Storage::new();
        let parser = Parser::new(latex, &storage);
        let config = RenderConfig {
            display_mode: if display {
                DisplayMode::Block
            } else {
                DisplayMode::Inline
            },
            ..Default::default()
        };

        let events: Vec<_> = parser.collect();
        let errors: Vec<String> = events
            .iter()
            .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
            .collect();
        if !errors.is_empty() {
            return Err(errors.join("; "));
        }

        let escaped: Vec<Option<String>> = events
            .iter()
            .map(|event| event.as_ref().ok().and_then(escaped_text))
            .collect();
        let events = events
            .into_iter()
            .zip(&escaped)
            .map(|(event, escaped)| match (event, escaped) {
                (Ok(Event::Content(content)), Some(text)) => {
                    Ok(Event::Content(with_text(content, text)))
                }
                (event, _) => event,
            });

        let mut mathml = String::new();
        push_mathml(&mut mathml, events, config).map_err(|e| e.to_string())?;
        Ok(mathml)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::typeset::DELIMITERS;

        fn typeset(html: &str) -> String {
            MathmlTypesetter::new().typeset(html, &DELIMITERS).unwrap()
        }

        #[test]
        fn test_inline_to_mathml() {
            let out = typeset(r#"<p>a <span data-math-kind="inline">\(x^2\)</span> b</p>"#);
            assert!(out.starts_with(r#"<p>a <span data-math-kind="inline"><math"#));
            assert!(out.contains("</math>"));
            assert!(out.ends_with("</span> b</p>"));
            assert!(!out.contains("\\("));
        }

        #[test]
        fn test_display_to_mathml() {
            let out = typeset("<span data-math-kind=\"display\">$$\n\\frac{a}{b}\n$$</span>");
            assert!(out.contains("<mfrac"));
            assert!(!out.contains("$$"));
        }

        #[test]
        fn test_escaped_source_is_unescaped() {
            let out = typeset(r#"<span data-math-kind="inline">\(a &lt; b\)</span>"#);
            assert!(out.contains("<math"));
            assert!(out.contains("&lt;"));
            assert!(!out.contains("<<"));
        }

        #[test]
        fn test_text_argument_cannot_inject_markup() {
            let out = typeset(
                r#"<span data-math-kind="inline">\(\text{&lt;img src=x onerror=alert(1)&gt;}\)</span>"#,
            );
            assert!(out.contains("<math"), "{out}");
            assert!(!out.contains("<img"), "{out}");
            assert!(out.contains("&lt;img"), "{out}");
        }

        #[test]
        fn test_operator_name_cannot_inject_markup() {
            let out = typeset(
                r#"<span data-math-kind="inline">\(\operatorname{&lt;b&gt;x&lt;/b&gt;}\)</span>"#,
            );
            assert!(!out.contains("<b>"), "{out}");
        }

        #[test]
        fn test_rendered_mathml_keeps_its_structure() {
            let out = typeset("<span data-math-kind=\"display\">$$\\frac{a}{b}$$</span>");
            assert!(out.contains("</mfrac>"), "{out}");
            assert!(out.contains(r#"display="block""#), "{out}");
        }

        #[test]
        fn test_invalid_latex_left_as_source() {
            let html = r#"<p><span data-math-kind="inline">\(\frac{a\)</span> and <span data-math-kind="inline">\(y\)</span></p>"#;
            let out = typeset(html);
            assert!(out.contains(r#"<span data-math-kind="inline">\(\frac{a\)</span>"#));
            assert_eq!(out.matches("<math").count(), 1);
        }

        #[test]
        fn test_wrong_delimiters_skipped() {
            let html = r#"<span data-math-kind="display">\(x\)</span>"#;
            assert_eq!(typeset(html), html);
        }

        #[test]
        fn test_markup_inside_span_skipped() {
            let html = r#"<span data-math-kind="inline">\(<b>x</b>\)</span>"#;
            assert_eq!(typeset(html), html);
        }

        #[test]
        fn test_unescape_html() {
            assert_eq!(unescape_html("a &amp;lt; b"), "a &lt; b");
            assert_eq!(unescape_html("x &gt; y"), "x > y");
            assert!(matches!(unescape_html("plain"), Cow::Borrowed(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_keeps_source() {
        let html = r#"<span data-math-kind="inline">\(x\)</span>"#;
        assert_eq!(PassthroughTypesetter.typeset(html, &DELIMITERS).unwrap(), html);
    }

    #[test]
    fn test_delimiters_cover_both_kinds() {
        assert!(DELIMITERS.iter().any(|d| d.display && d.left == "$$"));
        assert!(DELIMITERS.iter().any(|d| !d.display && d.left == "\\("));
    }
}
