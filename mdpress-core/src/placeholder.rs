//! Math placeholder codec
//!
//! Math spans are swapped for plain alphanumeric markers before the Markdown
//! parser runs, so `_`, `*` and backslashes inside `$$ … $$` or `\( … \)`
//! reach the typesetter untouched. A marker is ordinary inline text to the
//! parser: it cannot open an HTML block or end a paragraph. After parsing,
//! each marker is replaced by a `<span data-math-kind="…">` element carrying
//! the original source, or by the source itself where the parser expects
//! plain text.
//!
//! Scanning is a single forward pass. Code spans, fenced code blocks and
//! indented code blocks are copied verbatim; an opener with no closer is left
//! as literal text.

use std::borrow::Cow;

use pulldown_cmark_escape::escape_html;

/// Attribute carried by restored math elements; the sanitizer allow-list
/// must include it on `span`.
pub const KIND_ATTRIBUTE: &str = "data-math-kind";

/// Kind of a math span
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathKind {
    /// `$$ … $$`
    Display,
    /// `\( … \)`
    Inline,
}

impl MathKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MathKind::Display => "display",
            MathKind::Inline => "inline",
        }
    }

    /// Letter closing the id in a marker
    fn marker_suffix(self) -> char {
        match self {
            MathKind::Display => 'd',
            MathKind::Inline => 'i',
        }
    }

    /// Opening and closing delimiter
    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            MathKind::Display => ("$$", "$$"),
            MathKind::Inline => ("\\(", "\\)"),
        }
    }
}

/// A math span lifted out of the source for one render pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MathPlaceholder {
    pub id: usize,
    pub kind: MathKind,
    /// Exact source between the delimiters
    pub content: String,
    marker: String,
}

impl MathPlaceholder {
    /// The token standing in for this span in the protected text
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The span as written, delimiters included
    pub fn source(&self) -> String {
        let (open, close) = self.kind.delimiters();
        format!("{open}{}{close}", self.content)
    }

    /// Tagged element that replaces the marker in rendered HTML
    pub fn element(&self) -> String {
        let (open, close) = self.kind.delimiters();
        let mut out = format!(r#"<span {KIND_ATTRIBUTE}="{}">"#, self.kind.as_str());
        out.push_str(open);
        // Writing to a String cannot fail
        let _ = escape_html(&mut out, &self.content);
        out.push_str(close);
        out.push_str("</span>");
        out
    }
}

/// Output of [`extract`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Source text with every math span replaced by its marker
    pub text: String,
    /// Placeholders in order of appearance; `placeholders[i].id == i`
    pub placeholders: Vec<MathPlaceholder>,
}

/// Replace math spans with opaque markers.
///
/// A marker is `{tag}{id}{d|i}`: the tag is `mdpressmath`, lengthened until
/// it does not occur in `text`, and the kind letter ends the id so that
/// `…1i` is never a prefix of `…12i`.
pub fn extract(text: &str) -> Extracted {
    let tag = marker_tag(text);
    let mut out = String::with_capacity(text.len());
    let mut placeholders: Vec<MathPlaceholder> = Vec::new();

    for token in Scanner::new(text) {
        match token {
            Token::Math { kind, content } => {
                let id = placeholders.len();
                let marker = format!("{tag}{id}{}", kind.marker_suffix());
                out.push_str(&marker);
                placeholders.push(MathPlaceholder {
                    id,
                    kind,
                    content: content.to_string(),
                    marker,
                });
            }
            other => out.push_str(other.literal()),
        }
    }

    Extracted {
        text: out,
        placeholders,
    }
}

/// Put math back into rendered HTML as tagged elements.
///
/// Each placeholder's marker is replaced once. Markers the parser dropped are
/// simply not found.
pub fn restore(html: &str, placeholders: &[MathPlaceholder]) -> String {
    replace_markers(html, placeholders, MathPlaceholder::element).into_owned()
}

/// Put math back as its original delimited source, for places that only hold
/// plain text: code, image alt text, link destinations and titles.
pub fn restore_source<'a>(text: &'a str, placeholders: &[MathPlaceholder]) -> Cow<'a, str> {
    replace_markers(text, placeholders, MathPlaceholder::source)
}

/// Whether `text` holds any marker from `placeholders`
pub fn has_marker(text: &str, placeholders: &[MathPlaceholder]) -> bool {
    placeholders.iter().any(|p| text.contains(p.marker()))
}

fn replace_markers<'a>(
    text: &'a str,
    placeholders: &[MathPlaceholder],
    replacement: impl Fn(&MathPlaceholder) -> String,
) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(text);
    for placeholder in placeholders {
        if let Some(at) = out.find(placeholder.marker()) {
            let end = at + placeholder.marker().len();
            out.to_mut().replace_range(at..end, &replacement(placeholder));
        }
    }
    out
}

/// Pick a marker tag that does not already occur in the source, so text typed
/// by the user can never be mistaken for a placeholder.
fn marker_tag(text: &str) -> String {
    let mut tag = String::from("mdpressmath");
    while text.contains(tag.as_str()) {
        tag.push('x');
    }
    tag
}

/// A problem found by [`delimiter_warnings`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelimiterWarning {
    /// Byte offset of the delimiter
    pub offset: usize,
    /// 1-based line of the delimiter
    pub line: usize,
    pub message: String,
}

/// Report math delimiters that will not pair up.
///
/// Uses the same scanning rules as [`extract`], so anything reported here is
/// exactly what will reach the parser as literal text.
pub fn delimiter_warnings(text: &str) -> Vec<DelimiterWarning> {
    let line_of = |offset: usize| text[..offset].matches('\n').count() + 1;

    Scanner::new(text)
        .filter_map(|token| {
            let (offset, message) = match token {
                Token::Unclosed {
                    kind: MathKind::Display,
                    offset,
                } => (
                    offset,
                    "unmatched $$ delimiter - display math will not render".to_string(),
                ),
                Token::Unclosed {
                    kind: MathKind::Inline,
                    offset,
                } => (
                    offset,
                    "unmatched \\( delimiter - inline math will not render".to_string(),
                ),
                Token::StrayClose { offset } => (
                    offset,
                    "\\) without a matching \\( is shown as text".to_string(),
                ),
                _ => return None,
            };
            Some(DelimiterWarning {
                offset,
                line: line_of(offset),
                message,
            })
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    /// Text copied as-is (including code)
    Text(&'a str),
    Math { kind: MathKind, content: &'a str },
    /// Opening delimiter with no closer
    Unclosed { kind: MathKind, offset: usize },
    /// `\)` with no opener
    StrayClose { offset: usize },
}

impl<'a> Token<'a> {
    /// Source text this token contributes when it is not math
    fn literal(&self) -> &'a str {
        match self {
            Token::Text(text) => *text,
            Token::Unclosed { kind, .. } => kind.delimiters().0,
            Token::StrayClose { .. } => "\\)",
            Token::Math { .. } => "",
        }
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src.as_bytes()[self.pos - 1] == b'\n'
    }

    fn take(&mut self, len: usize) -> &'a str {
        let text = &self.src[self.pos..self.pos + len];
        self.pos += len;
        text
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let start = self.pos;
        let rest = &self.src[start..];
        if rest.is_empty() {
            return None;
        }

        if self.at_line_start() {
            if let Some(len) = fenced_code_len(rest) {
                return Some(Token::Text(self.take(len)));
            }
            let indented = indented_code_len(rest)
                .filter(|_| opens_indented_code(&self.src[..start]));
            if let Some(len) = indented {
                return Some(Token::Text(self.take(len)));
            }
        }

        if rest.starts_with('\n') || rest.starts_with("\\$") {
            let len = if rest.starts_with('\n') { 1 } else { 2 };
            return Some(Token::Text(self.take(len)));
        }

        if rest.starts_with('`') {
            let len = code_span_len(rest);
            return Some(Token::Text(self.take(len)));
        }

        for kind in [MathKind::Display, MathKind::Inline] {
            let (open, close) = kind.delimiters();
            if !rest.starts_with(open) {
                continue;
            }
            let body = &rest[open.len()..];
            let end = body
                .find(close)
                .filter(|&end| kind == MathKind::Display || !crosses_blank_line(&body[..end]));
            return Some(match end {
                Some(end) => {
                    self.pos += open.len() + end + close.len();
                    Token::Math {
                        kind,
                        content: &body[..end],
                    }
                }
                None => {
                    self.pos += open.len();
                    Token::Unclosed {
                        kind,
                        offset: start,
                    }
                }
            });
        }

        if rest.starts_with("\\)") {
            self.pos += 2;
            return Some(Token::StrayClose { offset: start });
        }

        // Plain text up to the next byte that could start something
        let skip = rest.chars().next().map_or(1, char::len_utf8);
        let len = rest[skip..]
            .find(|c: char| matches!(c, '`' | '$' | '\\' | '\n'))
            .map_or(rest.len(), |i| skip + i);
        Some(Token::Text(self.take(len)))
    }
}

/// Whether `s` contains a whole blank line, i.e. a paragraph break.
fn crosses_blank_line(s: &str) -> bool {
    let mut lines = s.split('\n').skip(1).peekable();
    while let Some(line) = lines.next() {
        if lines.peek().is_some() && line.trim().is_empty() {
            return true;
        }
    }
    false
}

/// Length of a fenced code block starting at the beginning of `rest`,
/// including its closing fence. An unclosed fence runs to the end of input.
fn fenced_code_len(rest: &str) -> Option<usize> {
    let first_end = rest.find('\n').map_or(rest.len(), |i| i + 1);
    let first = &rest[..first_end];
    let after_indent = first.trim_start_matches(' ');
    if first.len() - after_indent.len() > 3 {
        return None;
    }

    let fence_char = after_indent.chars().next()?;
    if fence_char != '`' && fence_char != '~' {
        return None;
    }
    let fence_len = after_indent.chars().take_while(|&c| c == fence_char).count();
    if fence_len < 3 {
        return None;
    }
    if fence_char == '`' && after_indent[fence_len..].contains('`') {
        return None;
    }

    let mut offset = first_end;
    while offset < rest.len() {
        let end = rest[offset..].find('\n').map_or(rest.len(), |i| offset + i + 1);
        let line = rest[offset..end].trim_end_matches(['\n', '\r']);
        let trimmed = line.trim_start_matches(' ');
        if line.len() - trimmed.len() <= 3 {
            let run = trimmed.chars().take_while(|&c| c == fence_char).count();
            if run >= fence_len && trimmed[run..].trim().is_empty() {
                return Some(end);
            }
        }
        offset = end;
    }
    Some(rest.len())
}

/// Whether an indented line after `before` (which ends at a line start) would
/// begin a code block rather than continue a paragraph or list item.
fn opens_indented_code(before: &str) -> bool {
    let mut lines = before.lines().rev();
    match lines.next() {
        None => return true,
        Some(line) if !line.trim().is_empty() => return false,
        Some(_) => {}
    }
    match lines.find(|line| !line.trim().is_empty()) {
        None => true,
        Some(prev) => indent_width(prev) == 0 && !is_list_item(prev),
    }
}

/// Length of an indented code block starting at the beginning of `rest`:
/// lines indented by four columns or more, with blank lines between them.
fn indented_code_len(rest: &str) -> Option<usize> {
    let mut offset = 0;
    while offset < rest.len() {
        let end = rest[offset..].find('\n').map_or(rest.len(), |i| offset + i + 1);
        let line = &rest[offset..end];
        let blank = line.trim().is_empty();
        if offset == 0 && blank {
            return None;
        }
        if !blank && indent_width(line) < 4 {
            break;
        }
        offset = end;
    }
    (offset > 0).then_some(offset)
}

/// Leading whitespace in columns, tabs stopping at multiples of four
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4 - width % 4,
            _ => break,
        }
    }
    width
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    let marker_end = match trimmed.chars().next() {
        Some('-' | '*' | '+') => 1,
        Some(c) if c.is_ascii_digit() => {
            let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
            if digits > 9 || !trimmed[digits..].starts_with(['.', ')']) {
                return false;
            }
            digits + 1
        }
        _ => return false,
    };
    trimmed[marker_end..].is_empty() || trimmed[marker_end..].starts_with([' ', '\t'])
}

/// Length of a code span starting at the beginning of `rest`. Without a
/// closing run of equal length before the paragraph ends, only the opening
/// backticks are consumed.
fn code_span_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let open = bytes.iter().take_while(|&&b| b == b'`').count();
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'`' => {
                let run = bytes[i..].iter().take_while(|&&b| b == b'`').count();
                if run == open {
                    return i + run;
                }
                i += run;
            }
            b'\n' => {
                let next_line = rest[i + 1..].split('\n').next().unwrap_or("");
                if next_line.trim().is_empty() {
                    return open;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    open
}
