//! Document model for the editing session

use std::borrow::Cow;

/// Title given to a fresh document
pub const DEFAULT_TITLE: &str = "Untitled document";

/// Text shown on first launch, before any draft has been saved
pub const SAMPLE_TEXT: &str = r#"# Welcome to mdpress

Use **Markdown** on the left. Toggle between split and focus modes from the View menu.

- Live preview updates instantly
- Download your .md or export a PDF
- Images and links render inline

## Math

Inline math such as \(e^{i\pi} + 1 = 0\) and display math:

$$
\int_0^1 x^2 \, dx = \frac{1}{3}
$$

## Quick tips

1. Use headings to build structure
2. Add lists, code blocks, and quotes
3. Export a PDF when you're ready
"#;

/// The document being edited
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub title: String,
}

impl Default for Document {
    fn default() -> Self {
        Self::sample()
    }
}

impl Document {
    pub fn new(text: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: title.into(),
        }
    }

    /// The built-in sample document
    pub fn sample() -> Self {
        Self::new(SAMPLE_TEXT, DEFAULT_TITLE)
    }

    /// Empty text with the default title
    pub fn blank() -> Self {
        Self::new("", DEFAULT_TITLE)
    }

    /// Title used for downloads and export requests: trimmed, or `"document"`
    /// when blank
    pub fn export_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            "document"
        } else {
            title
        }
    }

    /// File name for a download with the given extension (without the dot).
    ///
    /// Path separators in the title are replaced so the name always stays a
    /// single path component.
    pub fn file_name(&self, extension: &str) -> String {
        let stem: Cow<'_, str> = if self.export_title().contains(['/', '\\']) {
            Cow::Owned(self.export_title().replace(['/', '\\'], "_"))
        } else {
            Cow::Borrowed(self.export_title())
        };
        format!("{stem}.{extension}")
    }

    /// Character and word counts of the raw text
    pub fn stats(&self) -> DocumentStats {
        DocumentStats::of(&self.text)
    }

    /// Whether the text holds anything besides whitespace
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Bytes written by "Save as Markdown": the raw text, verbatim.
pub fn markdown_bytes(doc: &Document) -> &[u8] {
    doc.text.as_bytes()
}

/// Text loaded by "Upload". Invalid UTF-8 is replaced, never rejected.
pub fn decode_upload(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Counts shown in the status bar
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentStats {
    /// Unicode scalar values, whitespace included
    pub chars: usize,
    /// Whitespace-delimited words
    pub words: usize,
}

impl DocumentStats {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }
}
