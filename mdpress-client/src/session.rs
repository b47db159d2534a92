//! Editing session: owns the document and wires input to rendering,
//! persistence and export

use anyhow::Result;
use log::{debug, info, warn};

use mdpress_core::doc::{decode_upload, markdown_bytes, DEFAULT_TITLE};
use mdpress_core::scroll::{ScrollPane, ScrollSync};
use mdpress_core::{Config, Document, DraftStore, KeyValueStore, RenderResult, Renderer};

use crate::dispatch::{ExportDispatcher, ExportSurface, Outcome};
use crate::service::ExportService;

/// Opened by the Help menu entry
pub const HELP_URL: &str = "https://www.markdownguide.org/";

/// Asked before discarding a non-empty document
pub const NEW_DOCUMENT_PROMPT: &str =
    "Start a new document? Unsaved changes will be kept in downloads only.";

/// Pane arrangement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutMode {
    /// Editor and preview side by side
    #[default]
    Split,
    /// Editor only
    Focus,
}

impl LayoutMode {
    pub fn toggled(self) -> Self {
        match self {
            LayoutMode::Split => LayoutMode::Focus,
            LayoutMode::Focus => LayoutMode::Split,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayoutMode::Split => "Split View",
            LayoutMode::Focus => "Focus Mode",
        }
    }
}

/// Menu bar entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    New,
    View,
    Help,
}

impl std::str::FromStr for MenuAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(MenuAction::New),
            "view" => Ok(MenuAction::View),
            "help" => Ok(MenuAction::Help),
            other => anyhow::bail!("Unknown menu action: {other}"),
        }
    }
}

/// Everything the session shows or hands to the user
pub trait EditorSurface: ExportSurface {
    /// Replace the preview contents and status counts
    fn show_preview(&mut self, result: &RenderResult);

    /// Rearrange the panes
    fn set_layout(&mut self, mode: LayoutMode);

    /// Open an external link. Returns false when it could not be opened.
    fn open_url(&mut self, url: &str) -> bool;
}

/// One editor window
pub struct EditorSession<K, S, U> {
    doc: Document,
    drafts: DraftStore<K>,
    renderer: Renderer,
    scroll: ScrollSync,
    dispatcher: ExportDispatcher<S>,
    layout: LayoutMode,
    last_render: RenderResult,
    surface: U,
}

impl<K, S, U> EditorSession<K, S, U>
where
    K: KeyValueStore,
    S: ExportService,
    U: EditorSurface,
{
    /// Load the saved draft (or the sample document) and render it once
    pub fn new(config: &Config, store: K, service: S, surface: U) -> Result<Self> {
        let drafts = DraftStore::new(store);
        let doc = drafts.load()?;
        let renderer = if config.preview.math {
            Renderer::new()
        } else {
            Renderer::passthrough()
        };

        let mut session = Self {
            doc,
            drafts,
            renderer,
            scroll: ScrollSync::new(config.preview.scroll_guard()),
            dispatcher: ExportDispatcher::new(service),
            layout: LayoutMode::default(),
            last_render: RenderResult::default(),
            surface,
        };
        session.surface.set_layout(session.layout);
        session.render();
        Ok(session)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    /// Result of the most recent render
    pub fn last_render(&self) -> &RenderResult {
        &self.last_render
    }

    pub fn surface(&self) -> &U {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut U {
        &mut self.surface
    }

    pub fn drafts(&self) -> &DraftStore<K> {
        &self.drafts
    }

    /// Re-render the current text to the preview
    pub fn render(&mut self) -> &RenderResult {
        self.last_render = self.renderer.render(&self.doc.text);
        self.surface.show_preview(&self.last_render);
        &self.last_render
    }

    /// Save the current document as the draft
    pub fn persist(&mut self) -> Result<()> {
        self.drafts.persist(&self.doc)
    }

    /// The editor text changed
    pub fn on_input(&mut self, text: impl Into<String>) -> Result<()> {
        self.doc.text = text.into();
        self.render();
        self.persist()
    }

    /// The title field changed
    pub fn on_title_input(&mut self, title: impl Into<String>) -> Result<()> {
        self.doc.title = title.into();
        self.persist()
    }

    /// Clear the document, asking `confirm` first when there is something
    /// to lose. Returns whether the document was cleared.
    ///
    /// The cleared document is not persisted until the next edit.
    pub fn new_document(&mut self, confirm: impl FnOnce(&str) -> bool) -> bool {
        if self.doc.has_content() && !confirm(NEW_DOCUMENT_PROMPT) {
            debug!("session: new document declined");
            return false;
        }
        self.doc.text.clear();
        self.doc.title = DEFAULT_TITLE.to_string();
        self.render();
        true
    }

    /// Switch between split and focus layouts
    pub fn toggle_layout(&mut self) -> LayoutMode {
        self.layout = self.layout.toggled();
        self.surface.set_layout(self.layout);
        self.layout
    }

    /// Run a menu bar entry. Returns false when it was declined or failed.
    pub fn menu(&mut self, action: MenuAction, confirm: impl FnOnce(&str) -> bool) -> bool {
        match action {
            MenuAction::New => self.new_document(confirm),
            MenuAction::View => {
                self.toggle_layout();
                true
            }
            MenuAction::Help => {
                let opened = self.surface.open_url(HELP_URL);
                if !opened {
                    warn!("session: could not open {HELP_URL}");
                }
                opened
            }
        }
    }

    /// Save the raw text verbatim as `{title}.md`. Returns the file name.
    pub fn download_markdown(&mut self) -> Result<String> {
        let file_name = self.doc.file_name("md");
        self.surface.save_file(&file_name, markdown_bytes(&self.doc))?;
        info!("session: saved {file_name}");
        Ok(file_name)
    }

    /// Replace the text with an uploaded file's contents
    pub fn upload(&mut self, bytes: &[u8]) -> Result<()> {
        self.on_input(decode_upload(bytes))
    }

    /// The editor pane scrolled; mirror it onto the preview
    pub fn on_editor_scroll(
        &mut self,
        editor: &dyn ScrollPane,
        preview: &mut dyn ScrollPane,
    ) -> bool {
        self.scroll.on_scroll(editor, preview)
    }

    /// The preview pane scrolled; mirror it onto the editor
    pub fn on_preview_scroll(
        &mut self,
        preview: &dyn ScrollPane,
        editor: &mut dyn ScrollPane,
    ) -> bool {
        self.scroll.on_scroll(preview, editor)
    }

    pub fn export_pdf(&mut self) -> Outcome {
        self.dispatcher.export_pdf(&self.doc, &mut self.surface)
    }

    pub fn export_html_preview(&mut self) -> Outcome {
        self.dispatcher.export_html_preview(&self.doc, &mut self.surface)
    }

    /// Replace the text with Markdown fetched from `url`
    pub fn import_from_url(&mut self, url: &str) -> Result<Outcome> {
        let outcome = self.dispatcher.import_from_url(url, &mut self.surface);
        if let Outcome::Loaded(markdown) = &outcome {
            self.on_input(markdown.clone())?;
        }
        Ok(outcome)
    }
}
