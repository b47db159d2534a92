//! Integration tests for mdpress-client
//!
//! These tests drive a full editing session end-to-end: draft loading,
//! rendering, persistence across sessions, file interchange and exports.

use std::cell::Cell;
use std::rc::Rc;

use mdpress_client::dispatch::{EXPORT_UNREACHABLE, URL_REQUIRED};
use mdpress_client::{
    EditorSession, EditorSurface, ExportRequest, ExportService, ExportSurface, LayoutMode,
    Notifier, Outcome, ServiceError,
};
use mdpress_core::doc::{markdown_bytes, DEFAULT_TITLE};
use mdpress_core::{Config, Document, FileStore, MemoryStore, RenderResult};
use tempfile::TempDir;

#[derive(Default)]
struct Surface {
    busy: bool,
    preview: String,
    messages: Vec<String>,
    saved: Vec<(String, Vec<u8>)>,
    windows: Vec<String>,
}

impl Notifier for Surface {
    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

impl ExportSurface for Surface {
    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn save_file(&mut self, file_name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.saved.push((file_name.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn open_window(&mut self, html: &str) -> bool {
        self.windows.push(html.to_string());
        true
    }
}

impl EditorSurface for Surface {
    fn show_preview(&mut self, result: &RenderResult) {
        self.preview = result.html.clone();
    }

    fn set_layout(&mut self, _mode: LayoutMode) {}

    fn open_url(&mut self, _url: &str) -> bool {
        true
    }
}

/// Service counting calls; shares its counter with the test
#[derive(Clone, Default)]
struct CountingService {
    calls: Rc<Cell<usize>>,
    offline: bool,
}

impl CountingService {
    fn answer<T>(&self, value: T) -> Result<T, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        if self.offline {
            Err(ServiceError::Unreachable("connection refused".to_string()))
        } else {
            Ok(value)
        }
    }
}

impl ExportService for CountingService {
    fn export_pdf(&self, request: &ExportRequest) -> Result<Vec<u8>, ServiceError> {
        self.answer(format!("PDF:{}", request.title).into_bytes())
    }

    fn render_html(&self, request: &ExportRequest) -> Result<String, ServiceError> {
        self.answer(format!("<title>{}</title>", request.title))
    }

    fn fetch_url(&self, url: &str) -> Result<String, ServiceError> {
        self.answer(format!("# From {url}\n"))
    }
}

fn memory_session(
    service: CountingService,
) -> EditorSession<MemoryStore, CountingService, Surface> {
    EditorSession::new(&Config::default(), MemoryStore::new(), service, Surface::default())
        .expect("Failed to create session")
}

#[test]
fn integration_draft_survives_restart() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config::default();

    {
        let store = FileStore::in_dir(Some(dir.path())).unwrap();
        let mut session =
            EditorSession::new(&config, store, CountingService::default(), Surface::default())
                .unwrap();
        assert_eq!(session.document(), &Document::sample());
        session.on_input("# Kept\n\n\\(a+b\\)").unwrap();
        session.on_title_input("Kept notes").unwrap();
    }

    let store = FileStore::in_dir(Some(dir.path())).unwrap();
    let session =
        EditorSession::new(&config, store, CountingService::default(), Surface::default()).unwrap();
    assert_eq!(session.document(), &Document::new("# Kept\n\n\\(a+b\\)", "Kept notes"));
    assert!(session.surface().preview.contains("<h1>Kept</h1>"));
    assert!(session.surface().preview.contains("data-math-kind=\"inline\""));
}

#[test]
fn integration_download_then_upload_restores_text() {
    let mut session = memory_session(CountingService::default());
    let original = "Tabs\tand  spaces\r\n\n$$\\frac{1}{2}$$\n\u{1F600}\n";
    session.on_input(original).unwrap();
    session.on_title_input("Round trip").unwrap();

    let name = session.download_markdown().unwrap();
    assert_eq!(name, "Round trip.md");
    let bytes = session.surface().saved[0].1.clone();
    assert_eq!(bytes, markdown_bytes(session.document()));

    session.new_document(|_| true);
    assert_eq!(session.document().text, "");
    assert_eq!(session.document().title, DEFAULT_TITLE);

    session.upload(&bytes).unwrap();
    assert_eq!(session.document().text, original);
}

#[test]
fn integration_busy_state_does_not_block_dispatch() {
    let service = CountingService::default();
    let calls = service.calls.clone();
    let mut session = memory_session(service);

    // Affordances already disabled, e.g. by a request still in flight
    session.surface_mut().set_busy(true);
    let outcome = session.export_pdf();

    assert_eq!(calls.get(), 1);
    assert_eq!(outcome, Outcome::Saved(format!("{DEFAULT_TITLE}.pdf")));
    assert!(!session.surface().busy);
}

#[test]
fn integration_exports_use_current_title() {
    let mut session = memory_session(CountingService::default());
    session.on_title_input("  Board pack ").unwrap();

    session.export_pdf();
    assert_eq!(session.surface().saved[0].0, "Board pack.pdf");
    assert_eq!(session.surface().saved[0].1, b"PDF:Board pack".to_vec());

    assert_eq!(session.export_html_preview(), Outcome::Opened);
    assert_eq!(session.surface().windows, vec!["<title>Board pack</title>".to_string()]);
}

#[test]
fn integration_empty_url_is_rejected_locally() {
    let service = CountingService::default();
    let calls = service.calls.clone();
    let mut session = memory_session(service);
    let before = session.document().clone();

    let outcome = session.import_from_url(" \t ").unwrap();
    assert_eq!(outcome, Outcome::Failed(URL_REQUIRED.to_string()));
    assert_eq!(calls.get(), 0);
    assert_eq!(session.document(), &before);
}

#[test]
fn integration_import_replaces_and_renders() {
    let mut session = memory_session(CountingService::default());
    session.import_from_url("https://example.com/readme.md").unwrap();
    assert_eq!(session.document().text, "# From https://example.com/readme.md\n");
    assert!(session.surface().preview.starts_with("<h1>From "));
}

#[test]
fn integration_offline_service_leaves_document_alone() {
    let mut session = memory_session(CountingService {
        offline: true,
        ..Default::default()
    });
    let before = session.document().clone();

    assert!(session.export_pdf().is_failure());
    assert!(session.import_from_url("https://example.com").unwrap().is_failure());
    assert_eq!(session.document(), &before);
    assert_eq!(session.surface().messages[0], EXPORT_UNREACHABLE);
    assert!(session.surface().saved.is_empty());
    assert!(!session.surface().busy);
}

#[test]
fn integration_render_counts_follow_input() {
    let mut session = memory_session(CountingService::default());
    session.on_input("a b  c").unwrap();
    assert_eq!(session.last_render().stats.words, 3);
    assert_eq!(session.last_render().stats.chars, 6);

    session.on_input("   ").unwrap();
    assert_eq!(session.last_render().stats.words, 0);
}
