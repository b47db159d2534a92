//! Export dispatcher: PDF export, HTML preview and URL import
//!
//! Each operation disables the export affordances while its request is in
//! flight. The busy state is advisory: the dispatcher never refuses a call
//! because a previous one is still marked busy.

use std::ops::{Deref, DerefMut};

use log::{info, warn};

use mdpress_core::Document;

use crate::service::{ExportRequest, ExportService, ServiceError};

pub const EXPORT_FAILED: &str = "Export failed";
pub const EXPORT_UNREACHABLE: &str = "Could not reach the export service.";
pub const HTML_EXPORT_FAILED: &str = "HTML export failed";
pub const POPUP_BLOCKED: &str =
    "Pop-up blocked. Allow pop-ups for this site to view the HTML preview.";
pub const URL_REQUIRED: &str = "Please enter a URL to load.";
pub const URL_LOAD_FAILED: &str = "Could not load URL";
pub const URL_UNREACHABLE: &str = "Failed to fetch the URL.";

/// Shows a message to the user
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

/// UI hooks driven by the dispatcher
pub trait ExportSurface: Notifier {
    /// Enable (`false`) or disable (`true`) the export affordances
    fn set_busy(&mut self, busy: bool);

    /// Hand a downloaded file to the user
    fn save_file(&mut self, file_name: &str, bytes: &[u8]) -> anyhow::Result<()>;

    /// Show an HTML page in a new browsing context. Returns false when one
    /// could not be created.
    fn open_window(&mut self, html: &str) -> bool;
}

/// Marks the surface busy until dropped
pub struct BusyGuard<'a, U: ExportSurface + ?Sized> {
    surface: &'a mut U,
}

impl<'a, U: ExportSurface + ?Sized> BusyGuard<'a, U> {
    pub fn new(surface: &'a mut U) -> Self {
        surface.set_busy(true);
        Self { surface }
    }
}

impl<U: ExportSurface + ?Sized> Drop for BusyGuard<'_, U> {
    fn drop(&mut self) {
        self.surface.set_busy(false);
    }
}

impl<U: ExportSurface + ?Sized> Deref for BusyGuard<'_, U> {
    type Target = U;

    fn deref(&self) -> &U {
        self.surface
    }
}

impl<U: ExportSurface + ?Sized> DerefMut for BusyGuard<'_, U> {
    fn deref_mut(&mut self) -> &mut U {
        self.surface
    }
}

/// What a dispatcher operation ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A file was handed to the surface under this name
    Saved(String),
    /// The HTML preview was opened
    Opened,
    /// Markdown fetched from a URL (empty when the service returned none)
    Loaded(String),
    /// The operation failed; the message was shown to the user
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Message for a failed call: the service's own message when it sent one,
/// `fallback` for other rejections, `unreachable` when no usable response
/// arrived.
pub fn failure_message(err: &ServiceError, fallback: &str, unreachable: &str) -> String {
    match err {
        ServiceError::Rejected { .. } => err.service_message().unwrap_or(fallback).to_string(),
        ServiceError::Unreachable(_) | ServiceError::Decode(_) => unreachable.to_string(),
    }
}

/// Issues export requests for the current document
pub struct ExportDispatcher<S> {
    service: S,
}

impl<S: ExportService> ExportDispatcher<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Export the document as PDF and save it as `{title}.pdf`
    pub fn export_pdf<U: ExportSurface + ?Sized>(
        &self,
        doc: &Document,
        surface: &mut U,
    ) -> Outcome {
        let request = ExportRequest::from_document(doc);
        let mut surface = BusyGuard::new(surface);
        info!("export: PDF for {:?} ({} bytes)", request.title, request.markdown.len());

        let bytes = match self.service.export_pdf(&request) {
            Ok(bytes) => bytes,
            Err(e) => return fail(&mut *surface, &e, EXPORT_FAILED, EXPORT_UNREACHABLE),
        };

        let file_name = doc.file_name("pdf");
        match surface.save_file(&file_name, &bytes) {
            Ok(()) => Outcome::Saved(file_name),
            Err(e) => {
                warn!("export: could not save {file_name}: {e:#}");
                let message = format!("Could not save {file_name}: {e:#}");
                surface.notify(&message);
                Outcome::Failed(message)
            }
        }
    }

    /// Render the document to a standalone page and open it
    pub fn export_html_preview<U: ExportSurface + ?Sized>(
        &self,
        doc: &Document,
        surface: &mut U,
    ) -> Outcome {
        let request = ExportRequest::from_document(doc);
        let mut surface = BusyGuard::new(surface);
        info!("export: HTML preview for {:?}", request.title);

        let html = match self.service.render_html(&request) {
            Ok(html) => html,
            Err(e) => return fail(&mut *surface, &e, HTML_EXPORT_FAILED, EXPORT_UNREACHABLE),
        };

        if surface.open_window(&html) {
            Outcome::Opened
        } else {
            warn!("export: preview window could not be opened");
            surface.notify(POPUP_BLOCKED);
            Outcome::Failed(POPUP_BLOCKED.to_string())
        }
    }

    /// Fetch Markdown from `url` through the service
    pub fn import_from_url<U: ExportSurface + ?Sized>(
        &self,
        url: &str,
        surface: &mut U,
    ) -> Outcome {
        let url = url.trim();
        if url.is_empty() {
            surface.notify(URL_REQUIRED);
            return Outcome::Failed(URL_REQUIRED.to_string());
        }

        let mut surface = BusyGuard::new(surface);
        info!("import: fetching {url}");
        match self.service.fetch_url(url) {
            Ok(markdown) => Outcome::Loaded(markdown),
            Err(e) => fail(&mut *surface, &e, URL_LOAD_FAILED, URL_UNREACHABLE),
        }
    }
}

fn fail<U: Notifier + ?Sized>(
    surface: &mut U,
    err: &ServiceError,
    fallback: &str,
    unreachable: &str,
) -> Outcome {
    warn!("export: {err}");
    let message = failure_message(err, fallback, unreachable);
    surface.notify(&message);
    Outcome::Failed(message)
}
