//! mdpress client - Editing session and export service integration
//!
//! This crate connects the core document logic to the outside world:
//! - Editing session (input, menu actions, layout, uploads and downloads)
//! - Export dispatcher with busy-state handling
//! - Export service client (blocking HTTP, optional feature)
//! - File watching for external edits (optional feature)

pub mod dispatch;
pub mod service;
pub mod session;

#[cfg(feature = "watch")]
pub mod watcher;

// Re-export main types
pub use dispatch::{ExportDispatcher, ExportSurface, Notifier, Outcome};
pub use service::{ExportRequest, ExportService, ServiceError};
pub use session::{EditorSession, EditorSurface, LayoutMode, MenuAction};

#[cfg(feature = "http")]
pub use service::HttpExportService;
