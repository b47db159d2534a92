//! mdpress core - Document model, rendering, and configuration
//!
//! This crate contains the editor logic for mdpress, independent of any UI
//! or network concerns:
//! - Document model and word/character counts
//! - Math placeholder codec and delimiter lint
//! - Markdown render pipeline (parse, sanitize, typeset)
//! - Scroll synchronization between panes
//! - Draft persistence
//! - Configuration management

pub mod config;
pub mod doc;
pub mod draft;
pub mod placeholder;
pub mod render;
pub mod scroll;
pub mod typeset;

// Re-export commonly used types
pub use config::Config;
pub use doc::{Document, DocumentStats};
pub use draft::{DraftStore, FileStore, KeyValueStore, MemoryStore};
pub use render::{RenderResult, Renderer};
pub use scroll::{ScrollPane, ScrollSync};
