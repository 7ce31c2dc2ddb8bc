pub mod catalog;
pub mod db;
pub mod document;
pub mod error;
pub mod export;
pub mod identity;
pub mod import;
pub mod models;
pub mod policy;
pub mod profile;
pub mod service;
pub mod store;
pub mod validate;

pub use db::{Database, SqliteStore};
pub use document::{Document, DocumentKind, detect_document_kind};
pub use error::ExchangeError;
pub use export::ExportScope;
pub use import::{ImportMode, ImportOptions, ImportSummary};
pub use policy::{CollisionPrompt, ConflictPolicy, Resolution};
pub use profile::{JsonProfileStore, MemoryProfileStore, ProfileStore};
pub use service::ExchangeService;
pub use store::Store;
pub use validate::{Limits, ValidationError};
