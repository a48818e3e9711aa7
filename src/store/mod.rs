//! Persistence layer: the onboarding draft over libSQL or memory.

pub mod draft;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use draft::{DEFAULT_USER, DraftStore};
pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryBackend;
pub use traits::DraftBackend;
