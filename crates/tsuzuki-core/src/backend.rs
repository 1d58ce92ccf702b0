//! Durable key-value storage for the persisted watch list.
//!
//! The store serializes its whole collection into one blob and hands it to a
//! [`Backend`] under a namespace key. Backends only move strings around; they
//! know nothing about records.

mod file;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use crate::config::{AppConfig, BackendKind};
use crate::error::TsuzukiError;

/// A string key-value store.
pub trait Backend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>, TsuzukiError>;

    /// Replace the value stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<(), TsuzukiError>;
}

/// Build the backend selected in config.
pub fn open_backend(config: &AppConfig) -> Result<Box<dyn Backend>, TsuzukiError> {
    let backend: Box<dyn Backend> = match config.storage.backend {
        BackendKind::File => Box::new(FileBackend::open(&config.data_dir())?),
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => {
            let path = config.db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(SqliteBackend::open(&path)?)
        }
        #[cfg(not(feature = "sqlite"))]
        BackendKind::Sqlite => {
            return Err(TsuzukiError::Config(
                "built without the `sqlite` feature".into(),
            ))
        }
        BackendKind::Memory => Box::new(MemoryBackend::new()),
    };
    tracing::debug!(backend = backend.name(), "Opened storage backend");
    Ok(backend)
}
