use std::collections::HashMap;

use super::Backend;
use crate::error::TsuzukiError;

/// Session-only storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, as if an earlier session had written it.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Make every subsequent write fail, like a full or disabled browser store.
    pub fn fail_writes(mut self, fail: bool) -> Self {
        self.fail_writes = fail;
        self
    }

    /// Make every read fail, like storage the page is not allowed to open.
    pub fn fail_reads(mut self, fail: bool) -> Self {
        self.fail_reads = fail;
        self
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<String>, TsuzukiError> {
        if self.fail_reads {
            return Err(TsuzukiError::Io(std::io::Error::other("storage access denied")));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), TsuzukiError> {
        if self.fail_writes {
            return Err(TsuzukiError::Io(std::io::Error::other(
                "storage quota exceeded",
            )));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
