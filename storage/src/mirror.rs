//! Durable local mirrors.
//!
//! Both implementations enforce an optional byte quota across all stored
//! documents, mirroring the storage limits of a browser-style local store.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use errors::MirrorError;
use parking_lot::Mutex;
use pr_core::LocalMirror;
use tracing::debug;

/// One `<name>.json` file per document inside `dir`.
///
/// Writes go through a temp file in the same directory and are renamed into
/// place, so a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
    quota_bytes: Option<u64>
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self, MirrorError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| MirrorError::Io {
            name: dir.display().to_string(),
            reason: e.to_string()
        })?;
        Ok(Self { dir, quota_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, MirrorError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(MirrorError::Io {
                name: name.to_string(),
                reason: "invalid document name".to_string()
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Bytes used by every document except `exclude`.
    fn used_bytes_except(&self, exclude: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path() != exclude)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}

impl LocalMirror for FileMirror {
    fn read(&self, name: &str) -> Result<Option<String>, MirrorError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MirrorError::Io {
                name: name.to_string(),
                reason: e.to_string()
            })
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), MirrorError> {
        let path = self.path_for(name)?;
        let needed = contents.len() as u64;
        if let Some(quota) = self.quota_bytes {
            let available = quota.saturating_sub(self.used_bytes_except(&path));
            if needed > available {
                return Err(MirrorError::QuotaExceeded {
                    name: name.to_string(),
                    needed,
                    available
                });
            }
        }

        let io_err = |e: std::io::Error| MirrorError::Io {
            name: name.to_string(),
            reason: e.to_string()
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        debug!(name, bytes = needed, "Mirror document written");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), MirrorError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MirrorError::Io {
                name: name.to_string(),
                reason: e.to_string()
            })
        }
    }
}

/// In-process mirror for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    docs: Mutex<HashMap<String, String>>,
    quota_bytes: Mutex<Option<u64>>
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            quota_bytes: Mutex::new(Some(quota_bytes))
        }
    }

    pub fn set_quota(&self, quota_bytes: Option<u64>) {
        *self.quota_bytes.lock() = quota_bytes;
    }

    pub fn used_bytes(&self) -> u64 {
        self.docs.lock().values().map(|v| v.len() as u64).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.docs.lock().contains_key(name)
    }

    /// Stores `contents` without a quota check.
    pub fn insert_raw(&self, name: &str, contents: &str) {
        self.docs.lock().insert(name.to_string(), contents.to_string());
    }
}

impl LocalMirror for MemoryMirror {
    fn read(&self, name: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.docs.lock().get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), MirrorError> {
        let quota = *self.quota_bytes.lock();
        let mut docs = self.docs.lock();
        let needed = contents.len() as u64;
        if let Some(quota) = quota {
            let used: u64 = docs
                .iter()
                .filter(|(k, _)| k.as_str() != name)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(MirrorError::QuotaExceeded {
                    name: name.to_string(),
                    needed,
                    available
                });
            }
        }
        docs.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), MirrorError> {
        self.docs.lock().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_mirror_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mirror = FileMirror::new(dir.path(), None).unwrap();

        assert_eq!(mirror.read("projectTasks").unwrap(), None);
        mirror.write("projectTasks", r#"{"Foo":[]}"#).unwrap();
        assert_eq!(
            mirror.read("projectTasks").unwrap().as_deref(),
            Some(r#"{"Foo":[]}"#)
        );

        mirror.remove("projectTasks").unwrap();
        mirror.remove("projectTasks").unwrap();
        assert_eq!(mirror.read("projectTasks").unwrap(), None);
    }

    #[test]
    fn test_file_mirror_quota_counts_other_documents() {
        let dir = TempDir::new().unwrap();
        let mirror = FileMirror::new(dir.path(), Some(10)).unwrap();

        mirror.write("a", "123456").unwrap();
        // Rewriting the same document only counts its new size.
        mirror.write("a", "12345678").unwrap();

        let err = mirror.write("b", "12345").unwrap_err();
        assert!(err.is_quota());
        assert!(matches!(
            err,
            MirrorError::QuotaExceeded { needed: 5, available: 2, .. }
        ));
    }

    #[test]
    fn test_file_mirror_rejects_path_names() {
        let dir = TempDir::new().unwrap();
        let mirror = FileMirror::new(dir.path(), None).unwrap();
        assert!(mirror.write("../escape", "x").is_err());
        assert!(mirror.read("").is_err());
    }

    #[test]
    fn test_memory_mirror_quota() {
        let mirror = MemoryMirror::with_quota(8);
        mirror.write("a", "1234").unwrap();
        mirror.write("b", "1234").unwrap();
        assert!(mirror.write("c", "1").unwrap_err().is_quota());

        mirror.remove("a").unwrap();
        mirror.write("c", "1").unwrap();
        assert_eq!(mirror.used_bytes(), 5);

        mirror.set_quota(None);
        mirror.write("d", &"x".repeat(100)).unwrap();
    }
}
