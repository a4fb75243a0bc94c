//! An in-memory registry of heap files.
//!
//! The log identifies pages by a stable numeric file id rather than a path,
//! so the WAL layer resolves ids through this registry. Persisting the
//! registry itself is a concern of the outer system.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::heap_file::HeapFile;

/// Stable numeric identity of a registered heap file.
pub type FileId = u32;

#[derive(Debug, Default)]
struct CatalogState {
    files: Vec<Arc<HeapFile>>,
    by_name: HashMap<String, FileId>,
    by_path: HashMap<PathBuf, FileId>,
}

/// Name ⇄ file ⇄ id mapping. Ids are assigned in registration order, so a
/// restarted process that registers its tables in the same order observes
/// the same ids.
#[derive(Debug, Default)]
pub struct Catalog {
    state: Mutex<CatalogState>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Register a table. Re-registering the same backing file returns its
    /// existing id.
    pub fn add_table(&self, name: &str, file: Arc<HeapFile>) -> FileId {
        let mut state = self.state.lock().unwrap();
        if let Some(&id) = state.by_path.get(file.backing_path()) {
            state.by_name.insert(name.to_string(), id);
            return id;
        }
        let id = state.files.len() as FileId;
        state.by_path.insert(file.backing_path().to_path_buf(), id);
        state.by_name.insert(name.to_string(), id);
        state.files.push(file);
        id
    }

    pub fn table(&self, name: &str) -> Option<Arc<HeapFile>> {
        let state = self.state.lock().unwrap();
        let id = *state.by_name.get(name)?;
        state.files.get(id as usize).cloned()
    }

    pub fn file(&self, id: FileId) -> Option<Arc<HeapFile>> {
        self.state.lock().unwrap().files.get(id as usize).cloned()
    }

    pub fn file_id(&self, file: &HeapFile) -> Option<FileId> {
        self.state
            .lock()
            .unwrap()
            .by_path
            .get(file.backing_path())
            .copied()
    }
}
