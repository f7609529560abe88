use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::fs::FileSystem;
use crate::paths;

use super::{CacheEntry, EntryId, Freshness, Stamp};

/// Path-keyed cache of file metadata and contents.
///
/// Lookups are case-insensitive on the canonical path while the entry keeps
/// the original-case path for disk access. Existence is probed at most once
/// until [`FileCache::clear_file_time_modifications`] is called.
pub struct FileCache {
    file_system: Arc<dyn FileSystem>,
    entries: Vec<CacheEntry>,
    index: FxHashMap<String, EntryId>,
}

impl FileCache {
    pub fn new(file_system: Arc<dyn FileSystem>) -> Self {
        Self {
            file_system,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    fn canonical_name(name: &str, base_dir: &Path) -> String {
        if paths::is_absolute(name) {
            paths::normalize(name)
        } else {
            paths::join(&paths::to_slash(&base_dir.to_string_lossy()), name)
        }
    }

    /// Entry for `name` (resolved against `base_dir`), created on first access.
    pub fn get(&mut self, name: &str, base_dir: &Path) -> EntryId {
        let full_name = Self::canonical_name(name, base_dir);
        let key = full_name.to_lowercase();
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = EntryId(self.entries.len());
        self.entries
            .push(CacheEntry::new(PathBuf::from(&full_name), key.clone()));
        self.index.insert(key, id);
        id
    }

    /// Existing entry for `name` without creating one.
    pub fn find(&self, name: &str, base_dir: &Path) -> Option<EntryId> {
        let key = Self::canonical_name(name, base_dir).to_lowercase();
        self.index.get(&key).copied()
    }

    pub fn entry(&self, id: EntryId) -> &CacheEntry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut CacheEntry {
        &mut self.entries[id.0]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stat the entry unless it was already probed since the last clear.
    pub fn probe_existence(&mut self, id: EntryId) -> Stamp {
        let entry = &mut self.entries[id.0];
        if entry.cur_time.is_set() {
            return entry.cur_time;
        }
        entry.cur_time = match self.file_system.modified(&entry.full_name) {
            Ok(time) => Stamp::At(time),
            Err(_) => Stamp::Missing,
        };
        entry.cur_time
    }

    /// `get` followed by `probe_existence`.
    pub fn existence(&mut self, name: &str, base_dir: &Path) -> EntryId {
        let id = self.get(name, base_dir);
        self.probe_existence(id);
        id
    }

    /// Read the text of the entry when the cached copy is out of date.
    /// A read failure stamps `text_time` as missing.
    pub fn ensure_text(&mut self, id: EntryId) {
        let entry = &mut self.entries[id.0];
        if !entry.exists() {
            entry.text_time = Stamp::Missing;
            return;
        }
        if entry.is_text_current() {
            return;
        }
        match self.file_system.read(&entry.full_name) {
            Ok(bytes) => {
                debug!("Read text of {}", entry.full_name.display());
                entry.text = Some(Arc::from(String::from_utf8_lossy(&bytes).as_ref()));
                entry.text_time = entry.cur_time;
            }
            Err(_) => entry.text_time = Stamp::Missing,
        }
    }

    /// Read the bytes of the entry when the cached copy is out of date.
    /// A read failure stamps `buffer_time` as missing.
    pub fn ensure_buffer(&mut self, id: EntryId) {
        let entry = &mut self.entries[id.0];
        if !entry.exists() {
            entry.buffer_time = Stamp::Missing;
            return;
        }
        if entry.is_buffer_current() {
            return;
        }
        match self.file_system.read(&entry.full_name) {
            Ok(bytes) => {
                entry.buffer = Some(Arc::from(bytes.into_boxed_slice()));
                entry.buffer_time = entry.cur_time;
            }
            Err(_) => entry.buffer_time = Stamp::Missing,
        }
    }

    /// Probe and load text in one step.
    pub fn content(&mut self, name: &str, base_dir: &Path) -> EntryId {
        let id = self.existence(name, base_dir);
        self.ensure_text(id);
        id
    }

    /// Probe and load bytes in one step.
    pub fn buffer(&mut self, name: &str, base_dir: &Path) -> EntryId {
        let id = self.existence(name, base_dir);
        self.ensure_buffer(id);
        id
    }

    /// Forget every probe so the next access stats again.
    pub fn clear_file_time_modifications(&mut self) {
        for entry in &mut self.entries {
            entry.cur_time = Stamp::Unset;
        }
    }

    /// Reset memoized freshness; runs once at the start of a freshness pass.
    pub fn clear_dependency_times(&mut self) {
        for entry in &mut self.entries {
            entry.max_time_for_deps = Freshness::Unset;
        }
    }

    /// Drop reference info and output stamps so everything is rebuilt.
    pub fn force_rebuild(&mut self) {
        for entry in &mut self.entries {
            entry.info_time = Stamp::Unset;
            entry.output_time = Stamp::Unset;
        }
    }
}
