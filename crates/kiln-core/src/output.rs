use indexmap::IndexMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// Destination for every artifact a build produces.
pub trait OutputSink: Send + Sync {
    fn write(&self, path: &str, content: &[u8]) -> io::Result<()>;
}

/// Writes artifacts below an output directory, creating parents as needed.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl OutputSink for FsSink {
    fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, content)
    }
}

/// Keeps written artifacts in memory and records every write in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<IndexMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    /// Paths written since the last call, in write order.
    pub fn take_writes(&self) -> Vec<String> {
        std::mem::take(&mut *self.writes.lock().unwrap())
    }
}

impl OutputSink for MemorySink {
    fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
        self.writes.lock().unwrap().push(path.to_string());
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }
}
