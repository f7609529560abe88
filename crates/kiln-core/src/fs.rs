use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

/// Modification time in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModTime(pub u64);

/// File system access used by the file cache and module resolution.
/// This allows for dependency injection and testing with an in-memory tree.
pub trait FileSystem: Send + Sync {
    fn modified(&self, path: &Path) -> io::Result<ModTime>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFileSystem {
    fn modified(&self, path: &Path) -> io::Result<ModTime> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }
        let nanos = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(ModTime(nanos))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory file system with a logical clock.
///
/// Every write advances the clock, so a rewritten file is always newer than
/// anything written before it.
#[derive(Debug, Default)]
pub struct MockFileSystem {
    files: Mutex<FxHashMap<PathBuf, (ModTime, Vec<u8>)>>,
    clock: AtomicU64,
    reads: AtomicU64,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> ModTime {
        ModTime(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn write_file(&self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) {
        let time = self.tick();
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), (time, content.as_ref().to_vec()));
    }

    /// Bump the modification time without changing content.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let time = self.tick();
        if let Some(file) = self.files.lock().unwrap().get_mut(path.as_ref()) {
            file.0 = time;
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files.lock().unwrap().remove(path.as_ref());
    }

    /// Number of successful and failed content reads so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FileSystem for MockFileSystem {
    fn modified(&self, path: &Path) -> io::Result<ModTime> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(time, _)| *time)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
