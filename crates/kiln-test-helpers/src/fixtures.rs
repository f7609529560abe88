//! In-memory project fixtures
//!
//! A [`ProjectFixture`] wires a [`BuildSession`] to a [`MockFileSystem`] and
//! a [`MemorySink`] rooted at `/project`, so tests can edit sources and run
//! compile cycles without touching the disk.

use std::sync::Arc;

use kiln_core::config::ProjectConfig;
use kiln_core::frontend::ScanFrontEnd;
use kiln_core::fs::MockFileSystem;
use kiln_core::output::MemorySink;
use kiln_core::project::Project;
use kiln_core::session::{BuildSession, CycleReport};

use crate::mocks::CapturingLog;

pub const PROJECT_DIR: &str = "/project";

pub struct ProjectFixture {
    pub fs: Arc<MockFileSystem>,
    pub sink: Arc<MemorySink>,
    pub log: CapturingLog,
    pub session: BuildSession,
    pub project: Project,
}

impl ProjectFixture {
    pub fn new(config: ProjectConfig) -> Self {
        let fs = Arc::new(MockFileSystem::new());
        let sink = Arc::new(MemorySink::new());
        let log = CapturingLog::new();
        let session = BuildSession::new(fs.clone(), Arc::new(ScanFrontEnd::new()));
        let project = Project::new(config, PROJECT_DIR, sink.clone()).with_log(log.callback());
        Self {
            fs,
            sink,
            log,
            session,
            project,
        }
    }

    /// Fixture with `main` as entry points and the given `(path, content)` files
    pub fn with_files(main: &[&str], files: &[(&str, &str)]) -> Self {
        let config = ProjectConfig {
            main: main.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        };
        let fixture = Self::new(config);
        for (path, content) in files {
            fixture.write(path, content);
        }
        fixture
    }

    fn full_path(path: &str) -> String {
        format!("{}/{}", PROJECT_DIR, path)
    }

    /// Create or overwrite a project-relative file with a newer timestamp
    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) {
        self.fs.write_file(Self::full_path(path), content);
    }

    pub fn touch(&self, path: &str) {
        self.fs.touch(Self::full_path(path));
    }

    pub fn remove(&self, path: &str) {
        self.fs.remove_file(Self::full_path(path));
    }

    /// Run one compile cycle the way a watcher would after a change
    pub fn compile(&mut self) -> CycleReport {
        self.session.clear_file_time_modifications();
        self.session
            .compile(&mut self.project)
            .expect("compile cycle failed")
    }

    /// Output paths written since the last call
    pub fn written(&self) -> Vec<String> {
        let mut paths = self.sink.take_writes();
        paths.sort();
        paths
    }

    pub fn output(&self, path: &str) -> Option<String> {
        self.sink.get_string(path)
    }
}

/// Smallest byte sequence whose PNG header reports `width` x `height`
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes
}
