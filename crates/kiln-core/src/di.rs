use crate::config::ProjectConfig;
use crate::fs::{FileSystem, RealFileSystem};
use crate::output::{FsSink, OutputSink};
use crate::project::{default_log, LogCallback};
use std::path::PathBuf;
use std::sync::Arc;

/// Dependency injection container
/// Holds the shared collaborators a build session is wired from
pub struct Container {
    config: Arc<ProjectConfig>,
    file_system: Arc<dyn FileSystem>,
    sink: Arc<dyn OutputSink>,
    log: LogCallback,
}

impl Container {
    /// Create a container with production dependencies: the real file system
    /// and a sink writing under `outDir` (or the project directory)
    pub fn new(config: ProjectConfig) -> Self {
        let out_dir = config
            .out_dir
            .clone()
            .or_else(|| config.dir.clone())
            .unwrap_or_else(|| ".".to_string());
        let sink = Arc::new(FsSink::new(PathBuf::from(out_dir)));

        Container {
            config: Arc::new(config),
            file_system: Arc::new(RealFileSystem::new()),
            sink,
            log: default_log(),
        }
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: ProjectConfig,
        file_system: Arc<dyn FileSystem>,
        sink: Arc<dyn OutputSink>,
        log: LogCallback,
    ) -> Self {
        Container {
            config: Arc::new(config),
            file_system,
            sink,
            log,
        }
    }

    pub fn config(&self) -> &Arc<ProjectConfig> {
        &self.config
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    pub fn log(&self) -> &LogCallback {
        &self.log
    }

    /// Project root: the configured `dir`, or the current directory
    pub fn project_dir(&self) -> PathBuf {
        match &self.config.dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}
