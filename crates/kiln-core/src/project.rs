use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::bundle::css::{CssProcessor, SimpleCssProcessor};
use crate::bundle::sourcemap::SourceMap;
use crate::config::ProjectConfig;
use crate::output::OutputSink;
use crate::paths;
use crate::resolve::{
    AssetResolver, AtlasBuilder, AtlasEncoder, ShelfAtlas, TranslationCompiler,
    UntranslatedReporter,
};
use crate::shorten::FileNameShortener;

/// User-visible report channel for build messages
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub fn default_log() -> LogCallback {
    Arc::new(|message: &str| info!("{}", message))
}

/// Where an imported module was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub def_file: String,
    pub js_file: String,
    /// Only type declarations; the JS is copied rather than compiled
    pub declaration_only: bool,
    /// Imported by a relative specifier
    pub internal: bool,
}

/// Emitted JavaScript kept for bundle assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedModule {
    /// Project-relative path without extension, used as the bundle module name
    pub id: String,
    pub js: String,
    pub source_map: Option<SourceMap>,
    /// Module ids this module requires
    pub deps: Vec<String>,
    /// Dependency JS copied verbatim rather than emitted by the front end
    pub copied: bool,
}

/// Long-lived build configuration and cross-cycle state.
pub struct Project {
    pub config: ProjectConfig,
    pub dir: PathBuf,
    pub module_map: IndexMap<String, ModuleInfo>,
    /// Dependency JS files: project-relative source name to output name
    pub dep_js_files: IndexMap<String, String>,
    /// Asset files: project-relative source name to output name
    pub dep_asset_files: IndexMap<String, String>,
    /// Asset name to substituted value, rebuilt every cycle
    pub asset_map: IndexMap<String, String>,
    pub css_to_link: Vec<String>,
    pub emitted: IndexMap<String, EmittedModule>,
    pub bundle_js: Option<String>,
    pub bundle_png: Option<String>,
    pub html_head_expanded: String,
    pub shortener: FileNameShortener,
    pub resolvers: Vec<Arc<dyn AssetResolver>>,
    pub atlas: Box<dyn AtlasBuilder>,
    pub atlas_encoder: Option<Arc<dyn AtlasEncoder>>,
    pub translation: Option<Box<dyn TranslationCompiler>>,
    pub untranslated_reporter: Option<UntranslatedReporter>,
    pub css: Arc<dyn CssProcessor>,
    sink: Arc<dyn OutputSink>,
    log: LogCallback,
}

impl Project {
    pub fn new(config: ProjectConfig, dir: impl Into<PathBuf>, sink: Arc<dyn OutputSink>) -> Self {
        let shortener = FileNameShortener::new(&config);
        Self {
            config,
            dir: dir.into(),
            module_map: IndexMap::new(),
            dep_js_files: IndexMap::new(),
            dep_asset_files: IndexMap::new(),
            asset_map: IndexMap::new(),
            css_to_link: Vec::new(),
            emitted: IndexMap::new(),
            bundle_js: None,
            bundle_png: None,
            html_head_expanded: String::new(),
            shortener,
            resolvers: Vec::new(),
            atlas: Box::new(ShelfAtlas::new()),
            atlas_encoder: None,
            translation: None,
            untranslated_reporter: None,
            css: Arc::new(SimpleCssProcessor::new()),
            sink,
            log: default_log(),
        }
    }

    pub fn with_log(mut self, log: LogCallback) -> Self {
        self.log = log;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn with_atlas(mut self, atlas: Box<dyn AtlasBuilder>) -> Self {
        self.atlas = atlas;
        self
    }

    pub fn with_atlas_encoder(mut self, encoder: Arc<dyn AtlasEncoder>) -> Self {
        self.atlas_encoder = Some(encoder);
        self
    }

    pub fn with_translation(mut self, compiler: Box<dyn TranslationCompiler>) -> Self {
        self.translation = Some(compiler);
        self
    }

    pub fn with_untranslated_reporter(mut self, reporter: UntranslatedReporter) -> Self {
        self.untranslated_reporter = Some(reporter);
        self
    }

    pub fn with_css_processor(mut self, css: Arc<dyn CssProcessor>) -> Self {
        self.css = css;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Project directory as a `/`-separated string
    pub fn dir_str(&self) -> String {
        paths::normalize(&self.dir.to_string_lossy())
    }

    /// Path relative to the project directory when inside it
    pub fn relativize(&self, path: &str) -> String {
        paths::relativize(&self.dir_str(), path)
    }

    pub fn absolute(&self, name: &str) -> String {
        paths::join(&self.dir_str(), name)
    }

    pub fn log(&self, message: &str) {
        (self.log)(message);
    }

    /// Write through the sink. A failed write is reported and the cycle goes on.
    pub fn write(&self, path: &str, content: &[u8]) {
        if let Err(e) = self.sink.write(path, content) {
            warn!("Failed to write {}: {}", path, e);
            self.log(&format!("Error: Cannot write {}: {}", path, e));
        }
    }

    pub fn add_dep_js(&mut self, source: &str, output: &str) {
        self.dep_js_files
            .insert(source.to_string(), output.to_string());
    }

    /// Resolve a resource path written in `source_file` to a project-relative name
    pub fn resolve_path_string(&self, source_file: &str, text: &str) -> String {
        let dir = self.dir_str();
        let joined = if self.config.resources_are_relative_to_project_dir
            || text.starts_with("node_modules/")
        {
            paths::join(&dir, text)
        } else {
            let source_dir = paths::dirname(&paths::join(&dir, source_file));
            paths::join(&source_dir, text)
        };
        paths::relativize(&dir, &joined)
    }

    /// Reset per-cycle outputs
    pub(crate) fn begin_cycle(&mut self) {
        self.asset_map.clear();
        self.css_to_link.clear();
        self.bundle_js = match self.config.bundle {
            crate::config::BundleMode::None => None,
            _ => Some(self.shortener.shorten("bundle.js")),
        };
    }

    /// Drop discovered modules and dependency files
    pub(crate) fn clear_maps(&mut self) {
        self.module_map.clear();
        self.dep_js_files.clear();
        self.dep_asset_files.clear();
        self.emitted.clear();
        self.shortener = FileNameShortener::new(&self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use std::sync::Mutex;

    fn project(config: ProjectConfig) -> Project {
        Project::new(config, "/proj", Arc::new(MemorySink::new()))
    }

    #[test]
    fn test_resolve_path_string_source_relative() {
        let project = project(ProjectConfig::default());
        assert_eq!(
            project.resolve_path_string("src/app.ts", "img/logo.png"),
            "src/img/logo.png"
        );
        assert_eq!(
            project.resolve_path_string("src/app.ts", "../shared/a.png"),
            "shared/a.png"
        );
        assert_eq!(
            project.resolve_path_string("src/app.ts", "node_modules/lib/a.png"),
            "node_modules/lib/a.png"
        );
    }

    #[test]
    fn test_resolve_path_string_project_relative() {
        let project = project(ProjectConfig {
            resources_are_relative_to_project_dir: true,
            ..Default::default()
        });
        assert_eq!(
            project.resolve_path_string("src/app.ts", "img/logo.png"),
            "img/logo.png"
        );
    }

    #[test]
    fn test_log_callback_is_used() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let project = project(ProjectConfig::default()).with_log(Arc::new(move |m: &str| {
            captured.lock().unwrap().push(m.to_string())
        }));
        project.log("hello");
        assert_eq!(*lines.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_begin_cycle_names_bundle() {
        let mut merged = project(ProjectConfig {
            bundle: crate::config::BundleMode::Merged,
            output_sub_dir: Some("out".to_string()),
            ..Default::default()
        });
        merged.begin_cycle();
        assert_eq!(merged.bundle_js.as_deref(), Some("out/bundle.js"));

        let mut plain = project(ProjectConfig::default());
        plain.begin_cycle();
        assert_eq!(plain.bundle_js, None);
    }
}
