pub mod bundle;
pub mod cache;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod frontend;
pub mod fs;
pub mod module_resolver;
pub mod output;
pub mod paths;
pub mod project;
pub mod resolve;
pub mod rewrite;
pub mod session;
pub mod shorten;
pub mod span;

pub use bundle::{BundlePhase, BundlingAssembler};
pub use cache::{hash_config, FileCache, FreshnessEngine};
pub use config::{BundleMode, CliOverrides, ProjectConfig, StyleDefMode};
pub use di::Container;
pub use diagnostics::{CompilationResult, Diagnostic, DiagnosticLevel};
pub use errors::BuildError;
pub use frontend::{FrontEnd, ScanFrontEnd};
pub use output::{FsSink, MemorySink, OutputSink};
pub use project::{LogCallback, Project};
pub use resolve::{
    AssetResolver, AtlasBuilder, AtlasEncoder, MessageTable, Resolution, ResourceResolutionPipeline,
    ShelfAtlas, TranslationCompiler,
};
pub use session::{BuildSession, CycleReport};
pub use shorten::FileNameShortener;
