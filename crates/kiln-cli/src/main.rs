use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kiln_core::config::{BundleMode, CliOverrides, ProjectConfig};
use kiln_core::diagnostics::{CompilationResult, Diagnostic, DiagnosticLevel};
use kiln_core::{BuildSession, Container, CycleReport, MessageTable, Project, ScanFrontEnd};

/// Kiln - incremental builder for web front-end projects
#[derive(Parser, Debug, Clone)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entry source files, relative to the project directory
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Path to kiln.yaml (or kiln.json) configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Output directory for built files
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Bundling mode (none, fast, merged)
    #[arg(long, value_name = "MODE")]
    bundle: Option<String>,

    /// Merge sprites into one atlas image
    #[arg(long)]
    sprite_merge: bool,

    /// Keep comments and blank lines in bundles
    #[arg(long)]
    no_compress: bool,

    /// Shorten module names in merged bundles
    #[arg(long)]
    mangle: bool,

    /// Keep bundle formatting untouched
    #[arg(long)]
    beautify: bool,

    /// Generate source maps
    #[arg(long)]
    source_map: bool,

    /// Rebuild everything regardless of timestamps
    #[arg(long)]
    force: bool,

    /// Watch the project directory and rebuild on changes
    #[arg(short, long)]
    watch: bool,

    /// Initialize a new Kiln project
    #[arg(long)]
    init: bool,

    /// Pretty print diagnostics
    #[arg(long, default_value_t = true)]
    pretty: bool,

    /// Show diagnostic codes
    #[arg(long)]
    diagnostics: bool,
}

fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for detailed logs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    if cli.init {
        init_project()?;
        return Ok(());
    }

    let config = load_config(&cli)?;
    if config.main.is_empty() {
        eprintln!("Error: No entry files specified. Use --help for usage information.");
        std::process::exit(1);
    }

    info!("Kiln - building {} entry point(s)", config.main.len());
    if let Some(ref out_dir) = config.out_dir {
        info!("Output directory: {}", out_dir);
    }
    debug!("Bundle mode: {:?}", config.bundle);
    debug!("Watch mode: {}", cli.watch);

    let container = Container::new(config);
    let project_dir = container.project_dir();
    let mut project = Project::new(
        container.config().as_ref().clone(),
        project_dir.clone(),
        container.sink().clone(),
    )
    .with_log(container.log().clone());
    if project.config.compile_translations {
        project = project.with_translation(Box::new(MessageTable::new()));
    }
    if project.config.report_untranslated {
        project = project.with_untranslated_reporter(Arc::new(
            |message: &str, hint: Option<&str>, file: &str| match hint {
                Some(hint) => warn!("Untranslated \"{}\" ({}) in {}", message, hint, file),
                None => warn!("Untranslated \"{}\" in {}", message, file),
            },
        ));
    }
    if project.config.sprite_merge && project.atlas_encoder.is_none() {
        warn!("Sprite merging has no atlas encoder, bundle.png will not be written");
    }
    let mut session = BuildSession::new(
        container.file_system().clone(),
        Arc::new(ScanFrontEnd::new()),
    );
    if cli.force {
        session.force_rebuild_next_compile();
    }

    if cli.watch {
        watch_mode(&cli, &mut session, &mut project, &project_dir)?;
    } else if !compile(&cli, &mut session, &mut project)? {
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize a new Kiln project with a configuration file
fn init_project() -> anyhow::Result<()> {
    println!("Initializing new Kiln project...");

    ProjectConfig::init_file(Path::new("kiln.yaml"), "src/app.ts")
        .map_err(|e| anyhow::anyhow!("Failed to write kiln.yaml: {}", e))?;
    println!("Created kiln.yaml");

    std::fs::create_dir_all("src")?;
    println!("Created src/ directory");

    let sample = r#"import { greeting } from "./greeting";

export const message = greeting("World");
"#;
    std::fs::write("src/app.ts", sample)?;
    std::fs::write(
        "src/greeting.ts",
        "export function greeting(name) { return \"Hello, \" + name + \"!\"; }\n",
    )?;
    println!("Created src/app.ts");

    println!("\nProject initialized successfully!");
    println!("Run 'kiln' to build it.");

    Ok(())
}

fn parse_bundle_mode(mode: &str) -> anyhow::Result<BundleMode> {
    match mode {
        "none" => Ok(BundleMode::None),
        "fast" => Ok(BundleMode::Fast),
        "merged" => Ok(BundleMode::Merged),
        _ => Err(anyhow::anyhow!(
            "Invalid bundle mode '{}'. Supported modes: none, fast, merged",
            mode
        )),
    }
}

/// Load configuration from file (if any) and apply command line overrides.
/// `dir` and `outDir` come back absolute.
fn load_config(cli: &Cli) -> anyhow::Result<ProjectConfig> {
    let cwd = std::env::current_dir()?;

    let (mut config, config_dir) = if let Some(ref project_path) = cli.project {
        let config = ProjectConfig::from_file(project_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?;
        let parent = project_path
            .parent()
            .map(|p| cwd.join(p))
            .unwrap_or_else(|| cwd.clone());
        (config, parent)
    } else {
        let found = ["kiln.yaml", "kiln.json"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists());
        match found {
            Some(path) => {
                let config = ProjectConfig::from_file(&path)
                    .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
                (config, cwd.clone())
            }
            None => (ProjectConfig::default(), cwd.clone()),
        }
    };

    let mut overrides = CliOverrides::default();
    if !cli.files.is_empty() {
        overrides.main = Some(
            cli.files
                .iter()
                .map(|f| f.to_string_lossy().replace('\\', "/"))
                .collect(),
        );
    }
    if let Some(ref out_dir) = cli.out_dir {
        overrides.out_dir = Some(out_dir.to_string_lossy().to_string());
    }
    if let Some(ref mode) = cli.bundle {
        overrides.bundle = Some(parse_bundle_mode(mode)?);
    }
    if cli.sprite_merge {
        overrides.sprite_merge = Some(true);
    }
    if cli.no_compress {
        overrides.compress = Some(false);
    }
    if cli.mangle {
        overrides.mangle = Some(true);
    }
    if cli.beautify {
        overrides.beautify = Some(true);
    }
    if cli.source_map {
        overrides.source_map = Some(true);
    }
    config.merge(&overrides);

    let project_dir = match &config.dir {
        Some(dir) => config_dir.join(dir),
        None => config_dir,
    };
    if let Some(out_dir) = &config.out_dir {
        config.out_dir = Some(project_dir.join(out_dir).to_string_lossy().to_string());
    }
    config.dir = Some(project_dir.to_string_lossy().to_string());

    Ok(config)
}

/// Run one compile cycle and print its messages. Returns `false` on errors.
fn compile(cli: &Cli, session: &mut BuildSession, project: &mut Project) -> anyhow::Result<bool> {
    let start = std::time::Instant::now();
    session.clear_file_time_modifications();
    let report = session.compile(project)?;

    let dir = project.dir.clone();
    for diagnostic in messages_to_print(&report, session.result()) {
        let source = session
            .cache()
            .find(&diagnostic.file, &dir)
            .and_then(|id| session.cache().entry(id).text().cloned());
        print_diagnostic(
            diagnostic,
            source.as_deref().unwrap_or(""),
            cli.pretty,
            cli.diagnostics,
        );
    }

    if report.is_up_to_date() {
        info!("Everything is up to date");
    } else {
        info!(
            "Built {} file(s) in {:?} ({} errors, {} warnings)",
            report.emitted.len(),
            start.elapsed(),
            report.errors,
            report.warnings
        );
    }
    Ok(report.errors == 0)
}

/// Messages of a cycle that did no work were already printed
fn messages_to_print<'a>(report: &CycleReport, result: &'a CompilationResult) -> &'a [Diagnostic] {
    if report.is_up_to_date() {
        &[]
    } else {
        result.messages()
    }
}

fn print_diagnostic(diagnostic: &Diagnostic, source: &str, pretty: bool, show_codes: bool) {
    let code_str = if show_codes {
        format!(" [{}]", diagnostic.code)
    } else {
        String::new()
    };

    if pretty {
        let severity_str = match diagnostic.level {
            DiagnosticLevel::Error => "\x1b[31merror\x1b[0m",
            DiagnosticLevel::Warning => "\x1b[33mwarning\x1b[0m",
        };

        eprintln!(
            "\n{} [{}:{}:{}]: {}{}",
            severity_str,
            diagnostic.file,
            diagnostic.span.line,
            diagnostic.span.column,
            diagnostic.message,
            code_str
        );

        // Show the source line with a caret under the location
        let lines: Vec<&str> = source.lines().collect();
        if diagnostic.span.line > 0 && (diagnostic.span.line as usize) <= lines.len() {
            let line = lines[diagnostic.span.line as usize - 1];
            eprintln!("    {}", line);
            eprintln!(
                "    {}\x1b[31m^\x1b[0m",
                " ".repeat(diagnostic.span.column.saturating_sub(1) as usize)
            );
        }
    } else {
        let severity_str = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        };

        eprintln!(
            "{}:{}:{}: {}: {}{}",
            diagnostic.file,
            diagnostic.span.line,
            diagnostic.span.column,
            severity_str,
            diagnostic.message,
            code_str
        );
    }
}

/// Whether a changed path should trigger a rebuild
fn is_source_change(path: &Path, out_dir: Option<&Path>) -> bool {
    if out_dir.is_some_and(|out| path.starts_with(out)) {
        return false;
    }
    !path
        .components()
        .any(|c| c.as_os_str() == "node_modules" || c.as_os_str() == ".git")
}

/// Watch mode - rebuild on file changes
fn watch_mode(
    cli: &Cli,
    session: &mut BuildSession,
    project: &mut Project,
    project_dir: &Path,
) -> anyhow::Result<()> {
    use notify::{event::EventKind, Event, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    println!("Watching for changes... (Press Ctrl+C to stop)");

    println!("\nInitial build:");
    if let Err(e) = compile(cli, session, project) {
        eprintln!("Error: {}", e);
    }

    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(project_dir, RecursiveMode::Recursive)?;

    let out_dir = project.config.out_dir.as_ref().map(PathBuf::from);
    let debounce_duration = Duration::from_millis(100);
    let mut pending_since: Option<std::time::Instant> = None;

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) && event
                    .paths
                    .iter()
                    .any(|path| is_source_change(path, out_dir.as_deref()));
                if relevant && pending_since.is_none() {
                    pending_since = Some(std::time::Instant::now());
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                return Err(anyhow::anyhow!("File watcher disconnected"));
            }
        }

        // Debounce: build once the burst of events has settled
        if pending_since.is_some_and(|since| since.elapsed() >= debounce_duration) {
            pending_since = None;
            println!("\n\nFile changed, rebuilding...");
            if let Err(e) = compile(cli, session, project) {
                eprintln!("Error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle_mode() {
        assert_eq!(parse_bundle_mode("merged").unwrap(), BundleMode::Merged);
        assert_eq!(parse_bundle_mode("fast").unwrap(), BundleMode::Fast);
        assert!(parse_bundle_mode("tiny").is_err());
    }

    #[test]
    fn test_output_changes_are_ignored() {
        let out = Path::new("/p/dist");
        assert!(!is_source_change(Path::new("/p/dist/app.js"), Some(out)));
        assert!(!is_source_change(Path::new("/p/node_modules/x/index.js"), None));
        assert!(is_source_change(Path::new("/p/src/app.ts"), Some(out)));
    }

    #[test]
    fn test_idle_cycle_prints_nothing_again() {
        use kiln_core::span::Span;

        let mut result = CompilationResult::new();
        result.add(Diagnostic::warning("app.ts", Span::dummy(), "BB2", "dynamic asset"));

        let idle = CycleReport::default();
        assert!(messages_to_print(&idle, &result).is_empty());

        let busy = CycleReport {
            stale_entries: vec!["app.ts".to_string()],
            ..Default::default()
        };
        assert_eq!(messages_to_print(&busy, &result).len(), 1);
    }
}
