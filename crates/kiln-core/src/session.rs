//! One long-lived incremental build session
//!
//! A [`BuildSession`] owns the file cache and the message list and runs
//! compile cycles against a [`Project`]. A cycle selects the stale entry
//! points, loads and checks every unit they reach, resolves resource
//! references in a first pass, emits the stale units under a rewrite scope
//! in a second pass, and finally hands over to the [`BundlingAssembler`].

use regex::{Captures, Regex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::bundle::sourcemap::SourceMap;
use crate::bundle::{BundlePhase, BundlingAssembler};
use crate::cache::{hash_config, EntryId, FileCache, FreshnessEngine, Stamp};
use crate::config::BundleMode;
use crate::diagnostics::{codes, CompilationResult, Diagnostic};
use crate::errors::{BuildError, Result};
use crate::frontend::{DeclId, EmitOptions, Expr, FrontEnd, ParsedUnit};
use crate::fs::FileSystem;
use crate::module_resolver::{module_id, ModuleResolver};
use crate::paths;
use crate::project::{EmittedModule, Project};
use crate::resolve::{gather_source_info, png_dimensions, ResourceResolutionPipeline};
use crate::rewrite::RewriteScope;
use crate::span::Span;

static HTML_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<<([^>]+)>>").unwrap());

/// What a compile cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entry points found stale
    pub stale_entries: Vec<String>,
    /// Units emitted this cycle, in emission order
    pub emitted: Vec<String>,
    pub errors: usize,
    pub warnings: usize,
}

impl CycleReport {
    /// Nothing was stale, nothing was written
    pub fn is_up_to_date(&self) -> bool {
        self.stale_entries.is_empty()
    }
}

/// Pending substitution of an exported constant, scoped to one file
#[derive(Debug, Clone)]
struct Override {
    decl: DeclId,
    value: Expr,
}

pub struct BuildSession {
    cache: FileCache,
    front_end: Arc<dyn FrontEnd>,
    result: CompilationResult,
    assembler: BundlingAssembler,
    force_rebuild: bool,
    config_hash: Option<String>,
    live_reload_index: u64,
}

impl BuildSession {
    pub fn new(file_system: Arc<dyn FileSystem>, front_end: Arc<dyn FrontEnd>) -> Self {
        Self {
            cache: FileCache::new(file_system),
            front_end,
            result: CompilationResult::new(),
            assembler: BundlingAssembler::new(),
            force_rebuild: false,
            config_hash: None,
            live_reload_index: 0,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn result(&self) -> &CompilationResult {
        &self.result
    }

    pub fn phase(&self) -> BundlePhase {
        self.assembler.phase()
    }

    /// Number of error-free cycles so far
    pub fn live_reload_index(&self) -> u64 {
        self.live_reload_index
    }

    /// Rebuild everything on the next cycle
    pub fn force_rebuild_next_compile(&mut self) {
        self.force_rebuild = true;
    }

    /// Mark every cached path unprobed so the next cycle sees disk changes
    pub fn clear_file_time_modifications(&mut self) {
        self.cache.clear_file_time_modifications();
    }

    /// Run one compile cycle.
    pub fn compile(&mut self, project: &mut Project) -> Result<CycleReport> {
        let hash = hash_config(&project.config);
        if self.config_hash.as_ref().is_some_and(|previous| *previous != hash) {
            info!("Configuration changed, rebuilding everything");
            self.force_rebuild = true;
        }
        self.config_hash = Some(hash);

        let force = std::mem::take(&mut self.force_rebuild);
        if force {
            self.cache.force_rebuild();
            self.result = CompilationResult::new();
            project.clear_maps();
        }

        self.assembler.enter(BundlePhase::EntrySelection);
        project.begin_cycle();
        let dir = project.dir.clone();
        let mains: Vec<String> = project
            .config
            .main
            .iter()
            .map(|main| paths::normalize(main))
            .collect();

        let mut report = CycleReport::default();
        {
            let mut engine = FreshnessEngine::new(&mut self.cache, &dir);
            engine.reset();
            for main in &mains {
                let id = engine.entry_id(main);
                if engine.is_stale(id, false, force) {
                    report.stale_entries.push(main.clone());
                }
            }
        }
        if report.stale_entries.is_empty() {
            debug!("All {} entry points are up to date", mains.len());
            self.assembler.enter(BundlePhase::Done);
            report.errors = self.result.error_count();
            report.warnings = self.result.warning_count();
            return Ok(report);
        }
        info!("{} of {} entry points are stale", report.stale_entries.len(), mains.len());

        // Every unit reachable from any entry; only stale ones are emitted
        let program = self.load_program(&mains, project);
        let modules: FxHashSet<String> = program.iter().map(|file| module_id(file)).collect();
        project
            .emitted
            .retain(|id, module| module.copied || modules.contains(id));
        self.check_program(&program, &dir);
        if self.result.has_errors() {
            warn!("{} errors, nothing emitted", self.result.error_count());
            self.assembler.enter(BundlePhase::Done);
            report.errors = self.result.error_count();
            report.warnings = self.result.warning_count();
            return Ok(report);
        }

        let overrides = self.prepare_overrides(&program, project);

        // First pass: gather every reference before anything is rewritten
        let mut pipeline = ResourceResolutionPipeline::new();
        if project.config.sprite_merge {
            project.atlas.begin_cycle();
        }
        for file in &program {
            if paths::is_declaration(file) {
                continue;
            }
            let id = self.cache.get(file, &dir);
            let entry = self.cache.entry(id);
            if let (Some(unit), Some(info)) = (entry.parsed_unit(), entry.reference_info()) {
                pipeline.collect(file, unit, info, project, &mut self.result);
            }
        }
        pipeline.settle(project, &mut self.result);

        let atlas_changed = self.build_atlas(project)?;
        expand_html_head(project);

        // Freshness of everything reachable, emitted or not
        {
            let mut engine = FreshnessEngine::new(&mut self.cache, &dir);
            engine.reset();
            for file in &program {
                let id = engine.entry_id(file);
                engine.compute_max_time_for_deps(id, true);
            }
        }

        // Second pass: rewrite, emit, restore
        self.assembler.enter(BundlePhase::Emit);
        for file in &program {
            let id = self.cache.get(file, &dir);
            if paths::is_declaration(file) || paths::is_js(file) {
                stamp_output(self.cache.entry_mut(id));
                continue;
            }
            let has_sprites = self
                .cache
                .entry(id)
                .reference_info()
                .is_some_and(|info| !info.sprites.is_empty());
            let stale = force
                || !self.cache.entry(id).is_output_current()
                || (atlas_changed && has_sprites);
            if !stale {
                continue;
            }
            self.emit_file(id, file, overrides.get(file.as_str()), project)?;
            report.emitted.push(file.clone());
        }

        self.assembler.copy_dependency_js(&mut self.cache, project);
        self.assembler.process_assets(&mut self.cache, project);
        if project.config.bundle != BundleMode::None {
            self.assembler.assemble(&mut self.cache, project)?;
        }

        if !self.result.has_errors() {
            self.live_reload_index += 1;
        }
        self.assembler.enter(BundlePhase::Done);
        info!(
            "Cycle finished: {} emitted, {} errors, {} warnings",
            report.emitted.len(),
            self.result.error_count(),
            self.result.warning_count()
        );
        report.errors = self.result.error_count();
        report.warnings = self.result.warning_count();
        Ok(report)
    }

    /// Load, parse and gather every unit reachable from `entries`,
    /// dependencies first
    fn load_program(&mut self, entries: &[String], project: &mut Project) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        for entry in entries {
            self.visit(entry, project, &mut seen, &mut order);
        }
        // Files that left the program take their messages with them
        self.result
            .retain_files(|file| seen.contains(&file.to_lowercase()));
        order
    }

    fn visit(
        &mut self,
        file: &str,
        project: &mut Project,
        seen: &mut FxHashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !seen.insert(file.to_lowercase()) {
            return;
        }
        self.result.clear_file(file);
        let Some(id) = self.load_unit(file, project) else {
            return;
        };
        let deps: Vec<String> = self
            .cache
            .entry(id)
            .reference_info()
            .map(|info| info.source_deps.iter().map(|(_, dep)| dep.clone()).collect())
            .unwrap_or_default();
        for dep in deps {
            if !paths::is_js(&dep) {
                self.visit(&dep, project, seen, order);
            }
        }
        order.push(file.to_string());
    }

    /// Bring text, parsed unit and reference info of `file` up to date
    fn load_unit(&mut self, file: &str, project: &mut Project) -> Option<EntryId> {
        let id = self.cache.content(file, &project.dir);
        if !self.cache.entry(id).is_text_current() {
            self.result.add(Diagnostic::error(
                file,
                Span::dummy(),
                codes::MISSING_SOURCE,
                format!("Cannot read {}", file),
            ));
            return None;
        }

        if !self.cache.entry(id).is_source_current() {
            debug!("Parsing {}", file);
            let entry = self.cache.entry_mut(id);
            let text = entry.text.clone().unwrap_or_else(|| Arc::from(""));
            let (unit, diagnostics) = self.front_end.parse(file, &text);
            entry.parsed_unit = Some(unit);
            entry.parse_diagnostics = diagnostics;
            entry.source_time = entry.text_time;
        }

        if !self.cache.entry(id).is_info_current() {
            let specifiers: Vec<String> = self
                .cache
                .entry(id)
                .parsed_unit()
                .map(|unit| unit.imports.iter().map(|i| i.specifier.clone()).collect())
                .unwrap_or_default();
            let mut source_deps = Vec::new();
            for specifier in specifiers {
                let resolved = ModuleResolver::new(&mut self.cache, project).resolve(&specifier, file);
                if let Some(resolved) = resolved {
                    source_deps.push((specifier, resolved.file));
                }
            }
            let entry = self.cache.entry_mut(id);
            if let Some(unit) = &entry.parsed_unit {
                let info = gather_source_info(unit, source_deps, |name| {
                    project.resolve_path_string(file, name)
                });
                entry.reference_info = Some(info);
                entry.info_time = entry.cur_time;
            }
        }
        Some(id)
    }

    fn check_program(&mut self, program: &[String], dir: &Path) {
        let mut units: Vec<&ParsedUnit> = Vec::new();
        for file in program {
            let Some(id) = self.cache.find(file, dir) else {
                continue;
            };
            let entry = self.cache.entry(id);
            for diagnostic in entry.parse_diagnostics() {
                self.result.add(diagnostic.clone());
            }
            if let Some(unit) = entry.parsed_unit() {
                units.push(unit);
            }
        }
        for diagnostic in self.front_end.check(&units) {
            self.result.add(diagnostic);
        }
    }

    /// Locate the declarations named by `constantOverrides`
    fn prepare_overrides(
        &mut self,
        program: &[String],
        project: &Project,
    ) -> FxHashMap<String, Vec<Override>> {
        let mut overrides: FxHashMap<String, Vec<Override>> = FxHashMap::default();
        for (module, constants) in &project.config.constant_overrides {
            let file = project
                .module_map
                .get(module)
                .map(|info| info.def_file.clone())
                .or_else(|| {
                    program
                        .iter()
                        .find(|file| module_id(file) == *module)
                        .cloned()
                });
            let Some(file) = file else {
                project.log(&format!("Override module {} not found", module));
                continue;
            };
            let Some(id) = self.cache.find(&file, &project.dir) else {
                continue;
            };
            let Some(unit) = self.cache.entry(id).parsed_unit() else {
                continue;
            };
            for (name, value) in constants {
                match unit.find_declaration(name) {
                    Some(decl) => overrides.entry(file.clone()).or_default().push(Override {
                        decl,
                        value: Expr::from_json(value),
                    }),
                    None => project.log(&format!(
                        "Override {} not found in {}",
                        name, module
                    )),
                }
            }
        }
        overrides
    }

    /// Lay out the sprite atlas and write it when the sprite set changed
    fn build_atlas(&mut self, project: &mut Project) -> Result<bool> {
        if !project.config.sprite_merge || !project.atlas.was_changed() {
            return Ok(false);
        }
        let dir = project.dir.clone();
        let cache = &mut self.cache;
        let image = project.atlas.build(&mut |name: &str| {
            let id = cache.buffer(name, &dir);
            cache.entry(id).buffer().and_then(|bytes| png_dimensions(bytes))
        });
        let bundle_png = project.shortener.shorten("bundle.png");
        project.bundle_png = Some(bundle_png.clone());
        info!("Sprite atlas {}x{} with {} sprites", image.width, image.height, image.sprites.len());

        match project.atlas_encoder.clone() {
            Some(encoder) => {
                let png = encoder
                    .encode(&image, &mut |name: &str| {
                        let id = cache.buffer(name, &dir);
                        cache.entry(id).buffer().cloned()
                    })
                    .map_err(BuildError::Atlas)?;
                project.write(&bundle_png, &png);
            }
            None => warn!("No atlas encoder configured, {} not written", bundle_png),
        }
        Ok(true)
    }

    fn emit_file(
        &mut self,
        id: EntryId,
        file: &str,
        overrides: Option<&Vec<Override>>,
        project: &mut Project,
    ) -> Result<()> {
        let bundled = project.config.bundle != BundleMode::None;
        let js_name = paths::with_js_extension(file);
        let entry = self.cache.entry_mut(id);
        let Some(info) = entry.reference_info.clone() else {
            return Ok(());
        };
        let Some(unit) = entry.parsed_unit.as_mut() else {
            return Ok(());
        };

        let mut options = EmitOptions {
            source_map: project.config.emits_source_maps(),
            declaration: project.config.declaration,
            js_name: js_name.clone(),
            source_root: project.config.source_root.clone(),
            ..Default::default()
        };
        if bundled {
            for (specifier, dep) in &info.source_deps {
                options.module_names.insert(specifier.clone(), module_id(dep));
            }
        }

        let output = {
            let mut scope = RewriteScope::new(unit);
            for o in overrides.into_iter().flatten() {
                scope.set_initializer(o.decl, o.value.clone());
            }
            ResourceResolutionPipeline::new().apply(&mut scope, file, &info, project);
            debug!("Emitting {} with {} rewrites", file, scope.pending());
            self.front_end.emit(scope.unit(), &options)
        };

        if let Some(declaration) = &output.declaration {
            let name = format!("{}.d.ts", paths::strip_extension(&js_name));
            project.write(&name, declaration.as_bytes());
        }
        if bundled {
            let source_map = output
                .source_map
                .as_deref()
                .map(SourceMap::from_json)
                .transpose()?;
            let module = module_id(file);
            project.emitted.insert(
                module.clone(),
                EmittedModule {
                    id: module,
                    js: output.js,
                    source_map,
                    deps: info.source_deps.iter().map(|(_, dep)| module_id(dep)).collect(),
                    copied: false,
                },
            );
        } else {
            if let Some(map) = &output.source_map {
                project.write(&format!("{}.map", js_name), map.as_bytes());
            }
            project.write(&js_name, output.js.as_bytes());
        }

        stamp_output(self.cache.entry_mut(id));
        Ok(())
    }
}

/// Replace `<<asset>>` placeholders of the HTML head template
fn expand_html_head(project: &mut Project) {
    let Some(template) = project.config.html_head.clone() else {
        project.html_head_expanded.clear();
        return;
    };
    let shortener = &mut project.shortener;
    let dep_assets = &mut project.dep_asset_files;
    project.html_head_expanded = HTML_PLACEHOLDER
        .replace_all(&template, |caps: &Captures| {
            let name = caps[1].to_string();
            let shortened = shortener.shorten(&name);
            dep_assets.insert(name, shortened.clone());
            shortened
        })
        .into_owned();
}

/// Record emission at the freshness computed for the entry
fn stamp_output(entry: &mut crate::cache::CacheEntry) {
    entry.output_time = match entry.max_time_for_deps.time() {
        Some(time) => Stamp::At(time),
        None => entry.cur_time,
    };
}

impl std::fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("entries", &self.cache.len())
            .field("errors", &self.result.error_count())
            .field("live_reload_index", &self.live_reload_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::frontend::ScanFrontEnd;
    use crate::fs::MockFileSystem;
    use crate::output::MemorySink;

    fn setup(files: &[(&str, &str)]) -> (BuildSession, Project, Arc<MemorySink>) {
        let fs = Arc::new(MockFileSystem::new());
        for (name, content) in files {
            fs.write_file(format!("/p/{}", name), content);
        }
        let sink = Arc::new(MemorySink::new());
        let config = ProjectConfig {
            main: vec!["main.ts".to_string()],
            ..Default::default()
        };
        let project = Project::new(config, "/p", sink.clone()).with_log(Arc::new(|_: &str| {}));
        (
            BuildSession::new(fs, Arc::new(ScanFrontEnd::new())),
            project,
            sink,
        )
    }

    #[test]
    fn test_compile_runs_every_phase() {
        let (mut session, mut project, sink) = setup(&[("main.ts", "export const a = 1;\n")]);
        assert_eq!(session.phase(), BundlePhase::Idle);

        let report = session.compile(&mut project).unwrap();
        assert_eq!(report.stale_entries, vec!["main.ts".to_string()]);
        assert_eq!(report.emitted, vec!["main.ts".to_string()]);
        assert!(!report.is_up_to_date());
        assert_eq!(session.phase(), BundlePhase::Done);
        assert_eq!(
            sink.get_string("main.js").as_deref(),
            Some("var a = 1;\nexports.a = a;\n")
        );
    }

    #[test]
    fn test_second_cycle_is_up_to_date() {
        let (mut session, mut project, sink) = setup(&[("main.ts", "export const a = 1;\n")]);
        session.compile(&mut project).unwrap();
        sink.take_writes();

        session.clear_file_time_modifications();
        let report = session.compile(&mut project).unwrap();
        assert!(report.is_up_to_date());
        assert!(sink.take_writes().is_empty());
    }

    #[test]
    fn test_missing_main_reports_error() {
        let (mut session, mut project, _) = setup(&[]);
        let report = session.compile(&mut project).unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(session.result().messages()[0].code, codes::MISSING_SOURCE);
        assert_eq!(session.live_reload_index(), 0);
    }

    #[test]
    fn test_html_head_without_template_is_empty() {
        let (_, mut project, _) = setup(&[]);
        project.html_head_expanded = "stale".to_string();
        expand_html_head(&mut project);
        assert!(project.html_head_expanded.is_empty());
    }
}
