//! Output assembly
//!
//! After every stale unit has been emitted, the [`BundlingAssembler`] copies
//! dependency JavaScript, processes stylesheets and binary assets, and, when
//! a bundle mode is configured, writes the single JavaScript artifact.

pub mod css;
pub mod fast;
pub mod merged;
pub mod minify;
pub mod sourcemap;

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::FileCache;
use crate::config::BundleMode;
use crate::errors::Result;
use crate::module_resolver::module_id;
use crate::paths;
use crate::project::{EmittedModule, Project};

use css::{split_url_suffix, CssSource};

/// Module registry evaluated at the top of every bundle. `R(name, factory)`
/// registers a module, `R.r(name)` evaluates it; relative requires are
/// resolved against the requiring module's name.
pub const LOADER: &str = r#"var R = (function (G) {
    var defs = {}, done = {};
    function norm(from, name) {
        if (name.charAt(0) !== ".") return name;
        var parts = from.split("/");
        parts.pop();
        var segs = name.split("/");
        for (var i = 0; i < segs.length; i++) {
            if (segs[i] === "..") parts.pop();
            else if (segs[i] !== "." && segs[i] !== "") parts.push(segs[i]);
        }
        return parts.join("/");
    }
    function load(name) {
        var m = done[name];
        if (m) return m.exports;
        var f = defs[name];
        if (!f) throw new Error("Module " + name + " not found");
        m = done[name] = { exports: {} };
        f.call(m.exports, function (n) { return load(norm(name, n)); }, m, m.exports, G);
        return m.exports;
    }
    function R(name, f) { defs[name] = f; }
    R.r = load;
    return R;
})(typeof window !== "undefined" ? window : this);
"#;

/// Steps of one build cycle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BundlePhase {
    #[default]
    Idle,
    EntrySelection,
    Emit,
    DependencyCopy,
    AssetProcessing,
    BundleAssembly,
    Done,
}

/// Copies dependencies and assets and writes the bundle artifacts.
#[derive(Debug, Default)]
pub struct BundlingAssembler {
    phase: BundlePhase,
}

impl BundlingAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BundlePhase {
        self.phase
    }

    pub fn enter(&mut self, phase: BundlePhase) {
        debug!("Build phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Copy dependency JS next to the outputs, or register it as a bundle
    /// module when bundling.
    pub fn copy_dependency_js(&mut self, cache: &mut FileCache, project: &mut Project) {
        self.enter(BundlePhase::DependencyCopy);
        let bundled = project.config.bundle != BundleMode::None;
        let files: Vec<(String, String)> = project
            .dep_js_files
            .iter()
            .map(|(src, out)| (src.clone(), out.clone()))
            .collect();

        for (source, output) in files {
            let id = cache.existence(&source, &project.dir);
            if !cache.entry(id).exists() {
                project.log(&format!("Error: Dependent {} not found", source));
                continue;
            }
            if !bundled && !cache.entry(id).needs_copy() {
                continue;
            }
            cache.ensure_text(id);
            let Some(text) = cache.entry(id).text().cloned() else {
                project.log(&format!("Error: Dependent {} failed to load", source));
                continue;
            };
            if bundled {
                let module = module_id(&source);
                project.emitted.insert(
                    module.clone(),
                    EmittedModule {
                        id: module,
                        js: text.to_string(),
                        source_map: None,
                        deps: Vec::new(),
                        copied: true,
                    },
                );
            } else {
                debug!("Copying {} to {}", source, output);
                project.write(&output, text.as_bytes());
            }
            let entry = cache.entry_mut(id);
            entry.output_time = entry.text_time;
        }
    }

    /// Stylesheets and binary assets
    pub fn process_assets(&mut self, cache: &mut FileCache, project: &mut Project) {
        self.enter(BundlePhase::AssetProcessing);
        let merged = project.config.bundle == BundleMode::Merged;

        let mut stylesheets = Vec::new();
        let mut any_stale = false;
        for name in project.dep_asset_files.keys() {
            if !paths::is_css(name) {
                continue;
            }
            let id = cache.existence(name, &project.dir);
            if !cache.entry(id).exists() {
                continue;
            }
            let stale = cache.entry(id).needs_copy();
            any_stale |= stale;
            stylesheets.push((name.clone(), id, stale));
        }

        let processor = project.css.clone();
        if merged {
            if !stylesheets.is_empty() {
                let bundle_css = project.shortener.shorten("bundle.css");
                if any_stale {
                    let mut sources = Vec::new();
                    for (name, id, _) in &stylesheets {
                        cache.ensure_buffer(*id);
                        if let Some(buffer) = cache.entry(*id).buffer() {
                            sources.push(CssSource {
                                css: String::from_utf8_lossy(buffer).into_owned(),
                                from: name.clone(),
                            });
                        }
                    }
                    let shortener = &mut project.shortener;
                    let dep_assets = &mut project.dep_asset_files;
                    let css = processor.concatenate_and_minify(&sources, &mut |url, from| {
                        let (path, suffix) = split_url_suffix(url);
                        let resolved = paths::join(&paths::dirname(from), path);
                        dep_assets.insert(resolved.clone(), shortener.shorten(&resolved));
                        format!("{}{}", shortener.short_name(&resolved), suffix)
                    });
                    project.write(&bundle_css, css.as_bytes());
                }
                project.css_to_link.push(bundle_css);
            }
        } else {
            for (name, id, stale) in &stylesheets {
                let output = project
                    .dep_asset_files
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.clone());
                project.css_to_link.push(output.clone());
                if !stale {
                    continue;
                }
                cache.ensure_buffer(*id);
                let Some(buffer) = cache.entry(*id).buffer().cloned() else {
                    continue;
                };
                let dep_assets = &mut project.dep_asset_files;
                let css = processor.rewrite_urls(
                    &String::from_utf8_lossy(&buffer),
                    name,
                    &mut |url, from| {
                        let (path, _) = split_url_suffix(url);
                        let resolved = paths::join(&paths::dirname(from), path);
                        dep_assets
                            .entry(resolved.clone())
                            .or_insert(resolved);
                        url.to_string()
                    },
                );
                project.write(&output, css.as_bytes());
            }
        }

        let assets: Vec<(String, String)> = project
            .dep_asset_files
            .iter()
            .map(|(name, output)| (name.clone(), output.clone()))
            .collect();
        let mut copied = 0;
        for (name, output) in assets {
            let id = cache.existence(&name, &project.dir);
            if !cache.entry(id).exists() {
                project.log(&format!("Error: Dependent {} not found", name));
                continue;
            }
            if !cache.entry(id).needs_copy() {
                continue;
            }
            cache.ensure_buffer(id);
            let Some(buffer) = cache.entry(id).buffer().cloned() else {
                project.log(&format!("Error: Dependent {} failed to load", name));
                continue;
            };
            if !paths::is_css(&name) && !paths::is_js(&name) {
                project.write(&output, &buffer);
                copied += 1;
            }
            let entry = cache.entry_mut(id);
            entry.output_time = entry.cur_time;
        }
        if copied > 0 {
            info!("Copied {} assets", copied);
        }
    }

    /// JS assets in discovery order, prepended to bundles
    fn js_blobs(cache: &mut FileCache, project: &Project) -> Vec<Arc<[u8]>> {
        let mut blobs = Vec::new();
        for name in project.dep_asset_files.keys().filter(|n| paths::is_js(n)) {
            let id = cache.existence(name, &project.dir);
            cache.ensure_buffer(id);
            if let Some(buffer) = cache.entry(id).buffer() {
                blobs.push(buffer.clone());
            }
        }
        blobs
    }

    /// Write `bundle.js` (and its map for fast bundling)
    pub fn assemble(&mut self, cache: &mut FileCache, project: &mut Project) -> Result<()> {
        self.enter(BundlePhase::BundleAssembly);
        let Some(bundle_js) = project.bundle_js.clone() else {
            return Ok(());
        };
        let entries: Vec<String> = project
            .config
            .main
            .iter()
            .filter(|main| !paths::is_declaration(main))
            .map(|main| module_id(&paths::normalize(main)))
            .collect();
        let blobs = Self::js_blobs(cache, project);

        match project.config.bundle {
            BundleMode::None => {}
            BundleMode::Merged => {
                let options = merged::MergedOptions {
                    compress: project.config.compress,
                    mangle: project.config.mangle,
                    beautify: project.config.beautify,
                    defines: project.config.defines.clone(),
                };
                let content = merged::assemble(&project.emitted, &entries, &blobs, &options);
                info!("Writing merged bundle {}", bundle_js);
                project.write(&bundle_js, &content);
            }
            BundleMode::Fast => {
                let map_name = format!("{}.map", project.shortener.short_name("bundle.js"));
                let bundle = fast::assemble(
                    &project.emitted,
                    &entries,
                    &blobs,
                    paths::file_name(&bundle_js),
                    &map_name,
                    project.config.source_root.as_deref(),
                )?;
                info!("Writing fast bundle {}", bundle_js);
                project.write(&format!("{}.map", bundle_js), bundle.map.as_bytes());
                project.write(&bundle_js, bundle.js.as_bytes());
            }
        }
        Ok(())
    }
}
