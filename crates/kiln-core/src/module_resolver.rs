//! Import specifier resolution
//!
//! Relative specifiers are resolved against the importing file; bare
//! specifiers are looked up in every ancestor directory and then in
//! `node_modules/<name>/package.json`. Only flat `node_modules` layouts are
//! supported.

use serde::Deserialize;
use tracing::trace;

use crate::cache::FileCache;
use crate::paths;
use crate::project::{ModuleInfo, Project};

/// Result of resolving one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    /// Project-relative file providing the module's definition
    pub file: String,
    /// Module name used in bundles
    pub id: String,
    pub declaration_only: bool,
}

#[derive(Deserialize)]
struct PackageJson {
    main: Option<String>,
}

/// Bundle module name of a file: its path without the extension.
pub fn module_id(file: &str) -> String {
    if paths::is_declaration(file) {
        return file[..file.len() - ".d.ts".len()].to_string();
    }
    paths::strip_extension(file).to_string()
}

pub struct ModuleResolver<'a> {
    cache: &'a mut FileCache,
    project: &'a mut Project,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(cache: &'a mut FileCache, project: &'a mut Project) -> Self {
        Self { cache, project }
    }

    fn exists(&mut self, name: &str) -> bool {
        let id = self.cache.existence(name, &self.project.dir);
        self.cache.entry(id).exists()
    }

    fn record(&mut self, key: &str, def_file: String, js_file: String, declaration_only: bool, internal: bool) {
        self.project.module_map.insert(
            key.to_string(),
            ModuleInfo {
                def_file,
                js_file,
                declaration_only,
                internal,
            },
        );
    }

    /// Try the known extensions of `base` in priority order
    fn resolve_extension(&mut self, key: &str, base: &str, internal: bool) -> Option<ResolvedModule> {
        let js = format!("{}.js", base);
        for ext in [".ts", ".tsx"] {
            let file = format!("{}{}", base, ext);
            if self.exists(&file) {
                self.record(key, file.clone(), js, false, internal);
                return Some(ResolvedModule {
                    file,
                    id: base.to_string(),
                    declaration_only: false,
                });
            }
        }

        let declaration = format!("{}.d.ts", base);
        if self.exists(&declaration) && self.exists(&js) {
            self.project.add_dep_js(&js, &js);
            self.record(key, declaration.clone(), js, true, internal);
            return Some(ResolvedModule {
                file: declaration,
                id: base.to_string(),
                declaration_only: true,
            });
        }

        if self.exists(&js) {
            self.project.add_dep_js(&js, &js);
            self.record(key, js.clone(), js.clone(), true, internal);
            return Some(ResolvedModule {
                file: js,
                id: base.to_string(),
                declaration_only: true,
            });
        }
        None
    }

    /// Resolve `specifier` imported from the project-relative `containing_file`.
    /// Failures are logged and yield `None`.
    pub fn resolve(&mut self, specifier: &str, containing_file: &str) -> Option<ResolvedModule> {
        trace!("Resolving {} from {}", specifier, containing_file);
        if specifier.starts_with('.') {
            if specifier.contains("//") {
                self.project.log(&format!(
                    "Import {} contains two slashes in row in {}",
                    specifier, containing_file
                ));
            }
            let base = paths::join(&paths::dirname(containing_file), specifier);
            let resolved = self.resolve_extension(&base, &base, true);
            if resolved.is_none() {
                self.project.log(&format!(
                    "Module {} is not valid in {}",
                    specifier, containing_file
                ));
            }
            return resolved;
        }

        let mut dir = paths::dirname(containing_file);
        loop {
            let base = paths::join(&dir, specifier);
            if let Some(resolved) = self.resolve_extension(specifier, &base, false) {
                return Some(resolved);
            }
            let parent = paths::dirname(&dir);
            if parent == dir {
                break;
            }
            dir = parent;
        }

        let package = format!("node_modules/{}/package.json", specifier);
        let id = self.cache.content(&package, &self.project.dir);
        let text = self.cache.entry(id).text()?;
        let main = match serde_json::from_str::<PackageJson>(&text) {
            Ok(package) => package.main.unwrap_or_else(|| "index.js".to_string()),
            Err(e) => {
                self.project
                    .log(&format!("Cannot parse {} {}", package, e));
                return None;
            }
        };
        let base = paths::join(
            &format!("node_modules/{}", specifier),
            paths::strip_extension(&main),
        );
        let resolved = self.resolve_extension(specifier, &base, false);
        if resolved.is_none() {
            self.project.log(&format!(
                "Module {} is not valid in {}",
                specifier, containing_file
            ));
        }
        resolved
    }
}
