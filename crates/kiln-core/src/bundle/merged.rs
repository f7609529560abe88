use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

use crate::frontend::Expr;
use crate::project::EmittedModule;

use super::minify::{strip_comments, substitute_defines};
use super::LOADER;

/// Runtime modules that have to be evaluated before any entry point,
/// as `(pattern, module id)`; the first pattern found wins.
pub const RUNTIME_SHIMS: [(&str, &str); 2] = [
    ("/bobriln/index", "node_modules/bobriln/index"),
    ("/bobril/index", "node_modules/bobril/index"),
];

#[derive(Debug, Clone, Default)]
pub struct MergedOptions {
    pub compress: bool,
    pub mangle: bool,
    pub beautify: bool,
    pub defines: IndexMap<String, serde_json::Value>,
}

/// Entry ids with a detected runtime shim in front
pub fn entry_list(modules: &IndexMap<String, EmittedModule>, entries: &[String]) -> Vec<String> {
    let mut list = entries.to_vec();
    for (pattern, shim) in RUNTIME_SHIMS {
        if modules.keys().any(|id| format!("/{}", id).contains(pattern)) {
            if modules.contains_key(shim) && !list.iter().any(|e| e == shim) {
                list.insert(0, shim.to_string());
            }
            break;
        }
    }
    list
}

/// Modules reachable from `entries` in dependency-first order
pub fn module_order(modules: &IndexMap<String, EmittedModule>, entries: &[String]) -> Vec<String> {
    fn visit(
        id: &str,
        modules: &IndexMap<String, EmittedModule>,
        seen: &mut FxHashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !seen.insert(id.to_string()) {
            return;
        }
        let Some(module) = modules.get(id) else {
            return;
        };
        for dep in &module.deps {
            visit(dep, modules, seen, order);
        }
        order.push(id.to_string());
    }

    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    for entry in entries {
        visit(entry, modules, &mut seen, &mut order);
    }
    order
}

fn quoted(id: &str) -> String {
    Expr::Str(id.to_string()).render()
}

/// Short module names, skipping copied dependency JS whose own relative
/// requires still use the original names
fn mangled_names(order: &[String], modules: &IndexMap<String, EmittedModule>) -> FxHashMap<String, String> {
    order
        .iter()
        .filter(|id| modules.get(*id).is_some_and(|m| !m.copied))
        .enumerate()
        .map(|(index, id)| (id.clone(), format!("{:x}", index)))
        .collect()
}

/// Assemble the single merged artifact.
///
/// `blobs` are prepended verbatim, each followed by a newline.
pub fn assemble(
    modules: &IndexMap<String, EmittedModule>,
    entries: &[String],
    blobs: &[Arc<[u8]>],
    options: &MergedOptions,
) -> Vec<u8> {
    let entries = entry_list(modules, entries);
    let order = module_order(modules, &entries);
    debug!("Merged bundle of {} modules", order.len());

    let names = if options.mangle {
        mangled_names(&order, modules)
    } else {
        FxHashMap::default()
    };
    let name_of = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    let mut code = String::from("(function(){\n");
    code.push_str(LOADER);
    for id in &order {
        let module = &modules[id.as_str()];
        let mut body = module.js.clone();
        for dep in &module.deps {
            if let Some(short) = names.get(dep) {
                body = body.replace(
                    &format!("require({})", quoted(dep)),
                    &format!("require({})", quoted(short)),
                );
            }
        }
        code.push_str(&format!(
            "R({},function(require, module, exports, global){{\n",
            quoted(&name_of(id))
        ));
        code.push_str(&body);
        if !body.ends_with('\n') {
            code.push('\n');
        }
        code.push_str("});\n");
    }
    for entry in &entries {
        if modules.contains_key(entry.as_str()) {
            code.push_str(&format!("R.r({});\n", quoted(&name_of(entry))));
        }
    }
    code.push_str("})();\n");

    let code = substitute_defines(&code, &options.defines);
    let code = if options.compress && !options.beautify {
        strip_comments(&code)
    } else {
        code.lines()
            .filter(|line| !line.starts_with("//# sourceMappingURL="))
            .map(|line| format!("{}\n", line))
            .collect()
    };

    let mut out = Vec::with_capacity(code.len());
    for blob in blobs {
        out.extend_from_slice(blob);
        out.push(b'\n');
    }
    out.extend_from_slice(code.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, js: &str, deps: &[&str]) -> (String, EmittedModule) {
        (
            id.to_string(),
            EmittedModule {
                id: id.to_string(),
                js: js.to_string(),
                source_map: None,
                deps: deps.iter().map(|d| d.to_string()).collect(),
                copied: false,
            },
        )
    }

    fn modules(list: Vec<(String, EmittedModule)>) -> IndexMap<String, EmittedModule> {
        list.into_iter().collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let modules = modules(vec![
            module("a", "var b = require(\"b\");\n", &["b"]),
            module("b", "exports.x = 1;\n", &[]),
            module("unused", "", &[]),
        ]);
        let order = module_order(&modules, &["a".to_string()]);
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let modules = modules(vec![module("a", "", &["b"]), module("b", "", &["a"])]);
        assert_eq!(module_order(&modules, &["a".to_string()]), vec!["b", "a"]);
    }

    #[test]
    fn test_shim_is_listed_first() {
        let modules = modules(vec![
            module("src/a", "", &[]),
            module("node_modules/bobril/index", "", &[]),
        ]);
        assert_eq!(
            entry_list(&modules, &["src/a".to_string()]),
            vec!["node_modules/bobril/index", "src/a"]
        );
    }

    #[test]
    fn test_assemble_with_mangle_and_blobs() {
        let modules = modules(vec![
            module("src/a", "// hi\nvar b = require(\"src/b\");\n", &["src/b"]),
            module("src/b", "exports.x = DEBUG;\n", &[]),
        ]);
        let mut options = MergedOptions {
            compress: true,
            mangle: true,
            ..Default::default()
        };
        options.defines.insert("DEBUG".to_string(), serde_json::json!(false));
        let blobs: Vec<Arc<[u8]>> = vec![Arc::from(&b"var lib = 1;"[..])];

        let out = String::from_utf8(assemble(&modules, &["src/a".to_string()], &blobs, &options)).unwrap();
        assert!(out.starts_with("var lib = 1;\n(function(){\n"));
        let b = out.find("R(\"0\",function").unwrap();
        let a = out.find("R(\"1\",function").unwrap();
        assert!(b < a);
        assert!(out.contains("var b = require(\"0\");"));
        assert!(out.contains("exports.x = false;"));
        assert!(out.contains("R.r(\"1\");"));
        assert!(!out.contains("// hi"));
    }
}
