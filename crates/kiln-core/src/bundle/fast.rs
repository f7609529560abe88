use indexmap::IndexMap;
use std::sync::Arc;

use crate::errors::Result;
use crate::frontend::Expr;
use crate::project::EmittedModule;

use super::sourcemap::ConcatSourceMapBuilder;
use super::LOADER;

/// Fast bundle text and its composite source map
#[derive(Debug, Clone, PartialEq)]
pub struct FastBundle {
    pub js: String,
    pub map: String,
}

/// Wrap every module in a registration call, keeping emission order.
///
/// `map_name` is the file name written into the trailing
/// `sourceMappingURL` comment.
pub fn assemble(
    modules: &IndexMap<String, EmittedModule>,
    entries: &[String],
    blobs: &[Arc<[u8]>],
    bundle_name: &str,
    map_name: &str,
    source_root: Option<&str>,
) -> Result<FastBundle> {
    let mut builder = ConcatSourceMapBuilder::new();
    builder.add_lines(LOADER);
    for blob in blobs {
        builder.add_source(&String::from_utf8_lossy(blob), None)?;
    }

    for module in modules.values() {
        builder.add_line(&format!(
            "R('{}',function(require, module, exports, global){{",
            module.id
        ));
        builder.add_source(&module.js, module.source_map.as_ref())?;
        builder.add_line("});");
    }
    for entry in entries.iter().filter(|e| modules.contains_key(e.as_str())) {
        builder.add_line(&format!("R.r({});", Expr::Str(entry.clone()).render()));
    }
    builder.add_line(&format!("//# sourceMappingURL={}", map_name));

    if let Some(root) = source_root {
        builder.set_source_root(root.to_string());
    }
    let (js, map) = builder.finish(Some(bundle_name.to_string()));
    Ok(FastBundle {
        js,
        map: map.to_json().map_err(crate::bundle::sourcemap::SourceMapError::from)?,
    })
}
