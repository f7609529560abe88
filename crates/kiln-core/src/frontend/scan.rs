use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::{Arc, LazyLock};

use crate::bundle::sourcemap::SourceMapBuilder;
use crate::diagnostics::Diagnostic;
use crate::span::Span;

use super::{
    CallExpr, EmitOptions, EmitOutput, Expr, FrontEnd, FunctionDecl, Import, ImportBinding,
    ParsedUnit, VarDecl,
};

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import\s+(?:\*\s+as\s+([A-Za-z_$][\w$]*)|([A-Za-z_$][\w$]*)|\{([^}]*)\})\s+from\s+["']([^"']+)["'][ \t]*;?"#,
    )
    .unwrap()
});
static IMPORT_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*import\s+["']([^"']+)["'][ \t]*;?"#).unwrap());
static EXPORT_CONST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(export\s+const)\s+([A-Za-z_$][\w$]*)\s*=[ \t]*").unwrap()
});
static EXPORT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(export\s+function)\s+([A-Za-z_$][\w$]*)").unwrap()
});
static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(b)\.(asset|sprite|styleDefEx|styleDef)|(t|f))\s*\(").unwrap()
});
static BINDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*$").unwrap());

/// Unterminated recognized call
const UNTERMINATED_CALL: &str = "KS1";
/// Same name exported twice
const DUPLICATE_EXPORT: &str = "KS2";

/// Front end for JavaScript sources with ES `import`/`export` syntax.
///
/// Only the structure the build engine rewrites is recognized: imports,
/// `export const` / `export function` declarations, and the resource call
/// sites. Everything else passes through emission untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanFrontEnd;

impl ScanFrontEnd {
    pub fn new() -> Self {
        Self
    }
}

/// Byte ranges of string literals and comments, sorted by start.
struct Literals(Vec<(usize, usize)>);

impl Literals {
    fn scan(src: &str) -> Self {
        let bytes = src.as_bytes();
        let mut ranges = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let start = i;
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i += 2;
                    while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                        i += 1;
                    }
                    i = (i + 2).min(bytes.len());
                }
                quote @ (b'"' | b'\'' | b'`') => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        if bytes[i] == b'\\' {
                            i += 1;
                        } else if bytes[i] == b'\n' && quote != b'`' {
                            break;
                        }
                        i += 1;
                    }
                    i = (i + 1).min(bytes.len());
                }
                _ => {
                    i += 1;
                    continue;
                }
            }
            ranges.push((start, i));
        }
        Self(ranges)
    }

    /// End of the literal containing `pos`, if any
    fn containing(&self, pos: usize) -> Option<usize> {
        let idx = self.0.partition_point(|(_, end)| *end <= pos);
        match self.0.get(idx) {
            Some((start, end)) if *start <= pos => Some(*end),
            _ => None,
        }
    }

    fn contains(&self, pos: usize) -> bool {
        self.containing(pos).is_some()
    }

    /// Offset of the paren closing the one at `open`
    fn find_close(&self, src: &str, open: usize) -> Option<usize> {
        let bytes = src.as_bytes();
        let mut depth = 0usize;
        let mut i = open;
        while i < bytes.len() {
            if let Some(end) = self.containing(i) {
                i = end;
                continue;
            }
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Trimmed ranges of the top-level comma-separated pieces of `src[from..to]`
    fn split_args(&self, src: &str, from: usize, to: usize) -> Vec<(usize, usize)> {
        let bytes = src.as_bytes();
        let mut pieces = Vec::new();
        let mut depth = 0usize;
        let mut piece_start = from;
        let mut i = from;
        while i < to {
            if let Some(end) = self.containing(i) {
                i = end;
                continue;
            }
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    pieces.push((piece_start, i));
                    piece_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        pieces.push((piece_start, to));

        let mut trimmed: Vec<(usize, usize)> = pieces
            .into_iter()
            .map(|(s, e)| trim_range(src, s, e))
            .collect();
        if matches!(trimmed.last(), Some((s, e)) if s == e) {
            trimmed.pop();
        }
        trimmed
    }

    /// End of a declaration initializer starting at `from`
    fn statement_end(&self, src: &str, from: usize) -> usize {
        let bytes = src.as_bytes();
        let mut depth = 0usize;
        let mut i = from;
        while i < bytes.len() {
            if let Some(end) = self.containing(i) {
                i = end;
                continue;
            }
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b';' | b'\n' if depth == 0 => return i,
                _ => {}
            }
            i += 1;
        }
        bytes.len()
    }
}

fn trim_range(src: &str, start: usize, end: usize) -> (usize, usize) {
    let text = &src[start..end];
    let lead = text.len() - text.trim_start().len();
    let trail = text.len() - text.trim_end().len();
    if lead == text.len() {
        return (start, start);
    }
    (start + lead, end - trail)
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_expr(text: &str, literals: &Literals, offset: usize) -> Expr {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let quote = bytes[0];
        let is_single_literal = matches!(quote, b'"' | b'\'')
            && bytes[bytes.len() - 1] == quote
            && literals.containing(offset) == Some(offset + text.len());
        if is_single_literal {
            return Expr::Str(unescape(&text[1..text.len() - 1]));
        }
    }
    match text {
        "true" => return Expr::Bool(true),
        "false" => return Expr::Bool(false),
        "null" => return Expr::Null,
        _ => {}
    }
    let numeric_start = bytes
        .iter()
        .position(|b| *b != b'-')
        .map(|i| bytes[i].is_ascii_digit() || bytes[i] == b'.')
        .unwrap_or(false);
    if numeric_start {
        if let Ok(n) = text.parse::<f64>() {
            return Expr::Num(n);
        }
    }
    Expr::Raw(text.to_string())
}

fn parse_named_imports(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(" as ") {
            Some((imported, local)) => (imported.trim().to_string(), local.trim().to_string()),
            None => (item.to_string(), item.to_string()),
        })
        .collect()
}

/// Replacement text that keeps the line count of `original`
fn pad_lines(replacement: String, original: &str) -> String {
    let missing = original
        .matches('\n')
        .count()
        .saturating_sub(replacement.matches('\n').count());
    let mut text = replacement;
    text.extend(std::iter::repeat('\n').take(missing));
    text
}

impl FrontEnd for ScanFrontEnd {
    fn parse(&self, file: &str, text: &str) -> (ParsedUnit, Vec<Diagnostic>) {
        let literals = Literals::scan(text);
        let mut diagnostics = Vec::new();

        let mut imports = Vec::new();
        for caps in IMPORT_FROM.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            if literals.contains(start) {
                continue;
            }
            let binding = if let Some(ns) = caps.get(1) {
                ImportBinding::Namespace(ns.as_str().to_string())
            } else if let Some(default) = caps.get(2) {
                ImportBinding::Default(default.as_str().to_string())
            } else {
                ImportBinding::Named(parse_named_imports(caps.get(3).map_or("", |m| m.as_str())))
            };
            imports.push(Import {
                specifier: caps[4].to_string(),
                binding,
                span: Span::from_offsets(text, start, whole.end()),
            });
        }
        for caps in IMPORT_BARE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            if literals.contains(start) {
                continue;
            }
            imports.push(Import {
                specifier: caps[1].to_string(),
                binding: ImportBinding::None,
                span: Span::from_offsets(text, start, whole.end()),
            });
        }
        imports.sort_by_key(|import| import.span.start);

        let mut declarations = Vec::new();
        for caps in EXPORT_CONST.captures_iter(text) {
            let (Some(keyword), Some(whole)) = (caps.get(1), caps.get(0)) else {
                continue;
            };
            if literals.contains(keyword.start()) {
                continue;
            }
            let init_end = literals.statement_end(text, whole.end());
            let (init_start, init_end) = trim_range(text, whole.end(), init_end);
            if init_start == init_end {
                continue;
            }
            declarations.push(VarDecl {
                name: caps[2].to_string(),
                exported: true,
                init: parse_expr(&text[init_start..init_end], &literals, init_start),
                keyword_span: Span::from_offsets(text, keyword.start(), keyword.end()),
                init_span: Span::from_offsets(text, init_start, init_end),
                edited: false,
            });
        }

        let functions = EXPORT_FUNCTION
            .captures_iter(text)
            .filter_map(|caps| {
                let keyword = caps.get(1)?;
                if literals.contains(keyword.start()) {
                    return None;
                }
                Some(FunctionDecl {
                    name: caps[2].to_string(),
                    keyword_span: Span::from_offsets(text, keyword.start(), keyword.end()),
                })
            })
            .collect();

        let mut calls = Vec::new();
        let mut last_call_end = 0;
        for caps in CALL.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let start = whole.start();
            if start < last_call_end || literals.contains(start) {
                continue;
            }
            let preceding = text[..start].chars().next_back();
            if matches!(preceding, Some(c) if c == '.' || c == '$' || c == '_' || c.is_alphanumeric())
            {
                continue;
            }
            if text[..start].trim_end().ends_with("function") {
                continue;
            }
            let (object, method) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(object), Some(method), _) => (Some(object.as_str()), method.as_str()),
                (_, _, Some(function)) => (None, function.as_str()),
                _ => continue,
            };
            let open = whole.end() - 1;
            let Some(close) = literals.find_close(text, open) else {
                diagnostics.push(Diagnostic::error(
                    file,
                    Span::from_offsets(text, start, whole.end()),
                    UNTERMINATED_CALL,
                    format!("Unterminated call to {}", &text[start..open].trim_end()),
                ));
                break;
            };
            let args = literals
                .split_args(text, open + 1, close)
                .into_iter()
                .map(|(s, e)| parse_expr(&text[s..e], &literals, s))
                .collect();
            let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let binding = BINDING
                .captures(&text[line_start..start])
                .map(|caps| caps[1].to_string());

            let mut call = CallExpr::new(object, method, args, Span::from_offsets(text, start, close + 1));
            call.binding = binding;
            calls.push(call);
            last_call_end = close + 1;
        }

        let unit = ParsedUnit {
            file: file.to_string(),
            source: Arc::from(text),
            imports,
            calls,
            declarations,
            functions,
        };
        (unit, diagnostics)
    }

    fn check(&self, units: &[&ParsedUnit]) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for unit in units {
            let mut seen = FxHashSet::default();
            let exports = unit
                .declarations
                .iter()
                .filter(|d| d.exported)
                .map(|d| (&d.name, d.keyword_span))
                .chain(unit.functions.iter().map(|f| (&f.name, f.keyword_span)));
            for (name, span) in exports {
                if !seen.insert(name) {
                    diagnostics.push(Diagnostic::error(
                        &unit.file,
                        span,
                        DUPLICATE_EXPORT,
                        format!("Duplicate export '{}'", name),
                    ));
                }
            }
        }
        diagnostics
    }

    fn emit(&self, unit: &ParsedUnit, options: &EmitOptions) -> EmitOutput {
        let source = unit.source.as_ref();
        let mut edits: Vec<(usize, usize, String)> = Vec::new();

        for (index, import) in unit.imports.iter().enumerate() {
            let id = options
                .module_names
                .get(&import.specifier)
                .unwrap_or(&import.specifier);
            let require = format!("require({})", Expr::Str(id.clone()).render());
            let text = match &import.binding {
                ImportBinding::None => format!("{};", require),
                ImportBinding::Namespace(name) => format!("var {} = {};", name, require),
                ImportBinding::Default(name) => format!("var {} = {}.default;", name, require),
                ImportBinding::Named(pairs) => {
                    let holder = format!("__import{}", index);
                    let mut text = format!("var {} = {}", holder, require);
                    for (imported, local) in pairs {
                        text.push_str(&format!(", {} = {}.{}", local, holder, imported));
                    }
                    text.push(';');
                    text
                }
            };
            let original = &source[import.span.start..import.span.end];
            edits.push((import.span.start, import.span.end, pad_lines(text, original)));
        }

        for decl in &unit.declarations {
            edits.push((decl.keyword_span.start, decl.keyword_span.end, "var".to_string()));
            if decl.edited {
                let original = &source[decl.init_span.start..decl.init_span.end];
                edits.push((
                    decl.init_span.start,
                    decl.init_span.end,
                    pad_lines(decl.init.render(), original),
                ));
            }
        }
        for function in &unit.functions {
            edits.push((
                function.keyword_span.start,
                function.keyword_span.end,
                "function".to_string(),
            ));
        }
        for call in unit.calls.iter().filter(|c| c.edited) {
            let original = &source[call.span.start..call.span.end];
            edits.push((call.span.start, call.span.end, pad_lines(call.render(), original)));
        }

        edits.sort_by_key(|(start, _, _)| *start);
        let mut js = String::with_capacity(source.len());
        let mut cursor = 0;
        for (start, end, text) in edits {
            if start < cursor {
                continue;
            }
            js.push_str(&source[cursor..start]);
            js.push_str(&text);
            cursor = end;
        }
        js.push_str(&source[cursor..]);

        let exported: Vec<&str> = unit
            .declarations
            .iter()
            .filter(|d| d.exported)
            .map(|d| d.name.as_str())
            .chain(unit.functions.iter().map(|f| f.name.as_str()))
            .collect();
        if !exported.is_empty() && !js.ends_with('\n') {
            js.push('\n');
        }
        for name in &exported {
            js.push_str(&format!("exports.{0} = {0};\n", name));
        }

        let source_map = if options.source_map {
            let mut builder = SourceMapBuilder::new(unit.file.clone());
            builder.set_file(options.js_name.clone());
            if let Some(root) = &options.source_root {
                builder.set_source_root(root.clone());
            }
            for (line, text) in source.split('\n').enumerate() {
                builder.add_mapping_with_source(0, line, 0, None);
                builder.advance(text);
                builder.advance("\n");
            }
            let map_name = format!("{}.map", crate::paths::file_name(&options.js_name));
            js.push_str(&format!("//# sourceMappingURL={}\n", map_name));
            builder.build().to_json().ok()
        } else {
            None
        };

        let declaration = options.declaration.then(|| {
            let mut dts = String::new();
            for decl in unit.declarations.iter().filter(|d| d.exported) {
                dts.push_str(&format!("export declare const {}: any;\n", decl.name));
            }
            for function in &unit.functions {
                dts.push_str(&format!(
                    "export declare function {}(...args: any[]): any;\n",
                    function.name
                ));
            }
            if dts.is_empty() {
                dts.push_str("export {};\n");
            }
            dts
        });

        EmitOutput {
            js,
            source_map,
            declaration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(text: &str) -> (ParsedUnit, Vec<Diagnostic>) {
        ScanFrontEnd::new().parse("src/app.js", text)
    }

    #[test]
    fn test_recognizes_imports() {
        let (unit, diags) = parse(indoc! {r#"
            import * as b from "bobril";
            import lib from './lib';
            import { a, b as c } from "./util";
            import "./side";
            // import "./commented";
        "#});

        assert!(diags.is_empty());
        let specifiers: Vec<_> = unit.imports.iter().map(|i| i.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["bobril", "./lib", "./util", "./side"]);
        assert_eq!(unit.imports[0].binding, ImportBinding::Namespace("b".to_string()));
        assert_eq!(unit.imports[1].binding, ImportBinding::Default("lib".to_string()));
        assert_eq!(
            unit.imports[2].binding,
            ImportBinding::Named(vec![
                ("a".to_string(), "a".to_string()),
                ("b".to_string(), "c".to_string())
            ])
        );
        assert_eq!(unit.imports[3].binding, ImportBinding::None);
    }

    #[test]
    fn test_recognizes_call_sites() {
        let (unit, diags) = parse(indoc! {r##"
            var logo = b.asset("img/logo.png");
            var icon = b.sprite('img/icon.png', "#f00", 16, 16, 0, 8);
            export const card = b.styleDef({ color: "red" }, null);
            var msg = t("Hello {name}", { name: n }, "greeting");
            obj.t("not mine");
            function t(x) { return x; }
            var s = "b.asset('in string')";
        "##});

        assert!(diags.is_empty());
        assert_eq!(unit.calls.len(), 4);

        let asset = &unit.calls[0];
        assert_eq!(asset.callee(), "b.asset");
        assert_eq!(asset.args, vec![Expr::Str("img/logo.png".to_string())]);
        assert_eq!(asset.binding.as_deref(), Some("logo"));
        assert_eq!(asset.span.line, 1);

        let sprite = &unit.calls[1];
        assert_eq!(sprite.args.len(), 6);
        assert_eq!(sprite.args[1], Expr::Str("#f00".to_string()));
        assert_eq!(sprite.args[5], Expr::Num(8.0));

        let style = &unit.calls[2];
        assert_eq!(style.method, "styleDef");
        assert_eq!(style.binding.as_deref(), Some("card"));
        assert_eq!(style.args[0], Expr::Raw("{ color: \"red\" }".to_string()));
        assert_eq!(style.args[1], Expr::Null);

        let translation = &unit.calls[3];
        assert_eq!(translation.object, None);
        assert_eq!(translation.args.len(), 3);
    }

    #[test]
    fn test_nested_call_is_not_a_separate_site() {
        let (unit, _) = parse("var x = b.styleDef(s, t(\"a\"));\n");
        assert_eq!(unit.calls.len(), 1);
        assert_eq!(unit.calls[0].args[1], Expr::Raw("t(\"a\")".to_string()));
    }

    #[test]
    fn test_unterminated_call_is_a_diagnostic() {
        let (_, diags) = parse("var x = b.asset(\"a.png\";\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].code, "KS1");
    }

    #[test]
    fn test_declarations_and_check() {
        let front_end = ScanFrontEnd::new();
        let (unit, _) = front_end.parse(
            "src/consts.js",
            "export const DEBUG = true;\nexport const NAME = 'x';\nexport function DEBUG() {}\n",
        );
        assert_eq!(unit.declarations.len(), 2);
        assert_eq!(unit.declarations[0].init, Expr::Bool(true));
        assert_eq!(unit.declarations[1].init, Expr::Str("x".to_string()));
        assert_eq!(unit.find_declaration("NAME").map(|d| d.0), Some(1));

        let diags = front_end.check(&[&unit]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "KS2");
    }

    #[test]
    fn test_emit_untouched_unit() {
        let source = indoc! {r#"
            import * as b from "bobril";
            import { x } from "./dep";
            export const NAME = "n";
            var logo = b.asset('logo.png');
        "#};
        let (unit, _) = parse(source);
        let mut options = EmitOptions::default();
        options
            .module_names
            .insert("./dep".to_string(), "src/dep".to_string());

        let output = ScanFrontEnd::new().emit(&unit, &options);
        assert_eq!(
            output.js,
            indoc! {r#"
                var b = require("bobril");
                var __import1 = require("src/dep"), x = __import1.x;
                var NAME = "n";
                var logo = b.asset('logo.png');
                exports.NAME = NAME;
            "#}
        );
        assert!(output.source_map.is_none());
        assert!(output.declaration.is_none());
    }

    #[test]
    fn test_emit_renders_edited_nodes_keeping_lines() {
        let (mut unit, _) = parse("var a = b.asset(\n  'logo.png'\n);\nexport const DEBUG = true;\n");
        unit.calls[0].args[0] = Expr::Str("a.png".to_string());
        unit.calls[0].edited = true;
        unit.declarations[0].init = Expr::Bool(false);
        unit.declarations[0].edited = true;

        let output = ScanFrontEnd::new().emit(&unit, &EmitOptions::default());
        assert_eq!(
            output.js,
            "var a = b.asset(\"a.png\")\n\n;\nvar DEBUG = false;\nexports.DEBUG = DEBUG;\n"
        );
    }

    #[test]
    fn test_emit_source_map_and_declaration() {
        let (unit, _) = parse("export function go() {}\ngo();\n");
        let options = EmitOptions {
            source_map: true,
            declaration: true,
            js_name: "src/app.js".to_string(),
            ..Default::default()
        };
        let output = ScanFrontEnd::new().emit(&unit, &options);

        assert!(output.js.ends_with("//# sourceMappingURL=app.js.map\n"));
        let map = crate::bundle::sourcemap::SourceMap::from_json(
            output.source_map.as_deref().unwrap(),
        )
        .unwrap();
        assert_eq!(map.sources, vec!["src/app.js".to_string()]);
        assert!(map.mappings.starts_with("AAAA;AACA"));
        assert_eq!(
            output.declaration.as_deref(),
            Some("export declare function go(...args: any[]): any;\n")
        );
    }
}
