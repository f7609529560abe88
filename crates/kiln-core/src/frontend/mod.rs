//! Language front end interface
//!
//! The build engine never looks at source text itself. A [`FrontEnd`] turns
//! text into a [`ParsedUnit`] whose call sites and exported declarations are
//! addressable, and turns a (possibly rewritten) unit back into JavaScript.

mod scan;

pub use scan::ScanFrontEnd;

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::diagnostics::Diagnostic;
use crate::span::Span;

/// Argument or initializer value of a structural node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    /// Any expression the front end does not model, kept as source text
    Raw(String),
    /// `function(){return [items];}`
    Lambda(Vec<Expr>),
    /// `left+right`
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the value is known at build time
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Str(_) | Expr::Num(_) | Expr::Bool(_) | Expr::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Expr {
        match value {
            serde_json::Value::Null => Expr::Null,
            serde_json::Value::Bool(b) => Expr::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Expr::Num(f),
                None => Expr::Raw(n.to_string()),
            },
            serde_json::Value::String(s) => Expr::Str(s.clone()),
            other => Expr::Raw(other.to_string()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Expr::Str(s) => serde_json::Value::String(s.clone()).to_string(),
            Expr::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Expr::Bool(b) => b.to_string(),
            Expr::Null => "null".to_string(),
            Expr::Raw(text) => text.clone(),
            Expr::Lambda(items) => format!(
                "function(){{return [{}];}}",
                items.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
            ),
            Expr::Concat(left, right) => format!("{}+{}", left.render(), right.render()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub usize);

/// A recognized call site such as `b.asset("x.png")`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub object: Option<String>,
    pub method: String,
    pub args: Vec<Expr>,
    pub span: Span,
    /// Variable the call result is assigned to, if any
    pub binding: Option<String>,
    pub(crate) edited: bool,
}

impl CallExpr {
    pub fn new(object: Option<&str>, method: &str, args: Vec<Expr>, span: Span) -> Self {
        Self {
            object: object.map(str::to_string),
            method: method.to_string(),
            args,
            span,
            binding: None,
            edited: false,
        }
    }

    pub fn callee(&self) -> String {
        match &self.object {
            Some(object) => format!("{}.{}", object, self.method),
            None => self.method.clone(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}({})",
            self.callee(),
            self.args.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
        )
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import "x"`
    None,
    /// `import * as name from "x"`
    Namespace(String),
    /// `import name from "x"`
    Default(String),
    /// `import { a, b as c } from "x"` as `(imported, local)` pairs
    Named(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub specifier: String,
    pub binding: ImportBinding,
    pub span: Span,
}

/// `export const name = init;`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub exported: bool,
    pub init: Expr,
    /// Span of the `export const` keywords
    pub keyword_span: Span,
    pub init_span: Span,
    pub(crate) edited: bool,
}

/// `export function name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub keyword_span: Span,
}

/// A parsed source file with addressable structural nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUnit {
    pub file: String,
    pub source: Arc<str>,
    pub imports: Vec<Import>,
    pub calls: Vec<CallExpr>,
    pub declarations: Vec<VarDecl>,
    pub functions: Vec<FunctionDecl>,
}

impl ParsedUnit {
    pub fn call(&self, id: CallId) -> &CallExpr {
        &self.calls[id.0]
    }

    pub fn declaration(&self, id: DeclId) -> &VarDecl {
        &self.declarations[id.0]
    }

    pub fn find_declaration(&self, name: &str) -> Option<DeclId> {
        self.declarations
            .iter()
            .position(|d| d.exported && d.name == name)
            .map(DeclId)
    }

    pub fn call_ids(&self) -> impl Iterator<Item = CallId> {
        (0..self.calls.len()).map(CallId)
    }

    pub fn is_declaration_file(&self) -> bool {
        crate::paths::is_declaration(&self.file)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub source_map: bool,
    pub declaration: bool,
    /// Output name of the emitted JS, recorded as the map's `file`
    pub js_name: String,
    pub source_root: Option<String>,
    /// Import specifier to module id used in `require(...)`
    pub module_names: FxHashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmitOutput {
    pub js: String,
    pub source_map: Option<String>,
    pub declaration: Option<String>,
}

/// Parses, checks and emits source units.
pub trait FrontEnd: Send + Sync {
    fn parse(&self, file: &str, text: &str) -> (ParsedUnit, Vec<Diagnostic>);

    /// Whole-program diagnostics over the units of one cycle
    fn check(&self, _units: &[&ParsedUnit]) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn emit(&self, unit: &ParsedUnit, options: &EmitOptions) -> EmitOutput;
}
