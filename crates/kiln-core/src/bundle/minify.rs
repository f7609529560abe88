//! Text-level JavaScript compaction for merged bundles
//!
//! Works on a lexical split of the source into code, string and comment
//! pieces; nothing here understands JavaScript grammar beyond that.

use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::frontend::Expr;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Code,
    Str,
    Comment,
}

/// Split `js` into `(kind, text)` pieces covering the whole input
fn pieces(js: &str) -> Vec<(Piece, &str)> {
    let bytes = js.as_bytes();
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            quote @ (b'"' | b'\'' | b'`') => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != quote {
                    if bytes[j] == b'\\' {
                        j += 1;
                    } else if bytes[j] == b'\n' && quote != b'`' {
                        break;
                    }
                    j += 1;
                }
                Some((Piece::Str, (j + 1).min(bytes.len())))
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let j = js[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
                Some((Piece::Comment, j))
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let j = js[i + 2..].find("*/").map(|n| i + n + 4).unwrap_or(bytes.len());
                Some((Piece::Comment, j))
            }
            _ => None,
        };
        match end {
            Some((kind, end)) => {
                if code_start < i {
                    out.push((Piece::Code, &js[code_start..i]));
                }
                out.push((kind, &js[i..end]));
                i = end;
                code_start = end;
            }
            None => i += 1,
        }
    }
    if code_start < js.len() {
        out.push((Piece::Code, &js[code_start..]));
    }
    out
}

/// Drop comments, trailing whitespace and blank lines
pub fn strip_comments(js: &str) -> String {
    let mut stripped = String::with_capacity(js.len());
    for (kind, text) in pieces(js) {
        if kind != Piece::Comment {
            stripped.push_str(text);
        }
    }
    let mut out = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let line = line.trim_end();
        if !line.trim_start().is_empty() {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Replace free identifiers named in `defines` by their literal values.
/// Property accesses (`x.NAME`) and text inside strings or comments are kept.
pub fn substitute_defines(js: &str, defines: &IndexMap<String, serde_json::Value>) -> String {
    if defines.is_empty() {
        return js.to_string();
    }
    let mut out = String::with_capacity(js.len());
    for (kind, text) in pieces(js) {
        if kind != Piece::Code {
            out.push_str(text);
            continue;
        }
        let replaced = IDENTIFIER.replace_all(text, |caps: &Captures| {
            let m = caps.get(0).map(|m| (m.start(), m.as_str()));
            match m {
                Some((start, name)) => {
                    let is_property = text[..start].trim_end().ends_with('.');
                    match defines.get(name) {
                        Some(value) if !is_property => Expr::from_json(value).render(),
                        _ => name.to_string(),
                    }
                }
                None => String::new(),
            }
        });
        out.push_str(&replaced);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_strip_comments_keeps_strings() {
        let js = indoc! {r#"
            // header
            var a = "// not a comment"; /* inline */ var b = 1;

            /* block
               comment */
            var c = 'x';   
        "#};
        assert_eq!(
            strip_comments(js),
            "var a = \"// not a comment\";  var b = 1;\nvar c = 'x';\n"
        );
    }

    #[test]
    fn test_substitute_defines() {
        let mut defines = IndexMap::new();
        defines.insert("DEBUG".to_string(), serde_json::json!(false));
        defines.insert("VERSION".to_string(), serde_json::json!("1.2"));
        let js = "if (DEBUG) log(VERSION, \"DEBUG\", cfg.DEBUG, DEBUGGER);";
        assert_eq!(
            substitute_defines(js, &defines),
            "if (false) log(\"1.2\", \"DEBUG\", cfg.DEBUG, DEBUGGER);"
        );
    }

    #[test]
    fn test_pieces_cover_input() {
        let js = "a('b') /* c */ // d\ne";
        let joined: String = pieces(js).iter().map(|(_, text)| *text).collect();
        assert_eq!(joined, js);
    }
}
