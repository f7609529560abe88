//! Forward-slash path helpers.
//!
//! Logical file names inside a build are kept as `/`-separated strings on
//! every platform; only the file system layer converts them to `PathBuf`.

pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn is_absolute(path: &str) -> bool {
    let path = path.as_bytes();
    path.first() == Some(&b'/')
        || path.first() == Some(&b'\\')
        || (path.len() >= 2 && path[1] == b':' && path[0].is_ascii_alphabetic())
}

/// Collapse `.`, `..` and repeated separators.
pub fn normalize(path: &str) -> String {
    let path = to_slash(path);
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

pub fn join(base: &str, relative: &str) -> String {
    if base.is_empty() || is_absolute(relative) {
        return normalize(relative);
    }
    normalize(&format!("{}/{}", base, relative))
}

/// Directory part of `path`; empty for a bare file name.
pub fn dirname(path: &str) -> String {
    let path = to_slash(path);
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

pub fn has_extension(path: &str, ext: &str) -> bool {
    path.len() >= ext.len() && path[path.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// Replace a trailing `.ts`/`.tsx` with `.js`.
pub fn with_js_extension(path: &str) -> String {
    for ext in [".tsx", ".ts"] {
        if has_extension(path, ext) && !has_extension(path, ".d.ts") {
            return format!("{}.js", &path[..path.len() - ext.len()]);
        }
    }
    path.to_string()
}

pub fn strip_extension(path: &str) -> &str {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..file_start + dot],
        _ => path,
    }
}

/// Strip the project directory prefix (case-insensitively) from `path`.
pub fn relativize(project_dir: &str, path: &str) -> String {
    let dir = format!("{}/", normalize(project_dir).to_lowercase());
    let path = to_slash(path);
    if path.to_lowercase().starts_with(&dir) {
        path[dir.len()..].to_string()
    } else {
        path
    }
}

/// Last path component.
pub fn file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Extension including the dot, empty when there is none.
pub fn extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[dot..],
        _ => "",
    }
}

pub fn is_css(path: &str) -> bool {
    has_extension(path, ".css")
}

pub fn is_js(path: &str) -> bool {
    has_extension(path, ".js")
}

pub fn is_declaration(path: &str) -> bool {
    has_extension(path, ".d.ts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b/../c"), "a/c");
        assert_eq!(normalize("/root//x/"), "/root/x");
        assert_eq!(normalize("../x"), "../x");
        assert_eq!(normalize("a\\b"), "a/b");
    }

    #[test]
    fn test_join_and_dirname() {
        assert_eq!(join("src", "./img/logo.png"), "src/img/logo.png");
        assert_eq!(join("src/app", "../b"), "src/b");
        assert_eq!(dirname("src/a.ts"), "src");
        assert_eq!(dirname("a.ts"), "");
    }

    #[test]
    fn test_extensions() {
        assert_eq!(with_js_extension("src/a.ts"), "src/a.js");
        assert_eq!(with_js_extension("src/a.tsx"), "src/a.js");
        assert_eq!(with_js_extension("lib/a.d.ts"), "lib/a.d.ts");
        assert_eq!(strip_extension("src/a.js"), "src/a");
        assert_eq!(strip_extension("src.v1/a"), "src.v1/a");
        assert!(is_css("Style.CSS"));
        assert_eq!(file_name("src/img/a.png"), "a.png");
        assert_eq!(extension("src/img/a.png"), ".png");
        assert_eq!(extension("src/.hidden"), "");
    }

    #[test]
    fn test_relativize_is_case_insensitive() {
        assert_eq!(relativize("/Proj", "/proj/src/a.ts"), "src/a.ts");
        assert_eq!(relativize("/proj", "/other/a.ts"), "/other/a.ts");
    }
}
