use regex::{Captures, Regex};
use std::sync::LazyLock;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*(['"]?)([^'")]*)(['"]?)\s*\)"#).unwrap());
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static AROUND_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};:,>])\s*").unwrap());

/// Receives `(url, from_file)` and returns the replacement url.
pub type UrlRewriter<'a> = &'a mut dyn FnMut(&str, &str) -> String;

/// Stylesheet together with the project-relative file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSource {
    pub css: String,
    pub from: String,
}

pub trait CssProcessor: Send + Sync {
    fn rewrite_urls(&self, css: &str, from: &str, rewriter: UrlRewriter) -> String;

    fn concatenate_and_minify(&self, sources: &[CssSource], rewriter: UrlRewriter) -> String;
}

/// Whether a url points into the project
pub fn is_internal_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    !(url.is_empty()
        || url.starts_with('#')
        || url.starts_with("//")
        || lower.starts_with("data:")
        || lower.starts_with("http:")
        || lower.starts_with("https:"))
}

/// Split `img/a.svg#icon` into `("img/a.svg", "#icon")`
pub fn split_url_suffix(url: &str) -> (&str, &str) {
    let cut = [url.find('?'), url.find('#')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(url.len());
    url.split_at(cut)
}

/// `url(...)` rewriting and whitespace minification by pattern matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleCssProcessor;

impl SimpleCssProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn minify(css: &str) -> String {
        let css = COMMENT.replace_all(css, "");
        let css = WHITESPACE.replace_all(&css, " ");
        let css = AROUND_PUNCTUATION.replace_all(&css, "$1");
        css.replace(";}", "}").trim().to_string()
    }
}

impl CssProcessor for SimpleCssProcessor {
    fn rewrite_urls(&self, css: &str, from: &str, rewriter: UrlRewriter) -> String {
        URL.replace_all(css, |caps: &Captures| {
            let url = caps[2].trim();
            if !is_internal_url(url) {
                return caps[0].to_string();
            }
            format!("url({0}{1}{0})", &caps[1], rewriter(url, from))
        })
        .into_owned()
    }

    fn concatenate_and_minify(&self, sources: &[CssSource], rewriter: UrlRewriter) -> String {
        let mut joined = Vec::with_capacity(sources.len());
        for source in sources {
            joined.push(self.rewrite_urls(&source.css, &source.from, &mut *rewriter));
        }
        Self::minify(&joined.join("\n"))
    }
}
