use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::span::Span;

const BASE64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("Invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid VLQ mapping segment '{0}'")]
    InvalidMapping(String),
}

/// A source map builder following the Source Map v3 specification
/// https://sourcemaps.info/spec.html
///
/// Lines and columns are 0-based inside the builder.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: Option<String>,
    source_root: Option<String>,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    mappings: Vec<Mapping>,
    generated_line: usize,
    generated_column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    generated_line: usize,
    generated_column: usize,
    source_index: usize,
    source_line: usize,
    source_column: usize,
    name_index: Option<usize>,
}

/// One decoded segment of a `mappings` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_column: usize,
    pub source: Option<SegmentSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSource {
    pub source_index: usize,
    pub source_line: usize,
    pub source_column: usize,
    pub name_index: Option<usize>,
}

/// The JSON structure for source maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMapBuilder {
    pub fn new(source_file: String) -> Self {
        Self {
            sources: vec![source_file],
            ..Default::default()
        }
    }

    /// Builder without sources, for composite maps
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a source file and return its index
    pub fn add_source(&mut self, source_file: String) -> usize {
        if let Some(idx) = self.sources.iter().position(|s| s == &source_file) {
            idx
        } else {
            self.sources.push(source_file);
            self.sources.len() - 1
        }
    }

    fn add_name(&mut self, name: String) -> usize {
        if let Some(idx) = self.names.iter().position(|existing| existing == &name) {
            idx
        } else {
            self.names.push(name);
            self.names.len() - 1
        }
    }

    pub fn set_file(&mut self, file: String) {
        self.file = Some(file);
    }

    pub fn set_source_root(&mut self, source_root: String) {
        self.source_root = Some(source_root);
    }

    pub fn set_source_content(&mut self, source_index: usize, content: String) {
        if self.sources_content.len() <= source_index {
            self.sources_content.resize(source_index + 1, None);
        }
        self.sources_content[source_index] = Some(content);
    }

    /// Map the current generated position to a 1-based source span of source 0
    pub fn add_mapping(&mut self, source_span: Span, name: Option<String>) {
        self.add_mapping_with_source(
            0,
            source_span.line.saturating_sub(1) as usize,
            source_span.column.saturating_sub(1) as usize,
            name,
        );
    }

    /// Map the current generated position to a 0-based source position
    pub fn add_mapping_with_source(
        &mut self,
        source_index: usize,
        source_line: usize,
        source_column: usize,
        name: Option<String>,
    ) {
        let name_index = name.map(|n| self.add_name(n));
        self.mappings.push(Mapping {
            generated_line: self.generated_line,
            generated_column: self.generated_column,
            source_index,
            source_line,
            source_column,
            name_index,
        });
    }

    /// Advance the generated position by writing text
    pub fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.generated_line += 1;
                self.generated_column = 0;
            } else {
                self.generated_column += 1;
            }
        }
    }

    pub fn generated_line(&self) -> usize {
        self.generated_line
    }

    /// Build the final source map
    pub fn build(self) -> SourceMap {
        let mappings = self.encode_mappings();

        SourceMap {
            version: 3,
            file: self.file,
            source_root: self.source_root,
            sources: self.sources,
            sources_content: self.sources_content,
            names: self.names,
            mappings,
        }
    }

    /// Encode mappings using VLQ (Variable Length Quantity) encoding
    fn encode_mappings(&self) -> String {
        let mut result = String::new();
        let mut prev_generated_line = 0;
        let mut prev_generated_col = 0;
        let mut prev_source_index = 0;
        let mut prev_source_line = 0;
        let mut prev_source_col = 0;
        let mut prev_name_index = 0;

        for mapping in &self.mappings {
            while prev_generated_line < mapping.generated_line {
                result.push(';');
                prev_generated_line += 1;
                prev_generated_col = 0;
            }

            if !result.is_empty() && !result.ends_with(';') {
                result.push(',');
            }

            // [generated_col, source_index, source_line, source_col, name_index], delta encoded
            let generated_col_delta = mapping.generated_column as i64 - prev_generated_col as i64;
            result.push_str(&encode_vlq(generated_col_delta));
            prev_generated_col = mapping.generated_column;

            let source_index_delta = mapping.source_index as i64 - prev_source_index as i64;
            result.push_str(&encode_vlq(source_index_delta));
            prev_source_index = mapping.source_index;

            let source_line_delta = mapping.source_line as i64 - prev_source_line as i64;
            result.push_str(&encode_vlq(source_line_delta));
            prev_source_line = mapping.source_line;

            let source_col_delta = mapping.source_column as i64 - prev_source_col as i64;
            result.push_str(&encode_vlq(source_col_delta));
            prev_source_col = mapping.source_column;

            if let Some(name_idx) = mapping.name_index {
                let name_index_delta = name_idx as i64 - prev_name_index as i64;
                result.push_str(&encode_vlq(name_index_delta));
                prev_name_index = name_idx;
            }
        }

        result
    }
}

/// Encode a single value using VLQ Base64 encoding
pub fn encode_vlq(value: i64) -> String {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    let mut result = String::new();
    loop {
        let mut digit = (vlq & 0x1F) as u8;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0x20; // continuation bit
        }
        result.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
    result
}

fn decode_segment(text: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift = 0;
    for byte in text.bytes() {
        let digit = BASE64_CHARS
            .iter()
            .position(|c| *c == byte)
            .ok_or_else(|| SourceMapError::InvalidMapping(text.to_string()))? as i64;
        value += (digit & 0x1F) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            if shift > 60 {
                return Err(SourceMapError::InvalidMapping(text.to_string()));
            }
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }
    if shift != 0 {
        return Err(SourceMapError::InvalidMapping(text.to_string()));
    }
    Ok(values)
}

/// Decode a `mappings` string into per-generated-line segments with absolute values
pub fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, SourceMapError> {
    let mut lines = Vec::new();
    let (mut source_index, mut source_line, mut source_column, mut name_index) = (0i64, 0i64, 0i64, 0i64);

    for line in mappings.split(';') {
        let mut segments = Vec::new();
        let mut generated_column = 0i64;
        for raw in line.split(',').filter(|s| !s.is_empty()) {
            let values = decode_segment(raw)?;
            generated_column += values[0];
            let source = match values.len() {
                1 => None,
                4 | 5 => {
                    source_index += values[1];
                    source_line += values[2];
                    source_column += values[3];
                    let name = if values.len() == 5 {
                        name_index += values[4];
                        Some(name_index as usize)
                    } else {
                        None
                    };
                    Some(SegmentSource {
                        source_index: source_index as usize,
                        source_line: source_line as usize,
                        source_column: source_column as usize,
                        name_index: name,
                    })
                }
                _ => return Err(SourceMapError::InvalidMapping(raw.to_string())),
            };
            if generated_column < 0 || source_index < 0 || source_line < 0 || source_column < 0 {
                return Err(SourceMapError::InvalidMapping(raw.to_string()));
            }
            segments.push(Segment {
                generated_column: generated_column as usize,
                source,
            });
        }
        lines.push(segments);
    }

    Ok(lines)
}

impl SourceMap {
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Source path with `sourceRoot` applied
    pub fn resolved_source(&self, index: usize) -> Option<String> {
        let source = self.sources.get(index)?;
        Some(match &self.source_root {
            Some(root) if !root.is_empty() => {
                format!("{}/{}", root.trim_end_matches('/'), source)
            }
            _ => source.clone(),
        })
    }
}

/// Concatenates generated text while stitching the per-piece source maps
/// into one composite map.
#[derive(Debug, Default)]
pub struct ConcatSourceMapBuilder {
    content: String,
    builder: SourceMapBuilder,
}

impl ConcatSourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_text(&mut self, text: &str) {
        self.content.push_str(text);
        self.builder.advance(text);
        if !text.ends_with('\n') {
            self.content.push('\n');
            self.builder.advance("\n");
        }
    }

    /// Unmapped text, terminated by a newline
    pub fn add_line(&mut self, line: &str) {
        self.push_text(line);
    }

    /// Unmapped block of lines
    pub fn add_lines(&mut self, text: &str) {
        if !text.is_empty() {
            self.push_text(text);
        }
    }

    /// Append `content` and shift its map by the current line offset.
    /// A trailing `sourceMappingURL` comment in `content` is dropped.
    pub fn add_source(
        &mut self,
        content: &str,
        source_map: Option<&SourceMap>,
    ) -> Result<(), SourceMapError> {
        let content = strip_source_mapping_url(content);
        let line_offset = self.builder.generated_line();

        if let Some(map) = source_map {
            let lines = decode_mappings(&map.mappings)?;
            let source_indices: Vec<usize> = (0..map.sources.len())
                .map(|i| {
                    let name = map.resolved_source(i).unwrap_or_default();
                    let idx = self.builder.add_source(name);
                    if let Some(Some(text)) = map.sources_content.get(i) {
                        self.builder.set_source_content(idx, text.clone());
                    }
                    idx
                })
                .collect();

            for (line_idx, segments) in lines.iter().enumerate() {
                for segment in segments {
                    let Some(source) = segment.source else {
                        continue;
                    };
                    let Some(&source_index) = source_indices.get(source.source_index) else {
                        return Err(SourceMapError::InvalidMapping(format!(
                            "source index {} out of range",
                            source.source_index
                        )));
                    };
                    let name_index = source
                        .name_index
                        .and_then(|n| map.names.get(n).cloned())
                        .map(|n| self.builder.add_name(n));
                    self.builder.mappings.push(Mapping {
                        generated_line: line_offset + line_idx,
                        generated_column: segment.generated_column,
                        source_index,
                        source_line: source.source_line,
                        source_column: source.source_column,
                        name_index,
                    });
                }
            }
        }

        self.push_text(content);
        Ok(())
    }

    pub fn set_source_root(&mut self, source_root: String) {
        self.builder.set_source_root(source_root);
    }

    pub fn to_content(&self) -> &str {
        &self.content
    }

    pub fn to_source_map(self, file: Option<String>) -> SourceMap {
        let mut builder = self.builder;
        if let Some(file) = file {
            builder.set_file(file);
        }
        builder.build()
    }

    /// Text and map together
    pub fn finish(self, file: Option<String>) -> (String, SourceMap) {
        let content = self.content.clone();
        (content, self.to_source_map(file))
    }
}

fn strip_source_mapping_url(content: &str) -> &str {
    let trimmed = content.trim_end();
    match trimmed.rfind('\n') {
        Some(idx) if trimmed[idx + 1..].starts_with("//# sourceMappingURL=") => &content[..idx + 1],
        None if trimmed.starts_with("//# sourceMappingURL=") => "",
        _ => content,
    }
}
