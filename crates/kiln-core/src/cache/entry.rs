use std::path::PathBuf;
use std::sync::Arc;

use crate::diagnostics::Diagnostic;
use crate::frontend::ParsedUnit;
use crate::fs::ModTime;
use crate::resolve::ReferenceInfo;

/// Index of an entry inside its [`FileCache`](super::FileCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// Observed modification time of a file or derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stamp {
    /// Not probed / never computed
    #[default]
    Unset,
    /// Probe or read failed
    Missing,
    At(ModTime),
}

impl Stamp {
    pub fn time(self) -> Option<ModTime> {
        match self {
            Stamp::At(time) => Some(time),
            _ => None,
        }
    }

    pub fn is_set(self) -> bool {
        !matches!(self, Stamp::Unset)
    }
}

/// Memoized transitive freshness of a file for the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Not computed during this pass
    #[default]
    Unset,
    /// Being computed further up the recursion; carries the file's own time
    InProgress(ModTime),
    /// The file or one of its dependencies is missing, or it was never emitted
    Unresolvable,
    /// Newest modification time across the file and its dependencies
    At(ModTime),
}

impl Freshness {
    pub fn time(self) -> Option<ModTime> {
        match self {
            Freshness::InProgress(time) | Freshness::At(time) => Some(time),
            _ => None,
        }
    }
}

/// Cached knowledge about one path.
///
/// Each `*_time` field holds the `cur_time` its artifact was derived from.
/// An artifact is only handed out while its stamp equals `cur_time`.
#[derive(Debug)]
pub struct CacheEntry {
    /// Canonical absolute path, original case, used for I/O
    pub full_name: PathBuf,
    /// Lower-cased canonical path, used for identity
    pub key: String,
    pub cur_time: Stamp,
    pub text_time: Stamp,
    pub buffer_time: Stamp,
    pub source_time: Stamp,
    pub info_time: Stamp,
    pub output_time: Stamp,
    pub max_time_for_deps: Freshness,
    pub(crate) text: Option<Arc<str>>,
    pub(crate) buffer: Option<Arc<[u8]>>,
    pub(crate) parsed_unit: Option<ParsedUnit>,
    pub(crate) parse_diagnostics: Vec<Diagnostic>,
    pub(crate) reference_info: Option<ReferenceInfo>,
}

impl CacheEntry {
    pub(crate) fn new(full_name: PathBuf, key: String) -> Self {
        Self {
            full_name,
            key,
            cur_time: Stamp::Unset,
            text_time: Stamp::Unset,
            buffer_time: Stamp::Unset,
            source_time: Stamp::Unset,
            info_time: Stamp::Unset,
            output_time: Stamp::Unset,
            max_time_for_deps: Freshness::Unset,
            text: None,
            buffer: None,
            parsed_unit: None,
            parse_diagnostics: Vec::new(),
            reference_info: None,
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self.cur_time, Stamp::At(_))
    }

    pub fn is_text_current(&self) -> bool {
        self.exists() && self.text_time == self.cur_time && self.text.is_some()
    }

    pub fn is_buffer_current(&self) -> bool {
        self.exists() && self.buffer_time == self.cur_time && self.buffer.is_some()
    }

    pub fn is_source_current(&self) -> bool {
        self.is_text_current() && self.source_time == self.text_time && self.parsed_unit.is_some()
    }

    pub fn is_info_current(&self) -> bool {
        self.exists() && self.info_time == self.cur_time && self.reference_info.is_some()
    }

    pub fn text(&self) -> Option<&Arc<str>> {
        self.text.as_ref().filter(|_| self.is_text_current())
    }

    pub fn buffer(&self) -> Option<&Arc<[u8]>> {
        self.buffer.as_ref().filter(|_| self.is_buffer_current())
    }

    pub fn parsed_unit(&self) -> Option<&ParsedUnit> {
        self.parsed_unit.as_ref().filter(|_| self.is_source_current())
    }

    pub fn parse_diagnostics(&self) -> &[Diagnostic] {
        &self.parse_diagnostics
    }

    pub fn reference_info(&self) -> Option<&ReferenceInfo> {
        self.reference_info.as_ref().filter(|_| self.is_info_current())
    }

    /// Whether the last emitted output covers the current freshness value
    pub fn is_output_current(&self) -> bool {
        match (self.max_time_for_deps.time(), self.output_time.time()) {
            (Some(deps), Some(output)) => deps <= output,
            _ => false,
        }
    }

    /// Whether a dependency file changed since it was last copied
    pub fn needs_copy(&self) -> bool {
        match (self.cur_time.time(), self.output_time.time()) {
            (Some(cur), Some(output)) => cur > output,
            (Some(_), None) => true,
            _ => false,
        }
    }
}
