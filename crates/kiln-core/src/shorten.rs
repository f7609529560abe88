use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{BundleMode, ProjectConfig};
use crate::paths;

/// Names that keep their spelling when shortening is active
pub const RESERVED_NAMES: [&str; 3] = ["bundle.js", "bundle.css", "bundle.png"];

/// Maps asset paths to compact unique output names (`a.png`, `b.png`, ...).
///
/// Only active for merged bundling; otherwise every name maps to itself.
/// Assignments are memoized, so a path keeps its short name for the whole
/// session.
#[derive(Debug, Clone)]
pub struct FileNameShortener {
    enabled: bool,
    prefix: Option<String>,
    assigned: FxHashMap<String, String>,
    used: FxHashSet<String>,
    counter: u64,
}

fn bijective_base26(mut n: u64) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

impl FileNameShortener {
    pub fn new(config: &ProjectConfig) -> Self {
        let mut shortener = Self {
            enabled: config.bundle == BundleMode::Merged,
            prefix: config.output_sub_dir.clone().filter(|p| !p.is_empty()),
            assigned: FxHashMap::default(),
            used: FxHashSet::default(),
            counter: 0,
        };
        if shortener.enabled {
            for name in RESERVED_NAMES {
                shortener.assigned.insert(name.to_string(), name.to_string());
                shortener.used.insert(name.to_string());
            }
        }
        shortener
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Short name without the output subdirectory
    pub fn short_name(&mut self, name: &str) -> String {
        if !self.enabled {
            return name.to_string();
        }
        let key = name.to_lowercase();
        if let Some(short) = self.assigned.get(&key) {
            return short.clone();
        }
        let extension = paths::extension(name).to_lowercase();
        let short = loop {
            let candidate = format!("{}{}", bijective_base26(self.counter), extension);
            self.counter += 1;
            if self.used.insert(candidate.clone()) {
                break candidate;
            }
        };
        self.assigned.insert(key, short.clone());
        short
    }

    /// Output path: short name under the output subdirectory
    pub fn shorten(&mut self, name: &str) -> String {
        if !self.enabled {
            return name.to_string();
        }
        let short = self.short_name(name);
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), short),
            None => short,
        }
    }
}
