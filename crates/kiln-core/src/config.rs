use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::BuildError;
use crate::resolve::styledef::StyleDefPolicy;

/// How emitted JavaScript is packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleMode {
    /// One output file per source file
    #[default]
    None,
    /// Single minified artifact in dependency order
    Merged,
    /// Single artifact of wrapped modules with a composite source map
    Fast,
}

/// Which rewrite applies to style definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StyleDefMode {
    #[default]
    None,
    LiveReload,
    Debug,
    Release,
    Prefix,
}

/// Project configuration, usually loaded from `kiln.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Entry source files, relative to `dir`
    #[serde(default)]
    pub main: Vec<String>,

    /// Project root directory (default: current directory)
    #[serde(default)]
    pub dir: Option<String>,

    /// Bundling strategy (default: none)
    #[serde(default)]
    pub bundle: BundleMode,

    /// Merge sprites into one atlas image (default: false)
    #[serde(default)]
    pub sprite_merge: bool,

    /// Style definition rewrite policy (default: none)
    #[serde(default)]
    pub style_defs: StyleDefMode,

    /// Prefix used by the `prefix` and `debug` style policies
    #[serde(default)]
    pub style_prefix: Option<String>,

    /// Replace translatable literals by compact message ids (default: false)
    #[serde(default)]
    pub compile_translations: bool,

    /// Report every translatable literal found (default: false)
    #[serde(default)]
    pub report_untranslated: bool,

    /// Resolve asset names against the project root instead of the source file
    #[serde(default)]
    pub resources_are_relative_to_project_dir: bool,

    /// Strip comments and blank lines from bundles (default: true)
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Replace module names in merged bundles by short identifiers (default: false)
    #[serde(default)]
    pub mangle: bool,

    /// Keep bundle formatting untouched (default: false)
    #[serde(default)]
    pub beautify: bool,

    /// Directory prefix for shortened output names
    #[serde(default)]
    pub output_sub_dir: Option<String>,

    /// Emit source maps (forced on for fast bundling, off for merged bundling)
    #[serde(default)]
    pub source_map: bool,

    /// Emit declaration files (default: false)
    #[serde(default)]
    pub declaration: bool,

    /// `sourceRoot` written into composite source maps
    #[serde(default)]
    pub source_root: Option<String>,

    /// Global constants substituted while assembling a merged bundle
    #[serde(default)]
    pub defines: IndexMap<String, serde_json::Value>,

    /// module name -> exported constant -> replacement value
    #[serde(default)]
    pub constant_overrides: IndexMap<String, IndexMap<String, serde_json::Value>>,

    /// HTML head template; `<<path>>` placeholders expand to output names
    #[serde(default)]
    pub html_head: Option<String>,

    /// Output directory used by the command line sink
    #[serde(default)]
    pub out_dir: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            main: Vec::new(),
            dir: None,
            bundle: BundleMode::None,
            sprite_merge: false,
            style_defs: StyleDefMode::None,
            style_prefix: None,
            compile_translations: false,
            report_untranslated: false,
            resources_are_relative_to_project_dir: false,
            compress: true,
            mangle: false,
            beautify: false,
            output_sub_dir: None,
            source_map: false,
            declaration: false,
            source_root: None,
            defines: IndexMap::new(),
            constant_overrides: IndexMap::new(),
            html_head: None,
            out_dir: None,
        }
    }
}

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub main: Option<Vec<String>>,
    pub dir: Option<String>,
    pub bundle: Option<BundleMode>,
    pub sprite_merge: Option<bool>,
    pub compress: Option<bool>,
    pub mangle: Option<bool>,
    pub beautify: Option<bool>,
    pub source_map: Option<bool>,
    pub out_dir: Option<String>,
}

impl ProjectConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension)
    pub fn from_file(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path.extension().and_then(|e| e.to_str()) == Some("json"))
    }

    pub fn parse(content: &str, json: bool) -> Result<Self, BuildError> {
        if json {
            serde_json::from_str(content).map_err(|e| BuildError::Config(e.to_string()))
        } else {
            serde_yaml::from_str(content).map_err(|e| BuildError::Config(e.to_string()))
        }
    }

    /// Write a default configuration file
    pub fn init_file(path: &Path, main: &str) -> Result<(), BuildError> {
        let config = ProjectConfig {
            main: vec![main.to_string()],
            out_dir: Some("dist".to_string()),
            ..ProjectConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).map_err(|e| BuildError::Config(e.to_string()))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Merge command line overrides into this configuration
    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(main) = &overrides.main {
            self.main = main.clone();
        }
        if let Some(dir) = &overrides.dir {
            self.dir = Some(dir.clone());
        }
        if let Some(bundle) = overrides.bundle {
            self.bundle = bundle;
        }
        if let Some(sprite_merge) = overrides.sprite_merge {
            self.sprite_merge = sprite_merge;
        }
        if let Some(compress) = overrides.compress {
            self.compress = compress;
        }
        if let Some(mangle) = overrides.mangle {
            self.mangle = mangle;
        }
        if let Some(beautify) = overrides.beautify {
            self.beautify = beautify;
        }
        if let Some(source_map) = overrides.source_map {
            self.source_map = source_map;
        }
        if let Some(out_dir) = &overrides.out_dir {
            self.out_dir = Some(out_dir.clone());
        }
    }

    /// The single style policy selected by this configuration
    pub fn style_policy(&self) -> StyleDefPolicy {
        match self.style_defs {
            StyleDefMode::None => StyleDefPolicy::None,
            StyleDefMode::LiveReload => StyleDefPolicy::LiveReload,
            StyleDefMode::Debug => StyleDefPolicy::Debug {
                prefix: self.style_prefix.clone(),
            },
            StyleDefMode::Release => StyleDefPolicy::Release,
            StyleDefMode::Prefix => match &self.style_prefix {
                Some(prefix) => StyleDefPolicy::Prefix(prefix.clone()),
                None => StyleDefPolicy::None,
            },
        }
    }

    /// Whether emitted modules should carry source maps for this configuration
    pub fn emits_source_maps(&self) -> bool {
        match self.bundle {
            BundleMode::Merged => false,
            BundleMode::Fast => true,
            BundleMode::None => self.source_map,
        }
    }
}
