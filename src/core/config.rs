/// Engine configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::grammar::GrammarError;

/// Default pass-depth ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 100;
/// Default total pass budget for one top-level call.
pub const DEFAULT_MAX_PASSES: usize = 1_000_000;
/// Default definition-file suffix.
pub const DEFAULT_EXTENSION: &str = "txt";

/// Tunables for loading and rewriting.
///
/// ```ron
/// (
///     max_depth: 100,
///     max_passes: 1000000,
///     extension: "txt",
///     hot_reload: true,
///     seed: Some(42),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Nesting depth at which rewriting stops and returns what it has.
    pub max_depth: usize,
    /// Passes allowed across one top-level `parse`/`interpret`, nested
    /// expansions included.
    pub max_passes: usize,
    /// Suffix appended to definition paths that lack it.
    pub extension: String,
    /// Reload definitions when a loaded file changes on disk.
    pub hot_reload: bool,
    /// Seed for the default random source; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_passes: DEFAULT_MAX_PASSES,
            extension: DEFAULT_EXTENSION.to_string(),
            hot_reload: true,
            seed: None,
        }
    }
}

impl GrammarConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<GrammarConfig, GrammarError> {
        let contents = std::fs::read_to_string(path).map_err(|source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_ron(&contents)
    }

    /// Parse a configuration from a RON string. Missing fields take defaults.
    pub fn parse_ron(input: &str) -> Result<GrammarConfig, GrammarError> {
        Ok(ron::from_str(input)?)
    }
}
