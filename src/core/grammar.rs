/// Grammar — the aggregate callers hold: symbols, variables, randomness,
/// and the definition files they came from.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::core::config::GrammarConfig;
use crate::core::freshness::FreshnessGuard;
use crate::core::loader::GrammarLoader;
use crate::core::random::{RandomSource, StdRandom};
use crate::core::rewriter::Rewriter;
use crate::core::symbols::SymbolTable;
use crate::core::variables::VariableStore;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("IO error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed probability '{literal}'")]
    Probability { literal: String },
    #[error("assignment '{directive}' matched without a name or value")]
    AssignmentCapture { directive: String },
    #[error("RON deserialization error: {0}")]
    Config(#[from] ron::error::SpannedError),
}

/// Caller-supplied values for `{key}` placeholders.
pub type Bindings = FxHashMap<String, String>;

/// Symbol name interpreted by [`Grammar::interpret_default`].
pub const DEFAULT_SYMBOL: &str = "default";

/// A loaded grammar. Not shareable across threads without external
/// locking: every entry point may mutate variables or reload symbols.
pub struct Grammar<R: RandomSource = StdRandom> {
    symbols: SymbolTable,
    variables: VariableStore,
    rng: R,
    loader: GrammarLoader,
    guard: FreshnessGuard,
    path: Option<PathBuf>,
    config: GrammarConfig,
}

impl Grammar<StdRandom> {
    pub fn new() -> Self {
        Self::with_config(GrammarConfig::default())
    }

    /// A grammar with a random source seeded from `config.seed`, or from
    /// entropy when unset.
    pub fn with_config(config: GrammarConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRandom::seeded(seed),
            None => StdRandom::from_entropy(),
        };
        Self::with_random_and_config(rng, config)
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_config(GrammarConfig {
            seed: Some(seed),
            ..GrammarConfig::default()
        })
    }
}

impl Default for Grammar<StdRandom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RandomSource> Grammar<R> {
    pub fn with_random(rng: R) -> Self {
        Self::with_random_and_config(rng, GrammarConfig::default())
    }

    pub fn with_random_and_config(rng: R, config: GrammarConfig) -> Self {
        Self {
            symbols: SymbolTable::new(),
            variables: VariableStore::new(),
            rng,
            loader: GrammarLoader::new(config.extension.clone()),
            guard: FreshnessGuard::default(),
            path: None,
            config,
        }
    }

    /// Load the definition file at `path` (extension optional), replacing
    /// all symbols. Variables are kept. On failure the grammar has no root
    /// file until a later `load` succeeds.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), GrammarError> {
        let path = self.loader.with_extension(path.as_ref());
        self.path = None;
        self.guard.clear();
        let files = self.loader.load(&path, &mut self.symbols)?;
        self.guard.record(files);
        self.path = Some(path);
        Ok(())
    }

    /// Replace all symbols with definitions from `source`. Imports resolve
    /// against the current directory. Hot reload does not apply.
    pub fn load_str(&mut self, source: &str) -> Result<(), GrammarError> {
        self.path = None;
        self.guard.clear();
        self.loader
            .load_str(source, Path::new("."), &mut self.symbols)?;
        Ok(())
    }

    /// Reload the root file if any loaded file changed on disk. Returns
    /// whether a reload happened.
    pub fn refresh(&mut self) -> Result<bool, GrammarError> {
        if !self.config.hot_reload || self.path.is_none() {
            return Ok(false);
        }
        let Some(stale) = self.guard.stale_file()? else {
            return Ok(false);
        };
        info!(changed = %stale.display(), "definition file changed, reloading");
        self.load_root()?;
        Ok(true)
    }

    /// Rewrite `text` to a fixed point.
    pub fn parse(&mut self, text: &str) -> Result<String, GrammarError> {
        self.refresh()?;
        self.rewriter().parse(text)
    }

    /// Rewrite `text`, then fill `{key}` placeholders from `bindings`.
    pub fn parse_with(&mut self, text: &str, bindings: &Bindings) -> Result<String, GrammarError> {
        self.refresh()?;
        self.rewriter().with_bindings(bindings).parse(text)
    }

    /// A random template of `symbol`, rewritten. Unknown symbols yield the
    /// literal `{symbol}`.
    pub fn interpret(&mut self, symbol: &str) -> Result<String, GrammarError> {
        self.refresh()?;
        self.rewriter().interpret(symbol)
    }

    /// A random template of `symbol`, exactly as written.
    pub fn interpret_raw(&mut self, symbol: &str) -> Result<String, GrammarError> {
        self.refresh()?;
        Ok(self.rewriter().interpret_raw(symbol))
    }

    /// Interpret the `default` symbol.
    pub fn interpret_default(&mut self) -> Result<String, GrammarError> {
        self.interpret(DEFAULT_SYMBOL)
    }

    /// Value of `$name`, or `""` when unset.
    pub fn var(&self, name: &str) -> &str {
        self.variables.lookup(name)
    }

    /// Forget all variables. Symbols are untouched.
    pub fn reset(&mut self) {
        self.variables.clear();
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbol_names(&self) -> Vec<&str> {
        self.symbols.names()
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Root definition file, with extension.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every file read by the last successful load, root first.
    pub fn loaded_files(&self) -> Vec<&Path> {
        self.guard.files().collect()
    }

    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    fn load_root(&mut self) -> Result<(), GrammarError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let files = self.loader.load(path, &mut self.symbols)?;
        self.guard.record(files);
        Ok(())
    }

    fn rewriter(&mut self) -> Rewriter<'_> {
        Rewriter::new(
            &self.symbols,
            &mut self.variables,
            &mut self.rng,
            &self.config,
        )
    }
}
