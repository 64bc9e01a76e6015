/// Definition-file loading — line parsing, imports, and cycle protection.
///
/// Format, one entry per line:
/// - blank lines are ignored;
/// - `#import other` merges `other` (relative to the importing file);
/// - `#name` starts the symbol `name`;
/// - anything else is a template for the current symbol.

use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, info};

use crate::core::grammar::GrammarError;
use crate::core::symbols::SymbolTable;

/// Marker that opens a header line.
const HEADER_MARKER: char = '#';

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#import ([\w.]+)").expect("import pattern is valid"));

/// Parsed contents of one definition source, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definitions {
    /// `(symbol, template)` pairs in file order.
    pub entries: Vec<(String, String)>,
    /// Import names in file order, as written.
    pub imports: Vec<String>,
}

/// Split a definition source into entries and imports.
pub fn parse_definitions(source: &str) -> Definitions {
    let mut defs = Definitions::default();
    let mut current = String::new();

    for line in source.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix(HEADER_MARKER) {
            if let Some(caps) = IMPORT_RE.captures(line) {
                defs.imports.push(caps[1].to_string());
            } else {
                current = header.to_string();
            }
            continue;
        }
        defs.entries.push((current.clone(), line.to_string()));
    }

    defs
}

/// A file read during a load, with the modification time seen at read.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Reads definition files into a [`SymbolTable`].
#[derive(Debug, Clone)]
pub struct GrammarLoader {
    extension: String,
}

impl GrammarLoader {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Append the default extension unless `path` already carries it.
    pub fn with_extension(&self, path: &Path) -> PathBuf {
        if path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()) {
            return path.to_path_buf();
        }
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(&self.extension);
        PathBuf::from(name)
    }

    /// Root load: clear `table`, then read `path` and everything it imports.
    ///
    /// Returns every file read, root first. On error, entries merged from
    /// files read before the failure stay in `table`.
    pub fn load(&self, path: &Path, table: &mut SymbolTable) -> Result<Vec<LoadedFile>, GrammarError> {
        let path = self.with_extension(path);
        table.clear();

        let mut loaded = FxHashSet::default();
        loaded.insert(canonical(&path)?);
        let mut files = Vec::new();
        self.load_file(&path, table, &mut loaded, &mut files)?;

        info!(path = %path.display(), files = files.len(), symbols = table.len(), "loaded grammar");
        Ok(files)
    }

    /// Root load from an in-memory source. Imports resolve against `base`.
    pub fn load_str(
        &self,
        source: &str,
        base: &Path,
        table: &mut SymbolTable,
    ) -> Result<Vec<LoadedFile>, GrammarError> {
        table.clear();
        let mut loaded = FxHashSet::default();
        let mut files = Vec::new();
        let defs = parse_definitions(source);
        merge(&defs, table);
        self.load_imports(&defs.imports, base, table, &mut loaded, &mut files)?;
        Ok(files)
    }

    /// Read one file (already registered in `loaded`) and recurse into its
    /// imports in append mode.
    fn load_file(
        &self,
        path: &Path,
        table: &mut SymbolTable,
        loaded: &mut FxHashSet<PathBuf>,
        files: &mut Vec<LoadedFile>,
    ) -> Result<(), GrammarError> {
        let io_err = |source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        };
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(io_err)?;
        let source = std::fs::read_to_string(path).map_err(io_err)?;

        let defs = parse_definitions(&source);
        debug!(
            path = %path.display(),
            entries = defs.entries.len(),
            imports = defs.imports.len(),
            "read definition file"
        );
        merge(&defs, table);
        files.push(LoadedFile {
            path: path.to_path_buf(),
            modified,
        });

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.load_imports(&defs.imports, dir, table, loaded, files)
    }

    fn load_imports(
        &self,
        imports: &[String],
        dir: &Path,
        table: &mut SymbolTable,
        loaded: &mut FxHashSet<PathBuf>,
        files: &mut Vec<LoadedFile>,
    ) -> Result<(), GrammarError> {
        for name in imports {
            let path = self.with_extension(&dir.join(name));
            // Registered before recursing so a cycle back here is skipped.
            if !loaded.insert(canonical(&path)?) {
                debug!(path = %path.display(), "import already loaded, skipping");
                continue;
            }
            self.load_file(&path, table, loaded, files)?;
        }
        Ok(())
    }
}

impl Default for GrammarLoader {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_EXTENSION)
    }
}

fn merge(defs: &Definitions, table: &mut SymbolTable) {
    for (symbol, template) in &defs.entries {
        table.append(symbol, template.as_str());
    }
}

fn canonical(path: &Path) -> Result<PathBuf, GrammarError> {
    std::fs::canonicalize(path).map_err(|source| GrammarError::Io {
        path: path.to_path_buf(),
        source,
    })
}
