/// Symbol table — symbol names bound to their candidate templates.

use rustc_hash::FxHashMap;

/// Maps each symbol name to its templates, in file order.
///
/// Names only enter the table through [`SymbolTable::append`], so every
/// present name has at least one template. Repeated templates are kept;
/// they weight selection toward that line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: FxHashMap<String, Vec<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.symbols.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Add one candidate template under `name`.
    pub fn append(&mut self, name: &str, template: impl Into<String>) {
        self.symbols
            .entry(name.to_string())
            .or_default()
            .push(template.into());
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.symbols
            .iter()
            .map(|(name, templates)| (name.as_str(), templates.as_slice()))
    }
}
