/// Variable store for `$name` bindings.

use rustc_hash::FxHashMap;

/// Variable bindings set by assignment directives.
///
/// Values are stored literally, directives included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    values: FxHashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// The bound value, or `""` when `name` was never assigned.
    pub fn lookup(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
