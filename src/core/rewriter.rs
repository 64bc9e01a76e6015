/// The fixed-point rewrite engine.
///
/// A pass runs every rule once over the whole string. Passes repeat while
/// the string keeps changing, up to a depth ceiling. Nested symbol
/// expansions continue from their caller's depth, and all passes of one
/// top-level call draw from a shared budget, so self-referencing symbols
/// always terminate.

use tracing::{debug, warn};

use crate::core::config::GrammarConfig;
use crate::core::grammar::{Bindings, GrammarError};
use crate::core::random::{choose, RandomSource};
use crate::core::rules::{default_rules, RewriteRule};
use crate::core::symbols::SymbolTable;
use crate::core::variables::VariableStore;

/// One rewriting session over borrowed grammar state.
pub struct Rewriter<'a> {
    symbols: &'a SymbolTable,
    variables: &'a mut VariableStore,
    rng: &'a mut dyn RandomSource,
    rules: &'a [Box<dyn RewriteRule>],
    bindings: Option<&'a Bindings>,
    max_depth: usize,
    passes_left: usize,
    truncated: bool,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        symbols: &'a SymbolTable,
        variables: &'a mut VariableStore,
        rng: &'a mut dyn RandomSource,
        config: &GrammarConfig,
    ) -> Self {
        Self {
            symbols,
            variables,
            rng,
            rules: default_rules(),
            bindings: None,
            max_depth: config.max_depth,
            passes_left: config.max_passes,
            truncated: false,
        }
    }

    /// Use a custom rule list, highest priority first.
    pub fn with_rules(mut self, rules: &'a [Box<dyn RewriteRule>]) -> Self {
        self.rules = rules;
        self
    }

    /// Caller keyword values for `{key}` placeholders.
    pub fn with_bindings(mut self, bindings: &'a Bindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Rewrite `text` to a fixed point.
    pub fn parse(&mut self, text: &str) -> Result<String, GrammarError> {
        self.rewrite(text, 0)
    }

    /// A random template of `symbol`, rewritten. Unknown symbols come back
    /// as the literal `{symbol}`.
    pub fn interpret(&mut self, symbol: &str) -> Result<String, GrammarError> {
        self.expand(symbol, 0)
    }

    /// A random template of `symbol`, as written in the definitions.
    pub fn interpret_raw(&mut self, symbol: &str) -> String {
        let symbols = self.symbols;
        match symbols.get(symbol) {
            Some(templates) => choose(&mut *self.rng, templates)
                .cloned()
                .unwrap_or_else(|| placeholder(symbol)),
            None => placeholder(symbol),
        }
    }

    /// Whether any call so far stopped at the depth ceiling or pass budget.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn draw(&mut self) -> f64 {
        self.rng.next_f64()
    }

    pub fn variable(&self, name: &str) -> &str {
        self.variables.lookup(name)
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut *self.variables
    }

    pub fn has_bindings(&self) -> bool {
        self.bindings.is_some_and(|b| !b.is_empty())
    }

    pub fn binding(&self, key: &str) -> Option<&str> {
        self.bindings
            .and_then(|b| b.get(key))
            .map(String::as_str)
    }

    /// Expand `symbol` at `depth`.
    pub(crate) fn expand(&mut self, symbol: &str, depth: usize) -> Result<String, GrammarError> {
        let symbols = self.symbols;
        let Some(templates) = symbols.get(symbol) else {
            return Ok(placeholder(symbol));
        };
        let Some(template) = choose(&mut *self.rng, templates) else {
            return Ok(placeholder(symbol));
        };
        let template = template.clone();
        self.rewrite(&template, depth)
    }

    fn rewrite(&mut self, text: &str, mut depth: usize) -> Result<String, GrammarError> {
        let mut current = text.to_string();
        loop {
            if depth > self.max_depth {
                self.truncate("depth ceiling", depth);
                return Ok(current);
            }
            if self.passes_left == 0 {
                self.truncate("pass budget", depth);
                return Ok(current);
            }
            self.passes_left -= 1;

            let next = self.pass(&current, depth)?;
            debug!(depth, before = %current, after = %next, "pass");

            if next == current {
                return Ok(next);
            }
            if depth >= self.max_depth {
                self.truncate("depth ceiling", depth);
                return Ok(next);
            }
            current = next;
            depth += 1;
        }
    }

    fn pass(&mut self, text: &str, depth: usize) -> Result<String, GrammarError> {
        let rules = self.rules;
        let mut current = text.to_string();
        for rule in rules {
            if !rule.enabled(self) {
                continue;
            }
            current = rule.apply(&current, self, depth)?;
        }
        Ok(current)
    }

    fn truncate(&mut self, reason: &str, depth: usize) {
        if !self.truncated {
            warn!(reason, depth, "rewriting stopped before a fixed point");
        }
        self.truncated = true;
    }
}

fn placeholder(symbol: &str) -> String {
    format!("{{{}}}", symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_MAX_DEPTH;
    use crate::core::random::{SequenceRandom, StdRandom};
    use crate::core::rules::RuleMatch;
    use regex::Regex;

    fn table(defs: &[(&str, &str)]) -> SymbolTable {
        let mut table = SymbolTable::new();
        for (name, template) in defs {
            table.append(name, *template);
        }
        table
    }

    fn parse_with(symbols: &SymbolTable, draw: f64, text: &str) -> (String, VariableStore) {
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(draw);
        let config = GrammarConfig::default();
        let out = Rewriter::new(symbols, &mut vars, &mut rng, &config)
            .parse(text)
            .unwrap();
        (out, vars)
    }

    #[test]
    fn plain_text_is_a_fixed_point() {
        let (out, _) = parse_with(&SymbolTable::new(), 0.5, "nothing to do here");
        assert_eq!(out, "nothing to do here");
    }

    #[test]
    fn probability_branch() {
        let symbols = SymbolTable::new();
        assert_eq!(parse_with(&symbols, 0.3, "<1|fresh>").0, "fresh");
        assert_eq!(parse_with(&symbols, 0.3, "<0|fresh>").0, "");
        assert_eq!(parse_with(&symbols, 0.3, "<0.5|fresh>").0, "fresh");
        assert_eq!(parse_with(&symbols, 0.7, "<0.5|fresh>").0, "");
    }

    #[test]
    fn comparison_is_strict() {
        let symbols = SymbolTable::new();
        assert_eq!(parse_with(&symbols, 0.5, "<0.5|A|B>").0, "B");
        assert_eq!(parse_with(&symbols, 0.0, "<0|A|B>").0, "B");
    }

    #[test]
    fn either_or_branch() {
        let symbols = SymbolTable::new();
        assert_eq!(parse_with(&symbols, 0.99, "<1|A|B>").0, "A");
        assert_eq!(parse_with(&symbols, 0.0, "<0|A|B>").0, "B");
        assert_eq!(parse_with(&symbols, 0.0, "<2|A|B>").0, "A");
    }

    #[test]
    fn malformed_probability_is_error() {
        let symbols = SymbolTable::new();
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.1);
        let config = GrammarConfig::default();
        let err = Rewriter::new(&symbols, &mut vars, &mut rng, &config)
            .parse("<1.2.3|odd>")
            .unwrap_err();
        assert!(matches!(err, GrammarError::Probability { ref literal } if literal == "1.2.3"));
    }

    #[test]
    fn symbols_expand_recursively() {
        let symbols = table(&[
            ("symbol", "fresh"),
            ("nested", "{symbol}"),
            ("who", "we"),
            ("do-what", "want the funk"),
        ]);
        assert_eq!(parse_with(&symbols, 0.0, "{nested}").0, "fresh");
        assert_eq!(parse_with(&symbols, 0.0, "{who} {do-what}").0, "we want the funk");
    }

    #[test]
    fn unknown_symbol_stays_literal() {
        let (out, _) = parse_with(&SymbolTable::new(), 0.0, "{not-symbol}");
        assert_eq!(out, "{not-symbol}");
    }

    #[test]
    fn interpret_raw_skips_rewriting() {
        let symbols = table(&[("nested", "{symbol}"), ("symbol", "fresh")]);
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.0);
        let config = GrammarConfig::default();
        let mut rw = Rewriter::new(&symbols, &mut vars, &mut rng, &config);
        assert_eq!(rw.interpret_raw("nested"), "{symbol}");
        assert_eq!(rw.interpret("nested").unwrap(), "fresh");
        assert_eq!(rw.interpret_raw("missing"), "{missing}");
    }

    #[test]
    fn explicit_assignment_stores_literal_value() {
        let (out, vars) = parse_with(&SymbolTable::new(), 0.0, r#"the $moon="<1|crescent>" moon"#);
        assert_eq!(out, "the moon");
        // Assignment runs before branches, so the value is stored as written.
        assert_eq!(vars.lookup("moon"), "<1|crescent>");
    }

    #[test]
    fn variable_reference_sees_earlier_assignment() {
        let (out, vars) = parse_with(&SymbolTable::new(), 0.0, r#"$var="crescent" $var moon"#);
        assert_eq!(vars.lookup("var"), "crescent");
        assert_eq!(out, " crescent moon");
    }

    #[test]
    fn adjacent_assignments_all_apply() {
        let (out, vars) = parse_with(
            &SymbolTable::new(),
            0.0,
            r#"$who="fox"$where="den"the $who in the $where"#,
        );
        assert_eq!(vars.lookup("who"), "fox");
        assert_eq!(vars.lookup("where"), "den");
        assert_eq!(out, "the fox in the den");
    }

    #[test]
    fn unknown_variable_is_empty() {
        let (out, _) = parse_with(&SymbolTable::new(), 0.0, "[$missing]");
        assert_eq!(out, "[]");
    }

    #[test]
    fn lazy_assignment_takes_the_line() {
        let (out, vars) = parse_with(&SymbolTable::new(), 0.0, "crescent fresh $$var");
        assert_eq!(out, "crescent fresh");
        assert_eq!(vars.lookup("var"), "crescent fresh");
    }

    #[test]
    fn lazy_assignment_is_per_line() {
        let (out, vars) = parse_with(&SymbolTable::new(), 0.0, "first $$a\nsecond $$b");
        assert_eq!(out, "first\nsecond");
        assert_eq!(vars.lookup("a"), "first");
        assert_eq!(vars.lookup("b"), "second");
    }

    #[test]
    fn lazy_assignment_wins_over_explicit_for_same_name() {
        let (_, vars) = parse_with(&SymbolTable::new(), 0.0, r#"night $v="day" falls $$v"#);
        assert_eq!(vars.lookup("v"), "night falls");
    }

    #[test]
    fn explicit_assignment_for_other_name_still_applies() {
        let (_, vars) = parse_with(&SymbolTable::new(), 0.0, r#"night $w="day" falls $$v"#);
        assert_eq!(vars.lookup("w"), "day");
        assert_eq!(vars.lookup("v"), "night falls");
    }

    #[test]
    fn keyword_bindings_fill_placeholders() {
        let symbols = table(&[("greeting", "hello {name}")]);
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.0);
        let config = GrammarConfig::default();
        let mut bindings = Bindings::default();
        bindings.insert("name".to_string(), "world".to_string());
        let out = Rewriter::new(&symbols, &mut vars, &mut rng, &config)
            .with_bindings(&bindings)
            .parse("{greeting}, {other}")
            .unwrap();
        assert_eq!(out, "hello world, {other}");
    }

    #[test]
    fn self_reference_terminates() {
        let symbols = table(&[("loop-1", "{loop-2}"), ("loop-2", "{loop-1}")]);
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.0);
        let config = GrammarConfig::default();
        let mut rw = Rewriter::new(&symbols, &mut vars, &mut rng, &config);
        let out = rw.parse("{loop-1}").unwrap();
        assert!(out.starts_with("{loop-"), "got {}", out);
        assert!(rw.truncated());
    }

    #[test]
    fn growth_stops_after_depth_ceiling_passes() {
        let symbols = SymbolTable::new();
        for max_depth in [5, DEFAULT_MAX_DEPTH] {
            let mut vars = VariableStore::new();
            let mut rng = SequenceRandom::constant(0.0);
            let config = GrammarConfig {
                max_depth,
                ..GrammarConfig::default()
            };
            let mut rw = Rewriter::new(&symbols, &mut vars, &mut rng, &config);
            // Every pass re-injects `$a`, adding one `x`.
            let out = rw.parse(r#"$a="x$a"$a"#).unwrap();
            assert_eq!(out, format!("{}$a", "x".repeat(max_depth + 1)));
            assert!(rw.truncated());
        }
    }

    #[test]
    fn wide_acyclic_grammar_expands_fully() {
        let doc = vec!["{row}"; 250].join(" ");
        let row = vec!["{w}"; 50].join("");
        let symbols = table(&[("doc", doc.as_str()), ("row", row.as_str()), ("w", "a")]);
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.0);
        let config = GrammarConfig::default();
        let mut rw = Rewriter::new(&symbols, &mut vars, &mut rng, &config);
        let out = rw.interpret("doc").unwrap();
        assert!(!out.contains('{'));
        assert_eq!(out.matches('a').count(), 250 * 50);
        assert!(!rw.truncated());
    }

    #[test]
    fn branching_self_reference_is_bounded() {
        let symbols = table(&[("twice", "{twice}{twice}")]);
        let mut vars = VariableStore::new();
        let mut rng = StdRandom::seeded(3);
        let config = GrammarConfig {
            max_passes: 500,
            ..GrammarConfig::default()
        };
        let mut rw = Rewriter::new(&symbols, &mut vars, &mut rng, &config);
        let out = rw.parse("{twice}").unwrap();
        assert!(out.contains("{twice}"));
        assert!(rw.truncated());
    }

    #[test]
    fn custom_rule_list_controls_priority() {
        struct Shout {
            re: Regex,
        }
        impl RewriteRule for Shout {
            fn name(&self) -> &'static str {
                "shout"
            }
            fn pattern(&self) -> &Regex {
                &self.re
            }
            fn replace(
                &self,
                found: &RuleMatch,
                _text: &str,
                _rewriter: &mut Rewriter<'_>,
                _depth: usize,
            ) -> Result<String, GrammarError> {
                Ok(found.group(1).unwrap_or_default().to_uppercase())
            }
        }

        let rules: Vec<Box<dyn RewriteRule>> = vec![Box::new(Shout {
            re: Regex::new(r"!(\w+)").unwrap(),
        })];
        let symbols = SymbolTable::new();
        let mut vars = VariableStore::new();
        let mut rng = SequenceRandom::constant(0.0);
        let config = GrammarConfig::default();
        let out = Rewriter::new(&symbols, &mut vars, &mut rng, &config)
            .with_rules(&rules)
            .parse("say !hi to {nobody}")
            .unwrap();
        assert_eq!(out, "say HI to {nobody}");
    }
}
