/// Rewrite rules — one object per directive kind, applied in priority order.
///
/// Every rule finds all non-overlapping matches of its pattern in the
/// current string, then replaces each match once, left to right. The
/// rewriter runs the rules of [`default_rules`] in slice order on every pass.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::trace;

use crate::core::grammar::GrammarError;
use crate::core::rewriter::Rewriter;

/// One match of a rule pattern, detached from the string it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// Byte range of the whole match.
    pub range: Range<usize>,
    /// The matched text.
    pub text: String,
    groups: Vec<Option<String>>,
}

impl RuleMatch {
    /// Capture group `index` (1-based, as in the pattern), if it took part.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }
}

/// A directive kind the rewriter knows how to expand.
pub trait RewriteRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn pattern(&self) -> &Regex;

    /// Whether the rule runs at all for this rewriter.
    fn enabled(&self, _rewriter: &Rewriter<'_>) -> bool {
        true
    }

    /// Replacement text for one match. `text` is the string the match was
    /// found in, unmodified by earlier replacements of this rule.
    fn replace(
        &self,
        found: &RuleMatch,
        text: &str,
        rewriter: &mut Rewriter<'_>,
        depth: usize,
    ) -> Result<String, GrammarError>;

    /// All non-overlapping matches in `text`, left to right.
    fn find(&self, text: &str) -> Vec<RuleMatch> {
        self.pattern()
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(RuleMatch {
                    range: whole.range(),
                    text: whole.as_str().to_string(),
                    groups: caps
                        .iter()
                        .map(|g| g.map(|m| m.as_str().to_string()))
                        .collect(),
                })
            })
            .collect()
    }

    /// Replace every match in `text` once.
    fn apply(
        &self,
        text: &str,
        rewriter: &mut Rewriter<'_>,
        depth: usize,
    ) -> Result<String, GrammarError> {
        let found = self.find(text);
        if found.is_empty() {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in &found {
            out.push_str(&text[last..m.range.start]);
            out.push_str(&self.replace(m, text, rewriter, depth)?);
            last = m.range.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

static LAZY_ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m) \$\$(\w+)$").expect("lazy assignment pattern is valid"));

/// `$name="value"`: store the literal value and drop the directive along
/// with the non-word character in front of it.
///
/// A `$` preceded by a word character is not a directive. The boundary
/// character is only consumed when it is not the tail of the previous
/// match, so back-to-back assignments all apply in one pass.
pub struct ExplicitAssign {
    re: Regex,
}

impl ExplicitAssign {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r#"\$(\w+)="([^"\n]*)""#).expect("assignment pattern is valid"),
        }
    }
}

impl Default for ExplicitAssign {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for ExplicitAssign {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn find(&self, text: &str) -> Vec<RuleMatch> {
        let mut found = Vec::new();
        let mut prev_end = 0;
        for caps in self.re.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let mut start = whole.start();
            let after_previous = start == prev_end;
            prev_end = whole.end();
            match text[..start].chars().next_back() {
                Some(c) if c.is_alphanumeric() || c == '_' => continue,
                Some('\n') | None => {}
                Some(c) if !after_previous => start -= c.len_utf8(),
                Some(_) => {}
            }
            found.push(RuleMatch {
                range: start..whole.end(),
                text: text[start..whole.end()].to_string(),
                groups: caps
                    .iter()
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect(),
            });
        }
        found
    }

    fn replace(
        &self,
        found: &RuleMatch,
        text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let (name, value) = match (found.group(1), found.group(2)) {
            (Some(name), Some(value)) => (name, value),
            _ => {
                return Err(GrammarError::AssignmentCapture {
                    directive: found.text.clone(),
                })
            }
        };

        // A lazy marker for the same name owns the whole line.
        if lazy_name_on_line(text, found.range.start) == Some(name) {
            trace!(var = name, "explicit assignment superseded by lazy assignment");
            return Ok(String::new());
        }

        trace!(var = name, value, "assign");
        rewriter.variables_mut().assign(name, value);
        Ok(String::new())
    }
}

/// `line text $$name` at end of line: the line before the marker becomes
/// the value of `name`, and the marker is removed.
pub struct LazyAssign;

impl RewriteRule for LazyAssign {
    fn name(&self) -> &'static str {
        "lazy-assign"
    }

    fn pattern(&self) -> &Regex {
        &LAZY_ASSIGN_RE
    }

    fn replace(
        &self,
        found: &RuleMatch,
        text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let name = found
            .group(1)
            .ok_or_else(|| GrammarError::AssignmentCapture {
                directive: found.text.clone(),
            })?;
        let line_start = text[..found.range.start]
            .rfind('\n')
            .map_or(0, |i| i + 1);
        let value = &text[line_start..found.range.start];

        trace!(var = name, value, "lazy assign");
        rewriter.variables_mut().assign(name, value);
        Ok(String::new())
    }
}

/// `<p|A|B>`: `A` when the draw is below `p`, `B` otherwise.
pub struct EitherOr {
    re: Regex,
}

impl EitherOr {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"<([.\d]+)\|(.+?)\|(.+?)>").expect("either-or pattern is valid"),
        }
    }
}

impl Default for EitherOr {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for EitherOr {
    fn name(&self) -> &'static str {
        "either-or"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn replace(
        &self,
        found: &RuleMatch,
        _text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let p = probability(found.group(1).unwrap_or_default())?;
        let branch = if rewriter.draw() < p {
            found.group(2)
        } else {
            found.group(3)
        };
        Ok(branch.unwrap_or_default().to_string())
    }
}

/// `<p|text>`: `text` when the draw is below `p`, nothing otherwise.
pub struct Chance {
    re: Regex,
}

impl Chance {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"<([.\d]+)\|(.+?)>").expect("probability pattern is valid"),
        }
    }
}

impl Default for Chance {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for Chance {
    fn name(&self) -> &'static str {
        "chance"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn replace(
        &self,
        found: &RuleMatch,
        _text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let p = probability(found.group(1).unwrap_or_default())?;
        if rewriter.draw() < p {
            Ok(found.group(2).unwrap_or_default().to_string())
        } else {
            Ok(String::new())
        }
    }
}

/// `{symbol}`: a nested interpretation of the symbol.
pub struct SymbolExpansion {
    re: Regex,
}

impl SymbolExpansion {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"\{(.+?)\}").expect("symbol pattern is valid"),
        }
    }
}

impl Default for SymbolExpansion {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for SymbolExpansion {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn replace(
        &self,
        found: &RuleMatch,
        _text: &str,
        rewriter: &mut Rewriter<'_>,
        depth: usize,
    ) -> Result<String, GrammarError> {
        let symbol = found.group(1).unwrap_or_default();
        rewriter.expand(symbol, depth + 1)
    }
}

/// `$name`: the stored value, or nothing.
pub struct VariableRef {
    re: Regex,
}

impl VariableRef {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"\$(\w+)").expect("variable pattern is valid"),
        }
    }
}

impl Default for VariableRef {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for VariableRef {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn replace(
        &self,
        found: &RuleMatch,
        _text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let name = found.group(1).unwrap_or_default();
        Ok(rewriter.variable(name).to_string())
    }
}

/// `{key}` filled from caller-supplied bindings. Keys without a binding
/// are left as they are.
pub struct KeywordSubstitution {
    re: Regex,
}

impl KeywordSubstitution {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"\{([^{}]+)\}").expect("keyword pattern is valid"),
        }
    }
}

impl Default for KeywordSubstitution {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteRule for KeywordSubstitution {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn pattern(&self) -> &Regex {
        &self.re
    }

    fn enabled(&self, rewriter: &Rewriter<'_>) -> bool {
        rewriter.has_bindings()
    }

    fn replace(
        &self,
        found: &RuleMatch,
        _text: &str,
        rewriter: &mut Rewriter<'_>,
        _depth: usize,
    ) -> Result<String, GrammarError> {
        let key = found.group(1).unwrap_or_default();
        Ok(rewriter
            .binding(key)
            .map_or_else(|| found.text.clone(), str::to_string))
    }
}

static DEFAULT_RULES: LazyLock<Vec<Box<dyn RewriteRule>>> = LazyLock::new(|| {
    vec![
        Box::new(ExplicitAssign::new()),
        Box::new(LazyAssign),
        Box::new(EitherOr::new()),
        Box::new(Chance::new()),
        Box::new(SymbolExpansion::new()),
        Box::new(VariableRef::new()),
        Box::new(KeywordSubstitution::new()),
    ]
});

/// The standard rule list, highest priority first.
pub fn default_rules() -> &'static [Box<dyn RewriteRule>] {
    &DEFAULT_RULES
}

fn probability(literal: &str) -> Result<f64, GrammarError> {
    literal
        .parse::<f64>()
        .map_err(|_| GrammarError::Probability {
            literal: literal.to_string(),
        })
}

/// Name of the lazy assignment ending the line that contains `pos`.
fn lazy_name_on_line(text: &str, pos: usize) -> Option<&str> {
    let start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
    LAZY_ASSIGN_RE
        .captures(&text[start..end])
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
