//! The rule model: one pattern-to-classification mapping within a grammar.
//!
//! A [`Rule`] pairs a compiled pattern with the classification its matches
//! receive and with optional context constraints:
//!
//! * `only` restricts the rule to firing inside parents of the named kinds
//!   (e.g. an attribute rule that only applies inside a `tag` match);
//! * `allow` restricts which kinds may nest inside this rule's matches;
//! * `extract` decomposes one underlying match into several independently
//!   classified sub-spans;
//! * `embed` delegates the matched span to a different grammar, resolved
//!   by name through the registry;
//! * `guard` is a post-match predicate, the portable replacement for
//!   lookaround constructs the pattern engine does not support.
//!
//! Rules are constructed once at grammar-registration time and are
//! immutable and stateless afterwards; every tokenization call shares them
//! read-only. Construction is fallible: a pattern that does not compile or
//! that can match the empty string is rejected up front, since an
//! empty-width match would stall the scanner and break the recursion
//! bound of the tree builder.

pub mod common;

use std::fmt;
use std::sync::Arc;

use regex::{Captures, Regex};

use crate::error::{SyntaxError, SyntaxResult};

/// An owned description of one raw pattern match: the overall span plus
/// the spans of every capture group, in absolute offsets of the full
/// source text. Handed to guards and custom extractors.
#[derive(Debug, Clone)]
pub struct RawMatch {
    start: usize,
    end: usize,
    groups: Vec<Option<(usize, usize)>>,
}

impl RawMatch {
    pub(crate) fn from_captures(captures: &Captures<'_>, base: usize) -> Self {
        let groups = (0..captures.len())
            .map(|i| {
                captures
                    .get(i)
                    .map(|m| (base + m.start(), base + m.end()))
            })
            .collect();
        let whole = captures
            .get(0)
            .map(|m| (base + m.start(), base + m.end()))
            .unwrap_or((base, base));
        Self {
            start: whole.0,
            end: whole.1,
            groups,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Absolute `(start, end)` span of capture group `index`, if the group
    /// participated in the match. Group 0 is the whole match.
    pub fn group(&self, index: usize) -> Option<(usize, usize)> {
        self.groups.get(index).copied().flatten()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The matched slice of the full source text.
    pub fn text<'t>(&self, source: &'t str) -> &'t str {
        &source[self.start..self.end]
    }

    /// The slice covered by capture group `index`, if it participated.
    pub fn group_text<'t>(&self, source: &'t str, index: usize) -> Option<&'t str> {
        self.group(index).map(|(start, end)| &source[start..end])
    }
}

/// Classification of a span produced by an extractor: either a plain
/// category tag or a delegation to another grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanClass {
    Kind(String),
    Embed(String),
}

/// One sub-span produced by an extractor, in absolute offsets.
#[derive(Debug, Clone)]
pub struct ExtractedSpan {
    pub offset: usize,
    pub length: usize,
    pub class: SpanClass,
    pub allow: Option<Vec<String>>,
}

impl ExtractedSpan {
    pub fn kind(offset: usize, length: usize, kind: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            class: SpanClass::Kind(kind.into()),
            allow: None,
        }
    }

    pub fn embed(offset: usize, length: usize, grammar: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            class: SpanClass::Embed(grammar.into()),
            allow: None,
        }
    }

    pub fn allow<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }
}

/// Template entry for [`Extractor::groups`]: how one capture group is
/// classified. Entry *i* of the template applies to capture group *i + 1*.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    class: SpanClass,
    allow: Option<Vec<String>>,
}

impl GroupSpec {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            class: SpanClass::Kind(kind.into()),
            allow: None,
        }
    }

    pub fn embed(grammar: impl Into<String>) -> Self {
        Self {
            class: SpanClass::Embed(grammar.into()),
            allow: None,
        }
    }

    pub fn allow<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = Some(kinds.into_iter().map(Into::into).collect());
        self
    }
}

type ExtractFn = Arc<dyn Fn(&str, &RawMatch) -> SyntaxResult<Vec<ExtractedSpan>> + Send + Sync>;
type GuardFn = Arc<dyn Fn(&str, &RawMatch) -> SyntaxResult<bool> + Send + Sync>;

/// Decomposes one raw match into independently classified sub-spans.
#[derive(Clone)]
pub enum Extractor {
    /// Capture-group template: group *i + 1* takes classification *i*.
    /// Groups that did not participate in the match are skipped.
    Groups(Vec<GroupSpec>),
    /// Free-form decomposition for shapes a template cannot express.
    Custom(ExtractFn),
}

impl Extractor {
    pub fn groups<I>(specs: I) -> Self
    where
        I: IntoIterator<Item = GroupSpec>,
    {
        Extractor::Groups(specs.into_iter().collect())
    }

    pub fn with<F>(f: F) -> Self
    where
        F: Fn(&str, &RawMatch) -> SyntaxResult<Vec<ExtractedSpan>> + Send + Sync + 'static,
    {
        Extractor::Custom(Arc::new(f))
    }

    pub(crate) fn apply(&self, source: &str, raw: &RawMatch) -> SyntaxResult<Vec<ExtractedSpan>> {
        match self {
            Extractor::Groups(specs) => {
                let mut spans = Vec::with_capacity(specs.len());
                for (i, spec) in specs.iter().enumerate() {
                    if let Some((start, end)) = raw.group(i + 1) {
                        spans.push(ExtractedSpan {
                            offset: start,
                            length: end - start,
                            class: spec.class.clone(),
                            allow: spec.allow.clone(),
                        });
                    }
                }
                Ok(spans)
            }
            Extractor::Custom(f) => f(source, raw),
        }
    }

    fn produced_kinds(&self) -> Vec<&str> {
        match self {
            Extractor::Groups(specs) => specs
                .iter()
                .filter_map(|spec| match &spec.class {
                    SpanClass::Kind(kind) => Some(kind.as_str()),
                    SpanClass::Embed(grammar) => Some(grammar.as_str()),
                })
                .collect(),
            Extractor::Custom(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Groups(specs) => f.debug_tuple("Groups").field(specs).finish(),
            Extractor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One pattern-to-classification mapping. See the module docs for the
/// meaning of the optional constraints.
#[derive(Clone)]
pub struct Rule {
    matcher: Regex,
    kind: Option<String>,
    allow: Option<Vec<String>>,
    only: Option<Vec<String>>,
    extract: Option<Extractor>,
    embed: Option<String>,
    guard: Option<GuardFn>,
}

impl Rule {
    /// A rule matching any of the given literal words, all classified the
    /// same way. Equivalent to a word-boundary-delimited alternation of
    /// the escaped literals; longer literals are tried first so that no
    /// word is shadowed by one of its own prefixes.
    pub fn literals<I, S>(words: I, kind: &str) -> SyntaxResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut escaped: Vec<String> = words
            .into_iter()
            .map(|w| regex::escape(w.as_ref()))
            .collect();
        escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let pattern = format!(r"\b(?:{})\b", escaped.join("|"));
        let mut rule = Self::compile(&pattern)?;
        rule.kind = Some(kind.to_string());
        Ok(rule)
    }

    /// A rule matching a free-form pattern with a single classification.
    pub fn pattern(pattern: &str, kind: &str) -> SyntaxResult<Self> {
        let mut rule = Self::compile(pattern)?;
        rule.kind = Some(kind.to_string());
        Ok(rule)
    }

    /// A rule with a pattern but no classification of its own. Useful as
    /// the base for `extract`/`embed` rules, or on its own as a
    /// suppression rule whose matches claim their span without producing
    /// a token.
    pub fn matcher(pattern: &str) -> SyntaxResult<Self> {
        Self::compile(pattern)
    }

    fn compile(pattern: &str) -> SyntaxResult<Self> {
        let matcher = Regex::new(pattern).map_err(|e| SyntaxError::InvalidRule {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        if matcher.find("").is_some() {
            return Err(SyntaxError::InvalidRule {
                pattern: pattern.to_string(),
                message: "pattern matches the empty string".to_string(),
            });
        }
        Ok(Self {
            matcher,
            kind: None,
            allow: None,
            only: None,
            extract: None,
            embed: None,
            guard: None,
        })
    }

    /// Restricts which kinds may nest inside this rule's matches.
    pub fn allow<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts this rule to parents of the given kinds.
    pub fn only<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Delegates matched spans to the named grammar.
    pub fn embed(mut self, grammar: impl Into<String>) -> Self {
        self.embed = Some(grammar.into());
        self
    }

    /// Decomposes matches into sub-spans via the given extractor.
    pub fn extract(mut self, extractor: Extractor) -> Self {
        self.extract = Some(extractor);
        self
    }

    /// Post-match predicate: occurrences for which it returns `false` are
    /// dropped. Errors follow the strict/lenient policy.
    pub fn guard<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &RawMatch) -> SyntaxResult<bool> + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(f));
        self
    }

    pub(crate) fn matcher_regex(&self) -> &Regex {
        &self.matcher
    }

    pub fn kind_name(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn allowed_children(&self) -> Option<&[String]> {
        self.allow.as_deref()
    }

    pub fn embedded_grammar(&self) -> Option<&str> {
        self.embed.as_deref()
    }

    pub(crate) fn extractor(&self) -> Option<&Extractor> {
        self.extract.as_ref()
    }

    /// Whether this rule may contribute candidates under the given parent
    /// context and child-visibility set.
    pub(crate) fn eligible(&self, parent_kind: &str, allow: Option<&[String]>) -> bool {
        if let Some(only) = &self.only {
            if !only.iter().any(|k| k == parent_kind) {
                return false;
            }
        }
        match allow {
            None => true,
            Some(allowed) => {
                let kinds = self.produced_kinds();
                // Rules whose output cannot be determined statically (free
                // extractors, suppression rules) stay eligible.
                kinds.is_empty() || kinds.iter().any(|k| allowed.iter().any(|a| a == k))
            }
        }
    }

    fn produced_kinds(&self) -> Vec<&str> {
        let mut kinds = Vec::new();
        if let Some(kind) = &self.kind {
            kinds.push(kind.as_str());
        }
        if let Some(embed) = &self.embed {
            kinds.push(embed.as_str());
        }
        if let Some(extract) = &self.extract {
            kinds.extend(extract.produced_kinds());
        }
        kinds
    }

    /// Runs the guard for one occurrence. `Ok(true)` keeps the candidate.
    pub(crate) fn check_guard(&self, source: &str, raw: &RawMatch) -> SyntaxResult<bool> {
        match &self.guard {
            Some(guard) => guard(source, raw),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.matcher.as_str())
            .field("kind", &self.kind)
            .field("allow", &self.allow)
            .field("only", &self.only)
            .field("embed", &self.embed)
            .field("extract", &self.extract)
            .field("guard", &self.guard.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw_for(rule: &Rule, text: &str) -> RawMatch {
        let captures = rule.matcher_regex().captures(text).unwrap();
        RawMatch::from_captures(&captures, 0)
    }

    #[test]
    fn test_literals_builds_boundary_aware_alternation() {
        let rule = Rule::literals(["if", "else"], "keyword").unwrap();
        assert!(rule.matcher_regex().is_match("if x"));
        assert!(rule.matcher_regex().is_match("else"));
        // `ifx` is an identifier that happens to start with a keyword
        assert!(!rule.matcher_regex().is_match("ifx"));
    }

    #[test]
    fn test_literals_prefers_longer_words() {
        let rule = Rule::literals(["in", "into"], "keyword").unwrap();
        let m = rule.matcher_regex().find("into the woods").unwrap();
        assert_eq!(m.as_str(), "into");
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = Rule::pattern("(unclosed", "broken").unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidRule { .. }));
    }

    #[test]
    fn test_empty_matching_pattern_is_rejected() {
        let err = Rule::pattern("a*", "letters").unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidRule { .. }));
        let err = Rule::pattern("^", "anchor").unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidRule { .. }));
    }

    #[test]
    fn test_only_gates_on_parent_kind() {
        let rule = Rule::pattern("[a-z]+", "attribute").unwrap().only(["tag"]);
        assert!(rule.eligible("tag", None));
        assert!(!rule.eligible("root", None));
        assert!(!rule.eligible("string", None));
    }

    #[test]
    fn test_allow_gates_on_produced_kinds() {
        let keyword = Rule::literals(["if"], "keyword").unwrap();
        assert!(keyword.eligible("root", Some(&["keyword".to_string()])));
        assert!(!keyword.eligible("root", Some(&["string".to_string()])));

        // An embed rule is admitted when the embedded grammar is allowed.
        let script = Rule::matcher("<script>").unwrap().embed("javascript");
        assert!(script.eligible("root", Some(&["javascript".to_string()])));
        assert!(!script.eligible("root", Some(&["css".to_string()])));
    }

    #[test]
    fn test_group_extractor_skips_missing_groups() {
        let rule = Rule::matcher(r"([a-z]+)(?:=([0-9]+))?")
            .unwrap()
            .extract(Extractor::groups([
                GroupSpec::kind("attribute"),
                GroupSpec::kind("number"),
            ]));

        let raw = raw_for(&rule, "width=42");
        let spans = rule.extractor().unwrap().apply("width=42", &raw).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].class, SpanClass::Kind("attribute".to_string()));
        assert_eq!((spans[0].offset, spans[0].length), (0, 5));
        assert_eq!((spans[1].offset, spans[1].length), (6, 2));

        let raw = raw_for(&rule, "disabled");
        let spans = rule.extractor().unwrap().apply("disabled", &raw).unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_guard_filters_occurrences() {
        // Accept a slash-delimited pattern only when it follows `=`,
        // the post-match replacement for a lookbehind.
        let rule = Rule::pattern("/[a-z]+/", "regexp")
            .unwrap()
            .guard(|source, raw| {
                let before = source[..raw.start()].trim_end();
                Ok(before.ends_with('='))
            });

        let matched = raw_for(&rule, "x = /test/");
        assert!(rule.check_guard("x = /test/", &matched).unwrap());

        let divided = raw_for(&rule, "a /b/ c");
        assert!(!rule.check_guard("a /b/ c", &divided).unwrap());
    }

    #[test]
    fn test_raw_match_exposes_group_spans() {
        let rule = Rule::matcher(r"(<)([a-z]+)(>)").unwrap();
        let captures = rule.matcher_regex().captures("see <div> here").unwrap();
        let raw = RawMatch::from_captures(&captures, 100);
        assert_eq!(raw.start(), 104);
        assert_eq!(raw.end(), 109);
        assert_eq!(raw.group(2), Some((105, 108)));
        assert_eq!(raw.group(7), None);
    }
}
