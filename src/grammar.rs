//! Grammar: an ordered rule set and the tree-building algorithm.
//!
//! Tokenization runs in two phases over each span. First every eligible
//! rule scans the span independently, left to right, recording each
//! occurrence as a candidate tagged with the rule's priority (declaration
//! order, own rules before derived rules). Then the candidates are merged
//! by ascending start offset: where two candidates overlap, the one from
//! the higher-priority rule wins outright and the loser is discarded
//! whole, never trimmed. Collecting everything before resolving is what
//! lets a low-priority catch-all coexist with structural rules without
//! pre-empting them.
//!
//! Each winning match then becomes a token and its interior is tokenized
//! recursively, with the match's kind as the new parent context. Text not
//! covered by any winner stays a gap between siblings. Matches may instead
//! delegate their span to another grammar (`embed`) or decompose into
//! template sub-spans (`extract`).
//!
//! Grammars compose two ways: `derive_from` appends a base grammar's rules
//! after this grammar's own at rule-list computation time, and
//! `depends_on` asks the registry to ensure companion grammars are
//! registered alongside this one. Both reference grammars by name only,
//! resolved lazily through the registry, so registration order and cycles
//! between files never matter.

use std::ops::Range;
use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::warn;

use crate::config::ErrorMode;
use crate::error::{SyntaxError, SyntaxResult};
use crate::registry::Registry;
use crate::rule::{ExtractedSpan, RawMatch, Rule, SpanClass};
use crate::token::{Token, ROOT_KIND};

/// A named, ordered rule set for one language or dialect.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    name: String,
    rules: Vec<Arc<Rule>>,
    derives: Option<String>,
    dependencies: Vec<String>,
}

/// One provisional match recorded during the scan phase.
struct Candidate {
    start: usize,
    end: usize,
    priority: usize,
    rule: Arc<Rule>,
    grammar: String,
    raw: RawMatch,
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a rule. Order is priority: earlier rules shadow later ones
    /// over the full span of any overlapping match.
    pub fn push(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Falls back to the named grammar's rules after this grammar's own.
    pub fn derive_from(&mut self, base: impl Into<String>) -> &mut Self {
        self.derives = Some(base.into());
        self
    }

    /// Declares that registering this grammar must also ensure the named
    /// grammar is registered.
    pub fn depends_on(&mut self, name: impl Into<String>) -> &mut Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn derives(&self) -> Option<&str> {
        self.derives.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Tokenizes `text` into a tree rooted at a synthetic `root` token
    /// spanning the whole input.
    #[tracing::instrument(level = "debug", skip(self, syntax, text), fields(grammar = %self.name))]
    pub async fn build_tree(&self, syntax: &Registry, text: &str) -> SyntaxResult<Token> {
        let children = self
            .tokenize_span(syntax, text, 0..text.len(), ROOT_KIND, None, true)
            .await?;
        Ok(Token::new(0, text.len(), ROOT_KIND, text, children))
    }

    /// Tokenizes `text` and returns the top-level matches.
    pub async fn matches(&self, syntax: &Registry, text: &str) -> SyntaxResult<Vec<Token>> {
        Ok(self.build_tree(syntax, text).await?.into_children())
    }

    /// The scan-merge-recurse cycle over one span. `outermost` is true for
    /// the whole-input call and for embedded delegation; in every other
    /// call a candidate covering the entire span is discarded, which keeps
    /// children strictly smaller than their parents and bounds the
    /// recursion.
    #[async_recursion]
    pub(crate) async fn tokenize_span(
        &self,
        syntax: &Registry,
        text: &str,
        span: Range<usize>,
        parent_kind: &str,
        allow: Option<&[String]>,
        outermost: bool,
    ) -> SyntaxResult<Vec<Token>> {
        let mode = syntax.options().mode;
        let eligible = self.effective_rules(syntax, parent_kind, allow).await?;

        let mut candidates = Vec::new();
        for (priority, (rule, grammar)) in eligible.iter().enumerate() {
            self.scan_rule(text, &span, priority, rule, grammar, mode, &mut candidates)?;
        }
        if !outermost {
            candidates.retain(|c| !(c.start == span.start && c.end == span.end));
        }

        let winners = select_winners(candidates);

        let mut tokens = Vec::new();
        for winner in &winners {
            tokens.extend(self.realize(syntax, text, winner, mode).await?);
        }
        Ok(tokens)
    }

    /// The rule list in effect for one context: own rules first, then the
    /// derivation chain's, each filtered by `only` and the parent's
    /// child-visibility set.
    async fn effective_rules(
        &self,
        syntax: &Registry,
        parent_kind: &str,
        allow: Option<&[String]>,
    ) -> SyntaxResult<Vec<(Arc<Rule>, String)>> {
        let mut rules = Vec::new();
        collect_eligible(&mut rules, self, parent_kind, allow);

        let mut next = self.derives.clone();
        let mut depth = 0;
        while let Some(base_name) = next {
            depth += 1;
            if depth > syntax.options().chain_depth_limit {
                return Err(SyntaxError::internal(format!(
                    "derivation chain through {} exceeds the depth limit",
                    base_name
                )));
            }
            let base = syntax.resolve(&base_name).await?;
            collect_eligible(&mut rules, &base, parent_kind, allow);
            next = base.derives().map(str::to_string);
        }
        Ok(rules)
    }

    /// Scans one rule over the span, appending every guarded occurrence.
    fn scan_rule(
        &self,
        text: &str,
        span: &Range<usize>,
        priority: usize,
        rule: &Arc<Rule>,
        grammar: &str,
        mode: ErrorMode,
        out: &mut Vec<Candidate>,
    ) -> SyntaxResult<()> {
        let slice = &text[span.clone()];
        for captures in rule.matcher_regex().captures_iter(slice) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            // zero-width occurrences are rejected at rule construction;
            // this is the runtime backstop
            if whole.start() == whole.end() {
                continue;
            }
            let raw = RawMatch::from_captures(&captures, span.start);
            match rule.check_guard(text, &raw) {
                Ok(true) => out.push(Candidate {
                    start: raw.start(),
                    end: raw.end(),
                    priority,
                    rule: rule.clone(),
                    grammar: grammar.to_string(),
                    raw,
                }),
                Ok(false) => {}
                Err(cause) => {
                    let err = SyntaxError::RuleApply {
                        grammar: grammar.to_string(),
                        rule: priority,
                        message: cause.to_string(),
                    };
                    if mode == ErrorMode::Strict {
                        return Err(err);
                    }
                    warn!(error = %err, "rule guard failed, skipping occurrence");
                }
            }
        }
        Ok(())
    }

    /// Turns one winning candidate into its tokens: a host token with a
    /// recursively tokenized interior, an embedded-grammar delegation, or
    /// the expansion of an extractor template. Suppression rules (no kind,
    /// no extractor, no embed) claim their span and produce nothing.
    async fn realize(
        &self,
        syntax: &Registry,
        text: &str,
        winner: &Candidate,
        mode: ErrorMode,
    ) -> SyntaxResult<Vec<Token>> {
        let rule = &winner.rule;
        let length = winner.end - winner.start;
        let value = winner.raw.text(text);

        if let Some(extractor) = rule.extractor() {
            let spans = match extractor.apply(text, &winner.raw) {
                Ok(spans) => spans,
                Err(cause) => {
                    let err = SyntaxError::RuleApply {
                        grammar: winner.grammar.clone(),
                        rule: winner.priority,
                        message: cause.to_string(),
                    };
                    if mode == ErrorMode::Strict {
                        return Err(err);
                    }
                    warn!(error = %err, "extractor failed, skipping match");
                    return Ok(Vec::new());
                }
            };
            let spans = self.validate_spans(spans, winner, mode)?;
            let mut nodes = Vec::new();
            for node in assemble_forest(spans) {
                nodes.push(self.realize_extracted(syntax, text, node, mode).await?);
            }
            return Ok(match rule.kind_name() {
                Some(kind) => vec![Token::new(winner.start, length, kind, value, nodes)],
                None => nodes,
            });
        }

        if let Some(embed) = rule.embedded_grammar() {
            let kind = rule.kind_name().unwrap_or(embed);
            return match syntax.resolve(embed).await {
                Ok(embedded) => {
                    let children = embedded
                        .tokenize_span(
                            syntax,
                            text,
                            winner.start..winner.end,
                            ROOT_KIND,
                            None,
                            true,
                        )
                        .await?;
                    Ok(vec![Token::new(winner.start, length, kind, value, children)])
                }
                Err(err) => {
                    if mode == ErrorMode::Strict {
                        return Err(err);
                    }
                    warn!(error = %err, grammar = embed, "embedded grammar unavailable");
                    Ok(vec![Token::new(winner.start, length, kind, value, Vec::new())])
                }
            };
        }

        match rule.kind_name() {
            Some(kind) => {
                let children = self
                    .tokenize_span(
                        syntax,
                        text,
                        winner.start..winner.end,
                        kind,
                        rule.allowed_children(),
                        false,
                    )
                    .await?;
                Ok(vec![Token::new(winner.start, length, kind, value, children)])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Drops (lenient) or rejects (strict) extracted spans that escape
    /// their match or have zero width; both would break the containment
    /// invariant of the resulting tree.
    fn validate_spans(
        &self,
        spans: Vec<ExtractedSpan>,
        winner: &Candidate,
        mode: ErrorMode,
    ) -> SyntaxResult<Vec<ExtractedSpan>> {
        let mut valid = Vec::with_capacity(spans.len());
        for span in spans {
            let contained = span.offset >= winner.start
                && span.end_offset() <= winner.end
                && span.length > 0;
            if contained {
                valid.push(span);
                continue;
            }
            let err = SyntaxError::RuleApply {
                grammar: winner.grammar.clone(),
                rule: winner.priority,
                message: format!(
                    "extracted span {}..{} escapes match {}..{}",
                    span.offset,
                    span.end_offset(),
                    winner.start,
                    winner.end
                ),
            };
            if mode == ErrorMode::Strict {
                return Err(err);
            }
            warn!(error = %err, "dropping extracted span");
        }
        Ok(valid)
    }

    /// Builds the token for one extracted span. Embedded spans delegate to
    /// the named grammar; template spans with explicit nested spans take
    /// those as children verbatim; leaf template spans get a recursively
    /// tokenized interior like any other match.
    #[async_recursion]
    async fn realize_extracted(
        &self,
        syntax: &Registry,
        text: &str,
        node: SpanNode,
        mode: ErrorMode,
    ) -> SyntaxResult<Token> {
        let span = node.span;
        let value = &text[span.offset..span.end_offset()];
        match span.class {
            SpanClass::Embed(grammar_name) => match syntax.resolve(&grammar_name).await {
                Ok(embedded) => {
                    let children = embedded
                        .tokenize_span(
                            syntax,
                            text,
                            span.offset..span.offset + span.length,
                            ROOT_KIND,
                            None,
                            true,
                        )
                        .await?;
                    Ok(Token::new(
                        span.offset,
                        span.length,
                        grammar_name,
                        value,
                        children,
                    ))
                }
                Err(err) => {
                    if mode == ErrorMode::Strict {
                        return Err(err);
                    }
                    warn!(error = %err, grammar = %grammar_name, "embedded grammar unavailable");
                    Ok(Token::new(
                        span.offset,
                        span.length,
                        grammar_name,
                        value,
                        Vec::new(),
                    ))
                }
            },
            SpanClass::Kind(kind) => {
                let children = if node.children.is_empty() {
                    self.tokenize_span(
                        syntax,
                        text,
                        span.offset..span.offset + span.length,
                        &kind,
                        span.allow.as_deref(),
                        false,
                    )
                    .await?
                } else {
                    let mut children = Vec::with_capacity(node.children.len());
                    for child in node.children {
                        children.push(self.realize_extracted(syntax, text, child, mode).await?);
                    }
                    children
                };
                Ok(Token::new(span.offset, span.length, kind, value, children))
            }
        }
    }
}

fn collect_eligible(
    dst: &mut Vec<(Arc<Rule>, String)>,
    grammar: &Grammar,
    parent_kind: &str,
    allow: Option<&[String]>,
) {
    for rule in &grammar.rules {
        if rule.eligible(parent_kind, allow) {
            dst.push((rule.clone(), grammar.name.clone()));
        }
    }
}

/// Merges provisional matches into a non-overlapping winner list.
///
/// Candidates are ordered by ascending start, then ascending priority
/// index, then descending length, and swept left to right. An overlap is
/// resolved for the lower priority index; at equal priority the longer
/// match wins, and remaining ties go to the match already in place (the
/// earlier-registered rule). Losers are discarded whole.
fn select_winners(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
    });

    let mut winners: Vec<Candidate> = Vec::new();
    'candidates: for candidate in candidates {
        while let Some(last) = winners.last() {
            if last.end <= candidate.start {
                break;
            }
            let candidate_wins = candidate.priority < last.priority
                || (candidate.priority == last.priority
                    && candidate.end - candidate.start > last.end - last.start);
            if candidate_wins {
                winners.pop();
            } else {
                continue 'candidates;
            }
        }
        winners.push(candidate);
    }
    winners
}

/// An extracted span with the spans it textually contains, so a template
/// like `(outer (head) (body) (tail))` nests groups 2..4 inside group 1.
struct SpanNode {
    span: ExtractedSpan,
    children: Vec<SpanNode>,
}

/// Reconstructs nesting among extracted spans by containment. Spans that
/// overlap without containment would corrupt the tree and are dropped.
fn assemble_forest(mut spans: Vec<ExtractedSpan>) -> Vec<SpanNode> {
    spans.sort_by(|a, b| {
        a.offset
            .cmp(&b.offset)
            .then_with(|| b.length.cmp(&a.length))
    });

    let mut roots: Vec<SpanNode> = Vec::new();
    let mut stack: Vec<SpanNode> = Vec::new();

    fn attach(stack: &mut Vec<SpanNode>, roots: &mut Vec<SpanNode>, done: SpanNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }

    for span in spans {
        while let Some(top) = stack.last() {
            if span.offset >= top.span.end_offset() {
                let done = stack.pop().expect("stack is non-empty");
                attach(&mut stack, &mut roots, done);
            } else {
                break;
            }
        }
        let overlaps_top = stack
            .last()
            .is_some_and(|top| span.end_offset() > top.span.end_offset());
        if overlaps_top {
            warn!(
                start = span.offset,
                end = span.end_offset(),
                "extracted span overlaps a sibling without containment, dropping"
            );
        } else {
            stack.push(SpanNode {
                span,
                children: Vec::new(),
            });
        }
    }
    while let Some(done) = stack.pop() {
        attach(&mut stack, &mut roots, done);
    }
    roots
}
