//! # Chromatic: grammar-driven tokenization for syntax highlighting
//!
//! Chromatic turns source text into a hierarchical tree of classified
//! spans, driven by pluggable per-language grammars. It is the tokenizing
//! core of a highlighting pipeline: renderers consume the token tree and
//! map each span's kind to a visual treatment, but no rendering happens
//! here.
//!
//! ## Processing Pipeline
//!
//! ```text
//! grammar name → Registry (resolve/load) → Grammar (scan, merge, recurse) → Token tree
//! ```
//!
//! 1. **Resolution**: the [`registry`] resolves names and aliases to
//!    grammars, invoking registered loaders on demand. Concurrent
//!    requests for the same unloaded grammar collapse into a single load.
//! 2. **Scanning**: every eligible [`rule`](rule::Rule) of the
//!    [`grammar`](grammar::Grammar) scans the text for candidate matches.
//! 3. **Merging**: overlapping candidates are resolved by rule priority;
//!    losers are discarded whole, never trimmed.
//! 4. **Recursion**: each winning match is tokenized again in its own
//!    context, producing nested [`token`](token::Token)s. Rules may
//!    delegate their span to another grammar entirely, so a markup
//!    grammar can hand a script block to a script grammar by name.
//!
//! ## Composition
//!
//! Grammars compose by **derivation** (fall back to a base grammar's
//! rules), **embedding** (delegate one matched span to another grammar),
//! and **dependencies** (registering one grammar ensures its companions
//! are registered). All composition is by name, resolved lazily through
//! the registry, so grammar modules never import each other.
//!
//! ## Error Handling
//!
//! The [`error`] module distinguishes missing languages, failing rules,
//! and failing loaders. The registry's [`config::ErrorMode`] chooses
//! between strict evaluation (a failing rule aborts tokenization) and the
//! default lenient posture (the failure is logged and the rule skipped),
//! which suits best-effort highlighting of arbitrary text.
//!
//! ## Usage Example
//!
//! ```rust
//! use chromatic::{Grammar, Registry, Rule};
//!
//! async fn highlight() -> chromatic::SyntaxResult<()> {
//!     let syntax = Registry::new();
//!
//!     let mut toy = Grammar::new("toy");
//!     toy.push(Rule::literals(["if", "else"], "keyword")?);
//!     toy.push(Rule::pattern("[a-z]+", "identifier")?);
//!     syntax.register("toy", toy).await?;
//!
//!     let tree = syntax.tokenize("toy", "if x").await?;
//!     assert_eq!(tree.children()[0].kind(), "keyword");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod grammar;
pub mod registry;
pub mod rule;
pub mod token;

// Re-exports
pub use config::{ErrorMode, Options};
pub use error::{SyntaxError, SyntaxResult};
pub use grammar::Grammar;
pub use registry::{default_registry, loader_fn, GrammarLoader, Registry};
pub use rule::{ExtractedSpan, Extractor, GroupSpec, RawMatch, Rule, SpanClass};
pub use token::{Token, ROOT_KIND};
