//! Error taxonomy for grammar resolution and tokenization.
//!
//! The variants distinguish the failure classes callers react to
//! differently: a name with no registration and no loader
//! ([`SyntaxError::LanguageNotFound`]), a rule whose guard or extractor
//! failed during evaluation ([`SyntaxError::RuleApply`]), and a loader that
//! could not produce a grammar ([`SyntaxError::GrammarLoad`]).
//!
//! The enum is `Clone`: a single failed load is delivered to every caller
//! waiting on the same in-flight resolution.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// The requested grammar has neither a registration nor a loader.
    #[error("language not found: {name}")]
    LanguageNotFound { name: String },

    /// A rule's guard or extractor failed while evaluating a match.
    #[error("rule {rule} of grammar {grammar} failed to apply: {message}")]
    RuleApply {
        grammar: String,
        rule: usize,
        message: String,
    },

    /// A registered loader failed to produce its grammar. Never cached:
    /// a later resolve for the same name invokes the loader again.
    #[error("failed to load grammar {name}: {message}")]
    GrammarLoad { name: String, message: String },

    /// A rule was rejected at construction time, either because its
    /// pattern does not compile or because it can match the empty string.
    #[error("invalid rule pattern {pattern:?}: {message}")]
    InvalidRule { pattern: String, message: String },

    /// A stylesheet fetch failed. Constructed by rendering collaborators
    /// keyed on the grammar's canonical name; the tokenizer itself never
    /// raises this.
    #[error("failed to load stylesheet {url}: status {status}")]
    StyleSheetLoad { url: String, status: u16 },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

impl SyntaxError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        SyntaxError::Internal(message.into())
    }
}
