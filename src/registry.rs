//! The grammar catalog: name and alias resolution, registration, and
//! on-demand loading with in-flight deduplication.
//!
//! A registry maps canonical grammar names to resolved grammars, aliases,
//! or loaders. Resolution is the only asynchronous boundary in the
//! system: a loader may fetch its grammar definition from anywhere, so
//! concurrent requests for the same unresolved name are collapsed into a
//! single shared load, and every waiter observes the same grammar or the
//! same failure. Failed loads are never cached; the next request runs the
//! loader again.
//!
//! Registries are cheap handles over shared state (`Clone` shares the
//! catalog). A process typically keeps one long-lived instance via
//! [`default_registry`], while tests construct isolated instances so that
//! registrations never leak between them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_recursion::async_recursion;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use lazy_static::lazy_static;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Options;
use crate::error::{SyntaxError, SyntaxResult};
use crate::grammar::Grammar;
use crate::token::Token;

/// Produces a grammar on demand, e.g. by fetching and parsing an external
/// definition. Loaders receive a registry handle so they can register
/// aliases or companion grammars as a side effect.
#[async_trait]
pub trait GrammarLoader: Send + Sync {
    async fn load(&self, syntax: &Registry) -> SyntaxResult<Grammar>;
}

struct FnLoader<F>(F);

#[async_trait]
impl<F, Fut> GrammarLoader for FnLoader<F>
where
    F: Fn(Registry) -> Fut + Send + Sync,
    Fut: Future<Output = SyntaxResult<Grammar>> + Send,
{
    async fn load(&self, syntax: &Registry) -> SyntaxResult<Grammar> {
        (self.0)(syntax.clone()).await
    }
}

/// Adapts an async closure into a [`GrammarLoader`].
pub fn loader_fn<F, Fut>(f: F) -> Arc<dyn GrammarLoader>
where
    F: Fn(Registry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyntaxResult<Grammar>> + Send + 'static,
{
    Arc::new(FnLoader(f))
}

enum Entry {
    Grammar(Arc<Grammar>),
    Alias(String),
}

type BoxedLoad = Pin<Box<dyn Future<Output = SyntaxResult<Arc<Grammar>>> + Send>>;
type SharedLoad = Shared<BoxedLoad>;

/// Catalog of grammars, aliases and loaders.
pub struct Registry {
    entries: Arc<DashMap<String, Entry>>,
    loaders: Arc<DashMap<String, Arc<dyn GrammarLoader>>>,
    pending: Arc<Mutex<HashMap<String, SharedLoad>>>,
    options: Arc<Options>,
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            loaders: self.loaders.clone(),
            pending: self.pending.clone(),
            options: self.options.clone(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: Registry = Registry::new();
}

/// The process-wide shared registry. Construct-once, read-mostly after
/// warm-up; tests should prefer their own isolated instances.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

impl Registry {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            loaders: Arc::new(DashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Installs a resolved grammar under `name` and ensures every grammar
    /// it declares a dependency on is registered as well. Already
    /// registered dependencies are left untouched; missing ones are
    /// loaded, and a dependency with neither a registration nor a loader
    /// fails the whole registration.
    #[tracing::instrument(level = "debug", skip(self, grammar))]
    pub async fn register(&self, name: &str, grammar: Grammar) -> SyntaxResult<()> {
        self.install(name, grammar).await?;
        Ok(())
    }

    #[async_recursion]
    async fn install(&self, name: &str, grammar: Grammar) -> SyntaxResult<Arc<Grammar>> {
        let dependencies = grammar.dependencies().to_vec();
        let grammar = Arc::new(grammar);
        self.entries
            .insert(name.to_string(), Entry::Grammar(grammar.clone()));
        debug!(name, "registered grammar");
        for dependency in dependencies {
            if !self.has(&dependency) {
                self.resolve(&dependency).await?;
            }
        }
        Ok(grammar)
    }

    /// Installs a loader invoked the first time `name` is resolved.
    pub fn register_loader(&self, name: &str, loader: Arc<dyn GrammarLoader>) {
        self.loaders.insert(name.to_string(), loader);
    }

    /// Points each alternative name at `name`. Chains are followed
    /// transitively on lookup; a cycle is a registration bug and panics
    /// as soon as it is introduced.
    pub fn alias<I, S>(&self, name: &str, alternatives: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alternative in alternatives {
            let alternative = alternative.into();
            self.entries
                .insert(alternative.clone(), Entry::Alias(name.to_string()));
            self.canonical(&alternative);
        }
    }

    /// Follows alias pointers to the terminal name. Panics if the chain
    /// exceeds the configured depth bound, which can only mean a cycle.
    fn canonical(&self, name: &str) -> String {
        let mut current = name.to_string();
        let mut depth = 0;
        loop {
            let target = match self.entries.get(&current) {
                Some(entry) => match entry.value() {
                    Entry::Alias(target) => target.clone(),
                    Entry::Grammar(_) => return current,
                },
                None => return current,
            };
            depth += 1;
            if depth > self.options.chain_depth_limit {
                panic!("alias chain starting at {name:?} exceeds the depth bound: alias cycle");
            }
            current = target;
        }
    }

    /// Non-blocking membership check: true only for names that resolve to
    /// an already-loaded grammar, not for merely loadable ones.
    pub fn has(&self, name: &str) -> bool {
        let canonical = self.canonical(name);
        matches!(
            self.entries.get(&canonical).as_deref(),
            Some(Entry::Grammar(_))
        )
    }

    fn lookup(&self, canonical: &str) -> Option<Arc<Grammar>> {
        match self.entries.get(canonical).as_deref() {
            Some(Entry::Grammar(grammar)) => Some(grammar.clone()),
            _ => None,
        }
    }

    /// Resolves a name or alias to its grammar, invoking the registered
    /// loader if the grammar is not resident yet. Concurrent calls for
    /// the same canonical name share one loader invocation and one
    /// outcome. With no registration and no loader this fails with
    /// [`SyntaxError::LanguageNotFound`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, name: &str) -> SyntaxResult<Arc<Grammar>> {
        let canonical = self.canonical(name);
        if let Some(grammar) = self.lookup(&canonical) {
            return Ok(grammar);
        }

        let load = {
            let mut pending = self.pending.lock().await;
            // the winner of a racing load may have installed it already
            if let Some(grammar) = self.lookup(&canonical) {
                return Ok(grammar);
            }
            match pending.get(&canonical) {
                Some(load) => load.clone(),
                None => {
                    let Some(loader) = self.loaders.get(&canonical).map(|l| l.value().clone())
                    else {
                        return Err(SyntaxError::LanguageNotFound {
                            name: name.to_string(),
                        });
                    };
                    let registry = self.clone();
                    let key = canonical.clone();
                    let load: SharedLoad = async move {
                        let outcome = match loader.load(&registry).await {
                            Ok(grammar) => registry.install(&key, grammar).await,
                            Err(cause) => Err(SyntaxError::GrammarLoad {
                                name: key.clone(),
                                message: cause.to_string(),
                            }),
                        };
                        // evict before completing so a failure can retry
                        registry.pending.lock().await.remove(&key);
                        outcome
                    }
                    .boxed()
                    .shared();
                    pending.insert(canonical.clone(), load.clone());
                    load
                }
            }
        };
        load.await
    }

    /// Tokenizes `text` with the named grammar, resolving it (and any
    /// grammars it derives from or embeds) on demand.
    #[tracing::instrument(level = "debug", skip(self, text))]
    pub async fn tokenize(&self, name: &str, text: &str) -> SyntaxResult<Token> {
        let grammar = self.resolve(name).await?;
        grammar.build_tree(self, text).await
    }

    /// Pre-order flattening of the tree `tokenize` would return, for
    /// callers that consume a match list instead of a tree.
    pub async fn flatten_to_matches(&self, name: &str, text: &str) -> SyntaxResult<Vec<Token>> {
        Ok(self.tokenize(name, text).await?.flatten())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::rule::Rule;

    use super::*;

    fn toy_grammar(name: &str) -> Grammar {
        let mut grammar = Grammar::new(name);
        grammar.push(Rule::pattern("[0-9]+", "digit").unwrap());
        grammar
    }

    #[tokio::test]
    async fn test_register_then_resolve() {
        let syntax = Registry::new();
        syntax.register("toy", toy_grammar("toy")).await.unwrap();

        let grammar = syntax.resolve("toy").await.unwrap();
        assert_eq!(grammar.name(), "toy");
        assert!(syntax.has("toy"));
    }

    #[tokio::test]
    async fn test_aliases_resolve_to_the_same_grammar() {
        let syntax = Registry::new();
        syntax
            .register("javascript", toy_grammar("javascript"))
            .await
            .unwrap();
        syntax.alias("javascript", ["js", "jsx"]);

        let direct = syntax.resolve("javascript").await.unwrap();
        let via_alias = syntax.resolve("js").await.unwrap();
        assert!(Arc::ptr_eq(&direct, &via_alias));
        assert!(syntax.has("jsx"));
    }

    #[tokio::test]
    async fn test_alias_chains_are_transitive() {
        let syntax = Registry::new();
        syntax.register("ecmascript", toy_grammar("ecmascript")).await.unwrap();
        syntax.alias("ecmascript", ["javascript"]);
        syntax.alias("javascript", ["js"]);

        let grammar = syntax.resolve("js").await.unwrap();
        assert_eq!(grammar.name(), "ecmascript");
    }

    #[tokio::test]
    async fn test_has_is_false_for_loadable_but_unresolved() {
        let syntax = Registry::new();
        syntax.register_loader(
            "lazy",
            loader_fn(|_| async { Ok(toy_grammar("lazy")) }),
        );
        assert!(!syntax.has("lazy"));

        syntax.resolve("lazy").await.unwrap();
        assert!(syntax.has("lazy"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_name_fails() {
        let syntax = Registry::new();
        let err = syntax.resolve("missing").await.unwrap_err();
        assert_eq!(
            err,
            SyntaxError::LanguageNotFound {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    #[should_panic(expected = "alias cycle")]
    fn test_alias_cycles_fail_fast() {
        let syntax = Registry::new();
        syntax.alias("a", ["b"]);
        syntax.alias("b", ["a"]);
    }

    #[tokio::test]
    async fn test_separate_instances_do_not_share_state() {
        let a = Registry::new();
        let b = Registry::new();
        a.register("toy", toy_grammar("toy")).await.unwrap();
        assert!(a.has("toy"));
        assert!(!b.has("toy"));
    }
}
