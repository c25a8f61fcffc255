use chromatic::{Grammar, Options, Registry, Rule, SyntaxError};
use pretty_assertions::assert_eq;

fn failing_rule() -> Rule {
    Rule::pattern("x+", "broken")
        .unwrap()
        .guard(|_, _| Err(SyntaxError::internal("boom")))
}

#[tokio::test]
async fn test_strict_mode_surfaces_rule_failures() {
    let syntax = Registry::with_options(Options::strict());
    let mut grammar = Grammar::new("dummy");
    grammar.push(failing_rule());
    syntax.register("dummy", grammar).await.unwrap();

    let err = syntax.tokenize("dummy", "xxx").await.unwrap_err();
    match err {
        SyntaxError::RuleApply { grammar, rule, .. } => {
            assert_eq!(grammar, "dummy");
            assert_eq!(rule, 0);
        }
        other => panic!("expected RuleApply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lenient_mode_skips_the_failing_rule() {
    let syntax = Registry::new();
    let mut grammar = Grammar::new("dummy");
    grammar.push(failing_rule());
    syntax.register("dummy", grammar).await.unwrap();

    let root = syntax.tokenize("dummy", "xxx").await.unwrap();
    assert_eq!(root.children().len(), 0);
}

#[tokio::test]
async fn test_lenient_mode_keeps_tokens_from_healthy_rules() {
    let syntax = Registry::new();
    let mut grammar = Grammar::new("dummy");
    grammar.push(failing_rule());
    grammar.push(Rule::pattern("x+", "letters").unwrap());
    grammar.push(Rule::pattern("[0-9]+", "digits").unwrap());
    syntax.register("dummy", grammar).await.unwrap();

    // matched by the failing rule and both healthy rules
    let root = syntax.tokenize("dummy", "xxx 42").await.unwrap();
    let kinds: Vec<&str> = root.children().iter().map(|t| t.kind()).collect();
    assert_eq!(kinds, vec!["letters", "digits"]);
}

#[tokio::test]
async fn test_strict_mode_surfaces_missing_embedded_language() {
    let syntax = Registry::with_options(Options::strict());
    let mut grammar = Grammar::new("dummy");
    grammar.push(Rule::matcher("x+").unwrap().embed("no-such-language"));
    syntax.register("dummy", grammar).await.unwrap();

    let err = syntax.tokenize("dummy", "xxx").await.unwrap_err();
    match err {
        SyntaxError::LanguageNotFound { name } => assert_eq!(name, "no-such-language"),
        other => panic!("expected LanguageNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lenient_mode_leaves_unresolvable_embed_unexpanded() {
    let syntax = Registry::new();
    let mut grammar = Grammar::new("dummy");
    grammar.push(Rule::matcher("x+").unwrap().embed("no-such-language"));
    syntax.register("dummy", grammar).await.unwrap();

    let root = syntax.tokenize("dummy", "xxx").await.unwrap();
    // the host token survives, its span simply has no embedded children
    assert_eq!(root.children().len(), 1);
    assert_eq!(root.children()[0].kind(), "no-such-language");
    assert!(root.children()[0].children().is_empty());
}

#[tokio::test]
async fn test_failing_extractor_follows_the_mode() {
    let extractor_rule = || {
        Rule::matcher("x+")
            .unwrap()
            .extract(chromatic::Extractor::with(|_, _| {
                Err(SyntaxError::internal("no spans today"))
            }))
    };

    let strict = Registry::with_options(Options::strict());
    let mut grammar = Grammar::new("dummy");
    grammar.push(extractor_rule());
    strict.register("dummy", grammar).await.unwrap();
    assert!(matches!(
        strict.tokenize("dummy", "xxx").await,
        Err(SyntaxError::RuleApply { .. })
    ));

    let lenient = Registry::new();
    let mut grammar = Grammar::new("dummy");
    grammar.push(extractor_rule());
    grammar.push(Rule::pattern("[0-9]+", "digits").unwrap());
    lenient.register("dummy", grammar).await.unwrap();
    let root = lenient.tokenize("dummy", "xxx 1").await.unwrap();
    let kinds: Vec<&str> = root.children().iter().map(|t| t.kind()).collect();
    assert_eq!(kinds, vec!["digits"]);
}

#[tokio::test]
async fn test_top_level_missing_language_propagates_in_lenient_mode_too() {
    let syntax = Registry::new();
    let err = syntax.tokenize("never-registered", "text").await.unwrap_err();
    assert!(matches!(err, SyntaxError::LanguageNotFound { .. }));
}
