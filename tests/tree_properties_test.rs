//! Structural invariants of the token tree, checked over arbitrary input.

use chromatic::{Grammar, Registry, Rule, Token};
use proptest::prelude::*;

fn fixture() -> (Registry, Grammar) {
    let syntax = Registry::new();
    let mut grammar = Grammar::new("toy");
    grammar.push(Rule::pattern(r#""(?:[^"\\\n]|\\.)*""#, "string").unwrap());
    grammar.push(Rule::pattern(r"\\.", "escape").unwrap().only(["string"]));
    grammar.push(Rule::literals(["if", "else", "while", "class"], "keyword").unwrap());
    grammar.push(Rule::pattern(r"\b[0-9]+\b", "constant").unwrap());
    grammar.push(Rule::pattern("[a-z]+", "identifier").unwrap());
    (syntax, grammar)
}

fn tokenize(text: &str) -> Token {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let (syntax, grammar) = fixture();
        grammar.build_tree(&syntax, text).await.expect("tokenize")
    })
}

/// Containment, sibling ordering and non-overlap, and value consistency,
/// checked over the whole tree.
fn check_structure(token: &Token, text: &str) {
    assert_eq!(
        token.value(),
        &text[token.offset()..token.end_offset()],
        "value must mirror the covered slice"
    );
    let mut last_end = token.offset();
    for child in token.children() {
        assert!(
            child.offset() >= last_end,
            "siblings must be ordered without overlap"
        );
        assert!(
            child.end_offset() <= token.end_offset(),
            "child must stay inside its parent"
        );
        last_end = child.end_offset();
        check_structure(child, text);
    }
}

proptest! {
    #[test]
    fn prop_tree_is_well_formed(text in r#"[a-z0-9 "\\.]{0,60}"#) {
        let root = tokenize(&text);
        prop_assert_eq!(root.offset(), 0);
        prop_assert_eq!(root.end_offset(), text.len());
        check_structure(&root, &text);
    }

    #[test]
    fn prop_tokenization_is_deterministic(text in r#"[a-z0-9 "\\.]{0,60}"#) {
        let first = tokenize(&text);
        let second = tokenize(&text);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_keywords_never_split(text in "(if|else|while|class| |x|1){0,20}") {
        let root = tokenize(&text);
        // a keyword token always covers a whole word
        for token in root.flatten() {
            if token.kind() == "keyword" {
                prop_assert!(["if", "else", "while", "class"].contains(&token.value()));
            }
        }
    }
}
