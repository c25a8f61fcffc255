//! Stock rules shared by many grammars: comment shapes, string literals,
//! numbers, URLs, and common type-name conventions.
//!
//! Grammar modules compose these instead of repeating the patterns. The
//! patterns are compiled once and cloned per use; a clone shares the
//! compiled program.
//!
//! The regular-expression rules use a guard to check what precedes the
//! match, where the pattern alone cannot distinguish a regexp literal
//! from division.

use lazy_static::lazy_static;

use super::Rule;

lazy_static! {
    static ref C_STYLE_COMMENT: Rule = Rule::pattern(r"(?s)/\*.*?\*/", "comment")
        .expect("static pattern")
        .allow(["href"]);
    static ref CPP_STYLE_COMMENT: Rule = Rule::pattern(r"//[^\n]*", "comment")
        .expect("static pattern")
        .allow(["href"]);
    static ref PERL_STYLE_COMMENT: Rule = Rule::pattern(r"#[^\n]*", "comment")
        .expect("static pattern")
        .allow(["href"]);
    static ref XML_COMMENT: Rule = Rule::pattern(r"(?s)(?:<|&lt;)!--.*?--(?:>|&gt;)", "comment")
        .expect("static pattern")
        .allow(["href"]);
    static ref DOUBLE_QUOTED_STRING: Rule = Rule::pattern(r#""(?:[^"\\\n]|\\.)*""#, "string")
        .expect("static pattern");
    static ref SINGLE_QUOTED_STRING: Rule = Rule::pattern(r"'(?:[^'\\\n]|\\.)*'", "string")
        .expect("static pattern");
    static ref MULTI_LINE_DOUBLE_QUOTED_STRING: Rule =
        Rule::pattern(r#"(?s)"(?:[^"\\]|\\.)*""#, "string").expect("static pattern");
    static ref MULTI_LINE_SINGLE_QUOTED_STRING: Rule =
        Rule::pattern(r"(?s)'(?:[^'\\]|\\.)*'", "string").expect("static pattern");
    static ref STRING_ESCAPE: Rule = Rule::pattern(r"\\.", "escape")
        .expect("static pattern")
        .only(["string"]);
    static ref WEB_LINK: Rule =
        Rule::pattern(r#"\b(?:https?|ftp)://[^\s"'<>()\[\]{}]+"#, "href").expect("static pattern");
    static ref HEX_NUMBER: Rule =
        Rule::pattern(r"\b0[xX][0-9a-fA-F]+\b", "constant").expect("static pattern");
    static ref DECIMAL_NUMBER: Rule =
        Rule::pattern(r"\b[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?\b", "constant")
            .expect("static pattern");
    static ref CAMEL_CASE_TYPE: Rule =
        Rule::pattern(r"\b_*[A-Z][a-zA-Z0-9_]*\b", "type").expect("static pattern");
    static ref C_STYLE_TYPE: Rule =
        Rule::pattern(r"\b[a-z_][a-z0-9_]*_t\b", "type").expect("static pattern");
}

/// `/* ... */`, possibly spanning lines.
pub fn c_style_comment() -> Rule {
    C_STYLE_COMMENT.clone()
}

/// `// ...` to end of line.
pub fn cpp_style_comment() -> Rule {
    CPP_STYLE_COMMENT.clone()
}

/// `# ...` to end of line.
pub fn perl_style_comment() -> Rule {
    PERL_STYLE_COMMENT.clone()
}

/// `<!-- ... -->`, in raw or entity-encoded form.
pub fn xml_comment() -> Rule {
    XML_COMMENT.clone()
}

pub fn double_quoted_string() -> Rule {
    DOUBLE_QUOTED_STRING.clone()
}

pub fn single_quoted_string() -> Rule {
    SINGLE_QUOTED_STRING.clone()
}

pub fn multi_line_double_quoted_string() -> Rule {
    MULTI_LINE_DOUBLE_QUOTED_STRING.clone()
}

pub fn multi_line_single_quoted_string() -> Rule {
    MULTI_LINE_SINGLE_QUOTED_STRING.clone()
}

/// A backslash escape, only inside string matches.
pub fn string_escape() -> Rule {
    STRING_ESCAPE.clone()
}

/// An `http`/`https`/`ftp` URL.
pub fn web_link() -> Rule {
    WEB_LINK.clone()
}

pub fn hex_number() -> Rule {
    HEX_NUMBER.clone()
}

/// Integers, decimals and scientific notation. A leading sign is left to
/// the surrounding context, so `-273.15` classifies `273.15`.
pub fn decimal_number() -> Rule {
    DECIMAL_NUMBER.clone()
}

/// `CamelCase` type names, with optional leading underscores.
pub fn camel_case_type() -> Rule {
    CAMEL_CASE_TYPE.clone()
}

/// C convention `*_t` type names, e.g. `size_t`.
pub fn c_style_type() -> Rule {
    C_STYLE_TYPE.clone()
}

fn precedes_expression(source: &str, start: usize) -> bool {
    let before = source[..start].trim_end();
    before.is_empty() || before.ends_with(|c: char| "(,=:[!&|?{;".contains(c))
}

/// A Perl-style `/pattern/flags` literal. The guard admits the match only
/// in expression position, distinguishing it from division.
pub fn perl_style_regular_expression() -> Rule {
    Rule::pattern(r"/(?:\\.|[^/\\\n])+/[a-zA-Z]*", "string")
        .expect("static pattern")
        .guard(|source, raw| Ok(precedes_expression(source, raw.start())))
}

/// Ruby variant of the regexp literal; also admitted after `~` matching
/// operators.
pub fn ruby_style_regular_expression() -> Rule {
    Rule::pattern(r"/(?:\\.|[^/\\\n])+/[a-zA-Z]*", "string")
        .expect("static pattern")
        .guard(|source, raw| {
            let before = source[..raw.start()].trim_end();
            Ok(before.is_empty()
                || before.ends_with(|c: char| "(,=:[!&|?{;~".contains(c)))
        })
}
