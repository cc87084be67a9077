use crate::functions::is_supported;
use crate::lexer::{TokenKind, tokenize};
use crate::parser::parse;

/// Names of called functions outside the supported set, upper-cased, in
/// order of first appearance.
///
/// Only `identifier (` sequences count as calls, so string literal content
/// and field names never show up here.
pub fn unsupported_functions(formula: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(formula) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for pair in tokens.windows(2) {
        if let (TokenKind::Ident(name), TokenKind::LParen) = (&pair[0].kind, &pair[1].kind) {
            let upper = name.to_ascii_uppercase();
            if !is_supported(&upper) && !names.contains(&upper) {
                names.push(upper);
            }
        }
    }
    names
}

/// Whether the formula parses and only calls supported functions.
pub fn can_evaluate(formula: &str) -> bool {
    parse(formula).is_ok() && unsupported_functions(formula).is_empty()
}
