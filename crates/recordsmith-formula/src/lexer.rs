use crate::errors::{FormulaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the formula source.
    pub position: usize,
}

/// Split formula text into tokens, ending with [`TokenKind::Eof`].
///
/// Whitespace and `/* */` comments are skipped.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '/' && matches!(chars.get(i + 1), Some((_, '*'))) {
            i += 2;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (Some((_, '*')), Some((_, '/'))) => {
                        i += 2;
                        break;
                    }
                    (Some(_), _) => i += 1,
                    (None, _) => {
                        return Err(FormulaError::Lex {
                            position,
                            message: "unterminated comment".to_string(),
                        });
                    }
                }
            }
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (value, next) = read_string(&chars, i, ch)?;
            tokens.push(Token {
                kind: TokenKind::Str(value),
                position,
            });
            i = next;
            continue;
        }

        if ch.is_ascii_digit()
            || (ch == '.' && chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let value = text.parse::<f64>().map_err(|_| FormulaError::Lex {
                position,
                message: format!("invalid number `{text}`"),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position,
            });
            continue;
        }

        if is_ident_start(ch) {
            let start = i;
            while i < chars.len() && is_ident_continue(chars[i].1) {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            tokens.push(Token {
                kind: TokenKind::Ident(text),
                position,
            });
            continue;
        }

        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (kind, width) = match (ch, next) {
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('&', _) => (TokenKind::Amp, 1),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('=', _) => (TokenKind::Eq, 1),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('!', _) => (TokenKind::Bang, 1),
            ('<', Some('>')) => (TokenKind::Ne, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('>', _) => (TokenKind::Gt, 1),
            _ => {
                return Err(FormulaError::Lex {
                    position,
                    message: format!("unexpected character `{ch}`"),
                });
            }
        };
        tokens.push(Token { kind, position });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: source.len(),
    });
    Ok(tokens)
}

fn read_string(chars: &[(usize, char)], start: usize, quote: char) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut i = start + 1;
    while let Some(&(_, ch)) = chars.get(i) {
        match ch {
            '\\' => {
                let Some(&(_, escaped)) = chars.get(i + 1) else {
                    break;
                };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(FormulaError::Lex {
        position: chars[start].0,
        message: "unterminated string literal".to_string(),
    })
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn reads_operators_and_dotted_identifiers() {
        assert_eq!(
            kinds("Account.Owner__r.Name <> 'x' && $User.Id"),
            vec![
                TokenKind::Ident("Account.Owner__r.Name".to_string()),
                TokenKind::Ne,
                TokenKind::Str("x".to_string()),
                TokenKind::AndAnd,
                TokenKind::Ident("$User.Id".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literals_keep_escapes_and_parens() {
        assert_eq!(
            kinds(r#""say \"hi\" (ISBLANK(X))""#),
            vec![
                TokenKind::Str("say \"hi\" (ISBLANK(X))".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_block_comments() {
        assert_eq!(
            kinds("1 /* note */ + 2.5"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(
            tokenize("\"open"),
            Err(FormulaError::Lex { position: 0, .. })
        ));
    }
}
