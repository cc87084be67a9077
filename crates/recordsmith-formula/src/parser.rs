use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::errors::{FormulaError, Result};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::value::FormulaValue;

const PREFIX_BINDING: u8 = 15;

/// Deepest expression tree the parser will build.
pub const MAX_NESTING: usize = 256;

/// Parse formula text into an expression tree.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        depth: 0,
    };
    let expr = parser.expression(0)?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(parse_error(trailing, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    /// Nesting of the node being built, counting chained operators.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        let token = self.advance();
        if token.kind == kind {
            Ok(())
        } else {
            Err(parse_error(&token, &format!("expected {what}")))
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(parse_error(
                self.peek(),
                &format!("expression nests deeper than {MAX_NESTING} levels"),
            ));
        }
        Ok(())
    }

    fn expression(&mut self, min_binding: u8) -> Result<Expr> {
        let entry = self.depth;
        self.descend()?;
        let mut left = self.prefix()?;

        loop {
            let Some((op, left_binding, right_binding)) = infix_binding(&self.peek().kind) else {
                break;
            };
            if left_binding < min_binding {
                break;
            }
            self.advance();
            self.descend()?;
            let right = self.expression(right_binding)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.depth = entry;
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal(FormulaValue::Number(value))),
            TokenKind::Str(value) => Ok(Expr::Literal(FormulaValue::Text(value))),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Minus => self.unary(UnaryOp::Neg),
            TokenKind::Plus => self.unary(UnaryOp::Plus),
            TokenKind::Bang => self.unary(UnaryOp::Not),
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    let args = self.arguments()?;
                    return Ok(Expr::Call {
                        name: name.to_ascii_uppercase(),
                        args,
                    });
                }
                Ok(match name.to_ascii_uppercase().as_str() {
                    "TRUE" => Expr::Literal(FormulaValue::Bool(true)),
                    "FALSE" => Expr::Literal(FormulaValue::Bool(false)),
                    "NULL" => Expr::Literal(FormulaValue::Null),
                    _ => Expr::Field(name),
                })
            }
            _ => Err(parse_error(&token, "expected an expression")),
        }
    }

    fn unary(&mut self, op: UnaryOp) -> Result<Expr> {
        let expr = self.expression(PREFIX_BINDING)?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            let token = self.advance();
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(parse_error(&token, "expected `,` or `)`")),
            }
        }
    }
}

/// Left/right binding powers, lowest to highest: `||`, `&&`, equality,
/// ordering, additive and `&`, multiplicative, `^` (right associative).
fn infix_binding(kind: &TokenKind) -> Option<(BinaryOp, u8, u8)> {
    let binding = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1, 2),
        TokenKind::AndAnd => (BinaryOp::And, 3, 4),
        TokenKind::Eq => (BinaryOp::Eq, 5, 6),
        TokenKind::Ne => (BinaryOp::Ne, 5, 6),
        TokenKind::Lt => (BinaryOp::Lt, 7, 8),
        TokenKind::Le => (BinaryOp::Le, 7, 8),
        TokenKind::Gt => (BinaryOp::Gt, 7, 8),
        TokenKind::Ge => (BinaryOp::Ge, 7, 8),
        TokenKind::Plus => (BinaryOp::Add, 9, 10),
        TokenKind::Minus => (BinaryOp::Sub, 9, 10),
        TokenKind::Amp => (BinaryOp::Concat, 9, 10),
        TokenKind::Star => (BinaryOp::Mul, 11, 12),
        TokenKind::Slash => (BinaryOp::Div, 11, 12),
        TokenKind::Caret => (BinaryOp::Pow, 14, 13),
        _ => return None,
    };
    Some(binding)
}

fn parse_error(token: &Token, message: &str) -> FormulaError {
    let found = match &token.kind {
        TokenKind::Eof => "end of formula".to_string(),
        other => format!("{other:?}"),
    };
    FormulaError::Parse {
        position: token.position,
        message: format!("{message}, found {found}"),
    }
}
