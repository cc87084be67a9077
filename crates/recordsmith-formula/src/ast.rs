use std::collections::BTreeSet;

use crate::value::FormulaValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Pow,
}

/// Parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(FormulaValue),
    /// Field reference as written (may be a dotted path or a `$` global).
    Field(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call; `name` is upper-cased.
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Field(_) => {}
            Expr::Unary { expr, .. } => expr.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

/// Record fields an expression reads; `$` globals are excluded.
pub fn referenced_fields(expr: &Expr) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    expr.walk(&mut |node| {
        if let Expr::Field(name) = node {
            if !name.starts_with('$') {
                fields.insert(name.clone());
            }
        }
    });
    fields
}

/// Fields passed directly to `ISBLANK`, `ISNULL` or `BLANKVALUE`.
pub fn blank_checked_fields(expr: &Expr) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    expr.walk(&mut |node| {
        if let Expr::Call { name, args } = node {
            if matches!(name.as_str(), "ISBLANK" | "ISNULL" | "BLANKVALUE") {
                if let Some(Expr::Field(field)) = args.first() {
                    if !field.starts_with('$') {
                        fields.insert(field.clone());
                    }
                }
            }
        }
    });
    fields
}

/// Upper-cased names of every function an expression calls.
pub fn called_functions(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    expr.walk(&mut |node| {
        if let Expr::Call { name, .. } = node {
            names.insert(name.clone());
        }
    });
    names
}
