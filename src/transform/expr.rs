//! Column expressions for derived features
//!
//! A small arithmetic and boolean language evaluated row by row:
//!
//! ```text
//! price * qty
//! (revenue - cost) / revenue
//! `unit price` > 10 and not is_test
//! ```
//!
//! Missing operands produce missing results. Integer arithmetic stays
//! integer except for `/`.

use crate::table::{Column, Table, Value};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Binding power; higher binds tighter
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    Op(BinaryOp),
    Not,
    Minus,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprError(String);

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ExprError {}

fn err<T>(message: impl Into<String>) -> Result<T, ExprError> {
    Err(ExprError(message.into()))
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Op(BinaryOp::Mul));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '%' => {
                tokens.push(Token::Op(BinaryOp::Rem));
                i += 1;
            }
            '&' => {
                tokens.push(Token::Op(BinaryOp::And));
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Op(BinaryOp::Or));
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '<' | '>' | '=' | '!' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_is_eq) {
                    ('<', true) => Token::Op(BinaryOp::Le),
                    ('<', false) => Token::Op(BinaryOp::Lt),
                    ('>', true) => Token::Op(BinaryOp::Ge),
                    ('>', false) => Token::Op(BinaryOp::Gt),
                    ('=', true) => Token::Op(BinaryOp::Eq),
                    ('!', true) => Token::Op(BinaryOp::Ne),
                    ('!', false) => Token::Not,
                    _ => return err(format!("unexpected '{}' at {}", c, i)),
                };
                tokens.push(token);
                i += if next_is_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| ExprError(format!("unterminated string at {}", i)))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or_else(|| ExprError(format!("unterminated column name at {}", i)))?;
                tokens.push(Token::Ident(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = match text.parse::<i64>() {
                    Ok(n) => Value::Integer(n),
                    Err(_) => text
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| ExprError(format!("invalid number '{}'", text)))?,
                };
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::Op(BinaryOp::And),
                    "or" => Token::Op(BinaryOp::Or),
                    "not" => Token::Not,
                    "true" | "True" => Token::Number(Value::Boolean(true)),
                    "false" | "False" => Token::Number(Value::Boolean(false)),
                    _ => Token::Ident(word),
                });
            }
            other => return err(format!("unexpected '{}' at {}", other, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Op(op)) => Some(*op),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.prefix()?;
        while let Some(op) = self.peek_binary() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(precedence + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Literal(v)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            // Unary minus binds tighter than any binary operator
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.expression(7)?))),
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.expression(3)?))),
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => err("expected ')'"),
                }
            }
            Some(other) => err(format!("unexpected token {:?}", other)),
            None => err("unexpected end of expression"),
        }
    }
}

impl Expr {
    /// Parse an expression
    ///
    /// # Example
    /// ```
    /// use etl_orchestrator::transform::Expr;
    ///
    /// let expr = Expr::parse("price * (1 - discount)").unwrap();
    /// assert_eq!(expr.columns(), vec!["price", "discount"]);
    /// ```
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return err("empty expression");
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression(0)?;
        if parser.pos < parser.tokens.len() {
            return err(format!(
                "unexpected trailing token {:?}",
                parser.tokens[parser.pos]
            ));
        }
        Ok(expr)
    }

    /// Column names referenced, in first-use order
    pub fn columns(&self) -> Vec<&str> {
        fn walk<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
            match expr {
                Expr::Literal(_) => {}
                Expr::Column(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::Negate(inner) | Expr::Not(inner) => walk(inner, out),
                Expr::Binary(_, lhs, rhs) => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Evaluate over every row of a table into a new column
    pub fn evaluate(&self, table: &Table, name: &str) -> Result<Column, ExprError> {
        for column in self.columns() {
            if !table.has_column(column) {
                return err(format!("unknown column '{}'", column));
            }
        }
        let values = (0..table.row_count())
            .map(|row| self.eval_row(table, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Column::from_values(name, values))
    }

    fn eval_row(&self, table: &Table, row: usize) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(name) => Ok(table
                .column(name)
                .and_then(|c| c.get(row))
                .cloned()
                .unwrap_or(Value::Null)),
            Expr::Negate(inner) => match inner.eval_row(table, row)? {
                v if v.is_null() => Ok(Value::Null),
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| ExprError("integer overflow".into())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => err(format!("cannot negate {:?}", other)),
            },
            Expr::Not(inner) => match inner.eval_row(table, row)? {
                v if v.is_null() => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                other => err(format!("'not' needs a boolean, got {:?}", other)),
            },
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval_row(table, row)?;
                let b = rhs.eval_row(table, row)?;
                binary(*op, a, b)
            }
        }
    }
}

fn binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, ExprError> {
    use BinaryOp::*;
    match op {
        And | Or => {
            let (x, y) = match (&a, &b) {
                (x, y) if x.is_null() || y.is_null() => return Ok(Value::Null),
                (Value::Boolean(x), Value::Boolean(y)) => (*x, *y),
                _ => return err(format!("{:?} needs booleans, got {:?} and {:?}", op, a, b)),
            };
            Ok(Value::Boolean(if op == And { x && y } else { x || y }))
        }
        Lt | Le | Gt | Ge | Eq | Ne => {
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            let result = match op {
                Eq => a.loosely_equals(&b),
                Ne => !a.loosely_equals(&b),
                _ => {
                    let ordering = a
                        .compare_loose(&b)
                        .ok_or_else(|| ExprError(format!("cannot compare {:?} and {:?}", a, b)))?;
                    match op {
                        Lt => ordering == Ordering::Less,
                        Le => ordering != Ordering::Greater,
                        Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    }
                }
            };
            Ok(Value::Boolean(result))
        }
        Add | Sub | Mul | Div | Rem => arithmetic(op, a, b),
    }
}

fn arithmetic(op: BinaryOp, a: Value, b: Value) -> Result<Value, ExprError> {
    use BinaryOp::*;
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (&a, &b) {
        (Value::Integer(x), Value::Integer(y)) if op != Div => {
            let (x, y) = (*x, *y);
            let result = match op {
                Add => x.checked_add(y),
                Sub => x.checked_sub(y),
                Mul => x.checked_mul(y),
                _ if y == 0 => return Ok(Value::Null),
                _ => x.checked_rem(y),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| ExprError("integer overflow".into()))
        }
        (Value::Text(x), Value::Text(y)) if op == Add => Ok(Value::Text(format!("{}{}", x, y))),
        _ => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return err(format!("unsupported operands {:?} and {:?}", a, b));
            };
            let result = match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                _ if y == 0.0 => return Ok(Value::Null),
                Div => x / y,
                _ => x % y,
            };
            Ok(Value::Float(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::DataType;

    fn orders() -> Table {
        Table::from_rows(
            vec!["price".into(), "qty".into(), "unit price".into()],
            vec![
                vec![Value::Float(2.5), Value::Integer(4), Value::Integer(10)],
                vec![Value::Float(1.0), Value::Null, Value::Integer(20)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_precedence() {
        let expr = Expr::parse("1 + 2 * 3").unwrap();
        let out = expr.evaluate(&orders(), "x").unwrap();
        assert_eq!(out.values()[0], Value::Integer(7));

        let expr = Expr::parse("(1 + 2) * 3 - -1").unwrap();
        let out = expr.evaluate(&orders(), "x").unwrap();
        assert_eq!(out.values()[0], Value::Integer(10));
    }

    #[test]
    fn test_column_arithmetic_propagates_missing() {
        let expr = Expr::parse("price * qty").unwrap();
        let out = expr.evaluate(&orders(), "total").unwrap();
        assert_eq!(out.dtype(), DataType::Float);
        assert_eq!(out.values(), &[Value::Float(10.0), Value::Null]);
    }

    #[test]
    fn test_integer_division_is_float() {
        let expr = Expr::parse("`unit price` / 4").unwrap();
        let out = expr.evaluate(&orders(), "x").unwrap();
        assert_eq!(out.values()[0], Value::Float(2.5));
    }

    #[test]
    fn test_comparisons_and_logic() {
        let expr = Expr::parse("`unit price` >= 20 or not (price > 2)").unwrap();
        let out = expr.evaluate(&orders(), "flag").unwrap();
        assert_eq!(out.values(), &[Value::Boolean(false), Value::Boolean(true)]);
    }

    #[test]
    fn test_unknown_column_fails() {
        let expr = Expr::parse("price * ghost").unwrap();
        assert!(expr.evaluate(&orders(), "x").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("(1 + 2").is_err());
        assert!(Expr::parse("1 2").is_err());
        assert!(Expr::parse("'open").is_err());
        assert!(Expr::parse("a $ b").is_err());
    }

    #[test]
    fn test_string_literals_compare() {
        let table = Table::from_rows(vec!["tier".into()], vec![vec!["gold".into()]]).unwrap();
        let expr = Expr::parse("tier == 'gold'").unwrap();
        let out = expr.evaluate(&table, "is_gold").unwrap();
        assert_eq!(out.values()[0], Value::Boolean(true));
    }
}
