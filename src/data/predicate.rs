use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::model::{AttributeValue, Feature};

// ---------------------------------------------------------------------------
// Predicate AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// A boolean expression over feature attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        attribute: String,
        op: CompareOp,
        value: Literal,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(attribute: &str, op: CompareOp, value: Literal) -> Self {
        Predicate::Compare {
            attribute: attribute.to_string(),
            op,
            value,
        }
    }

    /// Every attribute name the predicate reads, regardless of short-circuiting.
    pub fn attributes(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Compare { attribute, .. } => {
                out.insert(attribute.as_str());
            }
            Predicate::All(parts) | Predicate::Any(parts) => {
                for p in parts {
                    p.collect_attributes(out);
                }
            }
        }
    }

    /// Evaluate against a feature.  Attributes missing from the feature
    /// compare as `Null`; presence is checked by the filter engine.
    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            Predicate::Compare {
                attribute,
                op,
                value,
            } => {
                let lhs = feature.get(attribute).unwrap_or(&AttributeValue::Null);
                compare(lhs, *op, value)
            }
            Predicate::All(parts) => parts.iter().all(|p| p.matches(feature)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(feature)),
        }
    }
}

/// Numbers compare with numbers, strings with strings.  Any other pairing
/// (including `Null`) only satisfies `!=`.
fn compare(lhs: &AttributeValue, op: CompareOp, rhs: &Literal) -> bool {
    let ord = match (lhs, rhs) {
        (AttributeValue::String(a), Literal::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (lhs, Literal::Number(b)) => lhs.as_f64().and_then(|a| a.partial_cmp(b)),
        _ => None,
    };
    match ord {
        Some(ord) => op.holds(ord),
        None => op == CompareOp::Ne,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                match p {
                    Predicate::Compare { .. } => write!(f, "{p}")?,
                    _ => write!(f, "({p})")?,
                }
            }
            Ok(())
        }
        match self {
            Predicate::Compare {
                attribute,
                op,
                value,
            } => write!(f, "{attribute}{}{value}", op.symbol()),
            Predicate::All(parts) => join(f, parts, "&"),
            Predicate::Any(parts) => join(f, parts, "|"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------
//
//   expr := and ('|' and)*
//   and  := term ('&' term)*
//   term := '(' expr ')' | IDENT OP literal

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Text(String),
    Op(CompareOp),
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
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
            '&' => {
                tokens.push(Token::And);
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Or);
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '>' | '<' | '=' | '!' => {
                let next_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, next_eq) {
                    ('>', true) => CompareOp::Ge,
                    ('>', false) => CompareOp::Gt,
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    ('=', true) => CompareOp::Eq,
                    ('!', true) => CompareOp::Ne,
                    _ => return Err(format!("unexpected '{c}' at position {i}")),
                };
                tokens.push(Token::Op(op));
                i += if next_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| format!("unterminated string starting at position {i}"))?;
                tokens.push(Token::Text(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '-' || chars[i] == '+')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("'{text}' is not a number"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected '{other}' at position {i}")),
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
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Predicate, String> {
        let mut parts = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.and()?);
        }
        Ok(collapse(parts, Predicate::Any))
    }

    fn and(&mut self) -> Result<Predicate, String> {
        let mut parts = vec![self.term()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.term()?);
        }
        Ok(collapse(parts, Predicate::All))
    }

    fn term(&mut self) -> Result<Predicate, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::Ident(attribute)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(format!("expected comparison after '{attribute}'")),
                };
                let value = match self.next() {
                    Some(Token::Number(n)) => Literal::Number(n),
                    Some(Token::Text(s)) => Literal::Text(s),
                    _ => return Err(format!("expected value after '{attribute}{}'", op.symbol())),
                };
                Ok(Predicate::Compare {
                    attribute,
                    op,
                    value,
                })
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn collapse(mut parts: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        if tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let predicate = parser.expr()?;
        if let Some(extra) = parser.peek() {
            return Err(format!("unexpected trailing token {extra:?}"));
        }
        Ok(predicate)
    }
}
