//! Expression evaluation for database values
//!
//! A [`Param`] holds a unit label and either a bare expression (`"1.5"`,
//! `"=[heat_rate]*2"`) or a year series (`"2010=1.5;2020=[heat_rate]*2"`).
//! Named parameters are referenced as `[name]` and resolved recursively.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LcaError, Result};
use crate::units::Quantity;

/// A database value: expression text plus its unit label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

impl Param {
    pub fn new(value: impl ToString, unit: &str) -> Self {
        Param {
            value: value.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// Splits a value into `(year, expression)` points. A bare expression has no year.
pub fn parse_series(text: &str) -> Vec<(Option<f64>, String)> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((year, rest)) if !rest.starts_with('=') => match year.trim().parse::<f64>() {
                Ok(y) => (Some(y), rest.trim().to_string()),
                Err(_) => (None, segment.to_string()),
            },
            _ => (None, segment.to_string()),
        })
        .collect()
}

/// Linear interpolation over `(year, value)` points, clamped at both ends.
pub fn interpolate(points: &[(f64, f64)], year: f64) -> Option<f64> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let first = *sorted.first()?;
    let last = *sorted.last()?;
    if year <= first.0 {
        return Some(first.1);
    }
    if year >= last.0 {
        return Some(last.1);
    }
    for pair in sorted.windows(2) {
        let (y0, v0) = pair[0];
        let (y1, v1) = pair[1];
        if year >= y0 && year <= y1 {
            if y1 == y0 {
                return Some(v0);
            }
            let frac = (year - y0) / (y1 - y0);
            return Some(v0 + frac * (v1 - v0));
        }
    }
    Some(last.1)
}

/// Evaluates expressions against a table of named parameters for one analysis year.
pub struct Evaluator<'a> {
    vars: &'a BTreeMap<String, String>,
    year: f64,
}

impl<'a> Evaluator<'a> {
    pub fn new(vars: &'a BTreeMap<String, String>, year: f64) -> Self {
        Evaluator { vars, year }
    }

    pub fn eval_param(&self, param: &Param) -> Result<Quantity> {
        let v = self.eval_series(&param.value)?;
        Quantity::from_label(v, &param.unit)
    }

    pub fn eval_series(&self, text: &str) -> Result<f64> {
        self.series(text, &mut Vec::new())
    }

    /// Evaluates a single expression.
    pub fn eval(&self, expr: &str) -> Result<f64> {
        self.expr(expr, &mut Vec::new())
    }

    fn series(&self, text: &str, stack: &mut Vec<String>) -> Result<f64> {
        let points = parse_series(text);
        if points.is_empty() {
            return Err(LcaError::expression(text, "empty value"));
        }
        if let [(None, expr)] = points.as_slice() {
            return self.expr(expr, stack);
        }
        let mut values = Vec::with_capacity(points.len());
        for (year, expr) in &points {
            let Some(year) = year else {
                return Err(LcaError::expression(text, "missing year in year series"));
            };
            values.push((*year, self.expr(expr, stack)?));
        }
        interpolate(&values, self.year).ok_or_else(|| LcaError::expression(text, "empty value"))
    }

    fn expr(&self, expr: &str, stack: &mut Vec<String>) -> Result<f64> {
        let substituted = self.substitute(expr, stack)?;
        let tokens = tokenize(&substituted).map_err(|e| LcaError::expression(expr, e))?;
        let mut parser = Parser { tokens, pos: 0 };
        let value = parser.comparison().map_err(|e| LcaError::expression(expr, e))?;
        if parser.pos != parser.tokens.len() {
            return Err(LcaError::expression(expr, "unexpected trailing input"));
        }
        Ok(value)
    }

    /// Replaces each `[name]` with its evaluated value.
    fn substitute(&self, expr: &str, stack: &mut Vec<String>) -> Result<String> {
        let var_re = Regex::new(r"\[(.*?)\]")?;
        let mut out = String::with_capacity(expr.len());
        let mut last = 0;
        for cap in var_re.captures_iter(expr) {
            let Some(whole) = cap.get(0) else { continue };
            let name = cap[1].trim().to_string();
            if stack.contains(&name) {
                return Err(LcaError::expression(
                    expr,
                    format!("circular reference to [{name}]"),
                ));
            }
            let definition = self
                .vars
                .get(&name)
                .ok_or_else(|| LcaError::expression(expr, format!("unknown variable [{name}]")))?;
            stack.push(name);
            let value = self.series(definition, stack)?;
            stack.pop();
            out.push_str(&expr[last..whole.start()]);
            out.push_str(&format!("({value})"));
            last = whole.end();
        }
        out.push_str(&expr[last..]);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(s: &str) -> std::result::Result<Vec<Token>, String> {
    let s = s.trim();
    let s = s.strip_prefix('=').unwrap_or(s);
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let v = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(v));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "^",
                }));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('=', Some('=')) => "==",
                    ('!', Some('=')) => "!=",
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err(format!("unexpected character '{c}'")),
                };
                i += op.len();
                tokens.push(Token::Op(op));
            }
            _ => return Err(format!("unexpected character '{c}'")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult = std::result::Result<f64, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn comparison(&mut self) -> ParseResult {
        let left = self.additive()?;
        let Some(op) = self.peek_op() else {
            return Ok(left);
        };
        let test: fn(f64, f64) -> bool = match op {
            "==" => |a, b| a == b,
            "!=" => |a, b| a != b,
            "<" => |a, b| a < b,
            "<=" => |a, b| a <= b,
            ">" => |a, b| a > b,
            ">=" => |a, b| a >= b,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(if test(left, right) { 1.0 } else { 0.0 })
    }

    fn additive(&mut self) -> ParseResult {
        let mut v = self.multiplicative()?;
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            v = if op == "+" { v + rhs } else { v - rhs };
        }
        Ok(v)
    }

    fn multiplicative(&mut self) -> ParseResult {
        let mut v = self.unary()?;
        while let Some(op @ ("*" | "/")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            v = if op == "*" { v * rhs } else { v / rhs };
        }
        Ok(v)
    }

    fn unary(&mut self) -> ParseResult {
        match self.peek_op() {
            Some("-") => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some("+") => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> ParseResult {
        let base = self.primary()?;
        if self.peek_op() == Some("^") {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult {
        match self.next() {
            Some(Token::Num(v)) => Ok(v),
            Some(Token::LParen) => {
                let v = self.comparison()?;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Ident(name)) => {
                if self.next() != Some(Token::LParen) {
                    return Err(format!("unknown identifier '{name}'"));
                }
                let args = self.arguments()?;
                call(&name, &args)
            }
            Some(t) => Err(format!("unexpected token {t:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn arguments(&mut self) -> std::result::Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err("expected ',' or ')' in argument list".to_string()),
            }
        }
    }
}

fn call(name: &str, args: &[f64]) -> ParseResult {
    let upper = name.to_ascii_uppercase();
    let required = match upper.as_str() {
        "IF" => 3,
        "LN" => 1,
        _ => return Err(format!("unknown function '{name}'")),
    };
    if args.len() != required {
        return Err(format!(
            "Function {upper} got {} arguments but requires {required}",
            args.len()
        ));
    }
    match upper.as_str() {
        "IF" => {
            let cond = args[0];
            if cond == 1.0 {
                Ok(args[1])
            } else if cond == 0.0 {
                Ok(args[2])
            } else {
                Err(format!("Boolean value {cond} should be 0 or 1 but is not."))
            }
        }
        _ => Ok(args[0].ln()),
    }
}
