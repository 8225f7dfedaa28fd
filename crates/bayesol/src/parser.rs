//! Risk specification grammar.
//!
//! ```text
//! categories { spam, notspam }
//! prior { 1, 2 }
//! loss_matrix {
//! ""                spam    [ 0, 1 ]
//! "^X-Amount: ([0-9]+)" notspam [ $1, 0 ]
//! ""                notspam [ 5, 0 ]
//! }
//! ```
//!
//! `#` starts a comment. Loss entries and priors are arithmetic expressions
//! over numbers, `$k` submatch values, `+ - * / ^`, parentheses, `exp()` and
//! `log()`.

use dbacl_core::{DbaclError, Result};

/// Highest `$k` a loss entry may reference.
pub const MAX_SUBMATCH: usize = 9;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Submatch(usize),
    Symbol(char),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            line: 1,
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> DbaclError {
        DbaclError::RiskSpec(format!("line {}: {}", self.line, msg))
    }

    fn tokens(mut self) -> Result<Vec<(Token, usize)>> {
        let mut out = Vec::new();
        while let Some(&(start, c)) = self.chars.peek() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '"' => {
                    self.chars.next();
                    let s = self.string()?;
                    out.push((Token::Str(s), self.line));
                }
                '$' => {
                    self.chars.next();
                    let digits = self.take_while(|c| c.is_ascii_digit());
                    let k: usize = digits
                        .parse()
                        .map_err(|_| self.error("expected a submatch number after '$'"))?;
                    if k == 0 || k > MAX_SUBMATCH {
                        return Err(self.error(format!("submatch ${} out of range", k)));
                    }
                    out.push((Token::Submatch(k), self.line));
                }
                c if c.is_ascii_digit() || c == '.' => {
                    let text = self.number(start);
                    let value = text
                        .parse()
                        .map_err(|_| self.error(format!("bad number '{}'", text)))?;
                    out.push((Token::Number(value), self.line));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
                    out.push((Token::Ident(word), self.line));
                }
                '{' | '}' | '[' | ']' | '(' | ')' | ',' | '+' | '-' | '*' | '/' | '^' => {
                    self.chars.next();
                    out.push((Token::Symbol(c), self.line));
                }
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            }
        }
        Ok(out)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s
    }

    fn number(&mut self, start: usize) -> &'a str {
        let mut end = start;
        let mut prev = ' ';
        while let Some(&(i, c)) = self.chars.peek() {
            let exp_sign = matches!(c, '+' | '-') && matches!(prev, 'e' | 'E');
            if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E') || exp_sign) {
                break;
            }
            prev = c;
            end = i + c.len_utf8();
            self.chars.next();
        }
        let src = self.src;
        &src[start..end]
    }

    /// String body after the opening quote. `\"` is a quote, every other
    /// backslash is kept for the regex engine.
    fn string(&mut self) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(s),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, '"')) => s.push('"'),
                    Some((_, c)) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => break,
                },
                Some((_, '\n')) => return Err(self.error("unterminated string")),
                Some((_, c)) => s.push(c),
                None => break,
            }
        }
        Err(self.error("unterminated string"))
    }
}

/// Arithmetic expression of a prior or loss entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Submatch(usize),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Exp(Box<Expr>),
    Log(Box<Expr>),
}

impl Expr {
    /// Evaluate with `submatches[k - 1]` standing for `$k`; missing values are 0.
    pub fn eval(&self, submatches: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Submatch(k) => submatches.get(k - 1).copied().unwrap_or(0.0),
            Expr::Neg(e) => -e.eval(submatches),
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(submatches), b.eval(submatches));
                match op {
                    '+' => a + b,
                    '-' => a - b,
                    '*' => a * b,
                    '/' => a / b,
                    _ => a.powf(b),
                }
            }
            Expr::Exp(e) => e.eval(submatches).exp(),
            Expr::Log(e) => e.eval(submatches).ln(),
        }
    }

    /// Whether the expression refers to submatch values.
    pub fn uses_submatches(&self) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Submatch(_) => true,
            Expr::Neg(e) | Expr::Exp(e) | Expr::Log(e) => e.uses_submatches(),
            Expr::Binary(_, a, b) => a.uses_submatches() || b.uses_submatches(),
        }
    }
}

/// One `"pattern" category [ ... ]` line of the loss matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct LossLine {
    pub pattern: String,
    pub category: String,
    pub entries: Vec<Expr>,
}

/// A risk specification as written, before any validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRiskSpec {
    pub categories: Vec<String>,
    pub prior: Vec<Expr>,
    pub loss_lines: Vec<LossLine>,
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |(_, l)| *l)
    }

    fn error(&self, msg: impl std::fmt::Display) -> DbaclError {
        DbaclError::RiskSpec(format!("line {}: {}", self.line(), msg))
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        t
    }

    fn expect(&mut self, symbol: char) -> Result<()> {
        match self.next() {
            Some(Token::Symbol(c)) if c == symbol => Ok(()),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected '{}', found {:?}", symbol, other)))
            }
        }
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn spec(&mut self) -> Result<RawRiskSpec> {
        let mut spec = RawRiskSpec::default();
        let mut seen = [false; 3];
        while let Some(token) = self.next() {
            let section = match token {
                Token::Ident(name) => name,
                other => return Err(self.error(format!("expected a section name, found {:?}", other))),
            };
            self.expect('{')?;
            match section.as_str() {
                "categories" if !seen[0] => {
                    seen[0] = true;
                    spec.categories = self.list(|p| match p.next() {
                        Some(Token::Ident(name)) => Ok(name),
                        other => Err(p.error(format!("expected a category name, found {:?}", other))),
                    })?;
                }
                "prior" if !seen[1] => {
                    seen[1] = true;
                    spec.prior = self.list(Parser::expr)?;
                }
                "loss_matrix" if !seen[2] => {
                    seen[2] = true;
                    while !self.eat('}') {
                        spec.loss_lines.push(self.loss_line()?);
                    }
                    continue;
                }
                "categories" | "prior" | "loss_matrix" => {
                    return Err(self.error(format!("duplicate section {}", section)))
                }
                other => return Err(self.error(format!("unknown section {}", other))),
            }
            self.expect('}')?;
        }
        Ok(spec)
    }

    /// Comma separated items up to (not including) the closing brace.
    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::Symbol('}')) {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if !self.eat(',') {
                return Ok(items);
            }
        }
    }

    fn loss_line(&mut self) -> Result<LossLine> {
        let pattern = match self.next() {
            Some(Token::Str(s)) => s,
            other => return Err(self.error(format!("expected a quoted pattern, found {:?}", other))),
        };
        let category = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(self.error(format!("expected a category name, found {:?}", other))),
        };
        self.expect('[')?;
        let mut entries = Vec::new();
        if !self.eat(']') {
            loop {
                entries.push(self.expr()?);
                if !self.eat(',') {
                    break;
                }
            }
            self.expect(']')?;
        }
        Ok(LossLine {
            pattern,
            category,
            entries,
        })
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol(c @ ('+' | '-'))) => *c,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol(c @ ('*' | '/'))) => *c,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.eat('+');
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.eat('^') {
            // right associative, binds tighter than unary minus on its left
            return Ok(Expr::Binary('^', Box::new(base), Box::new(self.unary()?)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::Submatch(k)) => Ok(Expr::Submatch(k)),
            Some(Token::Symbol('(')) => {
                let e = self.expr()?;
                self.expect(')')?;
                Ok(e)
            }
            Some(Token::Ident(f)) if f == "exp" || f == "log" => {
                self.expect('(')?;
                let e = Box::new(self.expr()?);
                self.expect(')')?;
                Ok(if f == "exp" { Expr::Exp(e) } else { Expr::Log(e) })
            }
            Some(Token::Ident(f)) if f == "inf" => Ok(Expr::Number(f64::INFINITY)),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected a number, found {:?}", other)))
            }
        }
    }
}

/// Parse the text of a risk specification.
pub fn parse_risk_spec(text: &str) -> Result<RawRiskSpec> {
    let tokens = Lexer::new(text).tokens()?;
    Parser { tokens, pos: 0 }.spec()
}
