//! Query text grammar.
//!
//! Query text is parsed against one field scope: every term gets the scope
//! prefix prepended, so the same text can be aimed at different fields of
//! the fielded index. Supported syntax:
//!
//! - bare words, joined by an implicit AND
//! - `+word` (required) and `-word` (excluded)
//! - `"a phrase"`
//! - `word*` matching every term starting with `word`
//! - `AND`, `OR`, `NOT`, `AND NOT`, `XOR` and parentheses
//! - `a NEAR/n b` and `a ADJ/n b` proximity
//!
//! Words are lower-cased and never stemmed, so stem terms stored in the index
//! are matched literally.

use crate::error::{Error, Result};

/// Proximity window used by `NEAR` and `ADJ` without an explicit `/n`.
pub const DEFAULT_WINDOW: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Term(String),
    /// Every term starting with the given text.
    Wildcard(String),
    Phrase { terms: Vec<String>, slop: u32 },
    And(Vec<Query>),
    Or(Vec<Query>),
    AndNot(Box<Query>, Box<Query>),
    Nothing,
}

impl Query {
    /// Parse `text` with every term placed in `scope`.
    pub fn parse(text: &str, scope: &str) -> Result<Query> {
        let lexemes = lex(text);
        let mut parser = Parser {
            lexemes: &lexemes,
            pos: 0,
            scope,
        };
        parser.parse_all()
    }

    /// Parse `text` once per scope and OR the results. With no scopes the
    /// text is parsed against the empty scope.
    pub fn parse_scoped<'a>(
        text: &str,
        scopes: impl IntoIterator<Item = &'a str>,
    ) -> Result<Query> {
        let mut queries = Vec::new();
        for scope in scopes {
            queries.push(Query::parse(text, scope)?);
        }
        if queries.is_empty() {
            return Query::parse(text, "");
        }
        Ok(Query::any_of(queries))
    }

    pub fn any_of(mut queries: Vec<Query>) -> Query {
        match queries.len() {
            0 => Query::Nothing,
            1 => queries.remove(0),
            _ => Query::Or(queries),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Word { text: String, wildcard: bool },
    Phrase(Vec<String>),
    Love,
    Hate,
    Open,
    Close,
    And,
    Or,
    Not,
    Xor,
    Near(u32),
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(text: &str) -> Vec<Lexeme> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "AND" => out.push(Lexeme::And),
                "OR" => out.push(Lexeme::Or),
                "NOT" => out.push(Lexeme::Not),
                "XOR" => out.push(Lexeme::Xor),
                "NEAR" | "ADJ" => {
                    let mut window = DEFAULT_WINDOW;
                    if chars.get(i) == Some(&'/') {
                        let digits_start = i + 1;
                        let mut j = digits_start;
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        let digits: String =
                            chars[digits_start..j].iter().collect();
                        if let Ok(n) = digits.parse() {
                            window = n;
                            i = j;
                        }
                    }
                    out.push(Lexeme::Near(window));
                }
                _ => {
                    let wildcard = chars.get(i) == Some(&'*');
                    if wildcard {
                        i += 1;
                    }
                    out.push(Lexeme::Word {
                        text: word.to_lowercase(),
                        wildcard,
                    });
                }
            }
            continue;
        }

        match c {
            '"' => {
                i += 1;
                let mut words = Vec::new();
                let mut current = String::new();
                while i < chars.len() && chars[i] != '"' {
                    if is_word_char(chars[i]) {
                        current.push(chars[i]);
                    } else if !current.is_empty() {
                        words.push(std::mem::take(&mut current).to_lowercase());
                    }
                    i += 1;
                }
                if !current.is_empty() {
                    words.push(current.to_lowercase());
                }
                out.push(Lexeme::Phrase(words));
            }
            '(' => out.push(Lexeme::Open),
            ')' => out.push(Lexeme::Close),
            '+' | '-' => {
                let at_term_start = i == 0
                    || chars[i - 1].is_whitespace()
                    || chars[i - 1] == '(';
                let before_operand = chars
                    .get(i + 1)
                    .is_some_and(|n| is_word_char(*n) || *n == '"' || *n == '(');
                if at_term_start && before_operand {
                    out.push(if c == '+' { Lexeme::Love } else { Lexeme::Hate });
                }
            }
            _ => {}
        }
        i += 1;
    }

    out
}

struct Parser<'a> {
    lexemes: &'a [Lexeme],
    pos: usize,
    scope: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Lexeme> {
        self.lexemes.get(self.pos + offset)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn scoped(&self, word: &str) -> String {
        format!("{}{word}", self.scope)
    }

    fn parse_all(&mut self) -> Result<Query> {
        let mut query = None;
        while self.pos < self.lexemes.len() {
            // Stray closing parentheses are ignored.
            if self.peek() == Some(&Lexeme::Close) {
                self.advance();
                continue;
            }
            let start = self.pos;
            let next = self.parse_or()?;
            query = both(query, next);
            if self.pos == start {
                self.advance();
            }
        }
        Ok(query.unwrap_or(Query::Nothing))
    }

    fn parse_or(&mut self) -> Result<Option<Query>> {
        let mut acc = self.parse_and()?;
        loop {
            match self.peek() {
                Some(Lexeme::Or) => {
                    self.advance();
                    let rhs = self.parse_and()?;
                    acc = either(acc, rhs);
                }
                Some(Lexeme::Xor) => {
                    self.advance();
                    let rhs = self.parse_and()?;
                    acc = match (acc, rhs) {
                        (Some(a), Some(b)) => Some(Query::AndNot(
                            Box::new(Query::Or(vec![a.clone(), b.clone()])),
                            Box::new(Query::And(vec![a, b])),
                        )),
                        (a, b) => a.or(b),
                    };
                }
                _ => return Ok(acc),
            }
        }
    }

    fn parse_and(&mut self) -> Result<Option<Query>> {
        let mut acc = self.parse_group()?;
        loop {
            match self.peek() {
                Some(Lexeme::And) => {
                    self.advance();
                    if self.peek() == Some(&Lexeme::Not) {
                        self.advance();
                        let rhs = self.parse_group()?;
                        acc = without(acc, rhs);
                    } else {
                        let rhs = self.parse_group()?;
                        acc = both(acc, rhs);
                    }
                }
                Some(Lexeme::Not) => {
                    self.advance();
                    let rhs = self.parse_group()?;
                    acc = without(acc, rhs);
                }
                _ => return Ok(acc),
            }
        }
    }

    /// A run of terms joined by the default operator, with `+`/`-` marks.
    fn parse_group(&mut self) -> Result<Option<Query>> {
        let mut required = Vec::new();
        let mut excluded = Vec::new();
        let mut consumed = false;

        while let Some(lexeme) = self.peek() {
            match lexeme {
                Lexeme::Love => {
                    self.advance();
                    required.extend(self.parse_near()?);
                }
                Lexeme::Hate => {
                    self.advance();
                    excluded.extend(self.parse_near()?);
                }
                Lexeme::Word { .. } | Lexeme::Phrase(_) | Lexeme::Open => {
                    required.extend(self.parse_near()?);
                }
                Lexeme::Near(_) => self.advance(),
                _ => break,
            }
            consumed = true;
        }

        if !consumed || (required.is_empty() && excluded.is_empty()) {
            return Ok(None);
        }
        let Some(positive) = all_of(required) else {
            // Nothing required: excluded terms alone match nothing.
            return Ok(Some(Query::Nothing));
        };
        if excluded.is_empty() {
            Ok(Some(positive))
        } else {
            Ok(Some(Query::AndNot(
                Box::new(positive),
                Box::new(Query::any_of(excluded)),
            )))
        }
    }

    fn parse_near(&mut self) -> Result<Option<Query>> {
        let starts_proximity = matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Lexeme::Word { .. }), Some(Lexeme::Near(_)))
        );
        if !starts_proximity {
            return self.parse_atom();
        }

        let mut terms = vec![self.proximity_operand()?];
        let mut window = DEFAULT_WINDOW;
        while let Some(Lexeme::Near(w)) = self.peek() {
            window = *w;
            self.advance();
            terms.push(self.proximity_operand()?);
        }
        let slop = window.saturating_sub(terms.len() as u32);
        Ok(Some(Query::Phrase { terms, slop }))
    }

    fn proximity_operand(&mut self) -> Result<String> {
        match self.peek() {
            Some(Lexeme::Word {
                text,
                wildcard: false,
            }) => {
                let term = self.scoped(text);
                self.advance();
                Ok(term)
            }
            _ => Err(Error::QueryParse(
                "NEAR and ADJ need a single word on each side".into(),
            )),
        }
    }

    fn parse_atom(&mut self) -> Result<Option<Query>> {
        let Some(lexeme) = self.peek().cloned() else {
            return Ok(None);
        };
        match lexeme {
            Lexeme::Word { text, wildcard } => {
                self.advance();
                let term = self.scoped(&text);
                Ok(Some(if wildcard {
                    Query::Wildcard(term)
                } else {
                    Query::Term(term)
                }))
            }
            Lexeme::Phrase(words) => {
                self.advance();
                let mut terms: Vec<String> =
                    words.iter().map(|w| self.scoped(w)).collect();
                Ok(match terms.len() {
                    0 => None,
                    1 => terms.pop().map(Query::Term),
                    _ => Some(Query::Phrase { terms, slop: 0 }),
                })
            }
            Lexeme::Open => {
                self.advance();
                let inner = self.parse_or()?;
                if self.peek() == Some(&Lexeme::Close) {
                    self.advance();
                }
                Ok(inner)
            }
            _ => Ok(None),
        }
    }
}

fn all_of(mut queries: Vec<Query>) -> Option<Query> {
    match queries.len() {
        0 => None,
        1 => queries.pop(),
        _ => Some(Query::And(queries)),
    }
}

fn both(a: Option<Query>, b: Option<Query>) -> Option<Query> {
    match (a, b) {
        (Some(Query::And(mut left)), Some(right)) => {
            left.push(right);
            Some(Query::And(left))
        }
        (Some(left), Some(right)) => Some(Query::And(vec![left, right])),
        (a, b) => a.or(b),
    }
}

fn either(a: Option<Query>, b: Option<Query>) -> Option<Query> {
    match (a, b) {
        (Some(Query::Or(mut left)), Some(right)) => {
            left.push(right);
            Some(Query::Or(left))
        }
        (Some(left), Some(right)) => Some(Query::Or(vec![left, right])),
        (a, b) => a.or(b),
    }
}

fn without(a: Option<Query>, b: Option<Query>) -> Option<Query> {
    match (a, b) {
        (Some(left), Some(right)) => {
            Some(Query::AndNot(Box::new(left), Box::new(right)))
        }
        (Some(left), None) => Some(left),
        (None, Some(_)) => Some(Query::Nothing),
        (None, None) => None,
    }
}
