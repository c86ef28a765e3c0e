//! Blob index tag filter expressions.
//!
//! Grammar: `clause (AND clause)*` where a clause is `key op 'value'`. Keys are
//! bare or double-quoted; `@container` restricts the search to one container
//! and only supports `=`. Values compare lexicographically.

use std::cmp::Ordering;

use super::BackendError;
use crate::models::Tags;

const CONTAINER_KEY: &str = "@container";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagComparison {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl TagComparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagComparison::Eq => "=",
            TagComparison::Gt => ">",
            TagComparison::Ge => ">=",
            TagComparison::Lt => "<",
            TagComparison::Le => "<=",
        }
    }

    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        let ordering = actual.cmp(expected);
        match self {
            TagComparison::Eq => ordering == Ordering::Equal,
            TagComparison::Gt => ordering == Ordering::Greater,
            TagComparison::Ge => ordering != Ordering::Less,
            TagComparison::Lt => ordering == Ordering::Less,
            TagComparison::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPredicate {
    pub key: String,
    pub comparison: TagComparison,
    pub value: String,
}

impl TagPredicate {
    fn matches(&self, tags: &Tags) -> bool {
        tags.get(&self.key)
            .map(|actual| self.comparison.matches(actual, &self.value))
            .unwrap_or(false)
    }
}

/// A parsed `where` expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub container: Option<String>,
    pub predicates: Vec<TagPredicate>,
}

impl TagFilter {
    pub fn parse(expression: &str) -> Result<Self, BackendError> {
        let mut parser = Parser::new(expression);
        let mut filter = TagFilter::default();

        loop {
            let (key, quoted) = parser.key()?;
            let comparison = parser.comparison()?;
            let value = parser.value()?;

            if key == CONTAINER_KEY && !quoted {
                if comparison != TagComparison::Eq {
                    return Err(invalid("@container only supports '='"));
                }
                if filter.container.replace(value).is_some() {
                    return Err(invalid("@container may appear only once"));
                }
            } else {
                filter.predicates.push(TagPredicate { key, comparison, value });
            }

            if parser.at_end() {
                break;
            }
            parser.and_keyword()?;
        }

        Ok(filter)
    }

    /// Whether a blob in `container` carrying `tags` satisfies every clause.
    pub fn matches(&self, container: &str, tags: &Tags) -> bool {
        if let Some(ref wanted) = self.container {
            if wanted != container {
                return false;
            }
        }
        self.predicates.iter().all(|p| p.matches(tags))
    }
}

fn invalid(message: impl Into<String>) -> BackendError {
    BackendError::InvalidQuery(message.into())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.chars.len()
    }

    /// Reads up to the closing `delimiter`, consuming it.
    fn delimited(&mut self, delimiter: char, what: &str) -> Result<String, BackendError> {
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == delimiter {
                let text: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(text);
            }
            self.pos += 1;
        }
        Err(invalid(format!("unterminated {what}")))
    }

    fn key(&mut self) -> Result<(String, bool), BackendError> {
        self.skip_whitespace();
        let (key, quoted) = if self.peek() == Some('"') {
            (self.delimited('"', "quoted key")?, true)
        } else {
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_whitespace() || matches!(c, '=' | '<' | '>' | '\'' | '"') {
                    break;
                }
                self.pos += 1;
            }
            (self.chars[start..self.pos].iter().collect::<String>(), false)
        };

        if key.is_empty() {
            return Err(invalid(format!("expected a tag key at position {}", self.pos)));
        }
        Ok((key, quoted))
    }

    fn comparison(&mut self) -> Result<TagComparison, BackendError> {
        self.skip_whitespace();
        let comparison = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some('>'), Some('=')) => TagComparison::Ge,
            (Some('<'), Some('=')) => TagComparison::Le,
            (Some('='), _) => TagComparison::Eq,
            (Some('>'), _) => TagComparison::Gt,
            (Some('<'), _) => TagComparison::Lt,
            _ => return Err(invalid(format!("expected an operator at position {}", self.pos))),
        };
        self.pos += comparison.as_str().len();
        Ok(comparison)
    }

    fn value(&mut self) -> Result<String, BackendError> {
        self.skip_whitespace();
        if self.peek() != Some('\'') {
            return Err(invalid(format!("expected a quoted value at position {}", self.pos)));
        }
        self.delimited('\'', "value")
    }

    fn and_keyword(&mut self) -> Result<(), BackendError> {
        self.skip_whitespace();
        let word: String = self.chars.iter().skip(self.pos).take(3).collect();
        let followed_by_space = self.chars.get(self.pos + 3).map_or(false, |c| c.is_whitespace());
        if !word.eq_ignore_ascii_case("and") || !followed_by_space {
            return Err(invalid(format!("expected AND at position {}", self.pos)));
        }
        self.pos += 3;
        Ok(())
    }
}
