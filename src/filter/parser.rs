//! Lucene-style filter string parsing.
//!
//! Supported grammar, from lowest to highest precedence:
//!
//! ```text
//! or      := and (OR and)*
//! and     := not (AND not)*
//! not     := NOT not | primary
//! primary := '(' or ')' | '*' | PATH | PATH ':' value
//! value   := '*' | QUOTED | TERM
//! ```
//!
//! `field: *` tests existence, an unquoted value containing `*` is a glob and a
//! bare path tests existence as well. Keywords are accepted in upper or lower
//! case. Range, fuzzy and boost operators are rejected.

use crate::error::{EngineError, Result};
use crate::field::FieldPath;
use crate::filter::{FilterExpression, WildcardPattern};
use serde_json::Value;

/// Tokens in a filter string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Bare word, backslash escapes retained.
    Term(String),
    Quoted(String),
    Colon,
    And,
    Or,
    Not,
    LeftParen,
    RightParen,
}

const UNSUPPORTED_OPERATORS: &[char] = &['[', ']', '{', '}', '~', '^', '<', '>', '=', '!'];

/// Parse a filter string into a [`FilterExpression`].
pub fn parse_filter(input: &str) -> Result<FilterExpression> {
    let tokens = tokenize_filter(input)?;
    if tokens.is_empty() {
        return Err(EngineError::InvalidFilterDefinition(
            "empty filter".to_string(),
        ));
    }

    let mut parser = FilterParser::new(&tokens);
    let expression = parser.parse_or_expression()?;
    if let Some(token) = parser.current_token() {
        return Err(EngineError::InvalidFilterDefinition(format!(
            "unexpected {} after complete expression",
            describe(token)
        )));
    }
    Ok(expression)
}

/// Recursive descent parser over filter tokens.
pub(crate) struct FilterParser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> FilterParser<'a> {
    pub(crate) fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.current_token().cloned();
        self.position += 1;
        token
    }

    /// Parse OR expressions (lowest precedence).
    pub(crate) fn parse_or_expression(&mut self) -> Result<FilterExpression> {
        let mut operands = vec![self.parse_and_expression()?];

        while let Some(Token::Or) = self.current_token() {
            self.advance();
            operands.push(self.parse_and_expression()?);
        }

        Ok(collapse(operands, FilterExpression::Or))
    }

    /// Parse AND expressions (medium precedence).
    fn parse_and_expression(&mut self) -> Result<FilterExpression> {
        let mut operands = vec![self.parse_not_expression()?];

        while let Some(Token::And) = self.current_token() {
            self.advance();
            operands.push(self.parse_not_expression()?);
        }

        Ok(collapse(operands, FilterExpression::And))
    }

    /// Parse NOT expressions (highest precedence).
    fn parse_not_expression(&mut self) -> Result<FilterExpression> {
        if let Some(Token::Not) = self.current_token() {
            self.advance();
            let operand = self.parse_not_expression()?;
            Ok(operand.negate())
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<FilterExpression> {
        match self.advance() {
            Some(Token::LeftParen) => {
                let expr = self.parse_or_expression()?;
                if let Some(Token::RightParen) = self.current_token() {
                    self.advance();
                    Ok(expr)
                } else {
                    Err(EngineError::InvalidFilterDefinition(
                        "expected closing parenthesis".to_string(),
                    ))
                }
            }
            Some(Token::Term(raw)) if raw == "*" => Ok(FilterExpression::MatchAll),
            Some(Token::Term(raw)) => {
                let path = parse_path(&raw)?;
                if let Some(Token::Colon) = self.current_token() {
                    self.advance();
                    self.parse_value(path)
                } else {
                    Ok(FilterExpression::FieldExists(path))
                }
            }
            Some(token) => Err(EngineError::InvalidFilterDefinition(format!(
                "unexpected {}",
                describe(&token)
            ))),
            None => Err(EngineError::InvalidFilterDefinition(
                "unexpected end of filter".to_string(),
            )),
        }
    }

    fn parse_value(&mut self, path: FieldPath) -> Result<FilterExpression> {
        match self.advance() {
            Some(Token::Quoted(text)) => Ok(FilterExpression::FieldEquals(path, Value::String(text))),
            Some(Token::Term(raw)) if raw == "*" => Ok(FilterExpression::FieldExists(path)),
            Some(Token::Term(raw)) if has_unescaped_star(&raw) => {
                let pattern = WildcardPattern::new(&raw)?;
                Ok(FilterExpression::FieldWildcard(path, pattern))
            }
            Some(Token::Term(raw)) => Ok(FilterExpression::FieldEquals(
                path,
                Value::String(unescape(&raw)),
            )),
            Some(token) => Err(EngineError::InvalidFilterDefinition(format!(
                "expected a value for '{path}', found {}",
                describe(&token)
            ))),
            None => Err(EngineError::InvalidFilterDefinition(format!(
                "missing value for '{path}'"
            ))),
        }
    }
}

fn collapse(
    mut operands: Vec<FilterExpression>,
    combine: fn(Vec<FilterExpression>) -> FilterExpression,
) -> FilterExpression {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        combine(operands)
    }
}

fn parse_path(raw: &str) -> Result<FieldPath> {
    FieldPath::parse(&unescape(raw))
        .map_err(|e| EngineError::InvalidFilterDefinition(e.to_string()))
}

fn describe(token: &Token) -> String {
    match token {
        Token::Term(raw) => format!("term '{raw}'"),
        Token::Quoted(text) => format!("string \"{text}\""),
        Token::Colon => "':'".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::LeftParen => "'('".to_string(),
        Token::RightParen => "')'".to_string(),
    }
}

fn has_unescaped_star(raw: &str) -> bool {
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '*' => return true,
            _ => {}
        }
    }
    false
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next().unwrap_or('\\'));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Tokenize a filter string.
pub(crate) fn tokenize_filter(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LeftParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RightParen);
                chars.next();
            }
            ':' => {
                tokens.push(Token::Colon);
                chars.next();
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(EngineError::InvalidFilterDefinition(
                        "unterminated quoted string".to_string(),
                    ));
                }
                tokens.push(Token::Quoted(text));
            }
            c if UNSUPPORTED_OPERATORS.contains(&c) => {
                return Err(EngineError::InvalidFilterDefinition(format!(
                    "unsupported operator '{c}'"
                )));
            }
            _ => {
                let mut raw = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | ':' | '"') {
                        break;
                    }
                    if UNSUPPORTED_OPERATORS.contains(&ch) {
                        return Err(EngineError::InvalidFilterDefinition(format!(
                            "unsupported operator '{ch}'"
                        )));
                    }
                    chars.next();
                    raw.push(ch);
                    if ch == '\\' {
                        if let Some(escaped) = chars.next() {
                            raw.push(escaped);
                        }
                    }
                }

                match raw.as_str() {
                    "AND" | "and" | "&&" => tokens.push(Token::And),
                    "OR" | "or" | "||" => tokens.push(Token::Or),
                    "NOT" | "not" => tokens.push(Token::Not),
                    _ => tokens.push(Token::Term(raw)),
                }
            }
        }
    }

    Ok(tokens)
}
