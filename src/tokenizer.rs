//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising operators,
//! keywords, identifiers and literals. Multi-character punctuators are
//! matched before single-character ones to avoid ambiguity, and comments are
//! dropped together with whitespace.

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Punctuator,
  Keyword,
  Ident,
  Num,
  Str,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  /// Decoded contents of a string literal, escapes already resolved.
  pub literal: Option<String>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      literal: None,
      loc,
      len,
    }
  }

  fn string(loc: usize, len: usize, literal: String) -> Self {
    Self {
      literal: Some(literal),
      ..Self::new(TokenKind::Str, loc, len, None)
    }
  }
}

const KEYWORDS: [&str; 6] = ["int", "char", "return", "if", "else", "while"];

const MULTI_CHAR_PUNCTUATORS: [&str; 8] = ["==", "!=", "<=", ">=", "<<", ">>", "&&", "||"];

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if input[i..].starts_with("//") {
      i = input[i..].find('\n').map_or(bytes.len(), |end| i + end);
      continue;
    }

    if input[i..].starts_with("/*") {
      let Some(end) = input[i + 2..].find("*/") else {
        return Err(CompileError::at(input, i, "unclosed block comment"));
      };
      i += end + 4;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      // `0` is a token on its own; other numbers cannot start with it
      if c == b'0' && i < bytes.len() && bytes[i].is_ascii_digit() {
        return Err(CompileError::at(
          input,
          i,
          "invalid number: leading zeros are not allowed",
        ));
      }
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i64>()
        .map_err(|err| CompileError::at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      i += 1;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let kind = if KEYWORDS.contains(&&input[start..i]) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, start, i - start, None));
      continue;
    }

    if c == b'"' {
      let (literal, end) = read_string_literal(input, i)?;
      tokens.push(Token::string(i, end - i, literal));
      i = end;
      continue;
    }

    if let Some(op) = MULTI_CHAR_PUNCTUATORS
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len(), None));
      i += op.len();
      continue;
    }

    if matches!(
      c,
      b'+'
        | b'-'
        | b'*'
        | b'/'
        | b'%'
        | b'&'
        | b'^'
        | b'|'
        | b'<'
        | b'>'
        | b'='
        | b'('
        | b')'
        | b'['
        | b']'
        | b'{'
        | b'}'
        | b','
        | b';'
    ) {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1, None));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::at(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  Ok(tokens)
}

/// Decode the string literal whose opening quote sits at `start`, returning
/// its contents and the offset just past the closing quote.
fn read_string_literal(input: &str, start: usize) -> CompileResult<(String, usize)> {
  let mut literal = String::new();
  let mut chars = input[start + 1..].char_indices();

  while let Some((offset, ch)) = chars.next() {
    let pos = start + 1 + offset;
    match ch {
      '"' => return Ok((literal, pos + 1)),
      '\n' => break,
      '\\' => {
        let escaped = match chars.next() {
          Some((_, 'n')) => '\n',
          Some((_, 't')) => '\t',
          Some((_, 'r')) => '\r',
          Some((_, '0')) => '\0',
          Some((_, '\\')) => '\\',
          Some((_, '"')) => '"',
          Some((_, other)) => {
            return Err(CompileError::at(
              input,
              pos,
              format!("unknown escape sequence '\\{other}'"),
            ));
          }
          None => break,
        };
        literal.push(escaped);
      }
      _ => literal.push(ch),
    }
  }

  Err(CompileError::at(input, start, "unterminated string literal"))
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
