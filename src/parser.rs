//! Recursive-descent parser producing the program AST.
//!
//! Each binary precedence level is a small helper that gathers every
//! operand and operator it sees into one flattened `Expr::Chain`, so
//! `a - b - c` arrives at the code generator as three operands and two
//! operators rather than a nested tree. Levels that see no operator return
//! their single operand unchanged.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};
use crate::ty::Type;

/// Binary operators the grammar accepts. The code generator lowers only a
/// subset of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Shl,
  Shr,
  BitAnd,
  BitXor,
  BitOr,
  LogicAnd,
  LogicOr,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Subscript,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Mod => "%",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitXor => "^",
      BinaryOp::BitOr => "|",
      BinaryOp::LogicAnd => "&&",
      BinaryOp::LogicOr => "||",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::Subscript => "[]",
    }
  }

  fn from_symbol(symbol: &str) -> Option<Self> {
    let op = match symbol {
      "+" => BinaryOp::Add,
      "-" => BinaryOp::Sub,
      "*" => BinaryOp::Mul,
      "/" => BinaryOp::Div,
      "%" => BinaryOp::Mod,
      "<<" => BinaryOp::Shl,
      ">>" => BinaryOp::Shr,
      "&" => BinaryOp::BitAnd,
      "^" => BinaryOp::BitXor,
      "|" => BinaryOp::BitOr,
      "&&" => BinaryOp::LogicAnd,
      "||" => BinaryOp::LogicOr,
      "==" => BinaryOp::Eq,
      "!=" => BinaryOp::Ne,
      "<" => BinaryOp::Lt,
      "<=" => BinaryOp::Le,
      ">" => BinaryOp::Gt,
      ">=" => BinaryOp::Ge,
      _ => return None,
    };
    Some(op)
  }
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Ident(String),
  Int(i64),
  Str(String),
  Call {
    callee: String,
    args: Vec<Expr>,
  },
  Assign {
    target: String,
    value: Box<Expr>,
  },
  /// `operands[0] operators[0] operands[1] ...`, evaluated left to right.
  Chain {
    operands: Vec<Expr>,
    operators: Vec<BinaryOp>,
  },
}

impl Expr {
  pub fn ident(name: impl Into<String>) -> Self {
    Self::Ident(name.into())
  }

  pub fn int(value: i64) -> Self {
    Self::Int(value)
  }

  pub fn string(text: impl Into<String>) -> Self {
    Self::Str(text.into())
  }

  pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
    Self::Call {
      callee: callee.into(),
      args,
    }
  }

  pub fn assign(target: impl Into<String>, value: Expr) -> Self {
    Self::Assign {
      target: target.into(),
      value: Box::new(value),
    }
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Chain {
      operands: vec![lhs, rhs],
      operators: vec![op],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
  pub cond: Expr,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Declare {
    ty: Type,
    name: String,
  },
  Expr(Expr),
  Return(Expr),
  If {
    branches: Vec<Branch>,
    otherwise: Option<Vec<Stmt>>,
  },
  While {
    cond: Expr,
    body: Vec<Stmt>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
  pub ty: Type,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub return_type: Type,
  pub params: Vec<Param>,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
  pub functions: Vec<Function>,
}

/// Parse a whole translation unit from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);
  let mut functions = Vec::new();

  while !stream.is_eof() {
    functions.push(parse_function(&mut stream)?);
  }

  Ok(Program { functions })
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<Function> {
  let return_type = parse_type(stream)?;
  let name = stream.get_ident()?;
  stream.skip("(")?;

  let mut params = Vec::new();
  if !stream.equal(")") {
    loop {
      let ty = parse_type(stream)?;
      let name = stream.get_ident()?;
      params.push(Param { ty, name });
      if stream.equal(")") {
        break;
      }
      stream.skip(",")?;
    }
  }

  let body = parse_block(stream)?;
  Ok(Function {
    name,
    return_type,
    params,
    body,
  })
}

fn parse_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let mut ty = if stream.equal_keyword("int") {
    Type::int()
  } else if stream.equal_keyword("char") {
    Type::char()
  } else {
    return Err(stream.error_here("expected a type"));
  };

  while stream.equal("*") {
    ty = Type::pointer_to(ty);
  }
  Ok(ty)
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  stream.skip("{")?;
  let mut body = Vec::new();
  while !stream.equal("}") {
    if stream.is_eof() {
      return Err(stream.error_here("expected \"}\" before end of input"));
    }
    body.push(parse_stmt(stream)?);
  }
  Ok(body)
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if stream.peek_keyword("int") || stream.peek_keyword("char") {
    let ty = parse_type(stream)?;
    let name = stream.get_ident()?;
    stream.skip(";")?;
    return Ok(Stmt::Declare { ty, name });
  }

  if stream.equal_keyword("return") {
    let expr = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Return(expr));
  }

  if stream.equal_keyword("if") {
    return parse_if(stream);
  }

  if stream.equal_keyword("while") {
    stream.skip("(")?;
    let cond = parse_expr(stream)?;
    stream.skip(")")?;
    let body = parse_block(stream)?;
    return Ok(Stmt::While { cond, body });
  }

  let expr = parse_expr(stream)?;
  stream.skip(";")?;
  Ok(Stmt::Expr(expr))
}

/// `if` has already been consumed.
fn parse_if(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let mut branches = Vec::new();
  let mut otherwise = None;

  loop {
    stream.skip("(")?;
    let cond = parse_expr(stream)?;
    stream.skip(")")?;
    let body = parse_block(stream)?;
    branches.push(Branch { cond, body });

    if !stream.equal_keyword("else") {
      break;
    }
    if !stream.equal_keyword("if") {
      otherwise = Some(parse_block(stream)?);
      break;
    }
  }

  Ok(Stmt::If {
    branches,
    otherwise,
  })
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_assign(stream)
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<Expr> {
  let loc = stream.loc();
  let node = parse_chain(stream, 0)?;

  if !stream.equal("=") {
    return Ok(node);
  }

  let Expr::Ident(target) = node else {
    return Err(CompileError::at(
      stream.source,
      loc,
      "assignment target must be a variable",
    ));
  };
  let value = parse_chain(stream, 0)?;
  if stream.peek_punct("=") {
    return Err(stream.error_here("chained assignment is not supported"));
  }
  Ok(Expr::assign(target, value))
}

/// Operator levels from loosest to tightest binding.
const LEVELS: [&[&str]; 10] = [
  &["||"],
  &["&&"],
  &["==", "!="],
  &["<", "<=", ">", ">="],
  &["|"],
  &["^"],
  &["&"],
  &["<<", ">>"],
  &["+", "-"],
  &["*", "/", "%"],
];

fn parse_chain(stream: &mut TokenStream, level: usize) -> CompileResult<Expr> {
  let Some(symbols) = LEVELS.get(level) else {
    return parse_postfix(stream);
  };

  let mut operands = vec![parse_chain(stream, level + 1)?];
  let mut operators = Vec::new();

  while let Some(op) = stream
    .peek_punct_text()
    .filter(|text| symbols.contains(text))
    .and_then(BinaryOp::from_symbol)
  {
    stream.advance();
    operators.push(op);
    operands.push(parse_chain(stream, level + 1)?);
  }

  if operators.is_empty() {
    return Ok(operands.remove(0));
  }
  Ok(Expr::Chain {
    operands,
    operators,
  })
}

fn parse_postfix(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_primary(stream)?;

  loop {
    let loc = stream.loc();
    if stream.equal("(") {
      let Expr::Ident(callee) = node else {
        return Err(CompileError::at(
          stream.source,
          loc,
          "only named functions can be called",
        ));
      };
      let mut args = Vec::new();
      if !stream.equal(")") {
        loop {
          args.push(parse_expr(stream)?);
          if stream.equal(")") {
            break;
          }
          stream.skip(",")?;
        }
      }
      node = Expr::call(callee, args);
      continue;
    }

    if stream.equal("[") {
      let index = parse_expr(stream)?;
      stream.skip("]")?;
      node = Expr::binary(BinaryOp::Subscript, node, index);
      continue;
    }

    return Ok(node);
  }
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.equal("(") {
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(node);
  }

  match stream.peek().map(|token| token.kind) {
    Some(TokenKind::Ident) => Ok(Expr::Ident(stream.get_ident()?)),
    Some(TokenKind::Str) => Ok(Expr::Str(stream.get_string()?)),
    _ => Ok(Expr::Int(stream.get_number()?)),
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  fn peek_punct_text(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  fn peek_punct(&self, op: &str) -> bool {
    self.peek_punct_text() == Some(op)
  }

  fn peek_keyword(&self, keyword: &str) -> bool {
    self.peek().is_some_and(|token| {
      token.kind == TokenKind::Keyword && token_text(token, self.source) == keyword
    })
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.peek_punct(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn equal_keyword(&mut self, keyword: &str) -> bool {
    if self.peek_keyword(keyword) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(CompileError::at(
        self.source,
        self.loc(),
        format!("expected \"{s}\", but got \"{got}\""),
      ))
    }
  }

  fn error_here(&self, message: &str) -> CompileError {
    let got = describe_token(self.peek(), self.source);
    CompileError::at(self.source, self.loc(), format!("{message}, but got \"{got}\""))
  }

  /// Parse the current token as an integer literal.
  fn get_number(&mut self) -> CompileResult<i64> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let value = token.value.ok_or_else(|| {
        CompileError::at(
          self.source,
          token.loc,
          "internal error: numeric token missing value",
        )
      })?;
      self.pos += 1;
      return Ok(value);
    }

    Err(self.error_here("expected an expression"))
  }

  fn get_string(&mut self) -> CompileResult<String> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Str
    {
      let literal = token.literal.clone().ok_or_else(|| {
        CompileError::at(
          self.source,
          token.loc,
          "internal error: string token missing contents",
        )
      })?;
      self.pos += 1;
      return Ok(literal);
    }

    Err(self.error_here("expected a string literal"))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<String> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let name = token_text(token, self.source).to_string();
      self.pos += 1;
      return Ok(name);
    }

    Err(self.error_here("expected an identifier"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof))
  }
}
