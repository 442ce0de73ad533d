//! Shared error utilities used across the compilation pipeline.
//!
//! Front-end diagnostics are rendered in a style reminiscent of chibicc,
//! pointing at the offending byte with a caret. Code-generation errors name
//! the identifier or construct at fault together with the function that
//! contained it. Every error aborts the whole compilation.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  WithLocation {
    expr_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("undefined identifier `{name}` in function `{function}`"))]
  UndefinedIdentifier { name: String, function: String },

  #[snafu(display("`{name}` is declared twice in function `{function}`"))]
  Redeclaration { name: String, function: String },

  #[snafu(display("`{name}`: storage class `{ty}` is not supported"))]
  UnsupportedStorageClass { name: String, ty: String },

  #[snafu(display("`{statement}` statement is not supported (in function `{function}`)"))]
  UnsupportedStatement {
    statement: &'static str,
    function: String,
  },

  #[snafu(display("operator `{op}` is not supported (in function `{function}`)"))]
  UnsupportedOperator { op: &'static str, function: String },

  #[snafu(display(
    "call to `{name}` in function `{function}` cannot be resolved; functions must be defined before they are called"
  ))]
  UnresolvedCallee { name: String, function: String },

  #[snafu(display(
    "expression chain has {operands} operand(s) but {operators} operator(s) (in function `{function}`)"
  ))]
  MalformedChain {
    operands: usize,
    operators: usize,
    function: String,
  },

  #[snafu(display("`{name}` expects {expected} argument(s) but got {found}"))]
  BuiltinArity {
    name: &'static str,
    expected: usize,
    found: usize,
  },

  #[snafu(display("function `{name}` is defined more than once"))]
  DuplicateFunction { name: String },

  #[snafu(display("entry point `{name}` is not defined"))]
  MissingEntryPoint { name: String },

  #[snafu(display("integer literal {value} does not fit in 16 bits"))]
  IntegerOutOfRange { value: i64 },

  #[snafu(display("character {ch:?} cannot be encoded as a single byte"))]
  UnencodableCharacter { ch: char },

  #[snafu(display("stack frame of function `{function}` exceeds 32767 bytes"))]
  FrameTooLarge { function: String },

  #[snafu(display(
    "branch body of {size} bytes in function `{function}` exceeds the 127-byte short jump range"
  ))]
  BranchTooLarge { size: usize, function: String },

  #[snafu(display("code image needs {needed} bytes but only {capacity} are addressable"))]
  BufferOverflow { needed: usize, capacity: usize },

  #[snafu(display(
    "load base {load_base:#06x} with capacity {capacity:#x} does not fit in a 64 KiB segment"
  ))]
  InvalidLayout { load_base: u16, capacity: usize },

  #[snafu(display("expression compiled outside of any function"))]
  NoActiveScope,
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let line_start = expr[..loc.min(expr.len())]
      .rfind('\n')
      .map_or(0, |idx| idx + 1);
    let line_end = expr[line_start..]
      .find('\n')
      .map_or(expr.len(), |idx| line_start + idx);
    let line = &expr[line_start..line_end];
    let expr_line = format!("'{line}'");
    let safe_loc = loc.clamp(line_start, line_end) - line_start;
    let char_offset = line[..safe_loc].chars().count() + 1; // account for opening quote
    let marker = format!("{}^", " ".repeat(char_offset));
    Self::WithLocation {
      expr_line,
      marker,
      message: message.into(),
    }
  }
}
