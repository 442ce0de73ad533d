//! Expression lowering. Whatever the shape of the expression, its value
//! ends up in `ax`.

use log::trace;
use snafu::{OptionExt, ensure};

use super::CodeGen;
use super::encoder::{Cond, DosFunction, Inst, Reg, STRING_SENTINEL, encode};
use crate::error::{
  BufferOverflowSnafu, BuiltinAritySnafu, CompileResult, IntegerOutOfRangeSnafu,
  MalformedChainSnafu, UnencodableCharacterSnafu, UnresolvedCalleeSnafu,
  UnsupportedOperatorSnafu,
};
use crate::parser::{BinaryOp, Expr};

/// The one built-in: prints a `$`-terminated string through DOS.
pub const PUTS: &str = "puts";

/// Leaf operands that can be loaded into any register directly.
#[derive(Debug, Clone, Copy)]
enum Operand<'a> {
  Var(&'a str),
  Int(i64),
  Str(&'a str),
}

impl<'a> Operand<'a> {
  fn of(expr: &'a Expr) -> Option<Self> {
    match expr {
      Expr::Ident(name) => Some(Operand::Var(name)),
      Expr::Int(value) => Some(Operand::Int(*value)),
      Expr::Str(text) => Some(Operand::Str(text)),
      _ => None,
    }
  }
}

/// Integer literals are accepted as unsigned or signed 16-bit values.
fn immediate(value: i64) -> CompileResult<u16> {
  u16::try_from(value)
    .ok()
    .or_else(|| i16::try_from(value).ok().map(|signed| signed as u16))
    .context(IntegerOutOfRangeSnafu { value })
}

/// Instructions computing `ax := ax <op> bx`, or `None` for operators the
/// code generator does not lower.
pub fn lower_operator(op: BinaryOp) -> Option<Vec<Inst>> {
  let insts = match op {
    BinaryOp::Add => vec![Inst::Add(Reg::Ax, Reg::Bx)],
    BinaryOp::Sub => vec![Inst::Sub(Reg::Ax, Reg::Bx)],
    BinaryOp::Mul => vec![Inst::IMul(Reg::Ax, Reg::Bx)],
    BinaryOp::Div => vec![Inst::Cwd, Inst::IDiv(Reg::Bx)],
    BinaryOp::Eq => compare(Cond::Equal),
    BinaryOp::Ne => compare(Cond::NotEqual),
    BinaryOp::Gt => compare(Cond::Greater),
    BinaryOp::Lt => compare(Cond::Less),
    BinaryOp::Ge => compare(Cond::GreaterOrEqual),
    BinaryOp::Le => compare(Cond::LessOrEqual),
    BinaryOp::Mod
    | BinaryOp::Shl
    | BinaryOp::Shr
    | BinaryOp::BitAnd
    | BinaryOp::BitXor
    | BinaryOp::BitOr
    | BinaryOp::LogicAnd
    | BinaryOp::LogicOr
    | BinaryOp::Subscript => return None,
  };
  Some(insts)
}

/// Assume true, then clear `ax` unless the condition holds.
fn compare(cond: Cond) -> Vec<Inst> {
  let clear = Inst::Xor(Reg::Ax, Reg::Ax);
  let skip = encode(clear).len() as i8;
  vec![
    Inst::Cmp(Reg::Ax, Reg::Bx),
    Inst::MovImm(Reg::Ax, 1),
    Inst::Jcc(cond, skip),
    clear,
  ]
}

impl CodeGen {
  pub(super) fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Ident(name) => self.mov_operand(Reg::Ax, Operand::Var(name)),
      Expr::Int(value) => self.mov_operand(Reg::Ax, Operand::Int(*value)),
      Expr::Str(text) => self.mov_operand(Reg::Ax, Operand::Str(text)),
      Expr::Call { callee, args } => self.compile_call(callee, args),
      Expr::Assign { target, value } => self.compile_assign(target, value),
      Expr::Chain {
        operands,
        operators,
      } => self.compile_chain(operands, operators),
    }
  }

  fn mov_operand(&mut self, reg: Reg, operand: Operand<'_>) -> CompileResult<()> {
    match operand {
      Operand::Var(name) => {
        let disp = self.scopes.current()?.displacement(name)?;
        self.emit(Inst::LoadFrame(reg, disp))
      }
      Operand::Int(value) => self.emit(Inst::MovImm(reg, immediate(value)?)),
      Operand::Str(text) => self.emit_string_literal(reg, text),
    }
  }

  /// Lay the literal out in the instruction stream behind a jump that skips
  /// it, then load its address into `reg`.
  fn emit_string_literal(&mut self, reg: Reg, text: &str) -> CompileResult<()> {
    let mut bytes = text
      .chars()
      .map(|ch| u8::try_from(ch).ok().context(UnencodableCharacterSnafu { ch }))
      .collect::<CompileResult<Vec<u8>>>()?;
    bytes.push(STRING_SENTINEL);

    let skip = bytes.len();
    let jump = match i8::try_from(skip) {
      Ok(rel) => Inst::JmpShort(rel),
      Err(_) => {
        let rel = u16::try_from(skip).ok().context(BufferOverflowSnafu {
          needed: self.buf.position() + skip,
          capacity: self.buf.capacity(),
        })?;
        Inst::JmpNear(rel)
      }
    };
    self.emit(jump)?;

    let address = self.buf.address();
    trace!("string literal of {} byte(s) at {address:#06x}", bytes.len());
    self.buf.emit(&bytes)?;
    self.emit(Inst::MovImm(reg, address))
  }

  fn compile_call(&mut self, callee: &str, args: &[Expr]) -> CompileResult<()> {
    if callee == PUTS {
      let [message] = args else {
        return BuiltinAritySnafu {
          name: PUTS,
          expected: 1_usize,
          found: args.len(),
        }
        .fail();
      };
      self.compile_expr(message)?;
      self.emit(Inst::MovReg(Reg::Dx, Reg::Ax))?;
      return self.emit(Inst::DosCall(DosFunction::PrintString));
    }

    let scope = self.scopes.current()?;
    let address = self
      .functions
      .address(callee)
      .context(UnresolvedCalleeSnafu {
        name: callee,
        function: scope.function(),
      })?;

    for arg in args.iter().rev() {
      self.compile_expr(arg)?;
      self.emit(Inst::Push(Reg::Ax))?;
    }
    self.emit(Inst::MovImm(Reg::Ax, address))?;
    self.emit(Inst::CallReg(Reg::Ax))?;

    // Each pushed argument costs code bytes too, so the image overflows
    // long before this count could leave i16.
    let cleanup = i16::try_from(args.len() * 2).unwrap_or(i16::MAX);
    self.emit(Inst::AddImm(Reg::Sp, cleanup))
  }

  fn compile_assign(&mut self, target: &str, value: &Expr) -> CompileResult<()> {
    let disp = self.scopes.current()?.displacement(target)?;
    self.compile_expr(value)?;
    self.emit(Inst::StoreFrame(Reg::Ax, disp))
  }

  fn compile_chain(&mut self, operands: &[Expr], operators: &[BinaryOp]) -> CompileResult<()> {
    let scope = self.scopes.current()?;
    ensure!(
      operands.len() == operators.len() + 1,
      MalformedChainSnafu {
        operands: operands.len(),
        operators: operators.len(),
        function: scope.function(),
      }
    );

    let (first, rest) = operands.split_first().context(MalformedChainSnafu {
      operands: 0_usize,
      operators: operators.len(),
      function: scope.function(),
    })?;
    self.compile_expr(first)?;

    for (op, operand) in operators.iter().zip(rest) {
      match Operand::of(operand) {
        Some(leaf) => self.mov_operand(Reg::Bx, leaf)?,
        None => {
          self.emit(Inst::Push(Reg::Ax))?;
          self.compile_expr(operand)?;
          self.emit(Inst::MovReg(Reg::Bx, Reg::Ax))?;
          self.emit(Inst::Pop(Reg::Ax))?;
        }
      }

      let insts = match lower_operator(*op) {
        Some(insts) => insts,
        None => {
          return UnsupportedOperatorSnafu {
            op: op.symbol(),
            function: self.scopes.current()?.function(),
          }
          .fail();
        }
      };
      for inst in insts {
        self.emit(inst)?;
      }
    }
    Ok(())
  }
}
