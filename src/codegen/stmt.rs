//! Statement lowering and if-chains.
//!
//! An if/else-if/else chain becomes a run of guarded blocks:
//!
//! ```text
//!     <cond 1>
//!     test ax, ax
//!     jz   next_1          ; rel8, patched once the block is emitted
//!     <body 1>
//!     mov  ax, exit        ; abs16, patched after the whole chain
//!     jmp  ax
//! next_1:
//!     ...
//!     <else body>
//! exit:
//! ```

use log::trace;
use snafu::OptionExt;

use super::CodeGen;
use super::buffer::FixupWidth;
use super::encoder::{Cond, Inst, Reg, encode};
use crate::error::{
  BranchTooLargeSnafu, CompileResult, UnsupportedStatementSnafu, UnsupportedStorageClassSnafu,
};
use crate::parser::{Branch, Stmt};
use crate::ty::Type;

impl CodeGen {
  pub(super) fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    trace!("{stmt:?}");
    match stmt {
      Stmt::Declare { ty, name } => self.compile_declare(ty, name),
      Stmt::Expr(expr) => self.compile_expr(expr),
      Stmt::Return(expr) => {
        self.compile_expr(expr)?;
        self.emit_epilogue()
      }
      Stmt::If {
        branches,
        otherwise,
      } => self.compile_if(branches, otherwise.as_deref()),
      Stmt::While { .. } => UnsupportedStatementSnafu {
        statement: "while",
        function: self.scopes.current()?.function(),
      }
      .fail(),
    }
  }

  fn compile_declare(&mut self, ty: &Type, name: &str) -> CompileResult<()> {
    let scope = self.scopes.current_mut()?;
    scope.ensure_undeclared(name)?;
    let size = ty.size().context(UnsupportedStorageClassSnafu {
      name,
      ty: ty.to_string(),
    })?;
    scope.declare(name, u16::from(size))?;
    // the stack grows down, so reserving means subtracting
    self.emit(Inst::SubImm(Reg::Sp, i16::from(size)))
  }

  fn compile_if(&mut self, branches: &[Branch], otherwise: Option<&[Stmt]>) -> CompileResult<()> {
    let mut exits = Vec::with_capacity(branches.len());

    for branch in branches {
      self.compile_expr(&branch.cond)?;
      self.emit(Inst::Test(Reg::Ax, Reg::Ax))?;
      // jz
      let skip = self
        .buf
        .emit_with_fixup(&encode(Inst::Jcc(Cond::Equal, 0)), FixupWidth::Byte)?;

      let begin = self.buf.position();
      for stmt in &branch.body {
        self.compile_stmt(stmt)?;
      }
      let exit = self
        .buf
        .emit_with_fixup(&encode(Inst::MovImm(Reg::Ax, 0)), FixupWidth::Word)?;
      self.emit(Inst::JmpReg(Reg::Ax))?;
      exits.push(exit);

      let size = self.buf.position() - begin;
      let rel = match u8::try_from(size) {
        Ok(rel) if rel <= i8::MAX as u8 => rel,
        _ => {
          return BranchTooLargeSnafu {
            size,
            function: self.scopes.current()?.function(),
          }
          .fail();
        }
      };
      self.buf.patch(skip, u16::from(rel));
    }

    for stmt in otherwise.unwrap_or_default() {
      self.compile_stmt(stmt)?;
    }

    let exit_address = self.buf.address();
    for exit in exits {
      self.buf.patch(exit, exit_address);
    }
    Ok(())
  }
}
