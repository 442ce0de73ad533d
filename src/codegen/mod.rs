//! Code generation: lower the parsed program into a flat 16-bit `.COM` image.
//!
//! Every expression leaves its value in `ax`; `bx` holds the right-hand
//! operand of a binary operator and `dx` carries the string address for
//! `puts`. Locals live below `bp` and are addressed as `[bp - offset]`.
//! Arguments are pushed right to left and removed by the caller. There is no
//! assembler or linker in between: addresses that are unknown when an
//! instruction is written are left as [`Fixup`]s and patched later.
//!
//! The image starts with a small stub that calls the entry function and
//! hands its return value to DOS as the exit code:
//!
//! ```text
//! mov ax, <entry>
//! call ax
//! mov ah, 4ch
//! int 21h
//! ```

pub mod buffer;
pub mod encoder;
pub mod scope;

mod expr;
mod stmt;

use log::{debug, info};
use snafu::OptionExt;

use crate::error::{CompileResult, MissingEntryPointSnafu};
use crate::parser::{Function, Program};

pub use buffer::{COM_CAPACITY, COM_LOAD_BASE, CodeBuffer, Fixup, FixupWidth};
pub use encoder::{DosFunction, Inst, Reg, encode};
pub use scope::{FunctionTable, Scope, ScopeStack};

/// Layout and entry point of the image being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
  /// Address at which the image is loaded; `0x100` for `.COM` files.
  pub load_base: u16,
  /// Maximum image size in bytes.
  pub capacity: usize,
  /// Function called by the startup stub.
  pub entry_point: String,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      load_base: COM_LOAD_BASE,
      capacity: COM_CAPACITY,
      entry_point: "main".to_string(),
    }
  }
}

/// Compile a whole program into an executable image.
pub fn compile(program: &Program, options: &CompileOptions) -> CompileResult<Vec<u8>> {
  let mut codegen = CodeGen::new(options)?;
  codegen.compile_program(program, &options.entry_point)?;
  Ok(codegen.finish())
}

/// State of one compilation run: the image under construction, the
/// addresses of the functions compiled so far and the active frames.
#[derive(Debug)]
pub struct CodeGen {
  buf: CodeBuffer,
  functions: FunctionTable,
  scopes: ScopeStack,
}

impl CodeGen {
  pub fn new(options: &CompileOptions) -> CompileResult<Self> {
    Ok(Self {
      buf: CodeBuffer::new(options.load_base, options.capacity)?,
      functions: FunctionTable::default(),
      scopes: ScopeStack::default(),
    })
  }

  pub fn buffer(&self) -> &CodeBuffer {
    &self.buf
  }

  pub fn functions(&self) -> &FunctionTable {
    &self.functions
  }

  pub fn finish(self) -> Vec<u8> {
    self.buf.into_bytes()
  }

  fn emit(&mut self, inst: Inst) -> CompileResult<()> {
    self.buf.emit(&encode(inst))
  }

  /// Emit the startup stub, every function in source order, then point the
  /// stub at `entry_point`.
  pub fn compile_program(&mut self, program: &Program, entry_point: &str) -> CompileResult<()> {
    info!(
      "compiling {} function(s), entry point `{entry_point}`",
      program.functions.len()
    );

    let entry = self
      .buf
      .emit_with_fixup(&encode(Inst::MovImm(Reg::Ax, 0)), FixupWidth::Word)?;
    self.emit(Inst::CallReg(Reg::Ax))?;
    self.emit(Inst::DosCall(DosFunction::Exit))?;

    for function in &program.functions {
      self.compile_function(function)?;
    }

    let address = self
      .functions
      .address(entry_point)
      .context(MissingEntryPointSnafu { name: entry_point })?;
    self.buf.patch(entry, address);

    info!("image is {} byte(s)", self.buf.position());
    Ok(())
  }

  pub fn compile_function(&mut self, function: &Function) -> CompileResult<()> {
    let address = self.buf.address();
    self.functions.define(&function.name, address)?;
    debug!("function `{}` at {address:#06x}", function.name);
    if !function.params.is_empty() {
      debug!(
        "`{}`: {} parameter(s) are not bound to frame slots",
        function.name,
        function.params.len()
      );
    }

    self.scopes.push(Scope::new(&function.name));
    self.emit(Inst::Push(Reg::Bp))?;
    self.emit(Inst::MovReg(Reg::Bp, Reg::Sp))?;

    for stmt in &function.body {
      self.compile_stmt(stmt)?;
    }

    // Falling off the end returns whatever `ax` holds.
    self.emit_epilogue()?;

    if let Some(scope) = self.scopes.pop() {
      debug!(
        "function `{}` done, frame of {} byte(s)",
        scope.function(),
        scope.allocated()
      );
    }
    Ok(())
  }

  /// Release the whole frame of the active function, restore the caller's
  /// `bp` and return.
  fn emit_epilogue(&mut self) -> CompileResult<()> {
    let frame = self.scopes.current()?.frame_size();
    self.emit(Inst::AddImm(Reg::Sp, frame))?;
    self.emit(Inst::Pop(Reg::Bp))?;
    self.emit(Inst::Ret)
  }
}
