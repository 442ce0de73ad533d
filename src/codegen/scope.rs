//! Frame bookkeeping: per-function variable slots and the global function
//! table.
//!
//! A function owns exactly one [`Scope`]. Branch bodies do not open a scope
//! of their own, so every declaration in a function adds to the same
//! running total and nothing is ever released before the epilogue.

use rustc_hash::FxHashMap;
use snafu::{OptionExt, ensure};

use crate::error::{
  CompileResult, DuplicateFunctionSnafu, FrameTooLargeSnafu, NoActiveScopeSnafu,
  RedeclarationSnafu, UndefinedIdentifierSnafu,
};

#[derive(Debug, Clone)]
pub struct Scope {
  function: String,
  allocated: u16,
  slots: FxHashMap<String, u16>,
}

impl Scope {
  pub fn new(function: impl Into<String>) -> Self {
    Self {
      function: function.into(),
      allocated: 0,
      slots: FxHashMap::default(),
    }
  }

  /// Name of the function this frame belongs to.
  pub fn function(&self) -> &str {
    &self.function
  }

  /// Bytes reserved below `bp` so far.
  pub fn allocated(&self) -> u16 {
    self.allocated
  }

  /// The running total as the immediate of the epilogue's `add sp`.
  pub fn frame_size(&self) -> i16 {
    // declare() never lets the total leave i16
    i16::try_from(self.allocated).unwrap_or(i16::MAX)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.slots.contains_key(name)
  }

  /// Fails with `Redeclaration` if `name` already has a slot.
  pub fn ensure_undeclared(&self, name: &str) -> CompileResult<()> {
    ensure!(
      !self.contains(name),
      RedeclarationSnafu {
        name,
        function: &self.function
      }
    );
    Ok(())
  }

  /// Reserve `size` more bytes and bind `name` to the new running total.
  /// Returns the variable's offset below `bp`.
  pub fn declare(&mut self, name: &str, size: u16) -> CompileResult<u16> {
    self.ensure_undeclared(name)?;
    let offset = self
      .allocated
      .checked_add(size)
      .filter(|total| i16::try_from(*total).is_ok())
      .context(FrameTooLargeSnafu {
        function: &self.function,
      })?;
    self.allocated = offset;
    self.slots.insert(name.to_string(), offset);
    Ok(offset)
  }

  /// `bp`-relative displacement of a declared variable.
  pub fn displacement(&self, name: &str) -> CompileResult<i16> {
    let offset = self.slots.get(name).context(UndefinedIdentifierSnafu {
      name,
      function: &self.function,
    })?;
    // declare() keeps every offset within i16
    Ok(-(*offset as i16))
  }
}

/// Scopes nest in strict LIFO order. Functions cannot nest today, so the
/// depth never exceeds one.
#[derive(Debug, Default)]
pub struct ScopeStack {
  scopes: Vec<Scope>,
}

impl ScopeStack {
  pub fn push(&mut self, scope: Scope) {
    self.scopes.push(scope);
  }

  pub fn pop(&mut self) -> Option<Scope> {
    self.scopes.pop()
  }

  pub fn depth(&self) -> usize {
    self.scopes.len()
  }

  pub fn current(&self) -> CompileResult<&Scope> {
    self.scopes.last().context(NoActiveScopeSnafu)
  }

  pub fn current_mut(&mut self) -> CompileResult<&mut Scope> {
    self.scopes.last_mut().context(NoActiveScopeSnafu)
  }
}

/// Function name to entry address. Filled in source order, so a function
/// is only callable from itself and from functions that follow it.
#[derive(Debug, Default)]
pub struct FunctionTable {
  addresses: FxHashMap<String, u16>,
}

impl FunctionTable {
  pub fn define(&mut self, name: &str, address: u16) -> CompileResult<()> {
    ensure!(
      !self.addresses.contains_key(name),
      DuplicateFunctionSnafu { name }
    );
    self.addresses.insert(name.to_string(), address);
    Ok(())
  }

  pub fn address(&self, name: &str) -> Option<u16> {
    self.addresses.get(name).copied()
  }
}
