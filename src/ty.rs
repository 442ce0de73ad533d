use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
  Int,
  Char,
}

/// A basic kind plus the number of `*` that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
  pub kind: TypeKind,
  pub pointer_depth: u32,
}

impl Type {
  pub fn int() -> Self {
    Self {
      kind: TypeKind::Int,
      pointer_depth: 0,
    }
  }

  pub fn char() -> Self {
    Self {
      kind: TypeKind::Char,
      pointer_depth: 0,
    }
  }

  pub fn pointer_to(base: Type) -> Self {
    Self {
      pointer_depth: base.pointer_depth + 1,
      ..base
    }
  }

  pub fn is_integer(&self) -> bool {
    self.pointer_depth == 0 && matches!(self.kind, TypeKind::Int)
  }

  pub fn is_pointer(&self) -> bool {
    self.pointer_depth > 0
  }

  /// Bytes of stack a value of this type occupies, or `None` for the
  /// one-byte `char` cell, which the code generator cannot address.
  pub fn size(&self) -> Option<u8> {
    if self.is_pointer() {
      return Some(2);
    }
    match self.kind {
      TypeKind::Int => Some(2),
      TypeKind::Char => None,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let base = match self.kind {
      TypeKind::Int => "int",
      TypeKind::Char => "char",
    };
    write!(f, "{base}")?;
    for _ in 0..self.pointer_depth {
      write!(f, "*")?;
    }
    Ok(())
  }
}

pub fn pointer_to(base: Type) -> Type {
  Type::pointer_to(base)
}
