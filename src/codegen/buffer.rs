//! Append-only code image with a fixed capacity and explicit fixups.

use snafu::ensure;

use crate::error::{BufferOverflowSnafu, CompileResult, InvalidLayoutSnafu};

/// Offset at which DOS loads a `.COM` image inside its segment.
pub const COM_LOAD_BASE: u16 = 0x100;

/// Bytes addressable in one real-mode segment.
pub const SEGMENT_SIZE: usize = 0x10000;

/// Largest image that fits above the load base.
pub const COM_CAPACITY: usize = SEGMENT_SIZE - COM_LOAD_BASE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupWidth {
  Byte,
  Word,
}

impl FixupWidth {
  pub fn size(self) -> usize {
    match self {
      FixupWidth::Byte => 1,
      FixupWidth::Word => 2,
    }
  }
}

/// A placeholder written earlier that still has to receive its real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an unresolved fixup leaves a placeholder in the image"]
pub struct Fixup {
  pub at: usize,
  pub width: FixupWidth,
}

#[derive(Debug, Clone)]
pub struct CodeBuffer {
  bytes: Vec<u8>,
  load_base: u16,
  capacity: usize,
}

impl CodeBuffer {
  pub fn new(load_base: u16, capacity: usize) -> CompileResult<Self> {
    ensure!(
      usize::from(load_base) + capacity <= SEGMENT_SIZE,
      InvalidLayoutSnafu {
        load_base,
        capacity
      }
    );
    Ok(Self {
      bytes: Vec::new(),
      load_base,
      capacity,
    })
  }

  /// Current length of the image, which is also the offset of the next byte.
  pub fn position(&self) -> usize {
    self.bytes.len()
  }

  /// Logical address of the next byte once the image is loaded.
  pub fn address(&self) -> u16 {
    self.address_of(self.position())
  }

  /// Logical address of an image offset; wraps modulo the segment size.
  pub fn address_of(&self, position: usize) -> u16 {
    self.load_base.wrapping_add((position % SEGMENT_SIZE) as u16)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Append `bytes`, or fail without writing anything if they do not fit.
  pub fn emit(&mut self, bytes: &[u8]) -> CompileResult<()> {
    let needed = self.bytes.len() + bytes.len();
    ensure!(
      needed <= self.capacity,
      BufferOverflowSnafu {
        needed,
        capacity: self.capacity
      }
    );
    self.bytes.extend_from_slice(bytes);
    Ok(())
  }

  /// Append an instruction whose last `width` bytes are a placeholder.
  pub fn emit_with_fixup(&mut self, bytes: &[u8], width: FixupWidth) -> CompileResult<Fixup> {
    debug_assert!(bytes.len() >= width.size());
    self.emit(bytes)?;
    Ok(Fixup {
      at: self.position() - width.size(),
      width,
    })
  }

  /// Overwrite exactly the bytes covered by `fixup` with `value`,
  /// little-endian. A byte fixup takes the low byte of `value`.
  pub fn patch(&mut self, fixup: Fixup, value: u16) {
    log::trace!("patch {:#06x} <- {value:#06x}", fixup.at);
    let encoded = value.to_le_bytes();
    let width = fixup.width.size();
    self.bytes[fixup.at..fixup.at + width].copy_from_slice(&encoded[..width]);
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CompileError;
  use rstest::rstest;

  #[rstest]
  fn addresses_are_offset_by_the_load_base() {
    let mut buf = CodeBuffer::new(COM_LOAD_BASE, COM_CAPACITY).unwrap();
    assert_eq!(buf.address(), 0x100);
    buf.emit(&[0x90, 0x90, 0x90]).unwrap();
    assert_eq!(buf.position(), 3);
    assert_eq!(buf.address(), 0x103);
    assert_eq!(buf.address_of(0x10), 0x110);
  }

  #[rstest]
  fn patch_touches_only_the_fixup_bytes() {
    let mut buf = CodeBuffer::new(COM_LOAD_BASE, 64).unwrap();
    buf.emit(&[0xaa]).unwrap();
    let word = buf.emit_with_fixup(&[0xb8, 0x00, 0x00], FixupWidth::Word).unwrap();
    let byte = buf.emit_with_fixup(&[0x74, 0x00], FixupWidth::Byte).unwrap();
    buf.emit(&[0xbb]).unwrap();
    assert_eq!(word.at, 2);
    assert_eq!(byte.at, 5);

    buf.patch(word, 0x1234);
    buf.patch(byte, 0x0042);
    assert_eq!(buf.as_bytes(), &[0xaa, 0xb8, 0x34, 0x12, 0x74, 0x42, 0xbb]);
  }

  #[rstest]
  fn overflow_is_an_error_and_leaves_the_buffer_untouched() {
    let mut buf = CodeBuffer::new(COM_LOAD_BASE, 4).unwrap();
    buf.emit(&[1, 2, 3]).unwrap();
    let err = buf.emit(&[4, 5]).unwrap_err();
    assert!(matches!(
      err,
      CompileError::BufferOverflow {
        needed: 5,
        capacity: 4
      }
    ));
    assert_eq!(buf.as_bytes(), &[1, 2, 3]);
    buf.emit(&[4]).unwrap();
    assert_eq!(buf.position(), 4);
  }

  #[rstest]
  fn full_com_image_is_accepted() {
    let mut buf = CodeBuffer::new(COM_LOAD_BASE, COM_CAPACITY).unwrap();
    buf.emit(&vec![0x90; COM_CAPACITY]).unwrap();
    assert!(buf.emit(&[0x90]).is_err());
  }

  #[rstest]
  #[case(0x100, 0xff00, true)]
  #[case(0x100, 0xff01, false)]
  #[case(0, SEGMENT_SIZE, true)]
  fn layout_must_fit_one_segment(
    #[case] load_base: u16,
    #[case] capacity: usize,
    #[case] ok: bool,
  ) {
    assert_eq!(CodeBuffer::new(load_base, capacity).is_ok(), ok);
  }
}
