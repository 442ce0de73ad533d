//! 8086 instruction encoding for the small subset the code generator emits.
//!
//! Everything here is context-free: an [`Inst`] maps to the same bytes no
//! matter where it lands in the image. Operand widths are picked from the
//! value itself, so a frame slot within `[-128, 127]` of `bp` gets the
//! one-byte displacement form and anything further gets the two-byte form.

/// The six 16-bit registers the compiler ever names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
  Ax,
  Bx,
  Cx,
  Dx,
  Bp,
  Sp,
}

impl Reg {
  /// Register number used in opcodes and ModRM fields.
  pub fn code(self) -> u8 {
    match self {
      Reg::Ax => 0,
      Reg::Cx => 1,
      Reg::Dx => 2,
      Reg::Bx => 3,
      Reg::Sp => 4,
      Reg::Bp => 5,
    }
  }
}

/// Signed condition codes used by relational operators and branch guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
  Equal,
  NotEqual,
  Less,
  GreaterOrEqual,
  LessOrEqual,
  Greater,
}

impl Cond {
  fn opcode(self) -> u8 {
    match self {
      Cond::Equal => 0x74,
      Cond::NotEqual => 0x75,
      Cond::Less => 0x7c,
      Cond::GreaterOrEqual => 0x7d,
      Cond::LessOrEqual => 0x7e,
      Cond::Greater => 0x7f,
    }
  }
}

/// DOS services reached through `int 21h`. The function number goes in `ah`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DosFunction {
  /// Write the `$`-terminated string at `ds:dx` to standard output.
  PrintString,
  /// Terminate the program with the exit code in `al`.
  Exit,
}

impl DosFunction {
  pub fn number(self) -> u8 {
    match self {
      DosFunction::PrintString => 0x09,
      DosFunction::Exit => 0x4c,
    }
  }
}

/// Terminator scanned for by [`DosFunction::PrintString`].
pub const STRING_SENTINEL: u8 = b'$';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
  /// `mov r, imm16`, always the full-width immediate.
  MovImm(Reg, u16),
  /// `mov r, word [addr]`
  LoadAbs(Reg, u16),
  /// `mov word [addr], r`
  StoreAbs(Reg, u16),
  /// `mov r, word [bp + disp]`
  LoadFrame(Reg, i16),
  /// `mov word [bp + disp], r`
  StoreFrame(Reg, i16),
  /// `push word [bp + disp]`
  PushFrame(i16),
  Push(Reg),
  Pop(Reg),
  AddImm(Reg, i16),
  SubImm(Reg, i16),
  /// `mov dst, src`
  MovReg(Reg, Reg),
  Add(Reg, Reg),
  Sub(Reg, Reg),
  IMul(Reg, Reg),
  /// Sign-extend `ax` into `dx:ax`.
  Cwd,
  /// Signed divide of `dx:ax`; quotient in `ax`.
  IDiv(Reg),
  Cmp(Reg, Reg),
  Xor(Reg, Reg),
  Test(Reg, Reg),
  Jcc(Cond, i8),
  JmpShort(i8),
  /// Displacement wraps modulo 64 KiB, like the CPU's `ip`.
  JmpNear(u16),
  CallReg(Reg),
  JmpReg(Reg),
  Ret,
  DosCall(DosFunction),
}

fn fits_i8(value: i16) -> bool {
  i8::try_from(value).is_ok()
}

fn imm16(value: u16) -> [u8; 2] {
  value.to_le_bytes()
}

fn with_word(mut bytes: Vec<u8>, value: u16) -> Vec<u8> {
  bytes.extend_from_slice(&imm16(value));
  bytes
}

/// ModRM byte for a register-to-register operation.
fn modrm_reg(reg_field: u8, rm: Reg) -> u8 {
  0xc0 | (reg_field << 3) | rm.code()
}

/// `[disp16]` with no base register.
fn modrm_abs(reg_field: u8) -> u8 {
  0x06 | (reg_field << 3)
}

/// `[bp + disp]` operand: ModRM byte followed by the narrowest displacement.
fn bp_operand(reg_field: u8, disp: i16) -> Vec<u8> {
  if fits_i8(disp) {
    vec![0x46 | (reg_field << 3), disp.to_le_bytes()[0]]
  } else {
    let [lo, hi] = disp.to_le_bytes();
    vec![0x86 | (reg_field << 3), lo, hi]
  }
}

/// Group-1 arithmetic with an immediate (`/0` add, `/5` sub).
fn arith_imm(ext: u8, ax_short_form: u8, reg: Reg, value: i16) -> Vec<u8> {
  let [lo, hi] = value.to_le_bytes();
  if fits_i8(value) {
    vec![0x83, modrm_reg(ext, reg), lo]
  } else if reg == Reg::Ax {
    vec![ax_short_form, lo, hi]
  } else {
    vec![0x81, modrm_reg(ext, reg), lo, hi]
  }
}

/// Encode a single instruction.
pub fn encode(inst: Inst) -> Vec<u8> {
  match inst {
    Inst::MovImm(reg, value) => {
      let [lo, hi] = imm16(value);
      vec![0xb8 + reg.code(), lo, hi]
    }
    // ax has dedicated moffs forms
    Inst::LoadAbs(Reg::Ax, addr) => with_word(vec![0xa1], addr),
    Inst::LoadAbs(reg, addr) => with_word(vec![0x8b, modrm_abs(reg.code())], addr),
    Inst::StoreAbs(Reg::Ax, addr) => with_word(vec![0xa3], addr),
    Inst::StoreAbs(reg, addr) => with_word(vec![0x89, modrm_abs(reg.code())], addr),
    Inst::LoadFrame(reg, disp) => [vec![0x8b], bp_operand(reg.code(), disp)].concat(),
    Inst::StoreFrame(reg, disp) => [vec![0x89], bp_operand(reg.code(), disp)].concat(),
    Inst::PushFrame(disp) => [vec![0xff], bp_operand(6, disp)].concat(),
    Inst::Push(reg) => vec![0x50 + reg.code()],
    Inst::Pop(reg) => vec![0x58 + reg.code()],
    Inst::AddImm(reg, value) => arith_imm(0, 0x05, reg, value),
    Inst::SubImm(reg, value) => arith_imm(5, 0x2d, reg, value),
    Inst::MovReg(dst, src) => vec![0x89, modrm_reg(src.code(), dst)],
    Inst::Add(dst, src) => vec![0x01, modrm_reg(src.code(), dst)],
    Inst::Sub(dst, src) => vec![0x29, modrm_reg(src.code(), dst)],
    // imul r16, r/m16 puts the destination in the reg field
    Inst::IMul(dst, src) => vec![0x0f, 0xaf, modrm_reg(dst.code(), src)],
    Inst::Cwd => vec![0x99],
    Inst::IDiv(divisor) => vec![0xf7, modrm_reg(7, divisor)],
    Inst::Cmp(lhs, rhs) => vec![0x39, modrm_reg(rhs.code(), lhs)],
    Inst::Xor(dst, src) => vec![0x31, modrm_reg(src.code(), dst)],
    Inst::Test(lhs, rhs) => vec![0x85, modrm_reg(rhs.code(), lhs)],
    Inst::Jcc(cond, rel) => vec![cond.opcode(), rel.to_le_bytes()[0]],
    Inst::JmpShort(rel) => vec![0xeb, rel.to_le_bytes()[0]],
    Inst::JmpNear(rel) => {
      let [lo, hi] = imm16(rel);
      vec![0xe9, lo, hi]
    }
    Inst::CallReg(reg) => vec![0xff, modrm_reg(2, reg)],
    Inst::JmpReg(reg) => vec![0xff, modrm_reg(4, reg)],
    Inst::Ret => vec![0xc3],
    // mov ah, fn; int 21h
    Inst::DosCall(function) => vec![0xb4, function.number(), 0xcd, 0x21],
  }
}
