//! A tiny 8086 interpreter for the instruction subset the code generator
//! emits, plus the two DOS services it calls. Used by the end-to-end tests
//! to run compiled images instead of comparing bytes.

use crate::codegen::COM_LOAD_BASE;
use crate::codegen::buffer::SEGMENT_SIZE;
use crate::codegen::encoder::STRING_SENTINEL;

const AX: usize = 0;
const DX: usize = 2;
const SP: usize = 4;
const BP: usize = 5;

const STEP_LIMIT: usize = 1_000_000;

/// What a program did before it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
  /// `al` at the `int 21h / ah=4ch` call.
  pub exit_code: u8,
  /// Bytes written through `int 21h / ah=09h`.
  pub output: Vec<u8>,
  /// `ax` at every `ret`, in execution order.
  pub returns: Vec<u16>,
}

impl Outcome {
  pub fn text(&self) -> String {
    self.output.iter().copied().map(char::from).collect()
  }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
  Reg(usize),
  Mem(u16),
}

struct Machine {
  memory: Vec<u8>,
  regs: [u16; 8],
  ip: u16,
  zf: bool,
  sf: bool,
  of: bool,
  output: Vec<u8>,
  returns: Vec<u16>,
}

/// Load `image` at the `.COM` base and run it until it exits through DOS.
///
/// Panics on anything a real CPU would fault on or that the subset does not
/// cover, and on programs that do not exit within a fixed step budget.
pub fn run(image: &[u8]) -> Outcome {
  let base = usize::from(COM_LOAD_BASE);
  assert!(base + image.len() <= SEGMENT_SIZE, "image does not fit the segment");
  let mut machine = Machine {
    memory: vec![0; SEGMENT_SIZE],
    regs: [0; 8],
    ip: COM_LOAD_BASE,
    zf: false,
    sf: false,
    of: false,
    output: Vec::new(),
    returns: Vec::new(),
  };
  machine.memory[base..base + image.len()].copy_from_slice(image);
  // DOS leaves a zero word on the stack for a bare `ret`.
  machine.regs[SP] = 0xfffe;

  for _ in 0..STEP_LIMIT {
    if let Some(exit_code) = machine.step() {
      return Outcome {
        exit_code,
        output: machine.output,
        returns: machine.returns,
      };
    }
  }
  panic!("program did not exit within {STEP_LIMIT} steps");
}

impl Machine {
  fn byte(&self, addr: u16) -> u8 {
    self.memory[usize::from(addr)]
  }

  fn word(&self, addr: u16) -> u16 {
    u16::from_le_bytes([self.byte(addr), self.byte(addr.wrapping_add(1))])
  }

  fn set_word(&mut self, addr: u16, value: u16) {
    let [lo, hi] = value.to_le_bytes();
    self.memory[usize::from(addr)] = lo;
    self.memory[usize::from(addr.wrapping_add(1))] = hi;
  }

  fn fetch8(&mut self) -> u8 {
    let value = self.byte(self.ip);
    self.ip = self.ip.wrapping_add(1);
    value
  }

  fn fetch16(&mut self) -> u16 {
    let value = self.word(self.ip);
    self.ip = self.ip.wrapping_add(2);
    value
  }

  fn push(&mut self, value: u16) {
    self.regs[SP] = self.regs[SP].wrapping_sub(2);
    self.set_word(self.regs[SP], value);
  }

  fn pop(&mut self) -> u16 {
    let value = self.word(self.regs[SP]);
    self.regs[SP] = self.regs[SP].wrapping_add(2);
    value
  }

  /// Decode a ModRM byte into its reg field and r/m operand.
  fn modrm(&mut self) -> (usize, Operand) {
    let modrm = self.fetch8();
    let mode = modrm >> 6;
    let reg = usize::from((modrm >> 3) & 7);
    let rm = modrm & 7;
    let operand = match (mode, rm) {
      (0b11, _) => Operand::Reg(usize::from(rm)),
      (0b00, 0b110) => Operand::Mem(self.fetch16()),
      (0b01, 0b110) => {
        let disp = self.fetch8() as i8;
        Operand::Mem(self.regs[BP].wrapping_add_signed(i16::from(disp)))
      }
      (0b10, 0b110) => {
        let disp = self.fetch16();
        Operand::Mem(self.regs[BP].wrapping_add(disp))
      }
      _ => panic!("unsupported addressing mode {modrm:#04x}"),
    };
    (reg, operand)
  }

  fn read(&self, operand: Operand) -> u16 {
    match operand {
      Operand::Reg(reg) => self.regs[reg],
      Operand::Mem(addr) => self.word(addr),
    }
  }

  fn write(&mut self, operand: Operand, value: u16) {
    match operand {
      Operand::Reg(reg) => self.regs[reg] = value,
      Operand::Mem(addr) => self.set_word(addr, value),
    }
  }

  fn set_logic_flags(&mut self, result: u16) {
    self.zf = result == 0;
    self.sf = result & 0x8000 != 0;
    self.of = false;
  }

  fn add(&mut self, lhs: u16, rhs: u16) -> u16 {
    let result = lhs.wrapping_add(rhs);
    self.set_logic_flags(result);
    self.of = (!(lhs ^ rhs) & (lhs ^ result)) & 0x8000 != 0;
    result
  }

  fn sub(&mut self, lhs: u16, rhs: u16) -> u16 {
    let result = lhs.wrapping_sub(rhs);
    self.set_logic_flags(result);
    self.of = ((lhs ^ rhs) & (lhs ^ result)) & 0x8000 != 0;
    result
  }

  fn condition(&self, opcode: u8) -> bool {
    match opcode {
      0x74 => self.zf,
      0x75 => !self.zf,
      0x7c => self.sf != self.of,
      0x7d => self.sf == self.of,
      0x7e => self.zf || self.sf != self.of,
      0x7f => !self.zf && self.sf == self.of,
      _ => unreachable!(),
    }
  }

  fn jump(&mut self, rel: i16) {
    self.ip = self.ip.wrapping_add_signed(rel);
  }

  /// Execute one instruction; `Some(code)` once the program exits.
  fn step(&mut self) -> Option<u8> {
    let at = self.ip;
    let opcode = self.fetch8();
    match opcode {
      0xb8..=0xbf => {
        let value = self.fetch16();
        self.regs[usize::from(opcode - 0xb8)] = value;
      }
      // mov ah, imm8
      0xb4 => {
        let value = self.fetch8();
        self.regs[AX] = (self.regs[AX] & 0x00ff) | (u16::from(value) << 8);
      }
      0x8b => {
        let (reg, rm) = self.modrm();
        self.regs[reg] = self.read(rm);
      }
      0x89 => {
        let (reg, rm) = self.modrm();
        self.write(rm, self.regs[reg]);
      }
      0xa1 => {
        let addr = self.fetch16();
        self.regs[AX] = self.word(addr);
      }
      0xa3 => {
        let addr = self.fetch16();
        self.set_word(addr, self.regs[AX]);
      }
      0x50..=0x57 => self.push(self.regs[usize::from(opcode - 0x50)]),
      0x58..=0x5f => {
        let value = self.pop();
        self.regs[usize::from(opcode - 0x58)] = value;
      }
      0xff => {
        let (ext, rm) = self.modrm();
        let target = self.read(rm);
        match ext {
          2 => {
            self.push(self.ip);
            self.ip = target;
          }
          4 => self.ip = target,
          6 => self.push(target),
          _ => panic!("unsupported ff /{ext} at {at:#06x}"),
        }
      }
      0x81 | 0x83 => {
        let (ext, rm) = self.modrm();
        let imm = if opcode == 0x83 {
          i16::from(self.fetch8() as i8) as u16
        } else {
          self.fetch16()
        };
        let lhs = self.read(rm);
        let result = match ext {
          0 => self.add(lhs, imm),
          5 => self.sub(lhs, imm),
          _ => panic!("unsupported {opcode:#04x} /{ext} at {at:#06x}"),
        };
        self.write(rm, result);
      }
      0x05 => {
        let imm = self.fetch16();
        self.regs[AX] = self.add(self.regs[AX], imm);
      }
      0x2d => {
        let imm = self.fetch16();
        self.regs[AX] = self.sub(self.regs[AX], imm);
      }
      0x01 | 0x29 | 0x31 | 0x39 | 0x85 => {
        let (reg, rm) = self.modrm();
        let lhs = self.read(rm);
        let rhs = self.regs[reg];
        match opcode {
          0x01 => {
            let result = self.add(lhs, rhs);
            self.write(rm, result);
          }
          0x29 => {
            let result = self.sub(lhs, rhs);
            self.write(rm, result);
          }
          0x31 => {
            let result = lhs ^ rhs;
            self.set_logic_flags(result);
            self.write(rm, result);
          }
          0x39 => {
            self.sub(lhs, rhs);
          }
          _ => self.set_logic_flags(lhs & rhs),
        }
      }
      0x0f => {
        let second = self.fetch8();
        assert_eq!(second, 0xaf, "unsupported 0f {second:#04x} at {at:#06x}");
        let (reg, rm) = self.modrm();
        let product = i32::from(self.regs[reg] as i16) * i32::from(self.read(rm) as i16);
        self.regs[reg] = product as u16;
      }
      0x99 => {
        self.regs[DX] = if self.regs[AX] & 0x8000 != 0 { 0xffff } else { 0 };
      }
      0xf7 => {
        let (ext, rm) = self.modrm();
        assert_eq!(ext, 7, "unsupported f7 /{ext} at {at:#06x}");
        let divisor = i32::from(self.read(rm) as i16);
        assert_ne!(divisor, 0, "divide error at {at:#06x}");
        let dividend = ((u32::from(self.regs[DX]) << 16) | u32::from(self.regs[AX])) as i32;
        let quotient = i16::try_from(dividend / divisor)
          .unwrap_or_else(|_| panic!("divide overflow at {at:#06x}"));
        self.regs[AX] = quotient as u16;
        self.regs[DX] = (dividend % divisor) as u16;
      }
      0x74 | 0x75 | 0x7c..=0x7f => {
        let rel = self.fetch8() as i8;
        if self.condition(opcode) {
          self.jump(i16::from(rel));
        }
      }
      0xeb => {
        let rel = self.fetch8() as i8;
        self.jump(i16::from(rel));
      }
      0xe9 => {
        let rel = self.fetch16();
        self.ip = self.ip.wrapping_add(rel);
      }
      0xc3 => {
        self.returns.push(self.regs[AX]);
        self.ip = self.pop();
      }
      0xcd => {
        let vector = self.fetch8();
        assert_eq!(vector, 0x21, "unsupported interrupt {vector:#04x} at {at:#06x}");
        return self.dos();
      }
      _ => panic!("unsupported opcode {opcode:#04x} at {at:#06x}"),
    }
    None
  }

  fn dos(&mut self) -> Option<u8> {
    let [al, ah] = self.regs[AX].to_le_bytes();
    match ah {
      0x09 => {
        let mut addr = self.regs[DX];
        loop {
          let byte = self.byte(addr);
          if byte == STRING_SENTINEL {
            break;
          }
          self.output.push(byte);
          addr = addr.wrapping_add(1);
        }
        None
      }
      0x4c => Some(al),
      _ => panic!("unsupported DOS function {ah:#04x}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  fn runs_a_hand_written_program() {
    let image = [
      0xb8, 0x07, 0x01, // mov ax, msg
      0x89, 0xc2, // mov dx, ax
      0xeb, 0x03, b'o', b'k', b'$', // jmp over msg
      0xb4, 0x09, 0xcd, 0x21, // print
      0xb8, 0x2a, 0x00, // mov ax, 42
      0xb4, 0x4c, 0xcd, 0x21, // exit
    ];
    let outcome = run(&image);
    assert_eq!(outcome.exit_code, 42);
    assert_eq!(outcome.text(), "ok");
    assert!(outcome.returns.is_empty());
  }

  #[rstest]
  #[case(0x7c, 0xfffe, 0x0001, true)] // -2 < 1
  #[case(0x7f, 0x8000, 0x7fff, false)] // -32768 > 32767
  #[case(0x7d, 0x7fff, 0x8000, true)] // 32767 >= -32768
  #[case(0x7e, 0x0003, 0x0003, true)]
  fn signed_conditions_follow_the_overflow_flag(
    #[case] jcc: u8,
    #[case] lhs: u16,
    #[case] rhs: u16,
    #[case] taken: bool,
  ) {
    let [l0, l1] = lhs.to_le_bytes();
    let [r0, r1] = rhs.to_le_bytes();
    let image = [
      0xb8, l0, l1, 0xbb, r0, r1, // ax, bx
      0x39, 0xd8, // cmp ax, bx
      jcc, 0x05, //
      0xb8, 0x00, 0x00, // mov ax, 0
      0xeb, 0x03, //
      0xb8, 0x01, 0x00, // mov ax, 1
      0xb4, 0x4c, 0xcd, 0x21,
    ];
    assert_eq!(run(&image).exit_code, u8::from(taken));
  }
}
