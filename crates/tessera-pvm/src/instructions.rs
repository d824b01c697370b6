//! Instruction decoding.
//!
//! Code is a flat byte string and the program counter is a byte offset into
//! it. Every instruction starts with an opcode byte followed by operands whose
//! layout depends on the opcode:
//!
//! | class              | operands                                         |
//! |--------------------|--------------------------------------------------|
//! | none               | -                                                |
//! | imm                | imm32                                            |
//! | reg, imm64         | reg byte, imm64                                  |
//! | reg, imm           | reg byte, imm32                                  |
//! | two regs           | reg byte (low nibble dst, high nibble src)       |
//! | two regs, imm      | reg byte (low nibble a, high nibble b), imm32    |
//! | three regs         | reg byte (low a, high b), reg byte (low dst)     |
//!
//! Immediates are little endian. Register nibbles above 12 are clamped to 12.

use crate::error::DecodeError;
use crate::NO_OF_REGISTERS;

/// Opcode numbers of the supported instructions.
pub mod opcode {
    pub const TRAP: u8 = 0;
    pub const FALLTHROUGH: u8 = 1;
    pub const ECALLI: u8 = 10;
    pub const LOAD_IMM_64: u8 = 20;
    pub const JUMP: u8 = 40;
    pub const JUMP_IND: u8 = 50;
    pub const LOAD_IMM: u8 = 51;
    pub const LOAD_U8: u8 = 52;
    pub const LOAD_I8: u8 = 53;
    pub const LOAD_U16: u8 = 54;
    pub const LOAD_I16: u8 = 55;
    pub const LOAD_U32: u8 = 56;
    pub const LOAD_I32: u8 = 57;
    pub const LOAD_U64: u8 = 58;
    pub const STORE_U8: u8 = 59;
    pub const STORE_U16: u8 = 60;
    pub const STORE_U32: u8 = 61;
    pub const STORE_U64: u8 = 62;
    pub const MOVE_REG: u8 = 100;
    pub const SBRK: u8 = 101;
    pub const STORE_IND_U8: u8 = 120;
    pub const STORE_IND_U16: u8 = 121;
    pub const STORE_IND_U32: u8 = 122;
    pub const STORE_IND_U64: u8 = 123;
    pub const LOAD_IND_U8: u8 = 124;
    pub const LOAD_IND_I8: u8 = 125;
    pub const LOAD_IND_U16: u8 = 126;
    pub const LOAD_IND_I16: u8 = 127;
    pub const LOAD_IND_U32: u8 = 128;
    pub const LOAD_IND_I32: u8 = 129;
    pub const LOAD_IND_U64: u8 = 130;
    pub const ADD_IMM_64: u8 = 149;
    pub const BRANCH_EQ: u8 = 170;
    pub const BRANCH_NE: u8 = 171;
    pub const BRANCH_LT_U: u8 = 172;
    pub const BRANCH_GE_U: u8 = 173;
    pub const ADD_32: u8 = 190;
    pub const SUB_32: u8 = 191;
    pub const ADD_64: u8 = 200;
    pub const SUB_64: u8 = 201;
    pub const MUL_64: u8 = 202;
    pub const AND: u8 = 210;
    pub const XOR: u8 = 211;
    pub const OR: u8 = 212;
}

/// Register index, always below [`NO_OF_REGISTERS`].
pub type Reg = usize;

/// Width and extension of a memory load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
}

impl LoadKind {
    pub fn width(self) -> usize {
        match self {
            LoadKind::U8 | LoadKind::I8 => 1,
            LoadKind::U16 | LoadKind::I16 => 2,
            LoadKind::U32 | LoadKind::I32 => 4,
            LoadKind::U64 => 8,
        }
    }

    /// Extend a zero-padded little endian value to 64 bits.
    pub fn extend(self, raw: u64) -> u64 {
        match self {
            LoadKind::I8 => raw as u8 as i8 as i64 as u64,
            LoadKind::I16 => raw as u16 as i16 as i64 as u64,
            LoadKind::I32 => raw as u32 as i32 as i64 as u64,
            _ => raw,
        }
    }
}

/// Width of a memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    U8,
    U16,
    U32,
    U64,
}

impl StoreKind {
    pub fn width(self) -> usize {
        match self {
            StoreKind::U8 => 1,
            StoreKind::U16 => 2,
            StoreKind::U32 => 4,
            StoreKind::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCondition {
    Eq,
    Ne,
    LtU,
    GeU,
}

impl BranchCondition {
    pub fn holds(self, a: u64, b: u64) -> bool {
        match self {
            BranchCondition::Eq => a == b,
            BranchCondition::Ne => a != b,
            BranchCondition::LtU => a < b,
            BranchCondition::GeU => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add32,
    Sub32,
    Add64,
    Sub64,
    Mul64,
    And,
    Xor,
    Or,
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Trap,
    Fallthrough,
    Ecalli(u32),
    LoadImm64 { dst: Reg, value: u64 },
    Jump { target: u32 },
    JumpInd { base: Reg, offset: u32 },
    LoadImm { dst: Reg, value: i32 },
    Load { kind: LoadKind, dst: Reg, address: u32 },
    Store { kind: StoreKind, src: Reg, address: u32 },
    MoveReg { dst: Reg, src: Reg },
    Sbrk { dst: Reg, size: Reg },
    StoreInd { kind: StoreKind, src: Reg, base: Reg, offset: i32 },
    LoadInd { kind: LoadKind, dst: Reg, base: Reg, offset: i32 },
    AddImm64 { dst: Reg, src: Reg, value: i32 },
    Branch { condition: BranchCondition, a: Reg, b: Reg, target: u32 },
    Alu { op: AluOp, dst: Reg, a: Reg, b: Reg },
}

/// Decode the instruction at `pc`, returning it with the pc of the next one.
pub fn decode(code: &[u8], pc: u32) -> Result<(Instruction, u32), DecodeError> {
    use opcode::*;

    let mut operands = Operands::new(code, pc)?;
    let op = operands.byte()?;

    let instruction = match op {
        TRAP => Instruction::Trap,
        FALLTHROUGH => Instruction::Fallthrough,
        ECALLI => Instruction::Ecalli(operands.u32()?),
        LOAD_IMM_64 => {
            let (dst, _) = operands.regs()?;
            Instruction::LoadImm64 {
                dst,
                value: operands.u64()?,
            }
        }
        JUMP => Instruction::Jump {
            target: operands.u32()?,
        },
        JUMP_IND => {
            let (base, _) = operands.regs()?;
            Instruction::JumpInd {
                base,
                offset: operands.u32()?,
            }
        }
        LOAD_IMM => {
            let (dst, _) = operands.regs()?;
            Instruction::LoadImm {
                dst,
                value: operands.u32()? as i32,
            }
        }
        LOAD_U8..=LOAD_U64 => {
            let (dst, _) = operands.regs()?;
            Instruction::Load {
                kind: load_kind(op - LOAD_U8),
                dst,
                address: operands.u32()?,
            }
        }
        STORE_U8..=STORE_U64 => {
            let (src, _) = operands.regs()?;
            Instruction::Store {
                kind: store_kind(op - STORE_U8),
                src,
                address: operands.u32()?,
            }
        }
        MOVE_REG => {
            let (dst, src) = operands.regs()?;
            Instruction::MoveReg { dst, src }
        }
        SBRK => {
            let (dst, size) = operands.regs()?;
            Instruction::Sbrk { dst, size }
        }
        STORE_IND_U8..=STORE_IND_U64 => {
            let (src, base) = operands.regs()?;
            Instruction::StoreInd {
                kind: store_kind(op - STORE_IND_U8),
                src,
                base,
                offset: operands.u32()? as i32,
            }
        }
        LOAD_IND_U8..=LOAD_IND_U64 => {
            let (dst, base) = operands.regs()?;
            Instruction::LoadInd {
                kind: load_kind(op - LOAD_IND_U8),
                dst,
                base,
                offset: operands.u32()? as i32,
            }
        }
        ADD_IMM_64 => {
            let (dst, src) = operands.regs()?;
            Instruction::AddImm64 {
                dst,
                src,
                value: operands.u32()? as i32,
            }
        }
        BRANCH_EQ..=BRANCH_GE_U => {
            let (a, b) = operands.regs()?;
            let condition = match op {
                BRANCH_EQ => BranchCondition::Eq,
                BRANCH_NE => BranchCondition::Ne,
                BRANCH_LT_U => BranchCondition::LtU,
                _ => BranchCondition::GeU,
            };
            Instruction::Branch {
                condition,
                a,
                b,
                target: operands.u32()?,
            }
        }
        ADD_32 | SUB_32 | ADD_64 | SUB_64 | MUL_64 | AND | XOR | OR => {
            let (a, b) = operands.regs()?;
            let (dst, _) = operands.regs()?;
            let op = match op {
                ADD_32 => AluOp::Add32,
                SUB_32 => AluOp::Sub32,
                ADD_64 => AluOp::Add64,
                SUB_64 => AluOp::Sub64,
                MUL_64 => AluOp::Mul64,
                AND => AluOp::And,
                XOR => AluOp::Xor,
                _ => AluOp::Or,
            };
            Instruction::Alu { op, dst, a, b }
        }
        unknown => {
            return Err(DecodeError::UnknownOpcode {
                opcode: unknown,
                pc,
            })
        }
    };

    Ok((instruction, operands.next_pc()))
}

fn load_kind(index: u8) -> LoadKind {
    match index {
        0 => LoadKind::U8,
        1 => LoadKind::I8,
        2 => LoadKind::U16,
        3 => LoadKind::I16,
        4 => LoadKind::U32,
        5 => LoadKind::I32,
        _ => LoadKind::U64,
    }
}

fn store_kind(index: u8) -> StoreKind {
    match index {
        0 => StoreKind::U8,
        1 => StoreKind::U16,
        2 => StoreKind::U32,
        _ => StoreKind::U64,
    }
}

/// Cursor over the operand bytes of one instruction.
struct Operands<'a> {
    code: &'a [u8],
    pc: u32,
    cursor: usize,
}

impl<'a> Operands<'a> {
    fn new(code: &'a [u8], pc: u32) -> Result<Self, DecodeError> {
        if pc as usize >= code.len() {
            return Err(DecodeError::PcOutOfRange {
                pc,
                len: code.len(),
            });
        }
        Ok(Self {
            code,
            pc,
            cursor: pc as usize,
        })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self
            .code
            .get(self.cursor..self.cursor + N)
            .ok_or(DecodeError::Truncated { pc: self.pc })?;
        self.cursor += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn regs(&mut self) -> Result<(Reg, Reg), DecodeError> {
        let byte = self.byte()?;
        Ok((clamp_reg(byte & 0x0f), clamp_reg(byte >> 4)))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn next_pc(&self) -> u32 {
        self.cursor as u32
    }
}

fn clamp_reg(nibble: u8) -> Reg {
    (nibble as usize).min(NO_OF_REGISTERS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Assembler;

    #[test]
    fn test_decode_sequence() {
        let code = Assembler::new()
            .load_imm(1, -5)
            .add_64(3, 1, 2)
            .ecalli(42)
            .trap()
            .build();

        let (first, pc) = decode(&code, 0).unwrap();
        assert_eq!(first, Instruction::LoadImm { dst: 1, value: -5 });
        assert_eq!(pc, 6);

        let (second, pc) = decode(&code, pc).unwrap();
        assert_eq!(
            second,
            Instruction::Alu {
                op: AluOp::Add64,
                dst: 3,
                a: 1,
                b: 2
            }
        );

        let (third, pc) = decode(&code, pc).unwrap();
        assert_eq!(third, Instruction::Ecalli(42));

        let (fourth, pc) = decode(&code, pc).unwrap();
        assert_eq!(fourth, Instruction::Trap);
        assert!(matches!(
            decode(&code, pc),
            Err(DecodeError::PcOutOfRange { .. })
        ));
    }

    #[test]
    fn test_register_nibbles_are_clamped() {
        let code = [opcode::MOVE_REG, 0xff];
        let (instruction, _) = decode(&code, 0).unwrap();
        assert_eq!(instruction, Instruction::MoveReg { dst: 12, src: 12 });
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            decode(&[255], 0),
            Err(DecodeError::UnknownOpcode { opcode: 255, pc: 0 })
        );
    }

    #[test]
    fn test_truncated_operands() {
        let code = [opcode::ECALLI, 1, 0];
        assert_eq!(decode(&code, 0), Err(DecodeError::Truncated { pc: 0 }));
    }

    #[test]
    fn test_load_kinds() {
        assert_eq!(LoadKind::I8.extend(0x80), 0xffff_ffff_ffff_ff80);
        assert_eq!(LoadKind::U8.extend(0x80), 0x80);
        assert_eq!(LoadKind::I16.extend(0x8000), 0xffff_ffff_ffff_8000);
        assert_eq!(LoadKind::I32.extend(0x7fff_ffff), 0x7fff_ffff);
        assert_eq!(LoadKind::U64.width(), 8);
        assert_eq!(StoreKind::U16.width(), 2);
    }

    #[test]
    fn test_decode_memory_ops() {
        let code = Assembler::new()
            .load_ind(LoadKind::I16, 2, 3, -4)
            .store(StoreKind::U32, 5, 0x2_0000)
            .build();

        let (load, pc) = decode(&code, 0).unwrap();
        assert_eq!(
            load,
            Instruction::LoadInd {
                kind: LoadKind::I16,
                dst: 2,
                base: 3,
                offset: -4
            }
        );
        let (store, _) = decode(&code, pc).unwrap();
        assert_eq!(
            store,
            Instruction::Store {
                kind: StoreKind::U32,
                src: 5,
                address: 0x2_0000
            }
        );
    }
}
