//! Program assembler.
//!
//! Emits code in the encoding understood by [`decode`](crate::instructions::decode).
//! Jump and branch targets are absolute byte offsets; use [`Assembler::pc`]
//! to capture the offset of the next emitted instruction.

use bytes::Bytes;

use crate::instructions::{opcode, LoadKind, Reg, StoreKind};
use crate::HALT_ADDRESS;

/// Incremental code builder.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    code: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the next instruction.
    pub fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn trap(&mut self) -> &mut Self {
        self.code.push(opcode::TRAP);
        self
    }

    pub fn fallthrough(&mut self) -> &mut Self {
        self.code.push(opcode::FALLTHROUGH);
        self
    }

    pub fn ecalli(&mut self, index: u32) -> &mut Self {
        self.code.push(opcode::ECALLI);
        self.imm(index)
    }

    pub fn load_imm_64(&mut self, dst: Reg, value: u64) -> &mut Self {
        self.code.push(opcode::LOAD_IMM_64);
        self.regs(dst, 0);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn jump(&mut self, target: u32) -> &mut Self {
        self.code.push(opcode::JUMP);
        self.imm(target)
    }

    pub fn jump_ind(&mut self, base: Reg, offset: u32) -> &mut Self {
        self.code.push(opcode::JUMP_IND);
        self.regs(base, 0);
        self.imm(offset)
    }

    pub fn load_imm(&mut self, dst: Reg, value: i32) -> &mut Self {
        self.code.push(opcode::LOAD_IMM);
        self.regs(dst, 0);
        self.imm(value as u32)
    }

    pub fn load(&mut self, kind: LoadKind, dst: Reg, address: u32) -> &mut Self {
        self.code.push(opcode::LOAD_U8 + load_index(kind));
        self.regs(dst, 0);
        self.imm(address)
    }

    pub fn store(&mut self, kind: StoreKind, src: Reg, address: u32) -> &mut Self {
        self.code.push(opcode::STORE_U8 + store_index(kind));
        self.regs(src, 0);
        self.imm(address)
    }

    pub fn move_reg(&mut self, dst: Reg, src: Reg) -> &mut Self {
        self.code.push(opcode::MOVE_REG);
        self.regs(dst, src)
    }

    pub fn sbrk(&mut self, dst: Reg, size: Reg) -> &mut Self {
        self.code.push(opcode::SBRK);
        self.regs(dst, size)
    }

    pub fn store_ind(&mut self, kind: StoreKind, src: Reg, base: Reg, offset: i32) -> &mut Self {
        self.code.push(opcode::STORE_IND_U8 + store_index(kind));
        self.regs(src, base);
        self.imm(offset as u32)
    }

    pub fn load_ind(&mut self, kind: LoadKind, dst: Reg, base: Reg, offset: i32) -> &mut Self {
        self.code.push(opcode::LOAD_IND_U8 + load_index(kind));
        self.regs(dst, base);
        self.imm(offset as u32)
    }

    pub fn add_imm_64(&mut self, dst: Reg, src: Reg, value: i32) -> &mut Self {
        self.code.push(opcode::ADD_IMM_64);
        self.regs(dst, src);
        self.imm(value as u32)
    }

    pub fn branch_eq(&mut self, a: Reg, b: Reg, target: u32) -> &mut Self {
        self.branch(opcode::BRANCH_EQ, a, b, target)
    }

    pub fn branch_ne(&mut self, a: Reg, b: Reg, target: u32) -> &mut Self {
        self.branch(opcode::BRANCH_NE, a, b, target)
    }

    pub fn branch_lt_u(&mut self, a: Reg, b: Reg, target: u32) -> &mut Self {
        self.branch(opcode::BRANCH_LT_U, a, b, target)
    }

    pub fn branch_ge_u(&mut self, a: Reg, b: Reg, target: u32) -> &mut Self {
        self.branch(opcode::BRANCH_GE_U, a, b, target)
    }

    pub fn add_32(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::ADD_32, dst, a, b)
    }

    pub fn sub_32(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::SUB_32, dst, a, b)
    }

    pub fn add_64(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::ADD_64, dst, a, b)
    }

    pub fn sub_64(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::SUB_64, dst, a, b)
    }

    pub fn mul_64(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::MUL_64, dst, a, b)
    }

    pub fn and(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::AND, dst, a, b)
    }

    pub fn xor(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::XOR, dst, a, b)
    }

    pub fn or(&mut self, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.alu(opcode::OR, dst, a, b)
    }

    /// Halt the machine. Clobbers register 0.
    pub fn halt(&mut self) -> &mut Self {
        self.load_imm_64(0, HALT_ADDRESS).jump_ind(0, 0)
    }

    /// Append raw bytes, e.g. to produce malformed code in tests.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn build(&self) -> Bytes {
        Bytes::from(self.code.clone())
    }

    fn branch(&mut self, op: u8, a: Reg, b: Reg, target: u32) -> &mut Self {
        self.code.push(op);
        self.regs(a, b);
        self.imm(target)
    }

    fn alu(&mut self, op: u8, dst: Reg, a: Reg, b: Reg) -> &mut Self {
        self.code.push(op);
        self.regs(a, b);
        self.regs(dst, 0)
    }

    fn regs(&mut self, low: Reg, high: Reg) -> &mut Self {
        self.code.push((low as u8 & 0x0f) | ((high as u8 & 0x0f) << 4));
        self
    }

    fn imm(&mut self, value: u32) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }
}

fn load_index(kind: LoadKind) -> u8 {
    match kind {
        LoadKind::U8 => 0,
        LoadKind::I8 => 1,
        LoadKind::U16 => 2,
        LoadKind::I16 => 3,
        LoadKind::U32 => 4,
        LoadKind::I32 => 5,
        LoadKind::U64 => 6,
    }
}

fn store_index(kind: StoreKind) -> u8 {
    match kind {
        StoreKind::U8 => 0,
        StoreKind::U16 => 1,
        StoreKind::U32 => 2,
        StoreKind::U64 => 3,
    }
}
