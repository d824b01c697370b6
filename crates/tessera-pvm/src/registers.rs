//! General purpose register file.
//!
//! Registers hold raw 64-bit patterns. The signed accessors reinterpret the
//! same bits as two's complement, so writing through one view and reading
//! through the other never loses information.
//!
//! Register indices come from decoded instructions, which are always in
//! range; an index outside `0..NO_OF_REGISTERS` panics.

use crate::NO_OF_REGISTERS;

/// The 13 registers of a PVM instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    regs: [u64; NO_OF_REGISTERS],
}

impl Registers {
    /// All registers zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers preloaded with `values`.
    pub fn from_values(values: [u64; NO_OF_REGISTERS]) -> Self {
        Self { regs: values }
    }

    pub fn get_u64(&self, index: usize) -> u64 {
        self.regs[index]
    }

    pub fn get_i64(&self, index: usize) -> i64 {
        self.regs[index] as i64
    }

    pub fn set_u64(&mut self, index: usize, value: u64) {
        self.regs[index] = value;
    }

    pub fn set_i64(&mut self, index: usize, value: i64) {
        self.regs[index] = value as u64;
    }

    /// Low 32 bits, zero-extended view.
    pub fn get_lower_u32(&self, index: usize) -> u32 {
        self.regs[index] as u32
    }

    /// Low 32 bits, signed view.
    pub fn get_lower_i32(&self, index: usize) -> i32 {
        self.regs[index] as u32 as i32
    }

    /// Store a 32-bit result sign-extended to the full register width.
    pub fn set_u32_sign_extended(&mut self, index: usize, value: u32) {
        self.regs[index] = value as i32 as i64 as u64;
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        self.regs = [0; NO_OF_REGISTERS];
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.regs
    }
}
