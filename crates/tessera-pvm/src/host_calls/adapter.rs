//! Views of interpreter state handed to host-call handlers.
//!
//! Registers are exposed unsigned only. Memory addresses come straight from
//! 64-bit registers, so every access rechecks the range against
//! [`MEMORY_SIZE`] before touching the pages.

use crate::error::MemoryError;
use crate::memory::Memory;
use crate::registers::Registers;
use crate::MEMORY_SIZE;

/// Register access for host calls.
#[derive(Debug)]
pub struct HostCallRegisters<'a> {
    registers: &'a mut Registers,
}

impl<'a> HostCallRegisters<'a> {
    pub fn new(registers: &'a mut Registers) -> Self {
        Self { registers }
    }

    pub fn get(&self, index: usize) -> u64 {
        self.registers.get_u64(index)
    }

    pub fn set(&mut self, index: usize, value: u64) {
        self.registers.set_u64(index, value);
    }
}

/// Memory access for host calls.
#[derive(Debug)]
pub struct HostCallMemory<'a> {
    memory: &'a mut Memory,
}

impl<'a> HostCallMemory<'a> {
    pub fn new(memory: &'a mut Memory) -> Self {
        Self { memory }
    }

    pub fn store_from(&mut self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.is_empty() {
            return Ok(());
        }
        check_range(address, bytes.len() as u64)?;
        self.memory.store_from(address, bytes)
    }

    pub fn load_into(&self, buffer: &mut [u8], address: u64) -> Result<(), MemoryError> {
        if buffer.is_empty() {
            return Ok(());
        }
        check_range(address, buffer.len() as u64)?;
        self.memory.load_into(buffer, address)
    }

    pub fn is_writeable(&self, address: u64, length: u64) -> bool {
        length == 0 || (check_range(address, length).is_ok() && self.memory.is_writeable(address, length))
    }

    pub fn is_readable(&self, address: u64, length: u64) -> bool {
        length == 0 || (check_range(address, length).is_ok() && self.memory.is_readable(address, length))
    }
}

fn check_range(address: u64, length: u64) -> Result<(), MemoryError> {
    match address.checked_add(length) {
        Some(end) if end <= MEMORY_SIZE => Ok(()),
        _ => Err(MemoryError::OutOfBounds { address, length }),
    }
}
