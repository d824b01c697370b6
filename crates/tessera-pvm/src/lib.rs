//! Tessera PVM - execution core for JAM service code.
//!
//! This crate provides:
//! - Register file and paged guest memory
//! - Gas metering
//! - The instruction interpreter and its status machine
//! - Host-call adapter, registry and dispatch loop
//! - A pool of reusable interpreter instances

pub mod assembler;
pub mod config;
pub mod error;
pub mod gas_metering;
pub mod host_calls;
pub mod instructions;
pub mod interpreter;
pub mod memory;
pub mod memory_builder;
pub mod pool;
pub mod registers;

pub use assembler::Assembler;
pub use config::PvmConfig;
pub use error::{DecodeError, GasError, MemoryBuilderError, MemoryError, PvmError};
pub use gas_metering::{Gas, GasCost, GasCounter, SmallGas, MAX_GAS};
pub use host_calls::{
    ExecutionOutcome, ExecutionResult, HostCallHandler, HostCallIndex, HostCallMemory,
    HostCallRegisters, HostCallRegistry, HostCallResult, HostCalls, PvmExecution,
};
pub use interpreter::{Interpreter, Status};
pub use memory::{Memory, PageAccess, PageNumber};
pub use memory_builder::MemoryBuilder;
pub use pool::InterpreterPool;
pub use registers::Registers;

/// Number of general purpose registers.
pub const NO_OF_REGISTERS: usize = 13;

/// Size of the guest address space (4 GB).
pub const MEMORY_SIZE: u64 = 1 << 32;

/// Size of a memory page (4 KB).
pub const PAGE_SIZE: u32 = 1 << 12;

/// Pages at the bottom of the address space that can never be accessed.
pub const RESERVED_NUMBER_OF_PAGES: u32 = 16;

/// First address above the reserved region.
pub const RESERVED_MEMORY: u64 = RESERVED_NUMBER_OF_PAGES as u64 * PAGE_SIZE as u64;

/// Jumping to this address halts the machine.
pub const HALT_ADDRESS: u64 = (1 << 32) - (1 << 16);
