//! Host calls.
//!
//! A program requests a host call with `ecalli n`. The interpreter stops in
//! [`Status::HostCall`](crate::Status::HostCall) and the [`HostCalls`]
//! dispatcher looks up the handler registered for `n`, charges its gas,
//! awaits it and resumes the interpreter. Handlers only see the interpreter
//! through the bounds-checked views in [`adapter`].

pub mod adapter;
pub mod dispatcher;
pub mod registry;

pub use adapter::{HostCallMemory, HostCallRegisters};
pub use dispatcher::{ExecutionOutcome, ExecutionResult, HostCalls};
pub use registry::{HostCallHandler, HostCallRegistry, PvmExecution};

use crate::gas_metering::SmallGas;

/// Index selecting a host call, the immediate of `ecalli`.
pub type HostCallIndex = u32;

/// Register receiving a host call's result code.
pub const RESULT_REGISTER: usize = 7;

/// Register holding the address of the output on halt.
pub const HALT_ADDRESS_REGISTER: usize = 10;

/// Register holding the length of the output on halt.
pub const HALT_LENGTH_REGISTER: usize = 11;

/// Gas charged for a host call nobody registered.
pub const UNKNOWN_HOST_CALL_GAS: SmallGas = 10;

/// Result codes written into [`RESULT_REGISTER`].
#[derive(Debug, Clone, Copy)]
pub struct HostCallResult;

impl HostCallResult {
    /// The item does not exist.
    pub const NONE: u64 = u64::MAX;
    /// Name unknown.
    pub const WHAT: u64 = u64::MAX - 1;
    /// Memory index not accessible for reading or writing.
    pub const OOB: u64 = u64::MAX - 2;
    /// Index unknown.
    pub const WHO: u64 = u64::MAX - 3;
    /// Storage full.
    pub const FULL: u64 = u64::MAX - 4;
    /// Core index unknown.
    pub const CORE: u64 = u64::MAX - 5;
    /// Insufficient funds.
    pub const CASH: u64 = u64::MAX - 6;
    /// Gas limit too low.
    pub const LOW: u64 = u64::MAX - 7;
    /// The item is already solicited or cannot be forgotten.
    pub const HUH: u64 = u64::MAX - 8;
    /// General success.
    pub const OK: u64 = 0;
}
