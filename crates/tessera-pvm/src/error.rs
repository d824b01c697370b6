use thiserror::Error;

/// Errors raised by guest memory accesses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The access range does not fit in the 32-bit address space.
    #[error("Out of bounds access: address {address:#x}, length {length}")]
    OutOfBounds { address: u64, length: u64 },

    /// A touched page lacks the required access. `address` is the first
    /// inaccessible byte of the range.
    #[error("Page fault at {address:#x}")]
    PageFault { address: u32 },
}

/// Errors raised while staging the initial memory layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryBuilderError {
    #[error("Range {start:#x}..{end:#x} is not page aligned")]
    NotPageAligned { start: u64, end: u64 },

    #[error("Invalid range {start:#x}..{end:#x}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Range {start:#x}..{end:#x} overlaps the reserved region")]
    ReservedRegion { start: u64, end: u64 },

    #[error("Page {page} is already configured")]
    PageAlreadyConfigured { page: u32 },

    #[error("Contents too long: {size} > {capacity}")]
    ContentsTooLong { size: usize, capacity: u64 },

    #[error("Data at {address:#x} is outside configured pages")]
    UnconfiguredData { address: u64 },

    #[error("Invalid heap {start:#x}..{end:#x}: {reason}")]
    InvalidHeap {
        start: u64,
        end: u64,
        reason: &'static str,
    },
}

/// Gas meter underflow.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GasError {
    #[error("Out of gas: remaining {remaining}")]
    OutOfGas { remaining: i64 },
}

/// Malformed instruction stream.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Program counter {pc} is outside the code ({len} bytes)")]
    PcOutOfRange { pc: u32, len: usize },

    #[error("Unknown opcode {opcode} at {pc}")]
    UnknownOpcode { opcode: u8, pc: u32 },

    #[error("Truncated instruction at {pc}")]
    Truncated { pc: u32 },
}

/// Errors surfaced to embedders of the PVM.
#[derive(Debug, Error)]
pub enum PvmError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Memory layout error: {0}")]
    MemoryBuilder(#[from] MemoryBuilderError),

    #[error("Gas error: {0}")]
    Gas(#[from] GasError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Code size exceeded: {size} > {limit}")]
    CodeSizeExceeded { size: usize, limit: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
