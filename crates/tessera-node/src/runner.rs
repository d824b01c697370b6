//! Concurrent program execution.
//!
//! Every run gets an interpreter from a shared [`InterpreterPool`], a fresh
//! copy of the default memory layout and the node host calls, and runs on
//! its own tokio task.

use std::sync::Arc;

use bytes::Bytes;
use tessera_pvm::memory::align_to_page;
use tessera_pvm::{
    ExecutionResult, Gas, HostCalls, InterpreterPool, Memory, MemoryBuilder, MemoryBuilderError,
    PvmConfig, Registers, HALT_ADDRESS, MAX_GAS,
};
use tracing::{debug, info};

use crate::host::{self, NodeHostCall};

/// Bottom of the stack pages.
pub const STACK_START: u64 = 0x1_0000;
/// Top of the stack pages, the initial stack pointer.
pub const STACK_END: u64 = 0x2_0000;
/// Bottom of the growable heap.
pub const HEAP_START: u64 = 0x2_0000;
/// Heap ceiling.
pub const HEAP_END: u64 = 0x12_0000;
/// Where the read-only input is mapped.
pub const INPUT_ADDRESS: u64 = 0xFEFF_0000;
/// Largest input that fits below [`HALT_ADDRESS`].
pub const MAX_INPUT_SIZE: usize = (HALT_ADDRESS - INPUT_ADDRESS) as usize;

const STACK_POINTER_REGISTER: usize = 1;
const INPUT_ADDRESS_REGISTER: usize = 7;
const INPUT_LENGTH_REGISTER: usize = 8;

/// Build the memory every run starts from.
pub fn default_memory(input: &[u8]) -> Result<Memory, MemoryBuilderError> {
    let mut builder = MemoryBuilder::new().set_writeable_pages(STACK_START..STACK_END, &[])?;
    if !input.is_empty() {
        let end = INPUT_ADDRESS + align_to_page(input.len() as u64);
        builder = builder.set_readable_pages(INPUT_ADDRESS..end, input)?;
    }
    builder.finalize(HEAP_START, HEAP_END)
}

/// Registers every run starts with.
///
/// r0 holds the halt address, so `jump_ind r0, 0` ends the program.
pub fn initial_registers(input_length: usize) -> Registers {
    let mut registers = Registers::new();
    registers.set_u64(0, HALT_ADDRESS);
    registers.set_u64(STACK_POINTER_REGISTER, STACK_END);
    if input_length > 0 {
        registers.set_u64(INPUT_ADDRESS_REGISTER, INPUT_ADDRESS);
        registers.set_u64(INPUT_LENGTH_REGISTER, input_length as u64);
    }
    registers
}

/// Runs programs through a shared pool.
#[derive(Debug, Clone)]
pub struct Runner {
    config: PvmConfig,
    pool: Arc<InterpreterPool>,
    host_calls: Arc<HostCalls<NodeHostCall>>,
}

impl Runner {
    pub fn new(config: PvmConfig) -> anyhow::Result<Self> {
        let pool = InterpreterPool::from_config(&config)?;
        let host_calls = HostCalls::new(host::registry())
            .with_unknown_host_call_gas(config.unknown_host_call_gas);

        info!(
            pool_capacity = config.pool_capacity,
            instruction_gas = config.instruction_gas,
            "runner ready"
        );
        Ok(Self {
            config,
            pool: Arc::new(pool),
            host_calls: Arc::new(host_calls),
        })
    }

    pub fn config(&self) -> &PvmConfig {
        &self.config
    }

    pub fn pool(&self) -> &InterpreterPool {
        &self.pool
    }

    /// Execute `program` once per run, concurrently.
    ///
    /// Results are returned in run order.
    pub async fn run_many(
        &self,
        program: Bytes,
        input: &[u8],
        gas: Option<Gas>,
        runs: usize,
    ) -> anyhow::Result<Vec<ExecutionResult>> {
        self.config.check_code_size(&program)?;
        if input.len() > MAX_INPUT_SIZE {
            anyhow::bail!("Input of {} bytes exceeds {} bytes", input.len(), MAX_INPUT_SIZE);
        }

        let gas = gas.unwrap_or(self.config.default_gas);
        if gas > MAX_GAS {
            anyhow::bail!("Gas {} exceeds {}", gas, MAX_GAS);
        }
        let memory = default_memory(input)?;
        let registers = initial_registers(input.len());

        let tasks: Vec<_> = (0..runs)
            .map(|run| {
                let pool = Arc::clone(&self.pool);
                let host_calls = Arc::clone(&self.host_calls);
                let (program, memory) = (program.clone(), memory.clone());

                tokio::spawn(async move {
                    let mut interpreter = pool.acquire().await;
                    interpreter.reset(program, 0, gas, Some(registers), Some(memory));

                    let result = host_calls.run_program(&mut interpreter).await;
                    pool.release(interpreter);
                    debug!(run, outcome = ?result.outcome, gas_used = result.gas_used, "run finished");
                    result
                })
            })
            .collect();

        let mut results = Vec::with_capacity(runs);
        for task in tasks {
            results.push(task.await?);
        }
        Ok(results)
    }

    /// Execute `program` once.
    pub async fn run(
        &self,
        program: Bytes,
        input: &[u8],
        gas: Option<Gas>,
    ) -> anyhow::Result<ExecutionResult> {
        let mut results = self.run_many(program, input, gas, 1).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Execution produced no result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_pvm::instructions::{LoadKind, StoreKind};
    use tessera_pvm::{Assembler, ExecutionOutcome, PAGE_SIZE};

    fn runner(pool_capacity: usize) -> Runner {
        Runner::new(PvmConfig {
            pool_capacity,
            ..PvmConfig::default()
        })
        .unwrap()
    }

    /// Copies the input to the heap and returns it.
    fn echo_program() -> Bytes {
        Assembler::new()
            .sbrk(10, 8)
            .move_reg(11, 8)
            .load_ind(LoadKind::U32, 2, 7, 0)
            .store_ind(StoreKind::U32, 2, 10, 0)
            .jump_ind(0, 0)
            .build()
    }

    #[test]
    fn test_default_layout() {
        let memory = default_memory(b"abc").unwrap();
        assert!(memory.is_writeable(STACK_START, STACK_END - STACK_START));
        assert!(memory.is_readable(INPUT_ADDRESS, PAGE_SIZE as u64));
        assert!(!memory.is_writeable(INPUT_ADDRESS, 1));
        assert_eq!(memory.sbrk_index(), HEAP_START);
        assert_eq!(memory.heap_end(), HEAP_END);

        let empty = default_memory(&[]).unwrap();
        assert!(!empty.is_readable(INPUT_ADDRESS, 1));
    }

    #[test]
    fn test_initial_registers() {
        let registers = initial_registers(3);
        assert_eq!(registers.get_u64(0), HALT_ADDRESS);
        assert_eq!(registers.get_u64(1), STACK_END);
        assert_eq!(registers.get_u64(7), INPUT_ADDRESS);
        assert_eq!(registers.get_u64(8), 3);
        assert_eq!(initial_registers(0).get_u64(7), 0);
    }

    #[tokio::test]
    async fn test_echo_input() {
        let result = runner(1)
            .run(echo_program(), b"ping", Some(1_000))
            .await
            .unwrap();
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Halt(Bytes::from_static(b"ping"))
        );
        assert_eq!(result.gas_used, 5);
    }

    #[tokio::test]
    async fn test_run_many_more_runs_than_instances() {
        let runner = runner(2);
        let results = runner
            .run_many(echo_program(), b"abcd", None, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 10);
        assert!(results
            .iter()
            .all(|r| r.output() == Some(&Bytes::from_static(b"abcd"))));
        assert_eq!(runner.pool().idle_count(), 2);
    }

    #[tokio::test]
    async fn test_host_calls_available() {
        let code = Assembler::new()
            .load_imm_64(8, INPUT_ADDRESS)
            .load_imm(9, 2)
            .ecalli(host::LOG_INDEX)
            .move_reg(3, 7)
            .ecalli(host::GAS_INDEX)
            .jump_ind(0, 0)
            .build();

        let runner = runner(1);
        let result = runner.run(code, b"hi", Some(1_000)).await.unwrap();
        assert!(result.is_halt());
        assert_eq!(result.gas_used, 6 + 12 + 10);
    }

    #[tokio::test]
    async fn test_rejects_oversized_program() {
        let runner = Runner::new(PvmConfig {
            max_code_size: 4,
            ..PvmConfig::default()
        })
        .unwrap();
        assert!(runner.run(echo_program(), &[], None).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_oversized_gas() {
        let runner = runner(1);
        assert!(runner.run(echo_program(), &[], Some(u64::MAX)).await.is_err());

        let result = runner.run(echo_program(), b"ping", Some(MAX_GAS)).await.unwrap();
        assert!(result.is_halt());
        assert_eq!(result.gas_used, 5);
    }

    #[tokio::test]
    async fn test_out_of_gas_run() {
        let mut asm = Assembler::new();
        asm.jump(0);
        let result = runner(1).run(asm.build(), &[], Some(100)).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::OutOfGas);
        assert_eq!(result.gas_used, 100);
    }
}
