//! The execute / host-call loop.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::registry::{HostCallHandler, HostCallRegistry, PvmExecution};
use super::{
    HostCallIndex, HostCallResult, HALT_ADDRESS_REGISTER, HALT_LENGTH_REGISTER, RESULT_REGISTER,
    UNKNOWN_HOST_CALL_GAS,
};
use crate::gas_metering::{Gas, GasCost, SmallGas};
use crate::interpreter::{Interpreter, Status};

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Halted, with the output the program pointed at.
    Halt(Bytes),
    OutOfGas,
    Panic,
}

/// Outcome of [`HostCalls::run_program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub gas_used: Gas,
}

impl ExecutionResult {
    pub fn is_halt(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Halt(_))
    }

    /// Output of a halted execution.
    pub fn output(&self) -> Option<&Bytes> {
        match &self.outcome {
            ExecutionOutcome::Halt(output) => Some(output),
            _ => None,
        }
    }
}

/// Drives an interpreter to completion, serving its host calls.
#[derive(Debug)]
pub struct HostCalls<H> {
    registry: HostCallRegistry<H>,
    unknown_host_call_gas: SmallGas,
}

impl<H: HostCallHandler> HostCalls<H> {
    pub fn new(registry: HostCallRegistry<H>) -> Self {
        Self {
            registry,
            unknown_host_call_gas: UNKNOWN_HOST_CALL_GAS,
        }
    }

    /// Override the gas charged for unregistered host calls.
    pub fn with_unknown_host_call_gas(mut self, gas: SmallGas) -> Self {
        self.unknown_host_call_gas = gas;
        self
    }

    pub fn registry(&self) -> &HostCallRegistry<H> {
        &self.registry
    }

    /// Run the loaded program until it halts, panics or runs out of gas.
    ///
    /// Host calls are served in program order. The interpreter is left in its
    /// terminal state so callers can inspect it before releasing it.
    pub async fn run_program(&self, interpreter: &mut Interpreter) -> ExecutionResult {
        let status = loop {
            match interpreter.run() {
                Status::HostCall(index) => self.dispatch(interpreter, index).await,
                status => break status,
            }
        };

        let gas_used = interpreter.get_gas_consumed();
        debug!(?status, gas_used, "execution finished");

        let outcome = match status {
            Status::Halt => ExecutionOutcome::Halt(halt_output(interpreter)),
            Status::OutOfGas => ExecutionOutcome::OutOfGas,
            _ => ExecutionOutcome::Panic,
        };
        ExecutionResult { outcome, gas_used }
    }

    async fn dispatch(&self, interpreter: &mut Interpreter, index: HostCallIndex) {
        trace!(index, pc = interpreter.get_pc(), "host call");

        let Some(handler) = self.registry.get(index) else {
            warn!(index, "unknown host call");
            if interpreter
                .charge_gas(GasCost::Fixed(self.unknown_host_call_gas))
                .is_ok()
            {
                interpreter
                    .get_registers_mut()
                    .set_u64(RESULT_REGISTER, HostCallResult::WHAT);
                interpreter.resume();
            }
            return;
        };

        let cost = {
            let (_, registers, _) = interpreter.host_call_view();
            handler.gas_cost(&registers)
        };
        if interpreter.charge_gas(cost).is_err() {
            trace!(index, ?cost, "host call out of gas");
            return;
        }

        let verdict = {
            let (gas, mut registers, mut memory) = interpreter.host_call_view();
            handler.execute(gas, &mut registers, &mut memory).await
        };
        match verdict {
            Some(PvmExecution::Halt) => interpreter.halt(),
            Some(PvmExecution::Panic) => interpreter.panic(),
            None => interpreter.resume(),
        }
    }
}

/// Read the output `[r10, r10 + r11)` of a halted program.
///
/// An output range the program cannot read yields an empty result.
fn halt_output(interpreter: &Interpreter) -> Bytes {
    let registers = interpreter.get_registers();
    let address = registers.get_u64(HALT_ADDRESS_REGISTER);
    let length = registers.get_u64(HALT_LENGTH_REGISTER);
    let memory = interpreter.get_memory();

    if length == 0 || !memory.is_readable(address, length) {
        return Bytes::new();
    }
    let mut output = vec![0u8; length as usize];
    match memory.load_into(&mut output, address) {
        Ok(()) => Bytes::from(output),
        Err(err) => {
            debug!(%err, "halt output not readable");
            Bytes::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_calls::{HostCallMemory, HostCallRegisters};
    use crate::instructions::StoreKind;
    use crate::{Assembler, GasCounter, Memory, MemoryBuilder, PAGE_SIZE, RESERVED_MEMORY};

    const DATA: u64 = RESERVED_MEMORY;

    #[derive(Debug)]
    enum TestCall {
        /// r7 = r8 + r9
        Add,
        /// Writes `[0xAB; r9]` to `r8`, r7 = OK or OOB
        Fill,
        Stop,
        Abort,
        /// Costs r8 gas
        Burn,
    }

    impl HostCallHandler for TestCall {
        fn index(&self) -> HostCallIndex {
            match self {
                TestCall::Add => 1,
                TestCall::Fill => 2,
                TestCall::Stop => 3,
                TestCall::Abort => 4,
                TestCall::Burn => 5,
            }
        }

        fn gas_cost(&self, registers: &HostCallRegisters<'_>) -> GasCost {
            match self {
                TestCall::Burn => GasCost::Variable(registers.get(8)),
                _ => GasCost::Fixed(2),
            }
        }

        async fn execute(
            &self,
            _gas: &mut GasCounter,
            registers: &mut HostCallRegisters<'_>,
            memory: &mut HostCallMemory<'_>,
        ) -> Option<PvmExecution> {
            match self {
                TestCall::Add => {
                    let sum = registers.get(8).wrapping_add(registers.get(9));
                    registers.set(RESULT_REGISTER, sum);
                }
                TestCall::Fill => {
                    let data = vec![0xAB; registers.get(9) as usize];
                    let code = match memory.store_from(registers.get(8), &data) {
                        Ok(()) => HostCallResult::OK,
                        Err(_) => HostCallResult::OOB,
                    };
                    registers.set(RESULT_REGISTER, code);
                }
                TestCall::Stop => return Some(PvmExecution::Halt),
                TestCall::Abort => return Some(PvmExecution::Panic),
                TestCall::Burn => {}
            }
            None
        }
    }

    fn host_calls() -> HostCalls<TestCall> {
        HostCalls::new(
            HostCallRegistry::new()
                .with(TestCall::Add)
                .with(TestCall::Fill)
                .with(TestCall::Stop)
                .with(TestCall::Abort)
                .with(TestCall::Burn),
        )
    }

    fn data_memory() -> Memory {
        MemoryBuilder::new()
            .set_writeable_pages(DATA..DATA + PAGE_SIZE as u64, &[])
            .unwrap()
            .finalize(0, 0)
            .unwrap()
    }

    fn interpreter(code: Bytes, gas: Gas) -> Interpreter {
        let mut interpreter = Interpreter::new();
        interpreter.reset(code, 0, gas, None, Some(data_memory()));
        interpreter
    }

    #[tokio::test]
    async fn test_halt_returns_output() {
        let code = Assembler::new()
            .load_imm(1, 0x0403_0201)
            .store(StoreKind::U32, 1, DATA as u32)
            .load_imm_64(10, DATA)
            .load_imm(11, 4)
            .halt()
            .build();

        let mut interpreter = interpreter(code, 100);
        let result = host_calls().run_program(&mut interpreter).await;
        assert_eq!(
            result.outcome,
            ExecutionOutcome::Halt(Bytes::from_static(&[1, 2, 3, 4]))
        );
        assert_eq!(result.gas_used, 6);
        assert_eq!(interpreter.get_status(), Status::Halt);
    }

    #[tokio::test]
    async fn test_unreadable_output_is_empty() {
        let code = Assembler::new()
            .load_imm_64(10, DATA + PAGE_SIZE as u64 - 2)
            .load_imm(11, 4)
            .halt()
            .build();

        let result = host_calls()
            .run_program(&mut interpreter(code, 100))
            .await;
        assert_eq!(result.outcome, ExecutionOutcome::Halt(Bytes::new()));
    }

    #[tokio::test]
    async fn test_unknown_host_call_resumes() {
        let code = Assembler::new().ecalli(99).halt().build();
        let mut interpreter = interpreter(code, 100);
        let host_calls = host_calls();
        assert_eq!(host_calls.registry().len(), 5);
        assert!(host_calls.registry().get(99).is_none());

        let result = host_calls.run_program(&mut interpreter).await;
        assert!(result.is_halt());
        assert_eq!(
            interpreter.get_registers().get_u64(RESULT_REGISTER),
            HostCallResult::WHAT
        );
        assert_eq!(result.gas_used, 3 + u64::from(UNKNOWN_HOST_CALL_GAS));
    }

    #[tokio::test]
    async fn test_unknown_host_call_gas_is_configurable() {
        let code = Assembler::new().ecalli(99).halt().build();
        let result = host_calls()
            .with_unknown_host_call_gas(100)
            .run_program(&mut interpreter(code, 50))
            .await;
        assert_eq!(result.outcome, ExecutionOutcome::OutOfGas);
        assert_eq!(result.gas_used, 50);
    }

    #[tokio::test]
    async fn test_handler_sees_registers_and_memory() {
        let code = Assembler::new()
            .load_imm(8, 40)
            .load_imm(9, 2)
            .ecalli(1)
            .move_reg(12, 7)
            .load_imm_64(8, DATA)
            .load_imm(9, 3)
            .ecalli(2)
            .load_imm_64(10, DATA)
            .load_imm(11, 3)
            .halt()
            .build();

        let mut interpreter = interpreter(code, 1_000);
        let result = host_calls().run_program(&mut interpreter).await;
        assert_eq!(
            result.output(),
            Some(&Bytes::from_static(&[0xAB, 0xAB, 0xAB]))
        );
        assert_eq!(interpreter.get_registers().get_u64(12), 42);
        assert_eq!(
            interpreter.get_registers().get_u64(RESULT_REGISTER),
            HostCallResult::OK
        );
    }

    #[tokio::test]
    async fn test_handler_memory_fault_becomes_result_code() {
        let code = Assembler::new()
            .load_imm(8, 0)
            .load_imm(9, 8)
            .ecalli(2)
            .halt()
            .build();

        let mut interpreter = interpreter(code, 100);
        let result = host_calls().run_program(&mut interpreter).await;
        assert!(result.is_halt());
        assert_eq!(
            interpreter.get_registers().get_u64(RESULT_REGISTER),
            HostCallResult::OOB
        );
    }

    #[tokio::test]
    async fn test_handler_requests_termination() {
        let code = Assembler::new().ecalli(3).trap().build();
        let result = host_calls().run_program(&mut interpreter(code, 100)).await;
        assert_eq!(result.outcome, ExecutionOutcome::Halt(Bytes::new()));
        assert_eq!(result.gas_used, 3);

        let code = Assembler::new().ecalli(4).halt().build();
        let result = host_calls().run_program(&mut interpreter(code, 100)).await;
        assert_eq!(result.outcome, ExecutionOutcome::Panic);
    }

    #[tokio::test]
    async fn test_host_call_out_of_gas() {
        let code = Assembler::new()
            .load_imm(8, 1_000)
            .ecalli(5)
            .halt()
            .build();

        let mut interpreter = interpreter(code, 100);
        let result = host_calls().run_program(&mut interpreter).await;
        assert_eq!(result.outcome, ExecutionOutcome::OutOfGas);
        assert_eq!(result.gas_used, 100);
        assert_eq!(interpreter.get_status(), Status::OutOfGas);
    }

    #[tokio::test]
    async fn test_panic_and_out_of_gas_outcomes() {
        let code = Assembler::new().trap().build();
        let result = host_calls().run_program(&mut interpreter(code, 100)).await;
        assert_eq!(result.outcome, ExecutionOutcome::Panic);
        assert_eq!(result.gas_used, 1);

        let mut asm = Assembler::new();
        asm.jump(0);
        let result = host_calls()
            .run_program(&mut interpreter(asm.build(), 20))
            .await;
        assert_eq!(result.outcome, ExecutionOutcome::OutOfGas);
        assert_eq!(result.gas_used, 20);
        assert_eq!(result.output(), None);
    }
}
