//! Host calls offered to programs run by the node.

use tessera_pvm::host_calls::RESULT_REGISTER;
use tessera_pvm::{
    GasCost, GasCounter, HostCallHandler, HostCallIndex, HostCallMemory, HostCallRegisters,
    HostCallRegistry, HostCallResult, PvmExecution,
};
use tracing::info;

/// `gas`: writes the remaining gas into r7.
pub const GAS_INDEX: HostCallIndex = 0;

/// `log`: emits the message `[r8, r8 + r9)`, r7 = OK or OOB.
pub const LOG_INDEX: HostCallIndex = 100;

const BASE_COST: u32 = 10;

/// Longest message `log` accepts.
pub const MAX_LOG_LENGTH: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHostCall {
    Gas,
    Log,
}

impl HostCallHandler for NodeHostCall {
    fn index(&self) -> HostCallIndex {
        match self {
            NodeHostCall::Gas => GAS_INDEX,
            NodeHostCall::Log => LOG_INDEX,
        }
    }

    fn gas_cost(&self, registers: &HostCallRegisters<'_>) -> GasCost {
        match self {
            NodeHostCall::Gas => GasCost::Fixed(BASE_COST),
            NodeHostCall::Log => {
                GasCost::Variable(u64::from(BASE_COST).saturating_add(registers.get(9)))
            }
        }
    }

    async fn execute(
        &self,
        gas: &mut GasCounter,
        registers: &mut HostCallRegisters<'_>,
        memory: &mut HostCallMemory<'_>,
    ) -> Option<PvmExecution> {
        match self {
            NodeHostCall::Gas => registers.set(RESULT_REGISTER, gas.remaining()),
            NodeHostCall::Log => {
                let (address, length) = (registers.get(8), registers.get(9));
                if length > MAX_LOG_LENGTH || !memory.is_readable(address, length) {
                    registers.set(RESULT_REGISTER, HostCallResult::OOB);
                    return None;
                }

                let mut message = vec![0u8; length as usize];
                let code = match memory.load_into(&mut message, address) {
                    Ok(()) => {
                        info!(target: "tessera::guest", "{}", String::from_utf8_lossy(&message));
                        HostCallResult::OK
                    }
                    Err(_) => HostCallResult::OOB,
                };
                registers.set(RESULT_REGISTER, code);
            }
        }
        None
    }
}

/// Registry with every node host call.
pub fn registry() -> HostCallRegistry<NodeHostCall> {
    HostCallRegistry::new()
        .with(NodeHostCall::Gas)
        .with(NodeHostCall::Log)
}
