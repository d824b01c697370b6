//! The PVM interpreter.
//!
//! An [`Interpreter`] owns its registers, memory, gas counter and program
//! counter and executes one program at a time. [`Interpreter::run`] returns
//! as soon as the status stops being [`Status::Continuing`]: either because
//! the program finished (`Halt`, `Panic`, `OutOfGas`) or because it asked for
//! a host call. Host calls are completed outside the interpreter, after which
//! [`Interpreter::resume`] lets execution continue.

use bytes::Bytes;
use tracing::trace;

use crate::error::{GasError, MemoryError};
use crate::gas_metering::{Gas, GasCost, GasCounter, SmallGas};
use crate::host_calls::{HostCallIndex, HostCallMemory, HostCallRegisters};
use crate::instructions::{decode, AluOp, Instruction, LoadKind, StoreKind};
use crate::memory::Memory;
use crate::registers::Registers;
use crate::HALT_ADDRESS;

/// Gas charged for every executed instruction.
pub const INSTRUCTION_GAS: SmallGas = 1;

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Still executing.
    Continuing,
    /// The program finished normally.
    Halt,
    /// The program did something invalid.
    Panic,
    /// Gas ran out.
    OutOfGas,
    /// Suspended until the host call with this index is completed.
    HostCall(HostCallIndex),
}

impl Status {
    /// `Halt`, `Panic` and `OutOfGas` end an execution.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Halt | Status::Panic | Status::OutOfGas)
    }
}

/// A single PVM instance.
#[derive(Debug, Clone)]
pub struct Interpreter {
    program: Bytes,
    pc: u32,
    registers: Registers,
    memory: Memory,
    gas: GasCounter,
    status: Status,
    instruction_gas: SmallGas,
}

impl Interpreter {
    /// Create an interpreter with no program loaded.
    pub fn new() -> Self {
        Self::with_instruction_gas(INSTRUCTION_GAS)
    }

    /// Create an interpreter charging `instruction_gas` per instruction.
    pub fn with_instruction_gas(instruction_gas: SmallGas) -> Self {
        Self {
            program: Bytes::new(),
            pc: 0,
            registers: Registers::new(),
            memory: Memory::new(),
            gas: GasCounter::new(0),
            status: Status::Continuing,
            instruction_gas,
        }
    }

    /// Prepare a fresh execution of `program`.
    ///
    /// Registers and memory are replaced by the given ones, or zeroed.
    pub fn reset(
        &mut self,
        program: Bytes,
        initial_pc: u32,
        initial_gas: Gas,
        registers: Option<Registers>,
        memory: Option<Memory>,
    ) {
        self.program = program;
        self.pc = initial_pc;
        self.gas = GasCounter::new(initial_gas);
        self.status = Status::Continuing;

        match registers {
            Some(registers) => self.registers = registers,
            None => self.registers.reset(),
        }
        match memory {
            Some(memory) => self.memory = memory,
            None => self.memory.reset(),
        }
    }

    /// Execute until the status is no longer `Continuing`.
    pub fn run(&mut self) -> Status {
        while self.status == Status::Continuing {
            self.step();
        }
        self.status
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Status {
        if self.status != Status::Continuing {
            return self.status;
        }

        let (instruction, next_pc) = match decode(&self.program, self.pc) {
            Ok(decoded) => decoded,
            Err(err) => {
                trace!(pc = self.pc, %err, "decode failure");
                self.status = Status::Panic;
                return self.status;
            }
        };

        if self.gas.charge(self.instruction_gas).is_err() {
            self.status = Status::OutOfGas;
            return self.status;
        }

        self.status = match self.execute(instruction, next_pc) {
            Ok(status) => status,
            Err(err) => {
                trace!(pc = self.pc, %err, "memory fault");
                Status::Panic
            }
        };
        self.status
    }

    /// Leave the `HostCall` status after the host call completed.
    pub fn resume(&mut self) {
        if let Status::HostCall(_) = self.status {
            self.status = Status::Continuing;
        }
    }

    /// Finish the execution as if the program halted.
    pub fn halt(&mut self) {
        self.status = Status::Halt;
    }

    /// Finish the execution with a panic.
    pub fn panic(&mut self) {
        self.status = Status::Panic;
    }

    /// Deduct a host call's cost, switching to `OutOfGas` on underflow.
    pub fn charge_gas(&mut self, cost: GasCost) -> Result<(), GasError> {
        let result = self.gas.charge_cost(cost);
        if result.is_err() {
            self.status = Status::OutOfGas;
        }
        result
    }

    /// Split the state a host call may touch.
    pub fn host_call_view(
        &mut self,
    ) -> (&mut GasCounter, HostCallRegisters<'_>, HostCallMemory<'_>) {
        (
            &mut self.gas,
            HostCallRegisters::new(&mut self.registers),
            HostCallMemory::new(&mut self.memory),
        )
    }

    pub fn get_status(&self) -> Status {
        self.status
    }

    /// Gas consumed so far, never more than the initial allotment.
    pub fn get_gas_consumed(&self) -> Gas {
        self.gas.used()
    }

    /// Index of the pending host call.
    pub fn get_exit_param(&self) -> Option<HostCallIndex> {
        match self.status {
            Status::HostCall(index) => Some(index),
            _ => None,
        }
    }

    pub fn get_pc(&self) -> u32 {
        self.pc
    }

    pub fn get_gas(&self) -> &GasCounter {
        &self.gas
    }

    pub fn get_gas_mut(&mut self) -> &mut GasCounter {
        &mut self.gas
    }

    pub fn get_registers(&self) -> &Registers {
        &self.registers
    }

    pub fn get_registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn get_memory(&self) -> &Memory {
        &self.memory
    }

    pub fn get_memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    fn execute(&mut self, instruction: Instruction, next_pc: u32) -> Result<Status, MemoryError> {
        let regs = &mut self.registers;
        match instruction {
            Instruction::Trap => return Ok(Status::Panic),
            Instruction::Fallthrough => {}
            Instruction::Ecalli(index) => {
                self.pc = next_pc;
                return Ok(Status::HostCall(index));
            }
            Instruction::LoadImm64 { dst, value } => regs.set_u64(dst, value),
            Instruction::LoadImm { dst, value } => regs.set_i64(dst, i64::from(value)),
            Instruction::Jump { target } => return Ok(self.jump(target)),
            Instruction::JumpInd { base, offset } => {
                let target = regs.get_u64(base).wrapping_add(u64::from(offset)) as u32;
                if u64::from(target) == HALT_ADDRESS {
                    return Ok(Status::Halt);
                }
                return Ok(self.jump(target));
            }
            Instruction::Load { kind, dst, address } => {
                let value = self.load(kind, u64::from(address))?;
                self.registers.set_u64(dst, value);
            }
            Instruction::Store { kind, src, address } => {
                let value = regs.get_u64(src);
                self.store(kind, u64::from(address), value)?;
            }
            Instruction::MoveReg { dst, src } => regs.set_u64(dst, regs.get_u64(src)),
            Instruction::Sbrk { dst, size } => {
                let result = u32::try_from(regs.get_u64(size))
                    .ok()
                    .and_then(|size| self.memory.sbrk(size))
                    .unwrap_or(0);
                self.registers.set_u64(dst, result);
            }
            Instruction::StoreInd {
                kind,
                src,
                base,
                offset,
            } => {
                let value = regs.get_u64(src);
                let address = indirect_address(regs.get_u64(base), offset);
                self.store(kind, address, value)?;
            }
            Instruction::LoadInd {
                kind,
                dst,
                base,
                offset,
            } => {
                let address = indirect_address(regs.get_u64(base), offset);
                let value = self.load(kind, address)?;
                self.registers.set_u64(dst, value);
            }
            Instruction::AddImm64 { dst, src, value } => {
                regs.set_u64(dst, regs.get_u64(src).wrapping_add(i64::from(value) as u64));
            }
            Instruction::Branch {
                condition,
                a,
                b,
                target,
            } => {
                if condition.holds(regs.get_u64(a), regs.get_u64(b)) {
                    return Ok(self.jump(target));
                }
            }
            Instruction::Alu { op, dst, a, b } => {
                let (x, y) = (regs.get_u64(a), regs.get_u64(b));
                match op {
                    AluOp::Add32 => regs.set_u32_sign_extended(dst, (x as u32).wrapping_add(y as u32)),
                    AluOp::Sub32 => regs.set_u32_sign_extended(dst, (x as u32).wrapping_sub(y as u32)),
                    AluOp::Add64 => regs.set_u64(dst, x.wrapping_add(y)),
                    AluOp::Sub64 => regs.set_u64(dst, x.wrapping_sub(y)),
                    AluOp::Mul64 => regs.set_u64(dst, x.wrapping_mul(y)),
                    AluOp::And => regs.set_u64(dst, x & y),
                    AluOp::Xor => regs.set_u64(dst, x ^ y),
                    AluOp::Or => regs.set_u64(dst, x | y),
                }
            }
        }

        self.pc = next_pc;
        Ok(Status::Continuing)
    }

    fn jump(&mut self, target: u32) -> Status {
        if target as usize >= self.program.len() {
            trace!(pc = self.pc, target, "jump outside the code");
            return Status::Panic;
        }
        self.pc = target;
        Status::Continuing
    }

    fn load(&self, kind: LoadKind, address: u64) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        self.memory.load_into(&mut buf[..kind.width()], address)?;
        Ok(kind.extend(u64::from_le_bytes(buf)))
    }

    fn store(&mut self, kind: StoreKind, address: u64, value: u64) -> Result<(), MemoryError> {
        let bytes = value.to_le_bytes();
        self.memory.store_from(address, &bytes[..kind.width()])
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Register-relative addresses wrap within the 32-bit address space.
fn indirect_address(base: u64, offset: i32) -> u64 {
    u64::from(base.wrapping_add(i64::from(offset) as u64) as u32)
}
