use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tessera_pvm::instructions::StoreKind;
use tessera_pvm::{
    Assembler, GasCost, GasCounter, HostCallHandler, HostCallIndex, HostCallMemory,
    HostCallRegisters, HostCallRegistry, HostCalls, Interpreter, InterpreterPool, MemoryBuilder,
    PvmExecution, Registers, PAGE_SIZE, RESERVED_MEMORY,
};

const ITERATIONS: u64 = 10_000;

/// Counts r1 up to r2, storing the counter on every iteration.
fn loop_program() -> Bytes {
    let mut asm = Assembler::new();
    asm.load_imm_64(3, RESERVED_MEMORY);
    let top = asm.pc();
    asm.add_imm_64(1, 1, 1)
        .store_ind(StoreKind::U64, 1, 3, 0)
        .branch_ne(1, 2, top)
        .halt();
    asm.build()
}

/// Performs a host call per iteration.
fn host_call_program() -> Bytes {
    let mut asm = Assembler::new();
    let top = asm.pc();
    asm.ecalli(0)
        .add_imm_64(1, 1, 1)
        .branch_ne(1, 2, top)
        .halt();
    asm.build()
}

fn registers() -> Registers {
    let mut registers = Registers::new();
    registers.set_u64(2, ITERATIONS);
    registers
}

#[derive(Debug)]
struct Nop;

impl HostCallHandler for Nop {
    fn index(&self) -> HostCallIndex {
        0
    }

    fn gas_cost(&self, _registers: &HostCallRegisters<'_>) -> GasCost {
        GasCost::Fixed(1)
    }

    async fn execute(
        &self,
        _gas: &mut GasCounter,
        registers: &mut HostCallRegisters<'_>,
        _memory: &mut HostCallMemory<'_>,
    ) -> Option<PvmExecution> {
        registers.set(7, 0);
        None
    }
}

fn bench_interpreter(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpreter");
    group.throughput(Throughput::Elements(ITERATIONS));

    let code = loop_program();
    let memory = MemoryBuilder::new()
        .set_writeable_pages(RESERVED_MEMORY..RESERVED_MEMORY + PAGE_SIZE as u64, &[])
        .unwrap()
        .finalize(0, 0)
        .unwrap();
    let mut interpreter = Interpreter::new();

    group.bench_function("store_loop_10k", |b| {
        b.iter(|| {
            interpreter.reset(
                code.clone(),
                0,
                u64::MAX >> 1,
                Some(registers()),
                Some(memory.clone()),
            );
            black_box(interpreter.run())
        })
    });

    group.finish();
}

fn bench_dispatcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatcher");
    group.throughput(Throughput::Elements(ITERATIONS));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let host_calls = HostCalls::new(HostCallRegistry::new().with(Nop));
    let pool = InterpreterPool::new(1);
    let code = host_call_program();

    group.bench_function("host_calls_10k", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut interpreter = pool.acquire().await;
                interpreter.reset(code.clone(), 0, u64::MAX >> 1, Some(registers()), None);
                let result = host_calls.run_program(&mut interpreter).await;
                pool.release(interpreter);
                black_box(result)
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_interpreter, bench_dispatcher);
criterion_main!(benches);
