use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tessera_pvm::{Memory, MemoryBuilder, PAGE_SIZE, RESERVED_MEMORY};

const PAGE: u64 = PAGE_SIZE as u64;
const PAGES: u64 = 64;

fn writeable_memory() -> Memory {
    MemoryBuilder::new()
        .set_writeable_pages(RESERVED_MEMORY..RESERVED_MEMORY + PAGES * PAGE, &[])
        .unwrap()
        .finalize(RESERVED_MEMORY + PAGES * PAGE, RESERVED_MEMORY + 1024 * PAGE)
        .unwrap()
}

fn bench_store_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_access");

    for size in [8usize, 256, 16 * 1024] {
        let data = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("store_{size}"), |b| {
            let mut memory = writeable_memory();
            b.iter(|| {
                memory
                    .store_from(black_box(RESERVED_MEMORY + PAGE - 4), &data)
                    .unwrap()
            })
        });

        group.bench_function(format!("load_{size}"), |b| {
            let memory = writeable_memory();
            let mut buf = vec![0u8; size];
            b.iter(|| {
                memory
                    .load_into(&mut buf, black_box(RESERVED_MEMORY + PAGE - 4))
                    .unwrap();
                black_box(&buf);
            })
        });
    }

    group.finish();
}

fn bench_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_checks");
    let memory = writeable_memory();

    group.bench_function("is_writeable_span", |b| {
        b.iter(|| black_box(memory.is_writeable(black_box(RESERVED_MEMORY), PAGES * PAGE)))
    });
    group.bench_function("page_fault", |b| {
        let mut buf = [0u8; 8];
        b.iter(|| black_box(memory.load_into(&mut buf, black_box(PAGE)).is_err()))
    });

    group.finish();
}

fn bench_sbrk(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_sbrk");

    group.bench_function("grow_heap_to_ceiling", |b| {
        b.iter_batched(
            writeable_memory,
            |mut memory| {
                while memory.sbrk(black_box(3 * PAGE_SIZE)).is_some() {}
                black_box(memory.mapped_pages())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_store_load, bench_checks, bench_sbrk);
criterion_main!(benches);
