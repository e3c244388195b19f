//! Fork benchmarks against the simulated kernel

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use cowfork::{fork, sfork};
use cowfork_api::{EnvId, PteFlags, Syscalls, UserMemory, VirtAddr, PAGE_SIZE};
use cowfork_kernel::{Kernel, KernelConfig};
use cowfork_memory::DEFAULT_LAYOUT;

/// A runnable root environment with `pages` writable heap pages
fn populated(pages: usize) -> (Arc<Kernel>, EnvId) {
    let kernel = Kernel::new(KernelConfig::default());
    let env = kernel.create_env().expect("root environment");
    kernel
        .run(env, |ctx| {
            for page in 0..pages {
                let va = VirtAddr::new(DEFAULT_LAYOUT.utext.as_usize() + page * PAGE_SIZE);
                ctx.page_alloc(EnvId::CURRENT, va, PteFlags::USER_RW).expect("page_alloc");
            }
        })
        .expect("populate");
    (kernel, env)
}

fn bench_fork(c: &mut Criterion) {
    let mut group = c.benchmark_group("fork");
    for pages in [16usize, 256] {
        group.bench_with_input(BenchmarkId::new("copy_on_write", pages), &pages, |b, &pages| {
            b.iter_batched(
                || populated(pages),
                |(kernel, env)| kernel.run(env, |ctx| black_box(fork(ctx))),
                BatchSize::SmallInput,
            )
        });
        group.bench_with_input(BenchmarkId::new("shared", pages), &pages, |b, &pages| {
            b.iter_batched(
                || populated(pages),
                |(kernel, env)| kernel.run(env, |ctx| black_box(sfork(ctx))),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_cow_fault(c: &mut Criterion) {
    c.bench_function("cow_fault_first_write", |b| {
        b.iter_batched(
            || {
                let (kernel, env) = populated(1);
                kernel.run(env, |ctx| fork(ctx)).expect("fork");
                (kernel, env)
            },
            |(kernel, env)| kernel.run(env, |ctx| ctx.store_u32(DEFAULT_LAYOUT.utext, black_box(7))),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_fork, bench_cow_fault);

criterion_main!(benches);
