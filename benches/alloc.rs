//! Throughput benchmark for the slab fast path, shaped after `mmtk-core`'s
//! own `benches/main.rs`: a `criterion` harness driving the public API
//! directly rather than any internal-only hooks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use duoslab::backbone::Backbone;
use duoslab::slab::Slab;

fn make_region(size: usize) -> (Vec<u8>, Backbone) {
    let mut buf = vec![0u8; size];
    let backbone = unsafe { Backbone::init(buf.as_mut_ptr(), size, true) };
    (buf, backbone)
}

fn bench_salloc_sfree_single_cpu(c: &mut Criterion) {
    let (_buf, backbone) = make_region(64 << 20);
    let slab = Slab::init(&backbone);

    c.bench_function("salloc_sfree_24b_single_cpu", |b| {
        b.iter(|| {
            let ptr = slab.salloc(24, 0).expect("region sized generously for this benchmark");
            black_box(ptr);
            slab.sfree(ptr, 24, 0);
        })
    });
}

fn bench_balloc_bfree(c: &mut Criterion) {
    let (_buf, backbone) = make_region(64 << 20);

    c.bench_function("balloc_bfree", |b| {
        b.iter(|| {
            let page = backbone.balloc().expect("region sized generously for this benchmark");
            black_box(&page);
            backbone.bfree(page);
        })
    });
}

criterion_group!(benches, bench_salloc_sfree_single_cpu, bench_balloc_bfree);
criterion_main!(benches);
