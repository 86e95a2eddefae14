//! Black-box end-to-end scenarios. Each test here constructs its own
//! region so it can run independently of the crate's process-wide
//! singleton (exercised separately in `src/lib.rs`'s own test module).

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{Rng, SeedableRng};

use duoslab::backbone::Backbone;
use duoslab::constants::PAGE_SIZE;
use duoslab::slab::Slab;

fn region(size: usize) -> (Vec<u8>, Backbone) {
    let mut buf = vec![0u8; size];
    let backbone = unsafe { Backbone::init(buf.as_mut_ptr(), size, true) };
    (buf, backbone)
}

/// Scenario 1: a freshly initialized 1 GiB region reports a sane size and
/// an initial pressure strictly between 0 and 1.
#[test]
fn scenario_1_fresh_region_reports_sane_pressure() {
    let size = 1usize << 30;
    let (_buf, backbone) = region(size);

    assert_eq!(backbone.size(), size);
    assert!(backbone.used() > 0);
    let p = backbone.pressure();
    assert!(p > 0.0 && p < 1.0);
}

/// Scenario 2: 100 `balloc` calls strictly increase pressure and each
/// returned page is distinct.
#[test]
fn scenario_2_repeated_balloc_increases_pressure_with_distinct_pages() {
    let (_buf, backbone) = region(1 << 20);
    let before = backbone.pressure();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..100 {
        let page = backbone.balloc().expect("region should not be exhausted yet");
        assert!(seen.insert(page.as_ptr() as usize), "balloc returned a duplicate page");
    }

    assert!(backbone.pressure() > before);
}

/// Scenario 3: filling the region exactly matches the computed page count;
/// the next `balloc` fails and pressure reads exactly 1.0.
#[test]
fn scenario_3_filling_the_region_exhausts_it_exactly() {
    let size = 1 << 20;
    let (_buf, backbone) = region(size);

    let used_before = backbone.used();
    let n = (size - used_before) / PAGE_SIZE;
    assert_eq!((size - used_before) % PAGE_SIZE, 0, "region should divide evenly into pages");

    for _ in 0..n {
        assert!(backbone.balloc().is_some());
    }

    assert!(backbone.balloc().is_none());
    assert_eq!(backbone.pressure(), 1.0);
}

/// Scenario 4: allocating and freeing 100 pages brings pressure back down,
/// strictly below the peak and strictly above zero.
#[test]
fn scenario_4_alloc_then_free_100_pages_round_trips_pressure() {
    let (_buf, backbone) = region(1 << 20);
    let initial = backbone.pressure();

    let pages: Vec<_> = (0..100)
        .map(|_| backbone.balloc().expect("should not be exhausted"))
        .collect();
    let peak = backbone.pressure();
    assert!(peak > initial);

    for p in pages {
        backbone.bfree(p);
    }
    let final_pressure = backbone.pressure();
    assert!(final_pressure < peak);
    assert!(final_pressure > 0.0);
    assert_eq!(final_pressure, initial);
}

/// An object handed from one CPU's thread to another for a remote free.
/// `NonNull` isn't `Send` on its own; the allocator's CPU-pinning contract
/// is exactly what makes passing one across threads sound here, provided
/// the receiving thread frees it under its own (different) CPU id.
struct HandOff(NonNull<u8>, usize);
unsafe impl Send for HandOff {}

/// Scenario 5: two threads, each pinned to a distinct logical CPU id, hammer
/// `salloc`/`sfree` across a mix of size classes for a large number of
/// iterations. Each allocation is, at random, freed locally or hand off to
/// the other thread to free under the other CPU id, exercising both the
/// local-free and remote-free paths. At completion no bucket free list has
/// grown past its cap.
#[test]
fn scenario_5_two_cpu_stress_respects_free_list_cap() {
    use duoslab::constants::SLAB_MAX_FREE_PAGES;

    const SIZES: [usize; 3] = [24, 48, 96];

    // Generous relative to `ITERS`: hand-off to the peer thread can leave a
    // transient backlog of outstanding objects across several size classes.
    let size = 64 << 20;
    let (_buf, backbone) = region(size);
    let slab = Slab::init(&backbone);

    const ITERS: usize = 200_000; // scaled down from 10^6 to keep CI time sane
    let ops_done = AtomicUsize::new(0);

    // `to[cpu]` carries objects allocated by the other thread that `cpu`
    // must free remotely.
    let to0 = crossbeam::queue::SegQueue::<HandOff>::new();
    let to1 = crossbeam::queue::SegQueue::<HandOff>::new();
    let to = [&to0, &to1];

    crossbeam::thread::scope(|s| {
        for cpu in 0..2i32 {
            let slab = &slab;
            let ops_done = &ops_done;
            let own_inbox = to[cpu as usize];
            let peer_inbox = to[1 - cpu as usize];
            s.spawn(move |_| {
                let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(cpu as u64 + 1);
                for _ in 0..ITERS {
                    let class = SIZES[rng.random_range(0..SIZES.len())];
                    let ptr = slab
                        .salloc(class, cpu)
                        .expect("salloc should not fail under this budget");
                    // Touch the object to make sure it's genuinely usable memory.
                    unsafe { ptr.as_ptr().write(0xAB) };

                    if rng.random_bool(0.4) {
                        peer_inbox.push(HandOff(ptr, class));
                    } else {
                        slab.sfree(ptr, class, cpu);
                    }
                    ops_done.fetch_add(1, Ordering::Relaxed);

                    // Opportunistically drain objects the peer handed off to
                    // us, freeing them under our own (different) CPU id.
                    while let Some(HandOff(obj, obj_size)) = own_inbox.pop() {
                        slab.sfree(obj, obj_size, cpu);
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(ops_done.load(Ordering::Relaxed), ITERS * 2);

    // Either thread's inbox may still hold objects handed off right before
    // its peer's loop ended; free what's left before checking invariants.
    for (cpu, inbox) in [(0i32, &to0), (1i32, &to1)] {
        while let Some(HandOff(obj, obj_size)) = inbox.pop() {
            slab.sfree(obj, obj_size, cpu);
        }
    }

    for class in SIZES {
        let bucket = backbone.bucket(bucket_index_for(class));
        assert!(bucket.free.len() <= SLAB_MAX_FREE_PAGES);
    }
}

/// Scenario 6: one thread allocates N objects on CPU 0, another thread
/// frees them all on CPU 1. The owning page ends up fully empty and parked
/// on the bucket free list (or returned to the backbone if already capped).
#[test]
fn scenario_6_cross_cpu_remote_free_empties_the_page() {
    let (_buf, backbone) = region(1 << 20);
    let slab = Slab::init(&backbone);

    let obj_in_page = PAGE_SIZE / 64;
    let pointers: Vec<_> = (0..obj_in_page)
        .map(|_| slab.salloc(64, 0).expect("salloc should not fail"))
        .collect();

    let used_before_free = backbone.used();

    crossbeam::thread::scope(|s| {
        let slab = &slab;
        let pointers = pointers;
        s.spawn(move |_| {
            for p in pointers {
                slab.sfree(p, 64, 1);
            }
        });
    })
    .unwrap();

    let bucket = backbone.bucket(bucket_index_for(64));
    assert_eq!(bucket.partial.len(), 0);
    assert!(bucket.free.len() == 1 || backbone.used() < used_before_free);
}

fn bucket_index_for(size: usize) -> usize {
    let k = (usize::BITS - (size - 1).leading_zeros()).max(duoslab::constants::MIN_K);
    (k - duoslab::constants::MIN_K) as usize
}
