//! Throughput benches for the lock's acquire paths and the list's hot ops.
//!
//! Run with:
//! ```bash
//! cargo bench --bench lock_contention
//! ```

use crablist::{CrabList, RmwLock};

fn main() {
    divan::main();
}

// ============================================================================
//  Uncontended lock paths
// ============================================================================

#[divan::bench]
fn read_roundtrip(bencher: divan::Bencher) {
    let lock = RmwLock::new();
    bencher.bench_local(|| {
        lock.lock_read();
        lock.unlock_shared();
    });
}

#[divan::bench]
fn may_write_roundtrip(bencher: divan::Bencher) {
    let lock = RmwLock::new();
    bencher.bench_local(|| {
        lock.lock_may_write();
        lock.unlock_shared();
    });
}

#[divan::bench]
fn write_roundtrip(bencher: divan::Bencher) {
    let lock = RmwLock::new();
    bencher.bench_local(|| {
        lock.lock_write();
        lock.unlock_exclusive();
    });
}

#[divan::bench]
fn may_write_upgrade_roundtrip(bencher: divan::Bencher) {
    let lock = RmwLock::new();
    bencher.bench_local(|| {
        lock.lock_may_write();
        lock.upgrade();
        lock.unlock_exclusive();
    });
}

// ============================================================================
//  List operations
// ============================================================================

#[divan::bench]
fn insert_delete_roundtrip(bencher: divan::Bencher) {
    let list: CrabList<u32, u32> = CrabList::new();
    for k in 0..64 {
        list.insert_head(k * 2, k);
    }
    bencher.bench_local(|| {
        list.insert_head(63, 0);
        list.delete(&63);
    });
}

#[divan::bench]
fn search_hit(bencher: divan::Bencher) {
    let list: CrabList<u32, u32> = CrabList::new();
    for k in 0..64 {
        list.insert_head(k, k);
    }
    bencher.bench_local(|| list.search(&48));
}

#[divan::bench]
fn search_miss(bencher: divan::Bencher) {
    let list: CrabList<u32, u32> = CrabList::new();
    for k in 0..64 {
        list.insert_head(k * 2, k);
    }
    bencher.bench_local(|| list.search(&63));
}
