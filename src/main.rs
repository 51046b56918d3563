//! Stress demo driver.
//!
//! Spawns a thousand threads, releases them through one barrier, and has each
//! perform a single random operation against a shared list - then checks the
//! structural invariants once everyone is done.
//!
//! Run with:
//! ```bash
//! cargo run --release
//! ```

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;

use crablist::CrabList;

const MAX_THREADS: usize = 1000;

/// The four operations a worker can draw.
#[derive(Debug, Clone, Copy)]
enum Operation {
    InsertHead,
    InsertTail,
    Delete,
    Search,
}

impl Operation {
    fn pick(rng: &mut impl Rng) -> Self {
        match rng.random_range(0..4) {
            0 => Self::InsertHead,
            1 => Self::InsertTail,
            2 => Self::Delete,
            _ => Self::Search,
        }
    }
}

fn worker(id: usize, list: &CrabList<i32, char>, barrier: &Barrier) {
    let mut rng = rand::rng();
    let key: i32 = rng.random_range(1..=100);
    let data = char::from(rng.random_range(33u8..=126));
    let op = Operation::pick(&mut rng);

    barrier.wait();

    match op {
        Operation::InsertHead => {
            println!("{id}: InsertHead({key}, {data})");
            let result = list.insert_head(key, data);
            println!("{id}: InsertHead({key}, {data}) - {result}");
        }
        Operation::InsertTail => {
            println!("{id}: InsertTail({key}, {data})");
            let result = list.insert_tail(key, data);
            println!("{id}: InsertTail({key}, {data}) - {result}");
        }
        Operation::Delete => {
            println!("{id}: Delete({key})");
            let result = list.delete(&key);
            println!("{id}: Delete({key}) - {result}");
        }
        Operation::Search => {
            println!("{id}: Search({key})");
            match list.search(&key) {
                Some(found) => println!("{id}: Search({key}) - true, data = {found}"),
                None => println!("{id}: Search({key}) - false"),
            }
        }
    }
}

fn main() {
    println!("Stress driver started.");

    let list = Arc::new(CrabList::new());
    let barrier = Arc::new(Barrier::new(MAX_THREADS));

    let workers: Vec<_> = (1..=MAX_THREADS)
        .map(|id| {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || worker(id, &list, &barrier))
        })
        .collect();
    println!("All threads created. Waiting for them.");

    for w in workers {
        w.join().unwrap();
    }

    let mut list = match Arc::try_unwrap(list) {
        Ok(list) => list,
        Err(_) => unreachable!("all workers joined"),
    };
    list.check_invariants();

    let live = list.collect();
    assert!(live.iter().all(|(k, _)| (1..=100).contains(k)));
    println!("Invariants hold; {} live keys. Test ended successfully.", live.len());
}
