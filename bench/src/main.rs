//! Multi-threaded stress test of `PackedArray::add`, followed by a
//! compaction dump. Not a benchmark harness with configurable CLI flags
//! (argument parsing is out of scope) — tune the constants below and
//! rebuild.

#[cfg(all(not(windows), not(target_env = "musl")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pkmer_hash::{ArrayOptions, CompactionOptions, CompactionWriter, PackedArray, ReversibleHash};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const KEY_LEN: u32 = 28; // 14-base k-mers
const TABLE_SIZE: u64 = 1 << 24;
const VAL_LEN: u32 = 5;
const LVAL_LEN: u32 = 24;
const REPROBE_LIMIT: u32 = 62;
const WRITER_THREADS: usize = 4;
const ADDS_PER_THREAD: u64 = 4_000_000;

fn main() {
	env_logger::init();

	let mut seed_rng = SmallRng::seed_from_u64(0xDEAD_BEEF);
	let hash = ReversibleHash::random(KEY_LEN, &mut seed_rng);
	let options = ArrayOptions::new(TABLE_SIZE, KEY_LEN, VAL_LEN, LVAL_LEN, REPROBE_LIMIT);
	let array = Arc::new(PackedArray::new(options, hash).expect("valid array options"));

	let failures = Arc::new(AtomicU64::new(0));
	let start = Instant::now();

	let handles: Vec<_> = (0..WRITER_THREADS)
		.map(|t| {
			let array = array.clone();
			let failures = failures.clone();
			std::thread::spawn(move || {
				let mut rng = SmallRng::seed_from_u64(t as u64);
				for _ in 0..ADDS_PER_THREAD {
					let key = (rng.gen::<u64>() % ((1u64 << KEY_LEN) - 1)) + 1;
					if !array.add(key, 1) {
						failures.fetch_add(1, Ordering::Relaxed);
					}
				}
			})
		})
		.collect();

	for h in handles {
		h.join().expect("writer thread panicked");
	}

	let elapsed = start.elapsed();
	let total_adds = WRITER_THREADS as u64 * ADDS_PER_THREAD;
	let stats = array.stats();
	println!(
		"{} adds in {:?} ({:.1} adds/s); home_slots={} large_slots={} failed_claims={}",
		total_adds,
		elapsed,
		total_adds as f64 / elapsed.as_secs_f64(),
		stats.home_slots,
		stats.large_slots,
		failures.load(Ordering::Relaxed),
	);

	let dump_start = Instant::now();
	let cursor = Cursor::new(Vec::new());
	let writer = CompactionWriter::new(CompactionOptions::new(KEY_LEN / 2, 4), cursor);
	writer.write_header(array.size()).expect("write header");

	std::thread::scope(|scope| {
		let slices = WRITER_THREADS as u64;
		for s in 0..slices {
			let array = &array;
			let writer = &writer;
			scope.spawn(move || {
				let mut iter = array.iter_slice(s, slices);
				writer.dump(&mut iter).expect("dump slice");
			});
		}
	});
	writer.update_stats().expect("update stats");

	println!(
		"dump in {:?}: unique={} distinct={} total={}",
		dump_start.elapsed(),
		writer.unique(),
		writer.distinct(),
		writer.total(),
	);
}
