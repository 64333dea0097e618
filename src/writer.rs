//! Compaction writer: dumps a [`crate::array::PackedArrayIter`] to a
//! buffered, fixed-record key/value file. Values wider than the on-disk
//! field are saturated; `unique`/`distinct`/`total` track the true
//! (unsaturated) counts.

use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::array::PackedArrayIter;
use crate::error::Result;
use crate::options::CompactionOptions;

/// Byte size of the on-disk header: `mer_len, val_len, size, unique,
/// distinct, total`, each an 8-byte little-endian integer.
pub const HEADER_LEN: usize = 48;
const STATS_OFFSET: u64 = 24; // offset of `unique` within the header

pub struct CompactionWriter<W> {
	mer_len: u32,
	key_disk_len: usize,
	val_disk_len: usize,
	record_len: usize,
	buffer_len: usize,
	max_count: u64,
	out: Mutex<W>,
	unique: AtomicU64,
	distinct: AtomicU64,
	total: AtomicU64,
}

impl<W: Write + Seek> CompactionWriter<W> {
	pub fn new(options: CompactionOptions, out: W) -> Self {
		let key_disk_len = options.key_disk_len();
		let val_disk_len = options.val_disk_len as usize;
		let record_len = key_disk_len + val_disk_len;
		let nb_record = (options.buffer_size / record_len).max(1);
		CompactionWriter {
			mer_len: options.mer_len,
			key_disk_len,
			val_disk_len,
			record_len,
			buffer_len: nb_record * record_len,
			max_count: saturating_max(options.val_disk_len),
			out: Mutex::new(out),
			unique: AtomicU64::new(0),
			distinct: AtomicU64::new(0),
			total: AtomicU64::new(0),
		}
	}

	pub fn mer_len(&self) -> u32 {
		self.mer_len
	}

	pub fn val_len(&self) -> usize {
		self.val_disk_len
	}

	pub fn unique(&self) -> u64 {
		self.unique.load(Ordering::Relaxed)
	}

	pub fn distinct(&self) -> u64 {
		self.distinct.load(Ordering::Relaxed)
	}

	pub fn total(&self) -> u64 {
		self.total.load(Ordering::Relaxed)
	}

	/// Writes the header with the final `size` but zeroed stats. Must run
	/// before any `dump` so later writers don't overwrite each other's
	/// records with the header.
	pub fn write_header(&self, size: u64) -> Result<()> {
		let mut out = self.out.lock();
		out.seek(SeekFrom::Start(0))?;
		out.write_all(&self.mer_len_as_u64().to_le_bytes())?;
		out.write_all(&(self.val_disk_len as u64).to_le_bytes())?;
		out.write_all(&size.to_le_bytes())?;
		out.write_all(&0u64.to_le_bytes())?; // unique
		out.write_all(&0u64.to_le_bytes())?; // distinct
		out.write_all(&0u64.to_le_bytes())?; // total
		Ok(())
	}

	/// Rewrites the stats trailer of the header with the counters
	/// accumulated so far. Call once, after all `dump` calls complete.
	pub fn update_stats(&self) -> Result<()> {
		let mut out = self.out.lock();
		out.seek(SeekFrom::Start(STATS_OFFSET))?;
		out.write_all(&self.unique().to_le_bytes())?;
		out.write_all(&self.distinct().to_le_bytes())?;
		out.write_all(&self.total().to_le_bytes())?;
		Ok(())
	}

	fn mer_len_as_u64(&self) -> u64 {
		self.mer_len as u64
	}

	/// Drains `iter` to the end, buffering records locally before taking the
	/// shared output lock to flush. Safe to call concurrently from several
	/// threads, each over a disjoint slice of the same array.
	pub fn dump(&self, iter: &mut PackedArrayIter<'_>) -> Result<()> {
		let mut buffer = Vec::with_capacity(self.buffer_len);
		let (mut unique, mut distinct, mut total) = (0u64, 0u64, 0u64);

		loop {
			buffer.clear();
			while buffer.len() + self.record_len <= self.buffer_len {
				if !iter.next() {
					break;
				}
				buffer.extend_from_slice(&iter.key.to_le_bytes()[..self.key_disk_len]);
				let count = iter.val.min(self.max_count);
				buffer.extend_from_slice(&count.to_le_bytes()[..self.val_disk_len]);
				if iter.val == 1 {
					unique += 1;
				}
				distinct += 1;
				total += iter.val;
			}
			if buffer.is_empty() {
				break;
			}
			{
				let mut out = self.out.lock();
				out.write_all(&buffer)?;
			}
		}

		self.unique.fetch_add(unique, Ordering::Relaxed);
		self.distinct.fetch_add(distinct, Ordering::Relaxed);
		self.total.fetch_add(total, Ordering::Relaxed);
		Ok(())
	}
}

fn saturating_max(val_disk_len: u32) -> u64 {
	if val_disk_len >= 8 {
		u64::MAX
	} else {
		(1u64 << (8 * val_disk_len)) - 1
	}
}
