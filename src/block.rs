//! Zero-initialized, fixed-size word array backing a `PackedArray`. No
//! resizing: once constructed, its length never changes (spec Non-goal).

use std::convert::TryInto;
use std::sync::atomic::AtomicU64;

pub struct MemoryBlock {
	words: Box<[AtomicU64]>,
}

impl MemoryBlock {
	pub fn new(word_len: usize) -> MemoryBlock {
		let mut v = Vec::with_capacity(word_len);
		v.resize_with(word_len, || AtomicU64::new(0));
		MemoryBlock { words: v.into_boxed_slice() }
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.words.len()
	}

	#[inline]
	pub fn word(&self, index: usize) -> &AtomicU64 {
		&self.words[index]
	}

	/// Raw little-endian byte dump of the word array, for `write_raw`.
	pub fn to_raw_bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.words.len() * 8);
		for w in self.words.iter() {
			out.extend_from_slice(&w.load(std::sync::atomic::Ordering::Relaxed).to_le_bytes());
		}
		out
	}

	/// Reconstructs a block from a raw byte dump (as produced by
	/// `to_raw_bytes`). `bytes.len()` must be a multiple of 8.
	pub fn from_raw_bytes(bytes: &[u8]) -> MemoryBlock {
		assert_eq!(bytes.len() % 8, 0);
		let words: Vec<AtomicU64> = bytes
			.chunks_exact(8)
			.map(|c| AtomicU64::new(u64::from_le_bytes(c.try_into().unwrap())))
			.collect();
		MemoryBlock { words: words.into_boxed_slice() }
	}
}
