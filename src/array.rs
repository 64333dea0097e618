//! The packed hash array: claim-key-then-increment-value logic, overflow
//! to large slots, and the read paths that reconstruct keys and sum
//! overflow chains. See `SPEC_FULL.md` §4.5 for the design rationale
//! behind the bit layout and the multi-level `get_key_val_full` walk.

use std::convert::TryInto;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::MemoryBlock;
use crate::display::hex_key;
use crate::error::{Error, Result};
use crate::hash::ReversibleHash;
use crate::offsets::{FieldSpan, OffsetTable};
use crate::options::ArrayOptions;
use crate::reprobe::ReprobeSchedule;

#[inline]
fn mask(bits: u32) -> u64 {
	if bits == 0 {
		0
	} else if bits >= 64 {
		u64::MAX
	} else {
		(1u64 << bits) - 1
	}
}

enum WordClaim {
	Claimed,
	Merged,
	Mismatch,
}

#[inline]
fn set_key_word(word: &AtomicU64, nkey: u64, free_mask: u64) -> WordClaim {
	let mut old = word.load(Ordering::Relaxed);
	loop {
		if old & free_mask == 0 {
			match word.compare_exchange_weak(old, old | nkey, Ordering::AcqRel, Ordering::Relaxed) {
				Ok(_) => return WordClaim::Claimed,
				Err(cur) => {
					old = cur;
					continue;
				}
			}
		} else if old & free_mask == nkey {
			return WordClaim::Merged;
		} else {
			return WordClaim::Mismatch;
		}
	}
}

enum Claim {
	New,
	Merge,
	Fail,
}

/// CAS-adds `delta` into the `width`-bit sub-field at bit `boff` of `word`.
/// Returns `(masked_field_value_after, carry_out_of_the_field_width)`.
#[inline]
fn cas_add(word: &AtomicU64, delta: u64, boff: u32, width: u32) -> u64 {
	let m = mask(width);
	loop {
		let old = word.load(Ordering::Relaxed);
		let cur = (old >> boff) & m;
		let sum = cur.wrapping_add(delta);
		let newf = sum & m;
		let neww = (old & !(m << boff)) | (newf << boff);
		match word.compare_exchange_weak(old, neww, Ordering::AcqRel, Ordering::Relaxed) {
			Ok(_) => return sum >> width,
			Err(_) => continue,
		}
	}
}

/// Runtime statistics snapshot, exposed for operational visibility (not
/// part of the Jellyfish original, which has no equivalent).
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
	pub home_slots: u64,
	pub large_slots: u64,
}

pub struct PackedArray {
	size: u64,
	size_mask: u64,
	addr_bits: u32,
	key_len: u32,
	val_len: u32,
	lval_len: u32,
	reprobes: ReprobeSchedule,
	offsets: OffsetTable,
	block: MemoryBlock,
	hash: ReversibleHash,
	home_slots: AtomicU64,
	large_slots: AtomicU64,
}

impl PackedArray {
	pub fn new(options: ArrayOptions, hash: ReversibleHash) -> Result<PackedArray> {
		options.validate().map_err(Error::InvalidMap)?;
		assert_eq!(hash.key_len(), options.key_len, "hash matrix key_len must match options.key_len");

		let size = options.size.next_power_of_two();
		let addr_bits = size.trailing_zeros();
		let reprobes = ReprobeSchedule::new(options.reprobe_limit);
		let stored_key_bits = options.key_len - addr_bits;
		let reprobe_bits = reprobes.code_bits();
		let offsets = OffsetTable::new(stored_key_bits, reprobe_bits, options.val_len, options.lval_len);

		let block_len = offsets.block_len() as u64;
		let block_count = (size + block_len - 1) / block_len;
		let block = MemoryBlock::new((block_count as usize) * offsets.block_word_len());

		log::debug!(
			target: "pkmer_hash",
			"new packed array: size={} key_len={} stored_key_bits={} reprobe_bits={} val_len={} lval_len={}",
			size, options.key_len, stored_key_bits, reprobe_bits, options.val_len, options.lval_len,
		);

		Ok(PackedArray {
			size,
			size_mask: size - 1,
			addr_bits,
			key_len: options.key_len,
			val_len: options.val_len,
			lval_len: options.lval_len,
			reprobes,
			offsets,
			block,
			hash,
			home_slots: AtomicU64::new(0),
			large_slots: AtomicU64::new(0),
		})
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn key_len(&self) -> u32 {
		self.key_len
	}

	pub fn val_len(&self) -> u32 {
		self.val_len
	}

	pub fn reprobe_limit(&self) -> u32 {
		self.reprobes.limit()
	}

	pub fn stats(&self) -> Stats {
		Stats {
			home_slots: self.home_slots.load(Ordering::Relaxed),
			large_slots: self.large_slots.load(Ordering::Relaxed),
		}
	}

	#[inline]
	fn read_field(&self, base: usize, span: &FieldSpan) -> u64 {
		let w0 = self.block.word(base + span.word0).load(Ordering::Relaxed);
		let w1 = if span.splits() { self.block.word(base + span.word0 + 1).load(Ordering::Relaxed) } else { 0 };
		span.extract(w0, w1)
	}

	fn claim_key_field(&self, base: usize, span: &FieldSpan, value: u64) -> Claim {
		let (v0, v1) = span.place(value);
		let w0 = self.block.word(base + span.word0);
		let r0 = set_key_word(w0, v0, span.mask1());
		if matches!(r0, WordClaim::Mismatch) {
			return Claim::Fail;
		}
		if span.splits() {
			let w1 = self.block.word(base + span.word0 + 1);
			let r1 = set_key_word(w1, v1, span.mask2());
			if matches!(r1, WordClaim::Mismatch) {
				// word0 was mutated (claimed or merged) but word1 didn't match:
				// the slot is leaked per spec §5, no rollback attempted.
				return Claim::Fail;
			}
			return if matches!(r0, WordClaim::Claimed) && matches!(r1, WordClaim::Claimed) {
				Claim::New
			} else {
				Claim::Merge
			};
		}
		if matches!(r0, WordClaim::Claimed) { Claim::New } else { Claim::Merge }
	}

	fn add_field(&self, base: usize, span: &FieldSpan, delta: u64) -> u64 {
		let w0 = self.block.word(base + span.word0);
		let carry0 = cas_add(w0, delta, span.boff, span.bits_in_word0);
		if !span.splits() || carry0 == 0 {
			return if span.splits() { 0 } else { carry0 };
		}
		let w1 = self.block.word(base + span.word0 + 1);
		cas_add(w1, carry0, 0, span.width - span.bits_in_word0)
	}

	/// Inserts `val` at `key`'s home slot (claiming it first if necessary),
	/// recursing into large continuations on overflow. Returns `false` if
	/// the reprobe limit was exceeded at any level (table full).
	pub fn add(&self, key: u64, val: u64) -> bool {
		let h = self.hash.times(key);
		let home = h & self.size_mask;
		let stored_high = h >> self.addr_bits;
		self.add_rec(home, stored_high, val, false)
	}

	/// Convenience wrapper over [`PackedArray::add`] for callers that want
	/// the table-full condition surfaced through [`Error`] rather than a
	/// bare `bool`.
	pub fn try_add(&self, key: u64, val: u64) -> Result<()> {
		if self.add(key, val) {
			Ok(())
		} else {
			Err(Error::TableFull)
		}
	}

	fn add_rec(&self, id: u64, stored_high: u64, val: u64, large: bool) -> bool {
		let limit = self.reprobes.limit();
		let mut r = 0u32;
		let mut cid = id;

		let (base, value_span) = loop {
			let (base, layout) = self.offsets.locate(cid);
			let key_val = if large {
				((r as u64) << layout.stored_key_bits) | (1u64 << layout.large_bit)
			} else {
				stored_high | (((r as u64) + 1) << layout.stored_key_bits) | (1u64 << layout.status_bit)
			};

			match self.claim_key_field(base, &layout.key, key_val) {
				Claim::Fail => {
					if r == limit {
						log::trace!(target: "pkmer_hash", "table full claiming key {} at slot {}", hex_key(stored_high, self.key_len), id);
						return false;
					}
					r += 1;
					cid = (id + self.reprobes.get(r)) & self.size_mask;
					continue;
				}
				Claim::New => {
					if large {
						self.large_slots.fetch_add(1, Ordering::Relaxed);
					} else {
						self.home_slots.fetch_add(1, Ordering::Relaxed);
					}
				}
				Claim::Merge => {}
			}
			break (base, if large { &layout.value_large } else { &layout.value_normal });
		};

		let carry = self.add_field(base, value_span, val);
		if carry == 0 {
			return true;
		}

		let next_id = (cid + self.reprobes.get(0)) & self.size_mask;
		if self.add_rec(next_id, stored_high, carry, true) {
			return true;
		}

		// Sub-recursion failed: the table is full. Back out this level's
		// increment so a failed add doesn't leave an inflated count.
		let sub = val.wrapping_neg() & mask(value_span.width);
		self.add_field(base, value_span, sub);
		false
	}

	/// Resolves the logical key stored at `id` by walking backward through
	/// the large-continuation chain until a home slot is reached, returning
	/// that slot's stored-key fragment and the value found *at `id`*
	/// (not the chain's total). Mirrors the Jellyfish original's
	/// `get_key_val`.
	pub fn get_key_val(&self, id: u64) -> Option<(u64, u64)> {
		let mut cur = id;
		let mut overflows = 0u32;
		loop {
			let (base, layout) = self.offsets.locate(cur);
			let raw = self.read_field(base, &layout.key);
			let large = raw & (1u64 << layout.large_bit) != 0;
			if large {
				let code = (raw >> layout.stored_key_bits) & mask(layout.reprobe_bits);
				if code != 0 {
					cur = cur.wrapping_sub(self.reprobes.get(code as u32)) & self.size_mask;
				}
				cur = cur.wrapping_sub(self.reprobes.get(0)) & self.size_mask;
				overflows += 1;
				continue;
			}
			if raw & (1u64 << layout.status_bit) == 0 {
				return None;
			}
			let key_fragment = raw & mask(layout.stored_key_bits);
			let (obase, olayout) = self.offsets.locate(id);
			let ospan = if overflows == 0 { &olayout.value_normal } else { &olayout.value_large };
			let mut val = self.read_field(obase, ospan);
			if overflows > 0 {
				let shift = self.val_len + (overflows - 1) * self.lval_len;
				val <<= shift;
			}
			return Some((key_fragment, val));
		}
	}

	/// Sums a home slot's value with all of its large continuations,
	/// walking forward level by level (each level's base slot is the
	/// previous level's claimed slot plus `reprobes[0]`, exactly mirroring
	/// how `add_rec` picks the next overflow slot). Unlike the Jellyfish
	/// original (which stops after one continuation — see `SPEC_FULL.md`
	/// §4.5), this continues until a level has no continuation.
	fn sum_chain(&self, home_id: u64, home_val: u64) -> u64 {
		let mut val = home_val;
		let mut level_base = home_id;
		let mut overflows = 0u32;
		loop {
			let next_level_base = (level_base + self.reprobes.get(0)) & self.size_mask;
			let mut found = None;
			let mut r = 0u32;
			loop {
				let cid = if r == 0 { next_level_base } else { (next_level_base + self.reprobes.get(r)) & self.size_mask };
				let (cbase, clayout) = self.offsets.locate(cid);
				let craw = self.read_field(cbase, &clayout.key);
				if craw & (1u64 << clayout.large_bit) != 0 {
					let code = (craw >> clayout.stored_key_bits) & mask(clayout.reprobe_bits);
					if code == r as u64 {
						let mut nval = self.read_field(cbase, &clayout.value_large);
						let shift = self.val_len + overflows * self.lval_len;
						nval <<= shift;
						val = val.wrapping_add(nval);
						found = Some(cid);
						break;
					}
				} else {
					break;
				}
				r += 1;
				if r > self.reprobes.limit() {
					break;
				}
			}
			match found {
				Some(cid) => {
					overflows += 1;
					level_base = cid;
				}
				None => break,
			}
		}
		val
	}

	/// Returns the stored-key fragment and the full (chain-summed) value
	/// at home slot `id`, or `None` if `id` is empty or itself a large
	/// continuation (the caller should skip past it while iterating).
	pub fn get_key_val_full(&self, id: u64) -> Option<(u64, u64)> {
		let (base, layout) = self.offsets.locate(id);
		let raw = self.read_field(base, &layout.key);
		if raw & (1u64 << layout.large_bit) != 0 {
			return None;
		}
		if raw & (1u64 << layout.status_bit) == 0 {
			return None;
		}
		let key_fragment = raw & mask(layout.stored_key_bits);
		let home_val = self.read_field(base, &layout.value_normal);
		Some((key_fragment, self.sum_chain(id, home_val)))
	}

	/// Linear probe from `id` for a home slot whose stored-key fragment
	/// equals `key`, per spec.md's `get_val`. `full` sums the overflow
	/// chain as `get_key_val_full` does.
	pub fn get_val(&self, id: u64, key: u64, full: bool) -> Option<u64> {
		let limit = self.reprobes.limit();
		let mut r = 0u32;
		let mut cid = id;
		let home_val = loop {
			let (base, layout) = self.offsets.locate(cid);
			let raw = self.read_field(base, &layout.key);
			if raw & (1u64 << layout.large_bit) == 0
				&& raw & (1u64 << layout.status_bit) != 0
				&& (raw & mask(layout.stored_key_bits)) == key
			{
				break self.read_field(base, &layout.value_normal);
			}
			if r == limit {
				return None;
			}
			r += 1;
			cid = (id + self.reprobes.get(r)) & self.size_mask;
		};
		if full {
			Some(self.sum_chain(cid, home_val))
		} else {
			Some(home_val)
		}
	}

	/// Iterator over the half-open slot range `[start, end)`.
	pub fn iter_range(&self, start: u64, end: u64) -> PackedArrayIter<'_> {
		PackedArrayIter { array: self, pos: start, end, key: 0, val: 0 }
	}

	pub fn iter_all(&self) -> PackedArrayIter<'_> {
		self.iter_range(0, self.size)
	}

	pub fn iter_slice(&self, slice_number: u64, number_of_slices: u64) -> PackedArrayIter<'_> {
		let slice_size = self.size / number_of_slices;
		self.iter_range(slice_number * slice_size, (slice_number + 1) * slice_size)
	}

	/// Writes the raw word array per spec.md §6: a 32-byte header
	/// (`size`, stored-key-fragment width in bits, `val_len`,
	/// `reprobe_limit`), the reprobe schedule, 16-byte alignment padding, a
	/// reserved `zero_count` field (always `0`), then the raw word array.
	pub fn write_raw<W: std::io::Write>(&self, out: &mut W) -> Result<()> {
		let stored_key_bits = self.offsets.stored_key_bits() as u64;
		out.write_all(&self.size.to_le_bytes())?;
		out.write_all(&stored_key_bits.to_le_bytes())?;
		out.write_all(&(self.val_len as u64).to_le_bytes())?;
		out.write_all(&(self.reprobes.limit() as u64).to_le_bytes())?;
		let mut written = 32usize;
		for i in 0..=self.reprobes.limit() {
			out.write_all(&self.reprobes.get(i).to_le_bytes())?;
			written += 8;
		}
		let pad = (16 - (written % 16)) % 16;
		if pad > 0 {
			out.write_all(&vec![0u8; pad])?;
		}
		out.write_all(&0u64.to_le_bytes())?; // zero_count, reserved
		out.write_all(&self.block.to_raw_bytes())?;
		Ok(())
	}

	/// Reconstructs a [`PackedArray`] from bytes produced by
	/// [`PackedArray::write_raw`]. The raw format does not persist
	/// `lval_len` or the reversible hash matrix (neither does Jellyfish's
	/// original format) — the caller must supply the same values used at
	/// construction.
	pub fn read_raw(bytes: &[u8], lval_len: u32, hash: ReversibleHash) -> Result<PackedArray> {
		if bytes.len() < 32 {
			return Err(Error::InvalidMap("raw dump shorter than 32-byte header".into()));
		}
		let size = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
		let stored_key_bits = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as u32;
		let val_len = u64::from_le_bytes(bytes[16..24].try_into().unwrap()) as u32;
		let reprobe_limit = u64::from_le_bytes(bytes[24..32].try_into().unwrap()) as u32;

		if size == 0 || !size.is_power_of_two() {
			return Err(Error::InvalidMap(format!("size {} is not a nonzero power of two", size)));
		}

		let reprobes_bytes = 8 * (reprobe_limit as usize + 1);
		if bytes.len() < 32 + reprobes_bytes {
			return Err(Error::InvalidMap("raw dump truncated within reprobe schedule".into()));
		}
		let mut reprobes = Vec::with_capacity(reprobe_limit as usize + 1);
		for i in 0..=reprobe_limit {
			let off = 32 + 8 * i as usize;
			reprobes.push(u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap()));
		}
		let expected = ReprobeSchedule::new(reprobe_limit);
		if reprobes.as_slice() != expected.as_slice() {
			return Err(Error::InvalidMap("reprobe schedule does not match the deterministic schedule for this reprobe_limit".into()));
		}

		let mut pos = 32 + reprobes_bytes;
		pos += (16 - (pos % 16)) % 16;
		if bytes.len() < pos + 8 {
			return Err(Error::InvalidMap("raw dump truncated before zero_count".into()));
		}
		pos += 8; // zero_count, ignored

		let addr_bits = size.trailing_zeros();
		let key_len = stored_key_bits + addr_bits;
		if key_len != hash.key_len() {
			return Err(Error::InvalidMap(format!(
				"header implies key_len {} but supplied hash matrix has key_len {}",
				key_len,
				hash.key_len()
			)));
		}

		let reprobe_bits = expected.code_bits();
		let offsets = OffsetTable::new(stored_key_bits, reprobe_bits, val_len, lval_len);
		let block_len = offsets.block_len() as u64;
		let block_count = (size + block_len - 1) / block_len;
		let word_len = block_count as usize * offsets.block_word_len();
		let data = &bytes[pos..];
		if data.len() < word_len * 8 {
			return Err(Error::InvalidMap("raw dump truncated within the word array".into()));
		}
		let block = MemoryBlock::from_raw_bytes(&data[..word_len * 8]);

		Ok(PackedArray {
			size,
			size_mask: size - 1,
			addr_bits,
			key_len,
			val_len,
			lval_len,
			reprobes: expected,
			offsets,
			block,
			hash,
			home_slots: AtomicU64::new(0),
			large_slots: AtomicU64::new(0),
		})
	}
}

/// Iterator over a slot range, matching the external contract spec.md §6
/// requires of any producer an external heap-merge tool would consume:
/// `next() -> bool`, a current `key`, a current `val`, and `get_pos()`.
pub struct PackedArrayIter<'a> {
	array: &'a PackedArray,
	pos: u64,
	end: u64,
	pub key: u64,
	pub val: u64,
}

impl<'a> PackedArrayIter<'a> {
	pub fn next(&mut self) -> bool {
		while self.pos < self.end {
			let id = self.pos;
			self.pos += 1;
			if let Some((stored_high, val)) = self.array.get_key_val_full(id) {
				let h = (stored_high << self.array.addr_bits) | id;
				self.key = self.array.hash.invert_times(h);
				self.val = val;
				return true;
			}
		}
		false
	}

	pub fn get_pos(&self) -> u64 {
		self.pos
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::rngs::SmallRng;
	use rand::SeedableRng;

	fn small_array(size: u64, key_len: u32, val_len: u32, lval_len: u32, reprobe_limit: u32) -> PackedArray {
		env_logger::try_init().ok();
		let mut rng = SmallRng::seed_from_u64(42);
		let hash = ReversibleHash::random(key_len, &mut rng);
		let options = ArrayOptions::new(size, key_len, val_len, lval_len, reprobe_limit);
		PackedArray::new(options, hash).unwrap()
	}

	fn drain_all(array: &PackedArray) -> Vec<(u64, u64)> {
		let mut iter = array.iter_all();
		let mut out = Vec::new();
		while iter.next() {
			out.push((iter.key, iter.val));
		}
		out
	}

	// Scenario A: key_len=4, size=16, val_len=4, lval_len=8, reprobe_limit=3.
	// Insert 0x5 fifteen times: single entry, no overflow.
	#[test]
	fn scenario_a_repeated_insert_no_overflow() {
		let array = small_array(16, 4, 4, 8, 3);
		for _ in 0..15 {
			assert!(array.add(0x5, 1));
		}
		let entries = drain_all(&array);
		assert_eq!(entries, vec![(0x5, 15)]);
	}

	// Scenario B: same config, insert 0x5 sixteen times, forcing exactly
	// one overflow (home value field maxes at 2^4-1=15, 16th increment
	// overflows by 1 into a large continuation).
	#[test]
	fn scenario_b_single_overflow() {
		let array = small_array(16, 4, 4, 8, 3);
		for _ in 0..16 {
			assert!(array.add(0x5, 1));
		}
		let entries = drain_all(&array);
		assert_eq!(entries, vec![(0x5, 16)]);
		assert_eq!(array.stats().large_slots, 1);
	}

	// Scenario C: two colliding keys hashing to the same home; the second
	// must occupy (home + reprobes[1]) & size_mask with reprobe_code 2.
	#[test]
	fn scenario_c_collision_reprobes() {
		let array = small_array(16, 4, 4, 8, 3);
		// Find two distinct keys whose hash collides on the home slot.
		let mut by_home: std::collections::HashMap<u64, Vec<u64>> = std::collections::HashMap::new();
		for k in 1u64..16 {
			let h = array.hash.times(k) & array.size_mask;
			by_home.entry(h).or_default().push(k);
		}
		let (_, keys) = by_home.iter().find(|(_, v)| v.len() >= 2).expect("need a collision among 15 keys in a 16-slot table");
		let (k1, k2) = (keys[0], keys[1]);
		assert!(array.add(k1, 1));
		assert!(array.add(k2, 1));
		let mut entries = drain_all(&array);
		entries.sort();
		let mut expected = vec![(k1, 1), (k2, 1)];
		expected.sort();
		assert_eq!(entries, expected);

		let home = array.hash.times(k1) & array.size_mask;
		let second_slot = (home + array.reprobes.get(1)) & array.size_mask;
		let (base, layout) = array.offsets.locate(second_slot);
		let raw = array.read_field(base, &layout.key);
		assert_eq!(raw & (1u64 << layout.large_bit), 0);
		let code = (raw >> layout.stored_key_bits) & mask(layout.reprobe_bits);
		assert_eq!(code, 2);
	}

	#[test]
	fn count_conservation_single_threaded() {
		let array = small_array(1024, 16, 6, 10, 20);
		let mut rng = SmallRng::seed_from_u64(7);
		use rand::Rng;
		let mut expected: std::collections::HashMap<u64, u64> = std::collections::HashMap::new();
		for _ in 0..4000 {
			// Draw from a domain much smaller than the table size so the
			// number of *distinct* keys (which is what consumes home slots)
			// stays well under `size`, even though the full 16-bit key_len
			// is exercised by the chosen keys.
			let k = (rng.gen::<u64>() % 400) + 1; // avoid the zero-key sentinel
			*expected.entry(k).or_default() += 1;
			assert!(array.add(k, 1));
		}
		let entries = drain_all(&array);
		assert_eq!(entries.len(), expected.len());
		for (k, v) in entries {
			assert_eq!(v, expected[&k]);
		}
	}

	#[test]
	fn back_out_leaves_existing_counts_unchanged() {
		// A tiny table with a tight reprobe limit fills quickly; once add()
		// starts returning false, already-recorded counts must be intact.
		let array = small_array(8, 8, 3, 4, 2);
		let mut rng = SmallRng::seed_from_u64(99);
		use rand::Rng;
		let mut succeeded: std::collections::HashMap<u64, u64> = std::collections::HashMap::new();
		let mut any_failure = false;
		for _ in 0..200 {
			let k = (rng.gen::<u64>() % 255) + 1;
			if array.add(k, 1) {
				*succeeded.entry(k).or_default() += 1;
			} else {
				any_failure = true;
			}
		}
		assert!(any_failure, "expected the tiny table to fill up");
		let entries = drain_all(&array);
		assert_eq!(entries.len(), succeeded.len());
		for (k, v) in entries {
			assert_eq!(v, succeeded[&k]);
		}
	}

	#[test]
	fn try_add_reports_table_full_as_an_error() {
		let array = small_array(8, 8, 3, 4, 2);
		let mut rng = SmallRng::seed_from_u64(99);
		use rand::Rng;
		let mut hit_table_full = false;
		for _ in 0..200 {
			let k = (rng.gen::<u64>() % 255) + 1;
			if let Err(err) = array.try_add(k, 1) {
				assert!(matches!(err, Error::TableFull));
				hit_table_full = true;
			}
		}
		assert!(hit_table_full, "expected the tiny table to fill up");
	}

	#[test]
	fn serialization_round_trip() {
		let array = small_array(256, 16, 6, 10, 10);
		let mut rng = SmallRng::seed_from_u64(5);
		use rand::Rng;
		for _ in 0..500 {
			let k = (rng.gen::<u64>() % ((1u64 << 16) - 1)) + 1;
			array.add(k, 1);
		}
		let mut bytes = Vec::new();
		array.write_raw(&mut bytes).unwrap();

		let hash2 = array.hash.clone();
		let reopened = PackedArray::read_raw(&bytes, array.lval_len, hash2).unwrap();

		assert_eq!(drain_all(&array), drain_all(&reopened));
	}

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("pkmer-hash-test");
			path.push("array");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn file(&self, name: &str) -> std::path::PathBuf {
			self.0.join(name)
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	// Scenario F: serialize to an actual file on disk, reopen from the
	// bytes read back, and assert the iterator sequence matches exactly.
	#[test]
	fn serialization_round_trip_through_disk() {
		let dir = TempDir::new("serialization_round_trip_through_disk");
		let array = small_array(256, 16, 6, 10, 10);
		let mut rng = SmallRng::seed_from_u64(11);
		use rand::Rng;
		for _ in 0..500 {
			let k = (rng.gen::<u64>() % ((1u64 << 16) - 1)) + 1;
			array.add(k, 1);
		}

		let path = dir.file("dump.raw");
		let mut file = std::fs::File::create(&path).unwrap();
		array.write_raw(&mut file).unwrap();
		drop(file);

		let bytes = std::fs::read(&path).unwrap();
		let hash2 = array.hash.clone();
		let reopened = PackedArray::read_raw(&bytes, array.lval_len, hash2).unwrap();
		assert_eq!(drain_all(&array), drain_all(&reopened));
	}

	#[test]
	fn count_conservation_concurrent() {
		let array = std::sync::Arc::new(small_array(16384, 18, 6, 10, 24));
		const THREADS: u64 = 4;
		const PER_THREAD: u64 = 2000;

		let handles: Vec<_> = (0..THREADS)
			.map(|t| {
				let array = array.clone();
				std::thread::spawn(move || {
					// Each thread owns a disjoint key sub-range so the
					// expected per-key counts are known without a lock.
					let base = t * PER_THREAD + 1;
					for i in 0..PER_THREAD {
						let k = base + i;
						assert!(array.add(k, 1));
						assert!(array.add(k, 1)); // two increments per key, from the same thread
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}

		let entries: std::collections::HashMap<u64, u64> = drain_all(&array).into_iter().collect();
		assert_eq!(entries.len(), (THREADS * PER_THREAD) as usize);
		for v in entries.values() {
			assert_eq!(*v, 2);
		}
	}

	#[test]
	fn read_raw_rejects_short_input() {
		let err = PackedArray::read_raw(&[0u8; 10], 8, {
			let mut rng = SmallRng::seed_from_u64(1);
			ReversibleHash::random(8, &mut rng)
		})
		.unwrap_err();
		assert!(matches!(err, Error::InvalidMap(_)));
	}
}
