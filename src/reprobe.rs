//! Fixed reprobe offset sequence, used both for collision resolution on
//! claim and as a back-pointer code stored in large continuations.

/// `reprobes[0..=limit]`, a fixed, strictly increasing sequence of odd
/// offsets. `reprobes[0]` doubles as the fixed hop from a claimed slot to
/// its first large continuation.
#[derive(Clone, Debug)]
pub struct ReprobeSchedule {
	offsets: Vec<u64>,
}

impl ReprobeSchedule {
	/// Builds the schedule `reprobes[0..=limit]`. Offsets are `2*i*i + i + 1`
	/// (odd, strictly increasing), the classic quadratic-probing sequence
	/// adapted so offset `0` is never used (a displacement of zero would be
	/// indistinguishable from "no reprobe").
	pub fn new(limit: u32) -> Self {
		let offsets = (0..=limit as u64).map(|i| 2 * i * i + i + 1).collect();
		ReprobeSchedule { offsets }
	}

	#[inline]
	pub fn limit(&self) -> u32 {
		(self.offsets.len() - 1) as u32
	}

	#[inline]
	pub fn get(&self, step: u32) -> u64 {
		self.offsets[step as usize]
	}

	/// Bits required to encode the reprobe-code values this schedule's
	/// slots may need to store: `0..=limit` for large continuations and
	/// `1..=limit+1` for home slots.
	pub fn code_bits(&self) -> u32 {
		let max_code = self.limit() as u64 + 1;
		64 - max_code.leading_zeros()
	}

	pub fn as_slice(&self) -> &[u64] {
		&self.offsets
	}
}
