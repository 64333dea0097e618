//! Invertible linear map over GF(2) on `key_len`-bit words.
//!
//! `times(x)` computes `M * x` by XOR-accumulating the rows of `M` selected
//! by the set bits of `x`. The matrix is sampled uniformly at random until
//! invertible (checked by Gaussian elimination), and its inverse is kept
//! alongside so the array's iterator can recover `key` from
//! `(slot_index, stored_high_bits)` without maintaining a separate index.

use rand::Rng;

/// A `key_len x key_len` binary matrix, represented one row per `u64` (bit
/// `j` of row `i` is entry `M[i][j]`), and its precomputed inverse.
#[derive(Clone, Debug)]
pub struct ReversibleHash {
	key_len: u32,
	rows: Vec<u64>,
	inverse_rows: Vec<u64>,
}

impl ReversibleHash {
	/// Samples a random invertible `key_len x key_len` matrix over GF(2).
	/// `key_len` must be in `1..=64`.
	pub fn random<R: Rng>(key_len: u32, rng: &mut R) -> Self {
		assert!(key_len >= 1 && key_len <= 64, "key_len must be in 1..=64");
		loop {
			let rows: Vec<u64> = (0..key_len).map(|_| random_row(key_len, rng)).collect();
			if let Some(inverse_rows) = invert(&rows, key_len) {
				return ReversibleHash { key_len, rows, inverse_rows };
			}
		}
	}

	pub fn key_len(&self) -> u32 {
		self.key_len
	}

	/// `M * x` over GF(2).
	#[inline]
	pub fn times(&self, x: u64) -> u64 {
		apply(&self.rows, x)
	}

	/// `M^-1 * x` over GF(2).
	#[inline]
	pub fn invert_times(&self, x: u64) -> u64 {
		apply(&self.inverse_rows, x)
	}
}

fn random_row<R: Rng>(key_len: u32, rng: &mut R) -> u64 {
	let row: u64 = rng.gen();
	mask_bits(row, key_len)
}

#[inline]
fn mask_bits(x: u64, bits: u32) -> u64 {
	if bits >= 64 {
		x
	} else {
		x & ((1u64 << bits) - 1)
	}
}

#[inline]
fn apply(rows: &[u64], x: u64) -> u64 {
	let mut acc = 0u64;
	let mut bits = x;
	let mut i = 0;
	while bits != 0 {
		if bits & 1 != 0 {
			acc ^= rows[i];
		}
		bits >>= 1;
		i += 1;
	}
	acc
}

/// Gauss-Jordan elimination over GF(2) on the augmented matrix `[rows | I]`.
/// Returns the inverse's rows if `rows` is invertible.
fn invert(rows: &[u64], key_len: u32) -> Option<Vec<u64>> {
	let n = key_len as usize;
	let mut a: Vec<u64> = rows.to_vec();
	let mut inv: Vec<u64> = (0..n as u32).map(|i| 1u64 << i).collect();

	for col in 0..n {
		let pivot = (col..n).find(|&r| (a[r] >> col) & 1 == 1)?;
		a.swap(col, pivot);
		inv.swap(col, pivot);
		for r in 0..n {
			if r != col && (a[r] >> col) & 1 == 1 {
				a[r] ^= a[col];
				inv[r] ^= inv[col];
			}
		}
	}
	Some(inv)
}
