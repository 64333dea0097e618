//! Construction parameters for [`crate::array::PackedArray`] and
//! [`crate::writer::CompactionWriter`].

/// Parameters controlling the shape of a [`crate::array::PackedArray`].
#[derive(Clone, Copy, Debug)]
pub struct ArrayOptions {
	/// Number of slots. Rounded up to the next power of two.
	pub size: u64,
	/// Full key width in bits (e.g. `2 * mer_len` for DNA k-mers).
	pub key_len: u32,
	/// Width in bits of a home slot's value field.
	pub val_len: u32,
	/// Width in bits of a large continuation's value field.
	pub lval_len: u32,
	/// Maximum number of reprobes attempted before a claim is considered failed.
	pub reprobe_limit: u32,
}

impl ArrayOptions {
	pub fn new(size: u64, key_len: u32, val_len: u32, lval_len: u32, reprobe_limit: u32) -> Self {
		ArrayOptions { size, key_len, val_len, lval_len, reprobe_limit }
	}

	pub fn validate(&self) -> Result<(), String> {
		if self.size == 0 {
			return Err("size must be non-zero".into());
		}
		if self.val_len == 0 || self.lval_len == 0 {
			return Err("val_len and lval_len must be non-zero".into());
		}
		let addr_bits = self.size.next_power_of_two().trailing_zeros();
		if self.key_len < addr_bits {
			return Err(format!(
				"key_len ({}) must be at least log2(size) ({}); the stored-key fragment cannot be negative",
				self.key_len, addr_bits,
			));
		}
		if self.key_len > 64 {
			return Err("key_len beyond 64 bits is not supported (keys are packed in a u64)".into());
		}
		Ok(())
	}

	pub fn with_reprobe_limit(mut self, limit: u32) -> Self {
		self.reprobe_limit = limit;
		self
	}
}

/// Parameters for a [`crate::writer::CompactionWriter`]/[`crate::reader::CompactionReader`] pair.
#[derive(Clone, Copy, Debug)]
pub struct CompactionOptions {
	/// Length of the k-mer in bases (not bits).
	pub mer_len: u32,
	/// Width in bytes of the on-disk (saturated) value field.
	pub val_disk_len: u32,
	/// Size in bytes of the internal write buffer.
	pub buffer_size: usize,
}

impl Default for CompactionOptions {
	fn default() -> Self {
		CompactionOptions { mer_len: 0, val_disk_len: 4, buffer_size: 1 << 20 }
	}
}

impl CompactionOptions {
	pub fn new(mer_len: u32, val_disk_len: u32) -> Self {
		CompactionOptions { mer_len, val_disk_len, ..Default::default() }
	}

	pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
		self.buffer_size = buffer_size;
		self
	}

	pub fn key_disk_len(&self) -> usize {
		((self.mer_len as usize) + 3) / 4
	}

	pub fn record_len(&self) -> usize {
		self.key_disk_len() + self.val_disk_len as usize
	}
}
