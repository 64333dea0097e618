//! Compaction reader: parses the header written by
//! [`crate::writer::CompactionWriter`] and yields its fixed-width records.

use std::convert::TryInto;
use std::io::{ErrorKind, Read};

use crate::error::{Error, Result};
use crate::writer::HEADER_LEN;

pub struct CompactionReader<R> {
	mer_len: u32,
	val_len: usize,
	key_len: usize,
	record_len: usize,
	size: u64,
	unique: u64,
	distinct: u64,
	total: u64,
	inner: R,
}

impl<R: Read> CompactionReader<R> {
	pub fn new(mut inner: R) -> Result<Self> {
		let mut header = [0u8; HEADER_LEN];
		inner.read_exact(&mut header)?;
		let field = |i: usize| u64::from_le_bytes(header[8 * i..8 * i + 8].try_into().unwrap());

		let mer_len = field(0) as u32;
		let val_len = field(1) as usize;
		let size = field(2);
		let unique = field(3);
		let distinct = field(4);
		let total = field(5);
		let key_len = ((mer_len as usize) + 3) / 4;

		log::debug!(
			target: "pkmer_hash",
			"opened compacted dump: mer_len={} val_len={} size={} distinct={}",
			mer_len, val_len, size, distinct,
		);

		Ok(CompactionReader { mer_len, val_len, key_len, record_len: key_len + val_len, size, unique, distinct, total, inner })
	}

	pub fn mer_len(&self) -> u32 {
		self.mer_len
	}

	pub fn val_len(&self) -> usize {
		self.val_len
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn unique(&self) -> u64 {
		self.unique
	}

	pub fn distinct(&self) -> u64 {
		self.distinct
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	fn read_record(&mut self) -> Result<Option<(u64, u64)>> {
		let mut buf = vec![0u8; self.record_len];
		match self.inner.read_exact(&mut buf) {
			Ok(()) => {
				let mut key_bytes = [0u8; 8];
				key_bytes[..self.key_len].copy_from_slice(&buf[..self.key_len]);
				let mut val_bytes = [0u8; 8];
				val_bytes[..self.val_len].copy_from_slice(&buf[self.key_len..]);
				Ok(Some((u64::from_le_bytes(key_bytes), u64::from_le_bytes(val_bytes))))
			}
			Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
			Err(e) => Err(Error::Io(e)),
		}
	}
}

impl<R: Read> Iterator for CompactionReader<R> {
	type Item = Result<(u64, u64)>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.read_record() {
			Ok(Some(kv)) => Some(Ok(kv)),
			Ok(None) => None,
			Err(e) => Some(Err(e)),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::options::CompactionOptions;
	use crate::writer::CompactionWriter;
	use std::io::Cursor;

	#[test]
	fn rejects_truncated_header() {
		let err = CompactionReader::new(Cursor::new(vec![0u8; 10])).unwrap_err();
		assert!(matches!(err, Error::Io(_)));
	}

	#[test]
	fn empty_dump_yields_no_records() {
		let cursor = Cursor::new(Vec::new());
		let writer = CompactionWriter::new(CompactionOptions::new(8, 4), cursor);
		writer.write_header(16).unwrap();
		writer.update_stats().unwrap();
		let bytes = writer.out.into_inner().into_inner();

		let mut reader = CompactionReader::new(Cursor::new(bytes)).unwrap();
		assert_eq!(reader.size(), 16);
		assert_eq!(reader.distinct(), 0);
		assert!(reader.next().is_none());
	}
}
