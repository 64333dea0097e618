use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// The reprobe limit was exceeded while claiming a home slot or a large
	/// continuation; the table has no room left for this key. Surfaced by
	/// [`crate::array::PackedArray::try_add`]; the lower-level
	/// [`crate::array::PackedArray::add`] reports the same condition as a
	/// plain `false` return, since table-full is an expected outcome on
	/// that hot path rather than an exceptional one.
	TableFull,
	/// A serialized region is too short or internally inconsistent to be a
	/// valid raw hash dump or compacted dump.
	InvalidMap(String),
	/// Underlying I/O failure on read/write/seek.
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::TableFull => write!(f, "table full"),
			Error::InvalidMap(msg) => write!(f, "invalid mapped region: {}", msg),
			Error::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			Error::TableFull | Error::InvalidMap(_) => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}
