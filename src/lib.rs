//! A concurrent, bit-packed, lock-free hash counter for fixed-width binary
//! keys (k-mers, when the caller 2-bit-packs DNA bases).
//!
//! [`PackedArray`] is the core: a fixed-size slot table where writers claim
//! a slot's key field with a single CAS and then race-free CAS-add into its
//! value field, overflowing into chained "large" slots when a value grows
//! past its home field's width. [`ReversibleHash`] lets the array recover a
//! key from a slot index alone, so no separate key index needs to be kept.
//! [`writer::CompactionWriter`]/[`reader::CompactionReader`] serialize the
//! array's contents to a compact, sorted-by-slot key/value file.

mod array;
mod block;
mod display;
mod error;
mod hash;
mod offsets;
mod options;
mod reader;
mod reprobe;
pub mod writer;

pub use crate::array::{PackedArray, PackedArrayIter, Stats};
pub use crate::error::{Error, Result};
pub use crate::hash::ReversibleHash;
pub use crate::options::{ArrayOptions, CompactionOptions};
pub use crate::reader::CompactionReader;
pub use crate::writer::CompactionWriter;
