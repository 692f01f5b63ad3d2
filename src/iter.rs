// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Shared cursor contract for row and index range iteration:
//! forward scans over the primary table and over a secondary index's key
//! space, both backed by `store::Cursor`.

use crate::codec;
use crate::column::Elements;
use crate::error::{Result, WormtableError};
use crate::row::RowView;
use crate::schema::Schema;
use crate::store::Cursor;
use std::sync::Arc;

/// Iterates committed rows in row-id order, optionally bounded above by an
/// exclusive packed row-id upper bound: inclusive lower bound via the
/// cursor's starting position, exclusive upper bound checked here. Once
/// exhausted, stays exhausted without re-touching the cursor.
pub struct RowRangeIter<'a> {
	cursor: Cursor<'a>,
	schema: Arc<Schema>,
	upper: Option<Vec<u8>>,
	done: bool,
}

impl<'a> RowRangeIter<'a> {
	pub(crate) fn new(cursor: Cursor<'a>, schema: Arc<Schema>, upper: Option<Vec<u8>>) -> RowRangeIter<'a> {
		RowRangeIter {
			cursor,
			schema,
			upper,
			done: false,
		}
	}
}

impl<'a> Iterator for RowRangeIter<'a> {
	type Item = Result<(u64, Vec<Elements>)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done || !self.cursor.valid() {
			self.done = true;
			return None;
		}
		let key = self.cursor.key()?;
		if let Some(upper) = &self.upper {
			if key >= upper.as_slice() {
				self.done = true;
				return None;
			}
		}
		let key = key.to_vec();
		let value = self.cursor.value()?.to_vec();
		self.cursor.next();

		let key_size = self.schema.key_size();
		let row_id = match codec::unpack_uint(&key, key_size) {
			Some(id) => id,
			None => {
				self.done = true;
				return Some(Err(WormtableError::Invariant(
					"primary key decoded to the missing sentinel".into(),
				)));
			}
		};
		let mut view = RowView::new(self.schema.clone());
		view.key_slot_mut().copy_from_slice(&key);
		view.body_slot_mut(value.len()).copy_from_slice(&value);
		Some(view.decode_all().map(|elements| (row_id, elements)))
	}
}

/// Iterates the row ids recorded under a secondary index, in key order,
/// optionally bounded above by an exclusive prefix upper bound (the result
/// of `key::increment_prefix`).
pub struct IndexRowIter<'a> {
	cursor: Cursor<'a>,
	key_size: usize,
	upper: Option<Vec<u8>>,
	done: bool,
}

impl<'a> IndexRowIter<'a> {
	pub(crate) fn new(cursor: Cursor<'a>, key_size: usize, upper: Option<Vec<u8>>) -> IndexRowIter<'a> {
		IndexRowIter {
			cursor,
			key_size,
			upper,
			done: false,
		}
	}
}

impl<'a> Iterator for IndexRowIter<'a> {
	type Item = Result<u64>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done || !self.cursor.valid() {
			return None;
		}
		let key = self.cursor.key()?;
		if let Some(upper) = &self.upper {
			if key >= upper.as_slice() {
				self.done = true;
				return None;
			}
		}
		if key.len() < self.key_size {
			self.done = true;
			return Some(Err(WormtableError::Invariant(
				"index key shorter than the row id suffix it should carry".into(),
			)));
		}
		let row_id_bytes = &key[key.len() - self.key_size..];
		let row_id = codec::unpack_uint(row_id_bytes, self.key_size);
		self.cursor.next();
		match row_id {
			Some(id) => Some(Ok(id)),
			None => Some(Err(WormtableError::Invariant(
				"index key's row id suffix decoded to the missing sentinel".into(),
			))),
		}
	}
}

/// Iterates row ids under a secondary index in reverse key order; backs
/// `Index::max` and descending range scans.
pub struct IndexRowIterRev<'a> {
	cursor: Cursor<'a>,
	key_size: usize,
	lower: Option<Vec<u8>>,
	done: bool,
}

impl<'a> IndexRowIterRev<'a> {
	pub(crate) fn new(cursor: Cursor<'a>, key_size: usize, lower: Option<Vec<u8>>) -> IndexRowIterRev<'a> {
		IndexRowIterRev {
			cursor,
			key_size,
			lower,
			done: false,
		}
	}
}

impl<'a> Iterator for IndexRowIterRev<'a> {
	type Item = Result<u64>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done || !self.cursor.valid() {
			return None;
		}
		let key = self.cursor.key()?;
		if let Some(lower) = &self.lower {
			if key < lower.as_slice() {
				self.done = true;
				return None;
			}
		}
		if key.len() < self.key_size {
			self.done = true;
			return Some(Err(WormtableError::Invariant(
				"index key shorter than the row id suffix it should carry".into(),
			)));
		}
		let row_id_bytes = &key[key.len() - self.key_size..];
		let row_id = codec::unpack_uint(row_id_bytes, self.key_size);
		self.cursor.prev();
		match row_id {
			Some(id) => Some(Ok(id)),
			None => Some(Err(WormtableError::Invariant(
				"index key's row id suffix decoded to the missing sentinel".into(),
			))),
		}
	}
}
