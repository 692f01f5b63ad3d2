// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! The primary table: append-only row assembly and commit, keyed by an
//! automatically assigned row id.

use crate::codec;
use crate::column::{Column, Elements};
use crate::error::{Result, WormtableError};
use crate::row::{RowBuffer, RowView};
use crate::schema::Schema;
use crate::store::{self, CacheSize, OrderedStore};
use crate::value::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
	ReadWrite,
	ReadOnly,
}

/// Configuration threaded through `Table::create`/`Table::open`, in place of
/// positional arguments. Currently just the cache budget, but kept as its
/// own struct so future open-time knobs (e.g. a distinct write buffer size)
/// have somewhere to land without another signature change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
	pub cache: CacheSize,
}

/// Running totals over committed rows, read back with `Table::stats`.
/// Purely informational -- nothing here is load-bearing for correctness.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowStats {
	pub num_rows: u64,
	pub total_bytes: u64,
	pub min_row_bytes: Option<u32>,
	pub max_row_bytes: Option<u32>,
}

impl RowStats {
	fn record(&mut self, body_len: usize) {
		self.num_rows += 1;
		self.total_bytes += body_len as u64;
		let len = body_len as u32;
		self.min_row_bytes = Some(self.min_row_bytes.map_or(len, |m| m.min(len)));
		self.max_row_bytes = Some(self.max_row_bytes.map_or(len, |m| m.max(len)));
	}
}

/// An open table: either a write-mode handle accepting new rows, or a
/// read-only handle for lookups and range scans.
pub struct Table {
	schema: Arc<Schema>,
	store: OrderedStore,
	path: PathBuf,
	mode: Mode,
	row_buffer: Option<RowBuffer>,
	next_row_id: AtomicU64,
	closed: AtomicBool,
	stats: RowStats,
}

impl Table {
	/// Creates a new table at `path`, truncating any existing data there.
	/// Returns a write-mode handle.
	pub fn create(path: impl AsRef<Path>, schema: Schema, options: TableOptions) -> Result<Table> {
		let schema = Arc::new(schema);
		let store = OrderedStore::open(path.as_ref(), &[store::META_CF.to_string()], options.cache)?;
		Ok(Table {
			row_buffer: Some(RowBuffer::new(schema.clone())),
			schema,
			store,
			path: path.as_ref().to_path_buf(),
			mode: Mode::ReadWrite,
			next_row_id: AtomicU64::new(0),
			closed: AtomicBool::new(false),
			stats: RowStats::default(),
		})
	}

	/// Opens an existing table at `path` read-only.
	pub fn open(path: impl AsRef<Path>, schema: Schema, options: TableOptions) -> Result<Table> {
		let schema = Arc::new(schema);
		let store = OrderedStore::open_read_only(path.as_ref(), &[store::META_CF.to_string()], options.cache)?;
		let meta_cf = store.cf(store::META_CF)?;
		let num_rows = match store.get(meta_cf, store::META_NUM_ROWS_KEY)? {
			Some(bytes) if bytes.len() == 8 => {
				u64::from_be_bytes(bytes.try_into().expect("checked len == 8"))
			}
			_ => 0,
		};
		Ok(Table {
			schema,
			store,
			path: path.as_ref().to_path_buf(),
			mode: Mode::ReadOnly,
			row_buffer: None,
			next_row_id: AtomicU64::new(num_rows),
			closed: AtomicBool::new(false),
			stats: RowStats::default(),
		})
	}

	pub fn schema(&self) -> Arc<Schema> {
		self.schema.clone()
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn num_rows(&self) -> u64 {
		self.next_row_id.load(Ordering::SeqCst)
	}

	pub fn stats(&self) -> RowStats {
		self.stats
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(WormtableError::Closed);
		}
		Ok(())
	}

	fn check_writable(&self) -> Result<()> {
		self.check_open()?;
		if self.mode != Mode::ReadWrite {
			return Err(WormtableError::BadMode(
				"table was opened read-only".into(),
			));
		}
		Ok(())
	}

	/// Inserts a native value into the column at `index` of the row
	/// currently being assembled. Column 0 (the row id) is assigned
	/// automatically at `commit_row` and may not be inserted into directly.
	pub fn insert(&mut self, index: usize, value: Value) -> Result<()> {
		self.check_writable()?;
		let column = Column::new(self.schema.column(index)?.clone());
		let elements = column.from_native(value)?;
		self.row_buffer.as_mut().expect("write-mode table owns a row buffer").insert(index, elements)
	}

	/// Inserts a value given in `Column::from_text`'s textual grammar.
	pub fn insert_text(&mut self, index: usize, text: &[u8]) -> Result<()> {
		self.check_writable()?;
		let column = Column::new(self.schema.column(index)?.clone());
		let elements = column.from_text(text)?;
		self.row_buffer.as_mut().expect("write-mode table owns a row buffer").insert(index, elements)
	}

	/// Inserts an already-decoded element buffer, bypassing `from_native`'s
	/// conversion -- the entry point bulk loaders use once they have done
	/// their own parsing.
	pub fn insert_encoded(&mut self, index: usize, elements: Elements) -> Result<()> {
		self.check_writable()?;
		self.row_buffer.as_mut().expect("write-mode table owns a row buffer").insert(index, elements)
	}

	/// Finalizes the row currently being assembled: assigns it the next row
	/// id, writes it to the primary family, and resets the row buffer for
	/// the next row. Returns the assigned row id.
	pub fn commit_row(&mut self) -> Result<u64> {
		self.check_writable()?;
		let row_id = self.next_row_id.load(Ordering::SeqCst);
		let key_size = self.schema.key_size();
		let mut id_bytes = vec![0u8; key_size];
		codec::pack_uint(Some(row_id), key_size, &mut id_bytes)?;

		let buffer = self.row_buffer.as_mut().expect("write-mode table owns a row buffer");
		buffer.set_row_id(&id_bytes);
		let key = buffer.key_bytes().to_vec();
		let body = buffer.body().to_vec();

		let primary_cf = self.store.cf(store::PRIMARY_CF)?;
		let meta_cf = self.store.cf(store::META_CF)?;
		let next = row_id + 1;
		self.store.write_batch(&[
			(primary_cf, key.as_slice(), body.as_slice()),
			(meta_cf, store::META_NUM_ROWS_KEY, &next.to_be_bytes()),
		])?;

		self.stats.record(body.len());
		self.next_row_id.store(next, Ordering::SeqCst);
		buffer.reset();
		log::debug!(target: "wormtable::table", "committed row {}", row_id);
		Ok(row_id)
	}

	/// Reads a single row by id, decoding every column.
	pub fn get_row(&self, row_id: u64) -> Result<Vec<Elements>> {
		self.check_open()?;
		let view = self.load_row_view(row_id)?;
		view.decode_all()
	}

	/// Reads a single column of a single row, without decoding the rest.
	pub fn get_value(&self, row_id: u64, index: usize) -> Result<Elements> {
		self.check_open()?;
		let view = self.load_row_view(row_id)?;
		view.decode_column(index)
	}

	fn load_row_view(&self, row_id: u64) -> Result<RowView> {
		let key_size = self.schema.key_size();
		let mut key = vec![0u8; key_size];
		codec::pack_uint(Some(row_id), key_size, &mut key)?;
		let cf = self.store.cf(store::PRIMARY_CF)?;
		let body = self
			.store
			.get(cf, &key)?
			.ok_or_else(|| WormtableError::KeyError(format!("no row with id {}", row_id)))?;
		let mut view = RowView::new(self.schema.clone());
		view.key_slot_mut().copy_from_slice(&key);
		view.body_slot_mut(body.len()).copy_from_slice(&body);
		Ok(view)
	}

	/// Iterates rows in row-id order over `[min_id, max_id)`: `min_id`
	/// inclusive (or the first row if `None`), `max_id` exclusive (or
	/// unbounded to the end if `None`) -- row range iterator.
	pub fn iter_rows(&self, min_id: Option<u64>, max_id: Option<u64>) -> Result<crate::iter::RowRangeIter<'_>> {
		self.check_open()?;
		let key_size = self.schema.key_size();
		let pack = |id: u64| -> Result<Vec<u8>> {
			let mut k = vec![0u8; key_size];
			codec::pack_uint(Some(id), key_size, &mut k)?;
			Ok(k)
		};
		let start_key = min_id.map(pack).transpose()?;
		let upper_key = max_id.map(pack).transpose()?;
		let cursor = self
			.store
			.cursor(store::PRIMARY_CF, start_key.as_deref())?;
		Ok(crate::iter::RowRangeIter::new(cursor, self.schema.clone(), upper_key))
	}

	/// Used by `Index::build` to walk the whole committed table once.
	pub(crate) fn store(&self) -> &OrderedStore {
		&self.store
	}

	/// Flushes pending writes and marks the handle closed. Closing an
	/// already-closed table raises `WormtableError::Closed` rather than
	/// succeeding silently.
	pub fn close(&mut self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Err(WormtableError::Closed);
		}
		if self.mode == Mode::ReadWrite {
			let primary_cf = self.store.cf(store::PRIMARY_CF)?;
			let meta_cf = self.store.cf(store::META_CF)?;
			self.store.flush(primary_cf)?;
			self.store.flush(meta_cf)?;
		}
		self.row_buffer = None;
		Ok(())
	}
}

impl Drop for Table {
	fn drop(&mut self) {
		if !self.closed.load(Ordering::SeqCst) {
			if let Err(e) = self.close() {
				log::warn!(target: "wormtable::table", "error closing table on drop: {}", e);
			}
		}
	}
}
