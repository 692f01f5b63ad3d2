// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Secondary indexes: built once over an already-committed table, then
//! opened read-only for prefix and range queries.

use crate::column::Elements;
use crate::error::{Result, WormtableError};
use crate::iter::{IndexRowIter, IndexRowIterRev};
use crate::key::{self, IndexKeySpec};
use crate::schema::Schema;
use crate::store::{self, CacheSize, OrderedStore};
use crate::table::{Table, TableOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called periodically during `Index::build` with the number of rows
/// processed so far and the table's total row count. Returning `Err`
/// cancels the build; the partially-built secondary store is then
/// truncated before the error propagates.
pub trait ProgressCallback {
	fn on_progress(&mut self, rows_done: u64, rows_total: u64) -> Result<()>;
}

impl<F: FnMut(u64, u64) -> Result<()>> ProgressCallback for F {
	fn on_progress(&mut self, rows_done: u64, rows_total: u64) -> Result<()> {
		self(rows_done, rows_total)
	}
}

/// Default rows-per-callback interval for `Index::build`.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// Configuration threaded through `Index::build`/`Index::open`, in place of
/// positional arguments: the cache budget and (for `build`) the rows-per-callback
/// progress interval.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
	pub cache: CacheSize,
	pub progress_interval: u64,
}

impl Default for IndexOptions {
	fn default() -> IndexOptions {
		IndexOptions {
			cache: CacheSize::default(),
			progress_interval: DEFAULT_PROGRESS_INTERVAL,
		}
	}
}

/// A built secondary index, open for reading.
pub struct Index {
	schema: Arc<Schema>,
	spec: IndexKeySpec,
	store: OrderedStore,
	path: PathBuf,
	key_size: usize,
	closed: AtomicBool,
}

impl Index {
	/// Builds a new index at `path` over every row currently committed in
	/// `table`. `table` may be open read-write or read-only; building does
	/// not mutate it. Existing data at `path` is discarded.
	///
	/// `progress_interval` is how many rows elapse between calls to
	/// `progress`'s callback; it must be positive. If the scan or the
	/// callback fails partway through, the secondary store is truncated
	/// on a best-effort basis before the error propagates.
	pub fn build(
		table: &Table,
		path: impl AsRef<Path>,
		spec: IndexKeySpec,
		options: IndexOptions,
		mut progress: Option<&mut dyn ProgressCallback>,
	) -> Result<Index> {
		if options.progress_interval == 0 {
			return Err(WormtableError::Invariant(
				"progress_interval must be > 0".into(),
			));
		}
		let schema = table.schema();
		for &col in &spec.columns {
			schema.column(col)?;
		}
		let store = OrderedStore::open(path.as_ref(), &[], options.cache)?;
		let total = table.num_rows();

		let result = Self::build_into(table, &store, &schema, &spec, total, options.progress_interval, &mut progress);
		match result {
			Ok(done) => {
				log::info!(target: "wormtable::index", "built index over {} columns, {} rows", spec.columns.len(), done);
			}
			Err(e) => {
				log::warn!(target: "wormtable::index", "index build failed, truncating partial store: {}", e);
				if let Err(cleanup_err) = store.truncate_cf(store::PRIMARY_CF) {
					log::warn!(target: "wormtable::index", "cleanup after failed build also failed: {}", cleanup_err);
				}
				return Err(e);
			}
		}

		Ok(Index {
			key_size: schema.key_size(),
			schema,
			spec,
			store,
			path: path.as_ref().to_path_buf(),
			closed: AtomicBool::new(false),
		})
	}

	/// The scanning loop proper, factored out so `build` can uniformly
	/// truncate the secondary store on any failure path (I/O, a bad key, or
	/// the caller's progress callback returning an error).
	fn build_into(
		table: &Table,
		store: &OrderedStore,
		schema: &Arc<Schema>,
		spec: &IndexKeySpec,
		total: u64,
		progress_interval: u64,
		progress: &mut Option<&mut dyn ProgressCallback>,
	) -> Result<u64> {
		let cf = store.cf(store::PRIMARY_CF)?;
		let mut done = 0u64;
		for result in table.iter_rows(None, None)? {
			let (row_id, elements) = result?;
			let key = key::materialize_key(schema, spec, row_id, &elements)?;
			store.put(cf, &key, &[])?;
			done += 1;
			if let Some(cb) = progress.as_deref_mut() {
				if done % progress_interval == 0 || done == total {
					cb.on_progress(done, total)?;
				}
			}
		}
		store.flush(cf)?;
		Ok(done)
	}

	/// Opens a previously built index read-only.
	pub fn open(path: impl AsRef<Path>, schema: Arc<Schema>, spec: IndexKeySpec, options: IndexOptions) -> Result<Index> {
		let store = OrderedStore::open_read_only(path.as_ref(), &[], options.cache)?;
		Ok(Index {
			key_size: schema.key_size(),
			schema,
			spec,
			store,
			path: path.as_ref().to_path_buf(),
			closed: AtomicBool::new(false),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn spec(&self) -> &IndexKeySpec {
		&self.spec
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(WormtableError::Closed);
		}
		Ok(())
	}

	/// Number of distinct (key, row) entries recorded, found by scanning to
	/// the end -- secondary indexes don't keep a separate running counter
	/// since they are immutable once built.
	pub fn num_rows(&self) -> Result<u64> {
		self.check_open()?;
		Ok(self.iter_all()?.count() as u64)
	}

	/// Number of rows whose indexed columns equal `prefix` exactly (the
	/// duplicate count at an exact key prefix); 0 if no row matches.
	pub fn num_rows_with_prefix(&self, prefix: &[Elements]) -> Result<u64> {
		self.check_open()?;
		Ok(self.rows_with_prefix(prefix)?.count() as u64)
	}

	fn iter_all(&self) -> Result<IndexRowIter<'_>> {
		let cursor = self.store.cursor(store::PRIMARY_CF, None)?;
		Ok(IndexRowIter::new(cursor, self.key_size, None))
	}

	/// Smallest row id whose indexed columns equal `prefix` exactly, or
	/// `KeyError` if no row matches.
	pub fn min(&self, prefix: &[Elements]) -> Result<u64> {
		self.check_open()?;
		let key = key::materialize_prefix(&self.schema, &self.spec, prefix)?;
		let cursor = self.store.cursor(store::PRIMARY_CF, Some(&key))?;
		let upper = key::increment_prefix(&key);
		let mut iter = IndexRowIter::new(cursor, self.key_size, upper);
		iter.next()
			.transpose()?
			.ok_or_else(|| WormtableError::KeyError("no rows match the given prefix".into()))
	}

	/// Largest row id whose indexed columns equal `prefix` exactly, or
	/// `KeyError` if no row matches. A prefix past every key raises
	/// `KeyError` rather than silently returning the store's last entry.
	pub fn max(&self, prefix: &[Elements]) -> Result<u64> {
		self.check_open()?;
		let key = key::materialize_prefix(&self.schema, &self.spec, prefix)?;
		let upper = key::increment_prefix(&key);
		// `cursor_rev` seeks to the last key <= the given bound, so seeking
		// at the prefix's exclusive upper bound lands on the last key
		// actually under the prefix.
		let mut cursor = match &upper {
			Some(u) => self.store.cursor_rev(store::PRIMARY_CF, Some(u))?,
			None => self.store.cursor_rev(store::PRIMARY_CF, None)?,
		};
		// `seek_for_prev` can land exactly on `upper` itself (a real key one
		// past the prefix); since `upper` is an exclusive bound, step back
		// past it before handing off to the iterator.
		if let Some(u) = &upper {
			if cursor.valid() && cursor.key() == Some(u.as_slice()) {
				cursor.prev();
			}
		}
		let mut iter = IndexRowIterRev::new(cursor, self.key_size, Some(key));
		iter.next()
			.transpose()?
			.ok_or_else(|| WormtableError::KeyError("no rows match the given prefix".into()))
	}

	/// Iterates row ids whose indexed columns fall within `[lower, upper)`,
	/// where either bound may be a partial prefix. `None` bounds mean "from
	/// the start" / "to the end" respectively (range queries).
	pub fn range(
		&self,
		lower: Option<&[Elements]>,
		upper: Option<&[Elements]>,
	) -> Result<IndexRowIter<'_>> {
		self.check_open()?;
		let lower_key = lower.map(|p| key::materialize_prefix(&self.schema, &self.spec, p)).transpose()?;
		// `upper` is an exclusive bound on the indexed-column *values*, not an
		// exact-match prefix to be widened: a stored key under `upper` itself
		// is `upper`'s bytes followed by a row-id suffix, which already
		// compares `>=` against the bare materialized prefix, so no
		// `increment_prefix` here (unlike `min`/`rows_with_prefix`, which
		// widen an exact-match prefix into its own half-open block).
		let upper_key = upper
			.map(|p| key::materialize_prefix(&self.schema, &self.spec, p))
			.transpose()?;
		let cursor = self.store.cursor(store::PRIMARY_CF, lower_key.as_deref())?;
		Ok(IndexRowIter::new(cursor, self.key_size, upper_key))
	}

	/// All row ids whose indexed columns equal `prefix` exactly.
	pub fn rows_with_prefix(&self, prefix: &[Elements]) -> Result<IndexRowIter<'_>> {
		self.check_open()?;
		let key = key::materialize_prefix(&self.schema, &self.spec, prefix)?;
		let upper = key::increment_prefix(&key);
		let cursor = self.store.cursor(store::PRIMARY_CF, Some(&key))?;
		Ok(IndexRowIter::new(cursor, self.key_size, upper))
	}

	pub fn close(&mut self) {
		self.closed.store(true, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::{Arity, ColumnSchema, ElementType};
	use crate::value::Value;
	use tempfile::tempdir;

	fn table_schema() -> Schema {
		let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
		let group = ColumnSchema::new("group", "", ElementType::Unsigned, 1, Arity::Fixed(1)).unwrap();
		Schema::new(vec![row_id, group]).unwrap()
	}

	fn build_table(dir: &Path) -> Table {
		let mut table = Table::create(dir, table_schema(), TableOptions::default()).unwrap();
		for g in [1u64, 2, 1, 3, 2] {
			table.insert(1, Value::Uint(g)).unwrap();
			table.commit_row().unwrap();
		}
		table
	}

	#[test]
	fn build_and_query_min() {
		let table_dir = tempdir().unwrap();
		let table = build_table(table_dir.path());
		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);
		let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

		let group_col = crate::column::Column::new(table.schema().column(1).unwrap().clone());
		let one = group_col.from_native(Value::Uint(1)).unwrap();
		assert_eq!(index.min(&[one.clone()]).unwrap(), 0);

		let missing = group_col.from_native(Value::Uint(9)).unwrap();
		assert!(index.min(&[missing]).is_err());
	}

	#[test]
	fn num_rows_with_prefix_counts_exact_matches() {
		let table_dir = tempdir().unwrap();
		let table = build_table(table_dir.path());
		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);
		let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

		let group_col = crate::column::Column::new(table.schema().column(1).unwrap().clone());
		let one = group_col.from_native(Value::Uint(1)).unwrap();
		assert_eq!(index.num_rows_with_prefix(&[one]).unwrap(), 3);
		let nine = group_col.from_native(Value::Uint(9)).unwrap();
		assert_eq!(index.num_rows_with_prefix(&[nine]).unwrap(), 0);
	}

	/// A prefix whose packed bytes are all 0xFF has no lexicographic
	/// successor; `Index::max` must fall back to scanning from the literal
	/// end of the store rather than failing to construct an upper bound.
	#[test]
	fn max_handles_all_ones_prefix_overflow() {
		let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
		// A signed, 1-byte column's maximum legitimate value (127) packs to
		// the byte 0xFF under the sign-bit-flip scheme.
		let s = ColumnSchema::new("s", "", ElementType::Signed, 1, Arity::Fixed(1)).unwrap();
		let schema = Schema::new(vec![row_id, s]).unwrap();

		let table_dir = tempdir().unwrap();
		let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
		for v in [5i64, 127, 127, -10] {
			table.insert(1, Value::Int(v)).unwrap();
			table.commit_row().unwrap();
		}

		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);
		let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

		let s_col = crate::column::Column::new(table.schema().column(1).unwrap().clone());
		let max_val = s_col.from_native(Value::Int(127)).unwrap();
		assert_eq!(index.max(&[max_val.clone()]).unwrap(), 2);
		assert_eq!(index.num_rows_with_prefix(&[max_val]).unwrap(), 2);
	}

	#[test]
	fn num_rows_counts_every_entry() {
		let table_dir = tempdir().unwrap();
		let table = build_table(table_dir.path());
		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);
		let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();
		assert_eq!(index.num_rows().unwrap(), 5);
	}

	#[test]
	fn zero_progress_interval_is_rejected() {
		let table_dir = tempdir().unwrap();
		let table = build_table(table_dir.path());
		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);
		let err = Index::build(&table, index_dir.path(), spec, IndexOptions { cache: CacheSize::default(), progress_interval: 0 }, None).unwrap_err();
		assert!(matches!(err, WormtableError::Invariant(_)));
	}

	#[test]
	fn cancelled_build_truncates_partial_store() {
		let table_dir = tempdir().unwrap();
		let table = build_table(table_dir.path());
		let index_dir = tempdir().unwrap();
		let spec = IndexKeySpec::new(vec![1]);

		let mut seen = 0u64;
		let mut cb = |_done: u64, _total: u64| -> Result<()> {
			seen += 1;
			Err(WormtableError::Invariant("cancelled by caller".into()))
		};
		let result = Index::build(&table, index_dir.path(), spec.clone(), IndexOptions { cache: CacheSize::default(), progress_interval: 1 }, Some(&mut cb));
		assert!(result.is_err());
		assert_eq!(seen, 1);

		// Reopening the same path and building again from scratch should
		// succeed cleanly, confirming the aborted attempt left nothing behind
		// that a fresh build would trip over.
		let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();
		assert_eq!(index.num_rows().unwrap(), 5);
	}
}
