// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! The ordered key-value engine the table and its indexes are built on,
//! treated as a black box behind this module's narrow cursor/put/get
//! surface. Backed by `rocksdb`: one column family per index plus a
//! default family for the primary locator table.

use crate::error::{Result, WormtableError};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, MultiThreaded, Options};
use std::path::Path;
use std::sync::Arc;

/// `rocksdb::DB` parameterized over `MultiThreaded`, so column-family
/// creation/drop (used by `truncate_cf` during a cancelled `Index::build`)
/// take `&self` rather than `&mut self`, matching how the rest of this
/// module shares a `DB` handle by reference. Grounded on
/// `andypeng2015-restate`'s own `type DB = rocksdb::OptimisticTransactionDB<MultiThreaded>`
/// alias in `other_examples/`.
type DB = rocksdb::DBWithThreadMode<MultiThreaded>;

/// Cache budget: `gigabytes` whole gigabytes plus `bytes`
/// additional bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSize {
	pub gigabytes: u64,
	pub bytes: u64,
}

impl CacheSize {
	pub fn new(gigabytes: u64, bytes: u64) -> CacheSize {
		CacheSize { gigabytes, bytes }
	}

	pub fn total_bytes(&self) -> u64 {
		self.gigabytes * (1 << 30) + self.bytes
	}
}

impl Default for CacheSize {
	fn default() -> CacheSize {
		// A modest default; callers with large tables should size this explicitly.
		CacheSize::new(0, 16 * (1 << 20))
	}
}

pub const PRIMARY_CF: &str = "primary";
/// Small metadata column family: holds the live row count so a table
/// reopened for reading doesn't need to scan the primary family to find it.
pub const META_CF: &str = "meta";
pub const META_NUM_ROWS_KEY: &[u8] = b"num_rows";

/// Thin wrapper over a `rocksdb::DB` handle: column-family lookups and
/// cursor construction live here so the rest of the crate never imports
/// `rocksdb` directly.
pub struct OrderedStore {
	db: DB,
}

impl OrderedStore {
	/// Opens (creating if absent) the store at `path` with one column family
	/// per name in `index_cfs`, plus the fixed primary-table family.
	pub fn open(path: &Path, index_cfs: &[String], cache: CacheSize) -> Result<OrderedStore> {
		let block_cache = rocksdb::Cache::new_lru_cache(cache.total_bytes() as usize);
		let mut block_opts = rocksdb::BlockBasedOptions::default();
		block_opts.set_block_cache(&block_cache);

		let mut cf_opts = Options::default();
		cf_opts.set_block_based_table_factory(&block_opts);

		let mut descriptors = vec![ColumnFamilyDescriptor::new(PRIMARY_CF, cf_opts.clone())];
		for name in index_cfs {
			descriptors.push(ColumnFamilyDescriptor::new(name, cf_opts.clone()));
		}

		let mut db_opts = Options::default();
		db_opts.create_if_missing(true);
		db_opts.create_missing_column_families(true);

		let db = DB::open_cf_descriptors(&db_opts, path, descriptors)?;
		Ok(OrderedStore { db })
	}

	/// Opens an existing store read-only; used for read-only `Table`/`Index`
	/// handles ("open for reading").
	pub fn open_read_only(path: &Path, index_cfs: &[String], cache: CacheSize) -> Result<OrderedStore> {
		let block_cache = rocksdb::Cache::new_lru_cache(cache.total_bytes() as usize);
		let mut block_opts = rocksdb::BlockBasedOptions::default();
		block_opts.set_block_cache(&block_cache);
		let mut cf_opts = Options::default();
		cf_opts.set_block_based_table_factory(&block_opts);

		let mut names = vec![PRIMARY_CF.to_string()];
		names.extend(index_cfs.iter().cloned());
		let descriptors: Vec<ColumnFamilyDescriptor> = names
			.iter()
			.map(|n| ColumnFamilyDescriptor::new(n, cf_opts.clone()))
			.collect();

		let db_opts = Options::default();
		let db = DB::open_cf_descriptors_read_only(&db_opts, path, descriptors, false)?;
		Ok(OrderedStore { db })
	}

	pub fn cf(&self, name: &str) -> Result<&ColumnFamily> {
		self.db
			.cf_handle(name)
			.ok_or_else(|| WormtableError::Storage(format!("no column family named {:?}", name)))
	}

	pub fn put(&self, cf: &ColumnFamily, key: &[u8], value: &[u8]) -> Result<()> {
		self.db.put_cf(cf, key, value)?;
		Ok(())
	}

	pub fn get(&self, cf: &ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.db.get_cf(cf, key)?)
	}

	pub fn flush(&self, cf: &ColumnFamily) -> Result<()> {
		self.db.flush_cf(cf)?;
		Ok(())
	}

	/// Drops and recreates column family `name`, discarding everything in it.
	/// Used for best-effort cleanup when an `Index::build` is aborted
	/// partway through (a failed build should not leave a half-populated
	/// secondary index behind).
	pub fn truncate_cf(&self, name: &str) -> Result<()> {
		self.db.drop_cf(name)?;
		self.db.create_cf(name, &Options::default())?;
		Ok(())
	}

	/// Applies several puts, across one or more column families of this same
	/// store, atomically. Used to keep the primary row and the live row
	/// count in the meta family consistent with each other at commit time.
	pub fn write_batch(&self, puts: &[(&ColumnFamily, &[u8], &[u8])]) -> Result<()> {
		let mut batch = rocksdb::WriteBatch::default();
		for (cf, key, value) in puts {
			batch.put_cf(*cf, key, value);
		}
		self.db.write(batch)?;
		Ok(())
	}

	/// A forward cursor over `cf`, positioned at `start` (inclusive) or at
	/// the first key if `start` is `None`.
	pub fn cursor<'a>(&'a self, cf_name: &str, start: Option<&[u8]>) -> Result<Cursor<'a>> {
		let cf = self.cf(cf_name)?;
		let mut raw = self.db.raw_iterator_cf(cf);
		match start {
			Some(k) => raw.seek(k),
			None => raw.seek_to_first(),
		}
		Ok(Cursor { raw })
	}

	/// A reverse cursor over `cf`, positioned at the last key at or before
	/// `start`, or the very last key if `start` is `None`. Used for
	/// `Index::max` and reverse range iteration.
	pub fn cursor_rev<'a>(&'a self, cf_name: &str, start: Option<&[u8]>) -> Result<Cursor<'a>> {
		let cf = self.cf(cf_name)?;
		let mut raw = self.db.raw_iterator_cf(cf);
		match start {
			Some(k) => {
				raw.seek_for_prev(k);
			}
			None => raw.seek_to_last(),
		}
		Ok(Cursor { raw })
	}
}

/// A cursor over one column family. Thin wrapper over
/// `rocksdb::DBRawIteratorWithThreadMode` presenting a plain
/// valid/key/value/next/prev shape.
pub struct Cursor<'a> {
	raw: rocksdb::DBRawIteratorWithThreadMode<'a, DB>,
}

impl<'a> Cursor<'a> {
	pub fn valid(&self) -> bool {
		self.raw.valid()
	}

	pub fn key(&self) -> Option<&[u8]> {
		self.raw.key()
	}

	pub fn value(&self) -> Option<&[u8]> {
		self.raw.value()
	}

	pub fn next(&mut self) {
		self.raw.next();
	}

	pub fn prev(&mut self) {
		self.raw.prev();
	}
}
