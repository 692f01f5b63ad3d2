// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Error kinds for the wormtable core.

use std::io;

/// Every error the public API can return.
///
/// Logical misuse (bad mode, bad schema, bad arity, ...) is kept distinct
/// from storage-engine and I/O failures so callers can tell "you used the API
/// wrong" apart from "the disk/engine failed".
#[derive(thiserror::Error, Debug)]
pub enum WormtableError {
	/// Operation requires a different open-state (e.g. insert on a read-mode table).
	#[error("bad mode: {0}")]
	BadMode(String),

	/// Table/Index was already open when `open` was called again.
	#[error("already open")]
	AlreadyOpen,

	/// Operation requires the object to be open.
	#[error("closed")]
	Closed,

	/// Duplicate column, missing row_id column, unsupported element_size, ...
	#[error("bad schema: {0}")]
	BadSchema(String),

	/// Wrong element count for a fixed-arity column, or too many for a variable one.
	#[error("bad arity: {0}")]
	BadArity(String),

	/// Value type doesn't match the column's element type.
	#[error("bad type: {0}")]
	BadType(String),

	/// Numeric value outside the per-type representable range.
	#[error("out of range: {0}")]
	OutOfRange(String),

	/// Textual element decoding failed.
	#[error("parse error: {0}")]
	ParseError(String),

	/// Committing the current row would exceed MAX_ROW_SIZE.
	#[error("row overflow: {0}")]
	RowOverflow(String),

	/// Primary or secondary lookup found nothing.
	#[error("key not found: {0}")]
	KeyError(String),

	/// Propagated from the backing ordered store.
	#[error("storage error: {0}")]
	Storage(String),

	/// Data-file I/O failure.
	#[error("io error: {0}")]
	Io(#[from] io::Error),

	/// Internal consistency check failed.
	#[error("invariant violated: {0}")]
	Invariant(String),
}

impl From<rocksdb::Error> for WormtableError {
	fn from(e: rocksdb::Error) -> Self {
		WormtableError::Storage(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, WormtableError>;
