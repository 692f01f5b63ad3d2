// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Native and textual value representations accepted by `Column::from_native`
//! / `Column::from_text`. Rust has no single "any numeric or sequence" type,
//! so those entry points are expressed over this small enum instead.

use crate::error::{Result, WormtableError};

/// A value supplied for a single column, before it is validated against that
/// column's type/arity and packed into a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// Missing for any column type.
	Missing,
	Uint(u64),
	Uints(Vec<u64>),
	Int(i64),
	Ints(Vec<i64>),
	Float(f64),
	Floats(Vec<f64>),
	/// Char columns take raw bytes (a string of single-byte characters).
	Bytes(Vec<u8>),
}

impl Value {
	pub fn is_missing(&self) -> bool {
		matches!(self, Value::Missing)
	}
}

/// Splits the comma/semicolon-separated textual grammar into a list of
/// element tokens, without yet interpreting them numerically.
pub fn split_text_elements(text: &[u8]) -> Result<Vec<&[u8]>> {
	if text.is_empty() {
		return Ok(Vec::new());
	}
	let sep = if text.contains(&b';') { b';' } else { b',' };
	Ok(text.split(|&b| b == sep).collect())
}

pub fn parse_uint(token: &[u8]) -> Result<u64> {
	let s = std::str::from_utf8(token)
		.map_err(|e| WormtableError::ParseError(e.to_string()))?
		.trim();
	s.parse::<u64>()
		.map_err(|e| WormtableError::ParseError(format!("{:?}: {}", s, e)))
}

pub fn parse_int(token: &[u8]) -> Result<i64> {
	let s = std::str::from_utf8(token)
		.map_err(|e| WormtableError::ParseError(e.to_string()))?
		.trim();
	s.parse::<i64>()
		.map_err(|e| WormtableError::ParseError(format!("{:?}: {}", s, e)))
}

pub fn parse_float(token: &[u8]) -> Result<f64> {
	let s = std::str::from_utf8(token)
		.map_err(|e| WormtableError::ParseError(e.to_string()))?
		.trim();
	s.parse::<f64>()
		.map_err(|e| WormtableError::ParseError(format!("{:?}: {}", s, e)))
}
