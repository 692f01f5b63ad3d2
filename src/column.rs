// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Typed element buffer: parsing, verification, binning and fixed/variable
//! layout helpers for a single column.
//!
//! `Column` is stateless logic keyed by a `ColumnSchema`; the data it reads
//! and writes lives in `Elements`, a tagged variant over the four element
//! types plus "missing".

use crate::codec::{self, FloatWidth};
use crate::error::{Result, WormtableError};
use crate::schema::{Arity, ColumnSchema, ElementType};
use crate::value::{self, Value};

/// A column's buffered elements: either wholly missing, or one of the four
/// typed sequences.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
	Missing,
	Uint(Vec<u64>),
	Int(Vec<i64>),
	Float(Vec<f64>),
	Bytes(Vec<u8>),
}

impl Elements {
	pub fn num_buffered(&self) -> usize {
		match self {
			Elements::Missing => 0,
			Elements::Uint(v) => v.len(),
			Elements::Int(v) => v.len(),
			Elements::Float(v) => v.len(),
			Elements::Bytes(v) => v.len(),
		}
	}

	pub fn is_missing(&self) -> bool {
		matches!(self, Elements::Missing)
	}
}

pub struct Column {
	pub schema: ColumnSchema,
}

impl Column {
	pub fn new(schema: ColumnSchema) -> Column {
		Column { schema }
	}

	pub fn fixed_region_size(&self) -> usize {
		self.schema.fixed_region_size()
	}

	fn check_arity(&self, len: usize) -> Result<()> {
		match self.schema.num_elements {
			Arity::Fixed(n) => {
				if len != n as usize {
					return Err(WormtableError::BadArity(format!(
						"column {:?}: expected {} elements, got {}",
						self.schema.name, n, len
					)));
				}
			}
			var => {
				if len > var.max_elements() {
					return Err(WormtableError::BadArity(format!(
						"column {:?}: {} elements exceeds max {}",
						self.schema.name,
						len,
						var.max_elements()
					)));
				}
			}
		}
		Ok(())
	}

	/// Converts a native value into this column's element buffer.
	pub fn from_native(&self, value: Value) -> Result<Elements> {
		if value.is_missing() {
			return Ok(Elements::Missing);
		}
		match (self.schema.element_type, value) {
			(ElementType::Unsigned, Value::Uint(v)) => {
				self.check_arity(1)?;
				self.check_uint_range(v)?;
				Ok(Elements::Uint(vec![v]))
			}
			(ElementType::Unsigned, Value::Uints(vs)) => {
				self.check_arity(vs.len())?;
				for &v in &vs {
					self.check_uint_range(v)?;
				}
				Ok(Elements::Uint(vs))
			}
			(ElementType::Signed, Value::Int(v)) => {
				self.check_arity(1)?;
				self.check_int_range(v)?;
				Ok(Elements::Int(vec![v]))
			}
			(ElementType::Signed, Value::Ints(vs)) => {
				self.check_arity(vs.len())?;
				for &v in &vs {
					self.check_int_range(v)?;
				}
				Ok(Elements::Int(vs))
			}
			(ElementType::Float, Value::Float(v)) => {
				self.check_arity(1)?;
				Ok(Elements::Float(vec![v]))
			}
			(ElementType::Float, Value::Floats(vs)) => {
				self.check_arity(vs.len())?;
				Ok(Elements::Float(vs))
			}
			(ElementType::Char, Value::Bytes(bs)) => {
				self.check_arity(bs.len())?;
				Ok(Elements::Bytes(bs))
			}
			(_, _) => Err(WormtableError::BadType(format!(
				"column {:?}: value does not match element type {:?}",
				self.schema.name, self.schema.element_type
			))),
		}
	}

	fn check_uint_range(&self, v: u64) -> Result<()> {
		if v > codec::max_unsigned(self.schema.element_size) {
			return Err(WormtableError::OutOfRange(format!(
				"column {:?}: {} out of range",
				self.schema.name, v
			)));
		}
		Ok(())
	}

	fn check_int_range(&self, v: i64) -> Result<()> {
		let size = self.schema.element_size;
		if v < codec::min_signed(size) || v > codec::max_signed(size) {
			return Err(WormtableError::OutOfRange(format!(
				"column {:?}: {} out of range",
				self.schema.name, v
			)));
		}
		Ok(())
	}

	/// Parses a column's text grammar: a single value for arity-1
	/// columns, else a comma/semicolon-separated list. An empty string
	/// denotes "none"; an empty string for a multi-element fixed column is
	/// rejected (there is no way to write "none, filled N-wide" in text).
	pub fn from_text(&self, text: &[u8]) -> Result<Elements> {
		if text.is_empty() {
			if let Arity::Fixed(n) = self.schema.num_elements {
				if n > 1 {
					return Err(WormtableError::ParseError(format!(
						"column {:?}: empty text for {}-element column",
						self.schema.name, n
					)));
				}
			}
			return Ok(Elements::Missing);
		}
		if self.schema.element_type == ElementType::Char {
			return self.from_native(Value::Bytes(text.to_vec()));
		}
		let tokens = value::split_text_elements(text)?;
		match self.schema.element_type {
			ElementType::Unsigned => {
				let vs = tokens
					.into_iter()
					.map(value::parse_uint)
					.collect::<Result<Vec<_>>>()?;
				if vs.len() == 1 && matches!(self.schema.num_elements, Arity::Fixed(1)) {
					self.from_native(Value::Uint(vs[0]))
				} else {
					self.from_native(Value::Uints(vs))
				}
			}
			ElementType::Signed => {
				let vs = tokens
					.into_iter()
					.map(value::parse_int)
					.collect::<Result<Vec<_>>>()?;
				if vs.len() == 1 && matches!(self.schema.num_elements, Arity::Fixed(1)) {
					self.from_native(Value::Int(vs[0]))
				} else {
					self.from_native(Value::Ints(vs))
				}
			}
			ElementType::Float => {
				let vs = tokens
					.into_iter()
					.map(value::parse_float)
					.collect::<Result<Vec<_>>>()?;
				if vs.len() == 1 && matches!(self.schema.num_elements, Arity::Fixed(1)) {
					self.from_native(Value::Float(vs[0]))
				} else {
					self.from_native(Value::Floats(vs))
				}
			}
			ElementType::Char => unreachable!(),
		}
	}

	/// Re-checks range and numeric pack/unpack round-trip exactness.
	pub fn verify(&self, elements: &Elements) -> Result<()> {
		if elements.is_missing() {
			return Ok(());
		}
		let n = elements.num_buffered();
		self.check_arity(n)?;
		let size = self.schema.fixed_element_width();
		let mut buf = vec![0u8; n.max(1) * size];
		self.pack_elements(elements, &mut buf)?;
		let decoded = self.unpack_elements(&buf, n)?;
		if decoded.is_missing() || decoded.num_buffered() != n {
			return Err(WormtableError::Invariant(format!(
				"column {:?}: failed verification round-trip",
				self.schema.name
			)));
		}
		if &decoded != elements {
			return Err(WormtableError::Invariant(format!(
				"column {:?}: pack/unpack is not exact",
				self.schema.name
			)));
		}
		Ok(())
	}

	/// Writes this column's packed elements (or the per-type missing
	/// sentinel, replicated for every fixed slot) into `out`.
	pub fn pack_elements(&self, elements: &Elements, out: &mut [u8]) -> Result<()> {
		let size = self.schema.element_size;
		let count = match self.schema.num_elements {
			Arity::Fixed(n) => n as usize,
			_ => elements.num_buffered(),
		};
		for i in 0..count {
			let slot = &mut out[i * size..i * size + size];
			match (self.schema.element_type, elements) {
				(_, Elements::Missing) => self.pack_missing(slot)?,
				(ElementType::Unsigned, Elements::Uint(v)) => {
					codec::pack_uint(Some(v[i]), size, slot)?
				}
				(ElementType::Signed, Elements::Int(v)) => {
					codec::pack_int(Some(v[i]), size, slot)?
				}
				(ElementType::Float, Elements::Float(v)) => {
					let width = FloatWidth::from_size(size)?;
					codec::pack_float(Some(v[i]), width, slot)?
				}
				(ElementType::Char, Elements::Bytes(v)) => slot[0] = v[i],
				_ => {
					return Err(WormtableError::Invariant(format!(
						"column {:?}: element buffer does not match element type",
						self.schema.name
					)))
				}
			}
		}
		Ok(())
	}

	fn pack_missing(&self, slot: &mut [u8]) -> Result<()> {
		match self.schema.element_type {
			ElementType::Unsigned => codec::pack_uint(None, slot.len(), slot),
			ElementType::Signed => codec::pack_int(None, slot.len(), slot),
			ElementType::Float => {
				let width = FloatWidth::from_size(slot.len())?;
				codec::pack_float(None, width, slot)
			}
			ElementType::Char => {
				slot[0] = codec::CHAR_MISSING;
				Ok(())
			}
		}
	}

	/// Decodes `count` packed elements from `raw`. If every element decodes
	/// to the per-type missing sentinel, returns `Elements::Missing`; if
	/// only some do, that is an internal consistency failure.
	pub fn unpack_elements(&self, raw: &[u8], count: usize) -> Result<Elements> {
		let size = self.schema.element_size;
		match self.schema.element_type {
			ElementType::Unsigned => {
				let decoded: Vec<Option<u64>> = (0..count)
					.map(|i| codec::unpack_uint(&raw[i * size..], size))
					.collect();
				self.finish_decode(decoded, Elements::Uint)
			}
			ElementType::Signed => {
				let decoded: Vec<Option<i64>> = (0..count)
					.map(|i| codec::unpack_int(&raw[i * size..], size))
					.collect();
				self.finish_decode(decoded, Elements::Int)
			}
			ElementType::Float => {
				let width = FloatWidth::from_size(size)?;
				let decoded: Vec<Option<f64>> = (0..count)
					.map(|i| codec::unpack_float(&raw[i * size..], width))
					.collect();
				self.finish_decode(decoded, Elements::Float)
			}
			ElementType::Char => {
				if count == 0 {
					return Ok(Elements::Bytes(Vec::new()));
				}
				let bytes = &raw[..count];
				if bytes.iter().all(|&b| b == codec::CHAR_MISSING)
					&& matches!(self.schema.num_elements, Arity::Fixed(_))
				{
					Ok(Elements::Missing)
				} else {
					Ok(Elements::Bytes(bytes.to_vec()))
				}
			}
		}
	}

	fn finish_decode<T>(
		&self,
		decoded: Vec<Option<T>>,
		wrap: impl Fn(Vec<T>) -> Elements,
	) -> Result<Elements> {
		let missing = decoded.iter().filter(|v| v.is_none()).count();
		if missing == 0 {
			Ok(wrap(decoded.into_iter().map(Option::unwrap).collect()))
		} else if missing == decoded.len() {
			Ok(Elements::Missing)
		} else {
			Err(WormtableError::Invariant(format!(
				"column {:?}: missing value seen amid present elements",
				self.schema.name
			)))
		}
	}

	/// Applies `x <- x - (x mod bin_width)` to every non-missing element.
	/// Bin width must be > 0; integral for integer columns; unsupported for
	/// char columns.
	pub fn truncate(&self, elements: &mut Elements, bin_width: f64) -> Result<()> {
		if bin_width <= 0.0 {
			return Err(WormtableError::BadSchema("bin width must be > 0".into()));
		}
		match elements {
			Elements::Missing => Ok(()),
			Elements::Uint(vs) => {
				let w = bin_width as u64;
				if w == 0 || w as f64 != bin_width {
					return Err(WormtableError::BadSchema(
						"bin width for an unsigned column must be a positive integer".into(),
					));
				}
				for v in vs.iter_mut() {
					*v -= *v % w;
				}
				Ok(())
			}
			Elements::Int(vs) => {
				let w = bin_width as i64;
				if w == 0 || w as f64 != bin_width {
					return Err(WormtableError::BadSchema(
						"bin width for a signed column must be a positive integer".into(),
					));
				}
				for v in vs.iter_mut() {
					*v -= v.rem_euclid(w);
				}
				Ok(())
			}
			Elements::Float(vs) => {
				for v in vs.iter_mut() {
					*v -= v.rem_euclid(bin_width);
				}
				Ok(())
			}
			Elements::Bytes(_) => Err(WormtableError::BadSchema(
				"char columns do not support binning".into(),
			)),
		}
	}
}

impl ColumnSchema {
	/// Width, in bytes, of one packed element. Identical to `element_size`;
	/// named distinctly where `Column` needs "one element's width" rather
	/// than "this column's total fixed-region width".
	pub fn fixed_element_width(&self) -> usize {
		self.element_size
	}
}
