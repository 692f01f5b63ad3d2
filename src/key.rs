// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Secondary key materialization and prefix arithmetic.
//!
//! A secondary index key is the concatenation of one or more columns'
//! encoded fields, in the order the index names them, followed by the row id
//! so rows that compare equal on the indexed columns still sort
//! deterministically and uniquely (needed since the backing ordered store
//! has no native notion of duplicate keys). A fixed
//! column contributes its packed element bytes in place; a variable column
//! contributes a one-byte missing flag, its packed buffered elements, and an
//! `element_size`-wide zero sentinel, so the field's length never needs to
//! be inferred from neighbouring fields when the column isn't last.

use crate::column::{Column, Elements};
use crate::error::{Result, WormtableError};
use crate::schema::{Arity, Schema};

/// Describes one secondary index: the columns it is keyed on, in order, and
/// an optional per-column bin width (binning).
#[derive(Debug, Clone)]
pub struct IndexKeySpec {
	pub columns: Vec<usize>,
	pub bin_widths: Vec<Option<f64>>,
}

impl IndexKeySpec {
	pub fn new(columns: Vec<usize>) -> IndexKeySpec {
		let n = columns.len();
		IndexKeySpec {
			columns,
			bin_widths: vec![None; n],
		}
	}

	/// Upper bound, in bytes, on a fully-materialized key: every indexed
	/// column at its widest packed element count (variable columns also
	/// carry a one-byte missing flag and an `element_size`-wide sentinel),
	/// plus the row id suffix.
	pub fn max_key_size(&self, schema: &Schema) -> Result<usize> {
		let mut total = 0usize;
		for &index in &self.columns {
			let col = schema.column(index)?;
			total += match col.num_elements {
				Arity::Fixed(n) => col.element_size * n as usize,
				var => 1 + col.element_size * var.max_elements() + col.element_size,
			};
		}
		Ok(total + schema.key_size())
	}
}

/// Encodes one selected column's contribution to a secondary key: for a
/// fixed column, its packed elements in place (including the per-type
/// missing sentinel, replicated, if the value is missing); for a variable
/// column, a one-byte missing flag (0/1), the packed buffered elements, then
/// an `element_size`-wide zero sentinel that terminates the field
/// lexicographically before any non-missing element.
fn encode_key_column(
	col_schema: &crate::schema::ColumnSchema,
	elements: &Elements,
	bin_width: Option<f64>,
	out: &mut Vec<u8>,
) -> Result<()> {
	let column = Column::new(col_schema.clone());
	let width = col_schema.element_size;
	match col_schema.num_elements {
		Arity::Fixed(n) => {
			let mut elements = elements.clone();
			if let Some(w) = bin_width {
				column.truncate(&mut elements, w)?;
			}
			let mut buf = vec![0u8; n as usize * width];
			column.pack_elements(&elements, &mut buf)?;
			out.extend_from_slice(&buf);
		}
		_ => {
			let missing = elements.is_missing();
			out.push(if missing { 0 } else { 1 });
			let mut elements = elements.clone();
			if !missing {
				if let Some(w) = bin_width {
					column.truncate(&mut elements, w)?;
				}
			}
			let count = elements.num_buffered();
			let mut buf = vec![0u8; count * width];
			column.pack_elements(&elements, &mut buf)?;
			out.extend_from_slice(&buf);
			out.extend(std::iter::repeat(0u8).take(width));
		}
	}
	Ok(())
}

/// Builds the physical key bytes for one row under an index spec: the
/// indexed columns' encoded fields (with binning applied, where configured)
/// concatenated in column order, followed by the row's own packed id.
///
/// `row_elements` is the row's full column list, already decoded (as
/// returned by `RowView::decode_all` or a table range iterator) -- callers
/// that already have a `RowView` can pass `&view.decode_all()?`.
pub fn materialize_key(
	schema: &Schema,
	spec: &IndexKeySpec,
	row_id: u64,
	row_elements: &[Elements],
) -> Result<Vec<u8>> {
	let mut out = Vec::with_capacity(spec.max_key_size(schema)?);
	for (&index, bin_width) in spec.columns.iter().zip(spec.bin_widths.iter()) {
		let col_schema = schema.column(index)?.clone();
		let elements = row_elements
			.get(index)
			.ok_or_else(|| WormtableError::KeyError(format!("no column at index {}", index)))?;
		encode_key_column(&col_schema, elements, *bin_width, &mut out)?;
	}
	crate::codec::pack_uint(Some(row_id), schema.key_size(), &mut vec_tail(&mut out, schema.key_size()))?;
	Ok(out)
}

/// Appends `len` zero bytes to `out` and returns a mutable view over them,
/// so the row-id suffix can be packed in place without a second allocation.
fn vec_tail(out: &mut Vec<u8>, len: usize) -> &mut [u8] {
	let start = out.len();
	out.resize(start + len, 0);
	&mut out[start..]
}

/// Builds a *prefix* key from a caller-supplied value tuple, e.g. for
/// `Index::min`/`Index::max`/range-iteration arguments: no row-id suffix,
/// since the caller is specifying a partial match. Binning is applied the
/// same way as during `build`, since key materialization is shared between
/// build and single-key lookup.
pub fn materialize_prefix(
	schema: &Schema,
	spec: &IndexKeySpec,
	values: &[Elements],
) -> Result<Vec<u8>> {
	if values.len() > spec.columns.len() {
		return Err(WormtableError::KeyError(format!(
			"prefix has {} components, index is keyed on {} columns",
			values.len(),
			spec.columns.len()
		)));
	}
	let mut out = Vec::new();
	for ((&index, elements), bin_width) in spec
		.columns
		.iter()
		.zip(values.iter())
		.zip(spec.bin_widths.iter())
	{
		let col_schema = schema.column(index)?.clone();
		encode_key_column(&col_schema, elements, *bin_width, &mut out)?;
	}
	Ok(out)
}

/// The smallest key lexicographically greater than every key sharing
/// `prefix`, by incrementing the prefix as a big-endian integer. `None` if
/// the prefix is all-0xFF (no such upper bound exists; callers fall back to
/// an unbounded scan to the end of the index).
pub fn increment_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
	let mut out = prefix.to_vec();
	for i in (0..out.len()).rev() {
		if out[i] != 0xFF {
			out[i] += 1;
			out.truncate(i + 1);
			return Some(out);
		}
	}
	None
}
