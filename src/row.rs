// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Row buffer assembly: fixed-region slots plus an append-only variable
//! region.

use crate::column::{Column, Elements};
use crate::error::{Result, WormtableError};
use crate::schema::{Arity, Schema, ADDRESS_SIZE, MAX_ROW_SIZE};
use std::sync::Arc;

/// 2-byte unsigned, uint-packed (with the usual +1 bias), all-ones pattern:
/// the reserved "no data in variable region" address.
fn write_missing_address(slot: &mut [u8]) {
	crate::codec::pack_uint(None, ADDRESS_SIZE, slot).unwrap();
}

fn write_length(slot: &mut [u8], len: usize) {
	match slot.len() {
		1 => slot[0] = len as u8,
		2 => slot.copy_from_slice(&(len as u16).to_be_bytes()),
		n => unreachable!("unexpected length field width {}", n),
	}
}

fn read_length(slot: &[u8]) -> usize {
	match slot.len() {
		1 => slot[0] as usize,
		2 => u16::from_be_bytes([slot[0], slot[1]]) as usize,
		n => unreachable!("unexpected length field width {}", n),
	}
}

/// Write-side assembly buffer for a single row: a fixed region followed by
/// an append-only variable region, zero-initialized (with every column's
/// missing sentinel pre-written) at the start of each row.
pub struct RowBuffer {
	schema: Arc<Schema>,
	buffer: Vec<u8>,
	current_size: usize,
}

impl RowBuffer {
	pub fn new(schema: Arc<Schema>) -> RowBuffer {
		let mut buf = RowBuffer {
			buffer: vec![0u8; MAX_ROW_SIZE],
			current_size: schema.fixed_region_size(),
			schema,
		};
		buf.reset();
		buf
	}

	/// Zeroes the buffer back to the fixed region, with every column's slot
	/// pre-filled with its missing sentinel so a column nobody inserts into
	/// before commit reads back as "missing" instead of decoding garbage.
	pub fn reset(&mut self) {
		let fixed_size = self.schema.fixed_region_size();
		for (i, col) in self.schema.columns().iter().enumerate() {
			let offset = self.schema.fixed_offset(i);
			let slot = &mut self.buffer[offset..offset + col.fixed_region_size()];
			if col.num_elements.is_variable() {
				write_missing_address(&mut slot[..ADDRESS_SIZE]);
				write_length(&mut slot[ADDRESS_SIZE..], 0);
			} else {
				let column = Column::new(col.clone());
				column.pack_elements(&Elements::Missing, slot).unwrap();
			}
		}
		self.current_size = fixed_size;
	}

	pub fn current_size(&self) -> usize {
		self.current_size
	}

	/// Inserts a value into a non-primary-key column.
	pub fn insert(&mut self, index: usize, elements: Elements) -> Result<()> {
		if index == 0 {
			return Err(WormtableError::Invariant(
				"cannot insert into column 0 (row_id); it is assigned at commit".into(),
			));
		}
		let col_schema = self.schema.column(index)?.clone();
		let column = Column::new(col_schema.clone());
		let offset = self.schema.fixed_offset(index);

		if col_schema.num_elements.is_variable() {
			if elements.is_missing() {
				write_missing_address(&mut self.buffer[offset..offset + ADDRESS_SIZE]);
				write_length(&mut self.buffer[offset + ADDRESS_SIZE..offset + col_schema.fixed_region_size()], 0);
				return Ok(());
			}
			let num_buffered = elements.num_buffered();
			let byte_len = num_buffered * col_schema.element_size;
			if self.current_size + byte_len > MAX_ROW_SIZE {
				return Err(WormtableError::RowOverflow(format!(
					"row would grow to {} bytes, exceeding MAX_ROW_SIZE {}",
					self.current_size + byte_len,
					MAX_ROW_SIZE
				)));
			}
			let address = self.current_size as u64;
			crate::codec::pack_uint(
				Some(address),
				ADDRESS_SIZE,
				&mut self.buffer[offset..offset + ADDRESS_SIZE],
			)?;
			write_length(
				&mut self.buffer[offset + ADDRESS_SIZE..offset + col_schema.fixed_region_size()],
				num_buffered,
			);
			let var_slot = &mut self.buffer[self.current_size..self.current_size + byte_len];
			column.pack_elements(&elements, var_slot)?;
			self.current_size += byte_len;
			Ok(())
		} else {
			let slot = &mut self.buffer[offset..offset + col_schema.fixed_region_size()];
			column.pack_elements(&elements, slot)
		}
	}

	/// Writes the already-packed row id into column 0's slot. Only called by
	/// `Table::commit_row`.
	pub(crate) fn set_row_id(&mut self, packed: &[u8]) {
		self.buffer[..packed.len()].copy_from_slice(packed);
	}

	/// The row body: everything after the primary-key slot, i.e. what gets
	/// appended to the data file and whose length is recorded in the locator.
	pub fn body(&self) -> &[u8] {
		let key_size = self.schema.key_size();
		&self.buffer[key_size..self.current_size]
	}

	pub fn key_bytes(&self) -> &[u8] {
		&self.buffer[..self.schema.key_size()]
	}

	/// Copies this buffer's current contents into a fresh `RowView`, so the
	/// just-assembled (but not yet durably stored) row can be decoded the
	/// same way a row read back from disk would be -- used when
	/// materializing a secondary key for a row at commit time.
	pub fn to_view(&self) -> RowView {
		let mut view = RowView::new(self.schema.clone());
		let key_size = self.schema.key_size();
		view.key_slot_mut().copy_from_slice(&self.buffer[..key_size]);
		let body = self.body();
		view.body_slot_mut(body.len()).copy_from_slice(body);
		view
	}
}

/// Read-side view over a decoded row: the fixed+variable bytes for row id
/// `key_size` followed by the body read back from the data file.
pub struct RowView {
	schema: Arc<Schema>,
	buffer: Vec<u8>,
}

impl RowView {
	pub fn new(schema: Arc<Schema>) -> RowView {
		RowView {
			buffer: vec![0u8; MAX_ROW_SIZE],
			schema,
		}
	}

	pub fn key_slot_mut(&mut self) -> &mut [u8] {
		let key_size = self.schema.key_size();
		&mut self.buffer[..key_size]
	}

	pub fn body_slot_mut(&mut self, len: usize) -> &mut [u8] {
		let key_size = self.schema.key_size();
		&mut self.buffer[key_size..key_size + len]
	}

	/// Decodes every column's elements out of the currently loaded row.
	pub fn decode_all(&self) -> Result<Vec<Elements>> {
		let mut out = Vec::with_capacity(self.schema.len());
		for i in 0..self.schema.len() {
			out.push(self.decode_column(i)?);
		}
		Ok(out)
	}

	pub fn decode_column(&self, index: usize) -> Result<Elements> {
		let col_schema = self.schema.column(index)?;
		let column = Column::new(col_schema.clone());
		let offset = self.schema.fixed_offset(index);
		if col_schema.num_elements.is_variable() {
			let address_slot = &self.buffer[offset..offset + ADDRESS_SIZE];
			let address = crate::codec::unpack_uint(address_slot, ADDRESS_SIZE);
			match address {
				None => Ok(Elements::Missing),
				Some(addr) => {
					let len_slot = &self.buffer[offset + ADDRESS_SIZE..offset + col_schema.fixed_region_size()];
					let count = read_length(len_slot);
					let start = addr as usize;
					let end = start + count * col_schema.element_size;
					column.unpack_elements(&self.buffer[start..end], count)
				}
			}
		} else {
			let n = match col_schema.num_elements {
				Arity::Fixed(n) => n as usize,
				_ => unreachable!(),
			};
			let slot = &self.buffer[offset..offset + col_schema.fixed_region_size()];
			column.unpack_elements(slot, n)
		}
	}
}
