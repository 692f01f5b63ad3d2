// Copyright (c) 2024 Wormtable contributors.
// Licensed under the MIT license or the Apache License, Version 2.0, at your option.

//! Schema surface: column descriptions and the constraints placed on them.

use crate::codec::FloatWidth;
use crate::error::{Result, WormtableError};

/// Largest a committed row may be. This implementation resolves an open
/// question over two candidate limits in favour of 65,535; see DESIGN.md.
pub const MAX_ROW_SIZE: usize = 65_535;

pub const VAR1_MAX_ELEMENTS: usize = 254;
pub const VAR2_MAX_ELEMENTS: usize = 65_534;

/// Size, in bytes, of the two-byte variable-region address field.
pub const ADDRESS_SIZE: usize = 2;

/// One of the four element types a column may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
	Unsigned,
	Signed,
	Float,
	Char,
}

/// Fixed or variable element count for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
	Fixed(u16),
	Var1,
	Var2,
}

impl Arity {
	pub fn max_elements(self) -> usize {
		match self {
			Arity::Fixed(n) => n as usize,
			Arity::Var1 => VAR1_MAX_ELEMENTS,
			Arity::Var2 => VAR2_MAX_ELEMENTS,
		}
	}

	pub fn is_variable(self) -> bool {
		!matches!(self, Arity::Fixed(_))
	}

	/// Size, in bytes, of the length field for a variable column (1 or 2).
	pub fn length_field_size(self) -> usize {
		match self {
			Arity::Var1 => 1,
			Arity::Var2 => 2,
			Arity::Fixed(_) => 0,
		}
	}
}

/// One column's static description.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
	pub name: String,
	pub description: String,
	pub element_type: ElementType,
	pub element_size: usize,
	pub num_elements: Arity,
}

impl ColumnSchema {
	pub fn new(
		name: impl Into<String>,
		description: impl Into<String>,
		element_type: ElementType,
		element_size: usize,
		num_elements: Arity,
	) -> Result<ColumnSchema> {
		let col = ColumnSchema {
			name: name.into(),
			description: description.into(),
			element_type,
			element_size,
			num_elements,
		};
		col.validate()?;
		Ok(col)
	}

	fn validate(&self) -> Result<()> {
		match self.element_type {
			ElementType::Unsigned | ElementType::Signed => {
				if self.element_size < 1 || self.element_size > 8 {
					return Err(WormtableError::BadSchema(format!(
						"column {:?}: element_size {} out of range 1..8",
						self.name, self.element_size
					)));
				}
			}
			ElementType::Float => {
				FloatWidth::from_size(self.element_size)?;
			}
			ElementType::Char => {
				if self.element_size != 1 {
					return Err(WormtableError::BadSchema(format!(
						"column {:?}: char element_size must be 1",
						self.name
					)));
				}
			}
		}
		if let Arity::Fixed(n) = self.num_elements {
			if n == 0 {
				return Err(WormtableError::BadSchema(format!(
					"column {:?}: fixed num_elements must be positive",
					self.name
				)));
			}
		}
		Ok(())
	}

	/// Width, in bytes, this column occupies in the row's fixed region.
	pub fn fixed_region_size(&self) -> usize {
		match self.num_elements {
			Arity::Fixed(n) => self.element_size * n as usize,
			var => ADDRESS_SIZE + var.length_field_size(),
		}
	}
}

/// An ordered list of column descriptions. Column 0 must be a one-element
/// unsigned column (the row id).
#[derive(Debug, Clone)]
pub struct Schema {
	columns: Vec<ColumnSchema>,
}

impl Schema {
	pub fn new(columns: Vec<ColumnSchema>) -> Result<Schema> {
		if columns.is_empty() {
			return Err(WormtableError::BadSchema("schema has no columns".into()));
		}
		let row_id = &columns[0];
		if row_id.element_type != ElementType::Unsigned || row_id.num_elements != Arity::Fixed(1) {
			return Err(WormtableError::BadSchema(
				"column 0 must be a one-element unsigned column (row_id)".into(),
			));
		}
		let mut seen_names = std::collections::HashSet::new();
		for c in &columns {
			if !seen_names.insert(c.name.clone()) {
				return Err(WormtableError::BadSchema(format!(
					"duplicate column name {:?}",
					c.name
				)));
			}
		}
		Ok(Schema { columns })
	}

	pub fn columns(&self) -> &[ColumnSchema] {
		&self.columns
	}

	pub fn column(&self, index: usize) -> Result<&ColumnSchema> {
		self.columns
			.get(index)
			.ok_or_else(|| WormtableError::BadSchema(format!("no column at index {}", index)))
	}

	pub fn len(&self) -> usize {
		self.columns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.columns.is_empty()
	}

	pub fn index_of(&self, name: &str) -> Option<usize> {
		self.columns.iter().position(|c| c.name == name)
	}

	/// Sum of every column's fixed-region width: the offset at which the
	/// variable region of a row buffer begins.
	pub fn fixed_region_size(&self) -> usize {
		self.columns.iter().map(|c| c.fixed_region_size()).sum()
	}

	/// Byte offset of a column's fixed-region slot.
	pub fn fixed_offset(&self, index: usize) -> usize {
		self.columns[..index]
			.iter()
			.map(|c| c.fixed_region_size())
			.sum()
	}

	/// Size, in bytes, of the row id (primary key) in its packed form.
	pub fn key_size(&self) -> usize {
		self.columns[0].element_size
	}
}
