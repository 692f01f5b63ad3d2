use tempfile::TempDir;
use wormtable::{
	Arity, ColumnSchema, Elements, ElementType, Index, IndexKeySpec, IndexOptions, Schema, Table,
	TableOptions, Value,
};

fn sample_schema() -> Schema {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 5, Arity::Fixed(1)).unwrap();
	let name = ColumnSchema::new("name", "a short label", ElementType::Char, 1, Arity::Var1).unwrap();
	let score = ColumnSchema::new("score", "", ElementType::Signed, 2, Arity::Fixed(1)).unwrap();
	let tags = ColumnSchema::new("tags", "", ElementType::Unsigned, 1, Arity::Var1).unwrap();
	Schema::new(vec![row_id, name, score, tags]).unwrap()
}

/// A table with a mix of fixed, variable, and missing columns round trips
/// through commit and read-back.
#[test]
fn mixed_columns_roundtrip() {
	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), sample_schema(), TableOptions::default()).unwrap();

	table.insert(1, Value::Bytes(b"alice".to_vec())).unwrap();
	table.insert(2, Value::Int(100)).unwrap();
	table.insert(3, Value::Uints(vec![1, 2, 3])).unwrap();
	let id = table.commit_row().unwrap();
	assert_eq!(id, 0);

	table.insert(1, Value::Bytes(b"bob".to_vec())).unwrap();
	// score and tags both left unset -> missing on read-back.
	table.commit_row().unwrap();

	assert_eq!(table.num_rows(), 2);

	let row0 = table.get_row(0).unwrap();
	assert_eq!(row0[1], Elements::Bytes(b"alice".to_vec()));
	assert_eq!(row0[2], Elements::Int(vec![100]));
	assert_eq!(row0[3], Elements::Uint(vec![1, 2, 3]));

	let row1 = table.get_row(1).unwrap();
	assert_eq!(row1[1], Elements::Bytes(b"bob".to_vec()));
	assert_eq!(row1[2], Elements::Missing);
	assert_eq!(row1[3], Elements::Missing);
}

/// Row ids are assigned in commit order starting at zero, regardless of how
/// many distinct columns each row sets.
#[test]
fn row_ids_are_sequential() {
	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), sample_schema(), TableOptions::default()).unwrap();
	let mut ids = Vec::new();
	for i in 0..10u64 {
		table.insert(2, Value::Int(i as i64)).unwrap();
		ids.push(table.commit_row().unwrap());
	}
	assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

/// Committing a NaN float value reads back the same as never having set the
/// column at all.
#[test]
fn nan_float_is_missing_on_read_back() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let temp = ColumnSchema::new("temp", "", ElementType::Float, 8, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, temp]).unwrap();

	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), schema, TableOptions::default()).unwrap();
	table.insert(1, Value::Float(f64::NAN)).unwrap();
	table.commit_row().unwrap();

	let row = table.get_row(0).unwrap();
	assert_eq!(row[1], Elements::Missing);
}

/// A closed table rejects further writes and reads.
#[test]
fn closed_table_rejects_operations() {
	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), sample_schema(), TableOptions::default()).unwrap();
	table.insert(2, Value::Int(1)).unwrap();
	table.commit_row().unwrap();
	table.close().unwrap();

	assert!(table.insert(2, Value::Int(2)).is_err());
	assert!(table.get_row(0).is_err());
}

/// Secondary index build + min/max/range queries over grouped data.
#[test]
fn secondary_index_min_max_range() {
	let table_dir = TempDir::new().unwrap();
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let group = ColumnSchema::new("group", "", ElementType::Unsigned, 1, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, group]).unwrap();

	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	// groups: 1,2,1,3,2,1
	for g in [1u64, 2, 1, 3, 2, 1] {
		table.insert(1, Value::Uint(g)).unwrap();
		table.commit_row().unwrap();
	}

	let index_dir = TempDir::new().unwrap();
	let spec = IndexKeySpec::new(vec![1]);
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

	let group_col = wormtable::Column::new(table.schema().column(1).unwrap().clone());
	let g1 = group_col.from_native(Value::Uint(1)).unwrap();
	let g2 = group_col.from_native(Value::Uint(2)).unwrap();
	let g3 = group_col.from_native(Value::Uint(3)).unwrap();

	assert_eq!(index.min(&[g1.clone()]).unwrap(), 0);
	assert_eq!(index.max(&[g1.clone()]).unwrap(), 5);
	assert_eq!(index.min(&[g2.clone()]).unwrap(), 1);
	assert_eq!(index.max(&[g2.clone()]).unwrap(), 4);
	assert_eq!(index.min(&[g3.clone()]).unwrap(), 3);
	assert_eq!(index.max(&[g3.clone()]).unwrap(), 3);

	let all_g1: Vec<u64> = index
		.rows_with_prefix(&[g1])
		.unwrap()
		.collect::<wormtable::Result<Vec<_>>>()
		.unwrap();
	assert_eq!(all_g1, vec![0, 2, 5]);

	assert_eq!(index.num_rows().unwrap(), 6);
}

/// A prefix with no matching rows raises a key error from `min`/`max`,
/// rather than silently falling back to the nearest real key.
#[test]
fn empty_prefix_query_is_key_error() {
	let table_dir = TempDir::new().unwrap();
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let group = ColumnSchema::new("group", "", ElementType::Unsigned, 1, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, group]).unwrap();

	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	table.insert(1, Value::Uint(1)).unwrap();
	table.commit_row().unwrap();

	let index_dir = TempDir::new().unwrap();
	let spec = IndexKeySpec::new(vec![1]);
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

	let group_col = wormtable::Column::new(table.schema().column(1).unwrap().clone());
	let nine = group_col.from_native(Value::Uint(9)).unwrap();
	assert!(index.min(&[nine.clone()]).is_err());
	assert!(index.max(&[nine]).is_err());
}

/// Reopening a closed table read-only sees the same row count and data a
/// fresh write-mode handle would have produced.
#[test]
fn reopen_read_only_preserves_data() {
	let dir = TempDir::new().unwrap();
	{
		let mut table = Table::create(dir.path(), sample_schema(), TableOptions::default()).unwrap();
		table.insert(1, Value::Bytes(b"persisted".to_vec())).unwrap();
		table.commit_row().unwrap();
		table.close().unwrap();
	}
	let table = Table::open(dir.path(), sample_schema(), TableOptions::default()).unwrap();
	assert_eq!(table.num_rows(), 1);
	let row = table.get_row(0).unwrap();
	assert_eq!(row[1], Elements::Bytes(b"persisted".to_vec()));
}

/// Inserting more variable-region bytes than MAX_ROW_SIZE allows is
/// rejected with a row-overflow error rather than a silent truncation.
#[test]
fn row_overflow_is_reported() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let blob = ColumnSchema::new("blob", "", ElementType::Unsigned, 1, Arity::Var2).unwrap();
	let schema = Schema::new(vec![row_id, blob]).unwrap();

	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), schema, TableOptions::default()).unwrap();
	let huge = vec![1u64; wormtable::schema::MAX_ROW_SIZE - 1];
	assert!(table.insert(1, Value::Uints(huge)).is_err());
}

/// A row occupying exactly MAX_ROW_SIZE commits; one element more raises
/// RowOverflow.
#[test]
fn max_row_size_boundary() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let blob = ColumnSchema::new("blob", "", ElementType::Unsigned, 1, Arity::Var2).unwrap();
	let schema = Schema::new(vec![row_id, blob]).unwrap();
	let fixed_region_size = 4 + 2 + 2; // row_id + address + VAR2 length field

	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), schema.clone(), TableOptions::default()).unwrap();
	let exact = vec![1u64; wormtable::schema::MAX_ROW_SIZE - fixed_region_size];
	table.insert(1, Value::Uints(exact)).unwrap();
	table.commit_row().unwrap();
	assert_eq!(table.num_rows(), 1);

	let dir2 = TempDir::new().unwrap();
	let mut table2 = Table::create(dir2.path(), schema, TableOptions::default()).unwrap();
	let one_more = vec![1u64; wormtable::schema::MAX_ROW_SIZE - fixed_region_size + 1];
	assert!(table2.insert(1, Value::Uints(one_more)).is_err());
}

/// Exactly VAR1_MAX_ELEMENTS succeeds; one more is rejected with BadArity.
#[test]
fn var1_max_arity_boundary() {
	use wormtable::schema::VAR1_MAX_ELEMENTS;
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let g = ColumnSchema::new("g", "", ElementType::Unsigned, 1, Arity::Var1).unwrap();
	let schema = Schema::new(vec![row_id, g]).unwrap();

	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), schema, TableOptions::default()).unwrap();
	assert!(table
		.insert(1, Value::Uints(vec![1u64; VAR1_MAX_ELEMENTS]))
		.is_ok());
	assert!(table
		.insert(1, Value::Uints(vec![1u64; VAR1_MAX_ELEMENTS + 1]))
		.is_err());
}

/// An empty table has zero rows, `get_row` on any id fails, and the row
/// range iterator yields nothing.
#[test]
fn empty_table_has_no_rows() {
	let dir = TempDir::new().unwrap();
	let table = Table::create(dir.path(), sample_schema(), TableOptions::default()).unwrap();
	assert_eq!(table.num_rows(), 0);
	assert!(table.get_row(0).is_err());
	assert_eq!(table.iter_rows(None, None).unwrap().count(), 0);
}

/// The primary row range iterator over `[min_id, max_id)` yields exactly the
/// rows in that half-open interval, and stays exhausted once drained.
#[test]
fn row_range_iterator_is_half_open() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let k = ColumnSchema::new("k", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, k]).unwrap();

	let dir = TempDir::new().unwrap();
	let mut table = Table::create(dir.path(), schema, TableOptions::default()).unwrap();
	for i in 0..100u64 {
		table.insert(1, Value::Uint(i)).unwrap();
		table.commit_row().unwrap();
	}

	let mut iter = table.iter_rows(Some(20), Some(80)).unwrap();
	let ids: Vec<u64> = (&mut iter).map(|r| r.unwrap().0).collect();
	assert_eq!(ids.len(), 60);
	assert_eq!(ids.first(), Some(&20));
	assert_eq!(ids.last(), Some(&79));
	// Exhausted iterator stays exhausted.
	assert!(iter.next().is_none());
}

/// A variable-arity char column's secondary index sorts missing before the
/// empty string, and the empty string before any non-empty value.
#[test]
fn char_index_orders_missing_before_empty_before_value() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let s = ColumnSchema::new("s", "", ElementType::Char, 1, Arity::Var1).unwrap();
	let schema = Schema::new(vec![row_id, s]).unwrap();

	let table_dir = TempDir::new().unwrap();
	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	table.insert(1, Value::Bytes(b"abc".to_vec())).unwrap();
	table.commit_row().unwrap(); // row 0: "abc"
	table.commit_row().unwrap(); // row 1: s left unset -> missing
	table.insert(1, Value::Bytes(Vec::new())).unwrap();
	table.commit_row().unwrap(); // row 2: present but empty
	table.insert(1, Value::Bytes(b"xyz".to_vec())).unwrap();
	table.commit_row().unwrap(); // row 3: "xyz"

	let index_dir = TempDir::new().unwrap();
	let spec = IndexKeySpec::new(vec![1]);
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();
	let ordered: Vec<u64> = index
		.range(None, None)
		.unwrap()
		.collect::<wormtable::Result<Vec<_>>>()
		.unwrap();
	// missing (row 1) < "" (row 2) < "abc" (row 0) < "xyz" (row 3).
	assert_eq!(ordered, vec![1, 2, 0, 3]);
}

/// A VAR2 column holding 1000 elements round trips through commit/read-back,
/// and an exact-match index query over it finds exactly the one row.
#[test]
fn var2_column_with_many_elements() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let g = ColumnSchema::new("g", "", ElementType::Unsigned, 2, Arity::Var2).unwrap();
	let schema = Schema::new(vec![row_id, g]).unwrap();

	let table_dir = TempDir::new().unwrap();
	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	let sequence: Vec<u64> = (0..1000).collect();
	table.insert(1, Value::Uints(sequence.clone())).unwrap();
	table.commit_row().unwrap();

	let row = table.get_row(0).unwrap();
	assert_eq!(row[1], Elements::Uint(sequence.clone()));

	let index_dir = TempDir::new().unwrap();
	let spec = IndexKeySpec::new(vec![1]);
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();
	let g_col = wormtable::Column::new(table.schema().column(1).unwrap().clone());
	let prefix = g_col.from_native(Value::Uints(sequence)).unwrap();
	let matches: Vec<u64> = index
		.rows_with_prefix(&[prefix])
		.unwrap()
		.collect::<wormtable::Result<Vec<_>>>()
		.unwrap();
	assert_eq!(matches, vec![0]);
}

/// Binning a column to a bin width aligns `index.num_rows(prefix)` queries
/// to the bin boundary, the same way `Column::truncate` aligns values before
/// packing at build time.
#[test]
fn binned_index_groups_by_bin_width() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let p = ColumnSchema::new("p", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, p]).unwrap();

	let table_dir = TempDir::new().unwrap();
	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	// Values 10..20 (exclusive) all fall in the [10, 20) bin under width 10.
	for v in [11u64, 15, 19, 20, 25] {
		table.insert(1, Value::Uint(v)).unwrap();
		table.commit_row().unwrap();
	}

	let index_dir = TempDir::new().unwrap();
	let mut spec = IndexKeySpec::new(vec![1]);
	spec.bin_widths = vec![Some(10.0)];
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

	let p_col = wormtable::Column::new(table.schema().column(1).unwrap().clone());
	let bin_10 = p_col.from_native(Value::Uint(10)).unwrap();
	assert_eq!(index.rows_with_prefix(&[bin_10]).unwrap().count(), 3); // 11, 15, 19
	let bin_20 = p_col.from_native(Value::Uint(20)).unwrap();
	assert_eq!(index.rows_with_prefix(&[bin_20]).unwrap().count(), 2); // 20, 25
}

/// `Index::range`'s upper bound is exclusive: rows whose indexed value
/// equals `upper` itself must not be emitted, only values strictly below it.
#[test]
fn range_upper_bound_is_exclusive() {
	let row_id = ColumnSchema::new("row_id", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let v = ColumnSchema::new("v", "", ElementType::Unsigned, 4, Arity::Fixed(1)).unwrap();
	let schema = Schema::new(vec![row_id, v]).unwrap();

	let table_dir = TempDir::new().unwrap();
	let mut table = Table::create(table_dir.path(), schema, TableOptions::default()).unwrap();
	for n in 0u64..10 {
		table.insert(1, Value::Uint(n)).unwrap();
		table.commit_row().unwrap();
	}

	let index_dir = TempDir::new().unwrap();
	let spec = IndexKeySpec::new(vec![1]);
	let index = Index::build(&table, index_dir.path(), spec, IndexOptions::default(), None).unwrap();

	let v_col = wormtable::Column::new(table.schema().column(1).unwrap().clone());
	let five = v_col.from_native(Value::Uint(5)).unwrap();
	let eight = v_col.from_native(Value::Uint(8)).unwrap();
	let row_ids: Vec<u64> = index
		.range(Some(&[five]), Some(&[eight]))
		.unwrap()
		.collect::<wormtable::Result<Vec<_>>>()
		.unwrap();
	// Values 5, 6, 7 -> row ids 5, 6, 7. Value 8 (the upper bound) is excluded.
	assert_eq!(row_ids, vec![5, 6, 7]);
}
