use indexmap::{IndexMap, IndexSet};
use log::warn;

use crate::data::shape::MetaData;
use crate::errors::Result;
use crate::shapefile::{AttributeTable, FieldType};

pub const SHAPE_ID_FIELD: &str = "shapeID";
pub const SHAPE_ID_WIDTH: u8 = 10;
pub const SHAPE_NAME_FIELD: &str = "shapeName";
pub const SHAPE_NAME_WIDTH: u8 = 50;
pub const TAG_FIELD_WIDTH: u8 = 128;
pub const MAX_TAG_VALUE_CHARS: usize = 127;

/// Distinct tag keys over all records, in the order they are first seen.
pub fn collect_tag_fields(records: &[MetaData]) -> IndexSet<&str> {
    records
        .iter()
        .flat_map(|record| record.tags.keys())
        .map(String::as_str)
        .collect()
}

fn truncate_value(value: &str) -> &str {
    match value.char_indices().nth(MAX_TAG_VALUE_CHARS) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

/// Writes one row per record, row `i` describing the `i`-th shape of the layer.
/// With `convert_tags` every distinct tag key gets its own text column, as long
/// as the table has room for it.
pub fn write_attribute_table<T: AttributeTable>(
    mut table: T,
    records: &[MetaData],
    convert_tags: bool,
) -> Result<()> {
    let id_field = table.add_field(SHAPE_ID_FIELD, FieldType::Integer, SHAPE_ID_WIDTH, 0)?;
    let name_field = table.add_field(SHAPE_NAME_FIELD, FieldType::Text, SHAPE_NAME_WIDTH, 0)?;

    // All fields exist before the first row is written.
    let mut tag_fields: IndexMap<&str, Option<usize>> = IndexMap::new();
    if convert_tags {
        let mut skipped = 0;
        for key in collect_tag_fields(records) {
            let field = if table.has_room_for(TAG_FIELD_WIDTH) {
                Some(table.add_field(key, FieldType::Text, TAG_FIELD_WIDTH, 0)?)
            } else {
                skipped += 1;
                None
            };
            tag_fields.insert(key, field);
        }
        if skipped > 0 {
            warn!(
                columns = tag_fields.len() - skipped,
                skipped = skipped;
                "Attribute table full, tag columns dropped"
            );
        }
    }

    for (row, record) in records.iter().enumerate() {
        table.write_integer(row, id_field, i64::try_from(row)?)?;
        table.write_text(row, name_field, &record.name)?;
        if !convert_tags {
            continue;
        }
        for (key, value) in &record.tags {
            let Some(&field) = tag_fields.get(key.as_str()) else {
                unreachable!("tag key {:?} missing from the collected fields", key);
            };
            if let Some(field) = field {
                table.write_text(row, field, truncate_value(value))?;
            }
        }
    }

    table.close()
}
