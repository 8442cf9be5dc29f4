use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use ::shapefile::dbase::{
    FieldIOError, FieldName, FieldValue, FieldWriter, TableWriterBuilder, WritableRecord,
};
use log::trace;

use crate::errors::Result;

use super::{AttributeTable, FieldType};

const FIELD_NAME_BYTES: usize = 10;
const HEADER_BYTES: usize = 32;
const FIELD_DESCRIPTOR_BYTES: usize = 32;
// Header and record lengths are stored as u16.
const MAX_HEADER_BYTES: usize = u16::MAX as usize;
const MAX_RECORD_BYTES: usize = u16::MAX as usize;

#[derive(Debug, Clone)]
struct Field {
    name: String,
    field_type: FieldType,
    width: u8,
    decimals: u8,
}

impl Field {
    fn blank(&self) -> FieldValue {
        match self.field_type {
            FieldType::Integer => FieldValue::Numeric(None),
            FieldType::Text => FieldValue::Character(None),
        }
    }
}

/// Cells of one record, in field order.
struct Row(Vec<FieldValue>);

impl WritableRecord for Row {
    fn write_using<'a, W: Write>(
        &self,
        field_writer: &mut FieldWriter<'a, W>,
    ) -> std::result::Result<(), FieldIOError> {
        for value in &self.0 {
            field_writer.write_next_field_value(value)?;
        }
        Ok(())
    }
}

/// dBase III attribute table. Rows are kept in memory and written on close,
/// once every field is known.
pub struct DbfTable {
    path: PathBuf,
    fields: Vec<Field>,
    // Includes the deletion flag.
    record_len: usize,
    rows: Vec<Row>,
}

impl DbfTable {
    pub fn create(path: &Path) -> Result<Self> {
        // Fail here rather than on close if the location is not writable.
        File::create(path)?;
        Ok(DbfTable {
            path: path.to_path_buf(),
            fields: Vec::new(),
            record_len: 1,
            rows: Vec::new(),
        })
    }

    fn cell(
        &mut self,
        row: usize,
        field: usize,
        expected: FieldType,
    ) -> Result<(&mut FieldValue, usize)> {
        let Some(descriptor) = self.fields.get(field) else {
            return Err(format!("{}: no field with index {}", self.path.display(), field).into());
        };
        if descriptor.field_type != expected {
            return Err(format!(
                "{}: field {} is {:?}, not {:?}",
                self.path.display(),
                descriptor.name,
                descriptor.field_type,
                expected
            ).into());
        }
        let width = usize::from(descriptor.width);

        if row == self.rows.len() {
            self.rows.push(Row(self.fields.iter().map(Field::blank).collect()));
        } else if row > self.rows.len() {
            return Err(format!(
                "{}: cannot write row {} before row {}",
                self.path.display(),
                row,
                self.rows.len()
            ).into());
        }
        Ok((&mut self.rows[row].0[field], width))
    }

    fn header_len(fields: usize) -> usize {
        HEADER_BYTES + FIELD_DESCRIPTOR_BYTES * fields + 1
    }
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a
/// character.
fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

impl AttributeTable for DbfTable {
    fn has_room_for(&self, width: u8) -> bool {
        self.record_len + usize::from(width) <= MAX_RECORD_BYTES
            && Self::header_len(self.fields.len() + 1) <= MAX_HEADER_BYTES
    }

    fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        width: u8,
        decimals: u8,
    ) -> Result<usize> {
        if !self.rows.is_empty() {
            return Err(format!(
                "{}: field {} declared after rows were written",
                self.path.display(),
                name
            ).into());
        }
        if width == 0 {
            return Err(format!("{}: field {} has zero width", self.path.display(), name).into());
        }
        if !self.has_room_for(width) {
            return Err(format!(
                "{}: no room for field {}, records are limited to {} bytes",
                self.path.display(),
                name,
                MAX_RECORD_BYTES
            ).into());
        }
        self.fields.push(Field {
            name: name.to_string(),
            field_type,
            width,
            decimals,
        });
        self.record_len += usize::from(width);
        Ok(self.fields.len() - 1)
    }

    fn write_integer(&mut self, row: usize, field: usize, value: i64) -> Result<()> {
        let (cell, width) = self.cell(row, field, FieldType::Integer)?;
        if value.to_string().len() > width {
            return Err(format!("Value {} does not fit in {} digits", value, width).into());
        }
        *cell = FieldValue::Numeric(Some(value as f64));
        Ok(())
    }

    fn write_text(&mut self, row: usize, field: usize, value: &str) -> Result<()> {
        let (cell, width) = self.cell(row, field, FieldType::Text)?;
        *cell = FieldValue::Character(Some(truncate_to_bytes(value, width).to_string()));
        Ok(())
    }

    fn close(self) -> Result<()> {
        let mut builder = TableWriterBuilder::new();
        for field in &self.fields {
            let short_name = truncate_to_bytes(&field.name, FIELD_NAME_BYTES);
            let name = FieldName::try_from(short_name).map_err(|err| {
                format!("{}: invalid field name {:?}: {:?}", self.path.display(), field.name, err)
            })?;
            builder = match field.field_type {
                FieldType::Integer => builder.add_numeric_field(name, field.width, field.decimals),
                FieldType::Text => builder.add_character_field(name, field.width),
            };
        }

        let writer = builder.build_with_file_dest(&self.path)?;
        writer.write_records(&self.rows)?;
        trace!(rows = self.rows.len(), fields = self.fields.len(); "Wrote attribute table");
        Ok(())
    }
}
