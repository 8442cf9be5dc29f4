pub mod dbf;
pub mod shp;

#[cfg(test)]
pub mod memory;

use std::{fs, path::PathBuf};

use crate::data::shape::ShapeKind;
use crate::errors::Result;

use self::{dbf::DbfTable, shp::ShpLayer};

/// Column type of an attribute table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Text,
}

/// A geometry layer that accepts objects one at a time. Objects are numbered
/// from zero in the order they are written.
pub trait ShapeLayer {
    fn write_object(&mut self, xs: &[f64], ys: &[f64]) -> Result<usize>;
    fn close(self) -> Result<()>;
}

/// A table whose fields are declared up front and whose rows are then written
/// cell by cell.
pub trait AttributeTable {
    /// Whether one more field of `width` bytes still fits in a record.
    fn has_room_for(&self, width: u8) -> bool;
    fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        width: u8,
        decimals: u8,
    ) -> Result<usize>;
    fn write_integer(&mut self, row: usize, field: usize, value: i64) -> Result<()>;
    fn write_text(&mut self, row: usize, field: usize, value: &str) -> Result<()>;
    fn close(self) -> Result<()>;
}

/// Creates the files that make up a shapefile. Every path is given as a stem,
/// the extension is chosen by the backend.
pub trait ShapefileBackend {
    type Layer: ShapeLayer;
    type Table: AttributeTable;

    fn create_layer(&mut self, stem: &str, kind: ShapeKind) -> Result<Self::Layer>;
    fn create_table(&mut self, stem: &str) -> Result<Self::Table>;
    fn write_projection(&mut self, stem: &str, projection: &str) -> Result<()>;
}

/// Stem of the files for one layer, e.g. `out/berlin-lines`.
pub fn layer_stem(prefix: &str, kind: ShapeKind) -> String {
    format!("{}-{}", prefix, kind.layer_suffix())
}

/// Appends an extension without touching dots already present in the stem.
pub fn with_extension(stem: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", stem, extension))
}

/// Writes layers as files on disk.
#[derive(Debug, Default)]
pub struct FileBackend;

impl ShapefileBackend for FileBackend {
    type Layer = ShpLayer;
    type Table = DbfTable;

    fn create_layer(&mut self, stem: &str, kind: ShapeKind) -> Result<ShpLayer> {
        ShpLayer::create(&with_extension(stem, "shp"), &with_extension(stem, "shx"), kind)
    }

    fn create_table(&mut self, stem: &str) -> Result<DbfTable> {
        DbfTable::create(&with_extension(stem, "dbf"))
    }

    fn write_projection(&mut self, stem: &str, projection: &str) -> Result<()> {
        fs::write(with_extension(stem, "prj"), format!("{}\n", projection))?;
        Ok(())
    }
}
