//! Backend that records everything it is asked to write, for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::data::shape::ShapeKind;
use crate::errors::Result;

use super::{AttributeTable, FieldType, ShapeLayer, ShapefileBackend};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Integer(i64),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct RecordedLayer {
    pub kind: Option<ShapeKind>,
    pub objects: Vec<(Vec<f64>, Vec<f64>)>,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordedTable {
    pub fields: Vec<(String, FieldType, u8)>,
    pub rows: Vec<BTreeMap<usize, Cell>>,
    pub closed: bool,
}

impl RecordedTable {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    /// Cell of `row` in the field called `name`, if it was written.
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let field = self.fields.iter().position(|(field, _, _)| field == name)?;
        self.rows.get(row)?.get(&field)
    }
}

#[derive(Debug, Default)]
pub struct Recording {
    pub layers: HashMap<String, RecordedLayer>,
    pub tables: HashMap<String, RecordedTable>,
    pub projections: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    pub recording: Rc<RefCell<Recording>>,
    /// Layer creation fails for this kind.
    pub fail_on: Option<ShapeKind>,
    /// Tables accept at most this many fields.
    pub field_limit: Option<usize>,
}

impl MemoryBackend {
    pub fn failing_on(kind: ShapeKind) -> Self {
        MemoryBackend {
            fail_on: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_field_limit(limit: usize) -> Self {
        MemoryBackend {
            field_limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn layer(&self, stem: &str) -> Option<RecordedLayer> {
        self.recording.borrow().layers.get(stem).cloned()
    }

    pub fn table(&self, stem: &str) -> Option<RecordedTable> {
        self.recording.borrow().tables.get(stem).cloned()
    }

    pub fn projection(&self, stem: &str) -> Option<String> {
        self.recording.borrow().projections.get(stem).cloned()
    }
}

pub struct MemoryLayer {
    stem: String,
    recording: Rc<RefCell<Recording>>,
}

impl ShapeLayer for MemoryLayer {
    fn write_object(&mut self, xs: &[f64], ys: &[f64]) -> Result<usize> {
        let mut recording = self.recording.borrow_mut();
        let layer = recording.layers.entry(self.stem.clone()).or_default();
        layer.objects.push((xs.to_vec(), ys.to_vec()));
        Ok(layer.objects.len() - 1)
    }

    fn close(self) -> Result<()> {
        let mut recording = self.recording.borrow_mut();
        recording.layers.entry(self.stem.clone()).or_default().closed = true;
        Ok(())
    }
}

pub struct MemoryTable {
    stem: String,
    recording: Rc<RefCell<Recording>>,
    field_limit: Option<usize>,
}

impl MemoryTable {
    fn write(&mut self, row: usize, field: usize, cell: Cell) -> Result<()> {
        let mut recording = self.recording.borrow_mut();
        let table = recording.tables.entry(self.stem.clone()).or_default();
        if field >= table.fields.len() {
            return Err(format!("No field with index {}", field).into());
        }
        if row > table.rows.len() {
            return Err(format!("Cannot write row {} before row {}", row, table.rows.len()).into());
        }
        if row == table.rows.len() {
            table.rows.push(BTreeMap::new());
        }
        table.rows[row].insert(field, cell);
        Ok(())
    }
}

impl AttributeTable for MemoryTable {
    fn has_room_for(&self, _width: u8) -> bool {
        let recording = self.recording.borrow();
        let fields = recording.tables.get(&self.stem).map_or(0, |table| table.fields.len());
        self.field_limit.map_or(true, |limit| fields < limit)
    }

    fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        width: u8,
        _decimals: u8,
    ) -> Result<usize> {
        if !self.has_room_for(width) {
            return Err(format!("Table {} is full", self.stem).into());
        }
        let mut recording = self.recording.borrow_mut();
        let table = recording.tables.entry(self.stem.clone()).or_default();
        if !table.rows.is_empty() {
            return Err("Fields must be declared before rows are written".into());
        }
        table.fields.push((name.to_string(), field_type, width));
        Ok(table.fields.len() - 1)
    }

    fn write_integer(&mut self, row: usize, field: usize, value: i64) -> Result<()> {
        self.write(row, field, Cell::Integer(value))
    }

    fn write_text(&mut self, row: usize, field: usize, value: &str) -> Result<()> {
        self.write(row, field, Cell::Text(value.to_string()))
    }

    fn close(self) -> Result<()> {
        let mut recording = self.recording.borrow_mut();
        recording.tables.entry(self.stem.clone()).or_default().closed = true;
        Ok(())
    }
}

impl ShapefileBackend for MemoryBackend {
    type Layer = MemoryLayer;
    type Table = MemoryTable;

    fn create_layer(&mut self, stem: &str, kind: ShapeKind) -> Result<MemoryLayer> {
        if self.fail_on == Some(kind) {
            return Err(format!("Permission denied: {}.shp", stem).into());
        }
        self.recording.borrow_mut().layers.insert(
            stem.to_string(),
            RecordedLayer {
                kind: Some(kind),
                ..Default::default()
            },
        );
        Ok(MemoryLayer {
            stem: stem.to_string(),
            recording: Rc::clone(&self.recording),
        })
    }

    fn create_table(&mut self, stem: &str) -> Result<MemoryTable> {
        self.recording
            .borrow_mut()
            .tables
            .insert(stem.to_string(), RecordedTable::default());
        Ok(MemoryTable {
            stem: stem.to_string(),
            recording: Rc::clone(&self.recording),
            field_limit: self.field_limit,
        })
    }

    fn write_projection(&mut self, stem: &str, projection: &str) -> Result<()> {
        self.recording
            .borrow_mut()
            .projections
            .insert(stem.to_string(), projection.to_string());
        Ok(())
    }
}
