use indexmap::IndexMap;

/// Geometry type of an output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Point,
    PolyLine,
    Polygon,
}

impl ShapeKind {
    /// Suffix appended to the output prefix to name the layer's files.
    pub fn layer_suffix(self) -> &'static str {
        match self {
            ShapeKind::Point => "points",
            ShapeKind::PolyLine => "lines",
            ShapeKind::Polygon => "polygons",
        }
    }
}

/// Name and remaining tags of one converted shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    pub name: String,
    pub tags: IndexMap<String, String>,
}
