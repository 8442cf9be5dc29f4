use crate::data::{osm::Way, shape::ShapeKind};

/// Closed ways become polygons unless a tag marks them as something travelled
/// along. Tags can only turn a polygon into a line, never the other way round.
pub fn classify_way(way: &Way) -> ShapeKind {
    if !way.is_closed() {
        return ShapeKind::PolyLine;
    }
    let forced_line = way.has_tag("highway")
        || way.tags.iter().any(|tag| tag.key == "junction" && tag.value == "roundabout");
    if forced_line {
        ShapeKind::PolyLine
    } else {
        ShapeKind::Polygon
    }
}
