use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ::shapefile::{Point, Polygon, PolygonRing, Polyline, ShapeWriter};
use log::trace;

use crate::data::shape::ShapeKind;
use crate::errors::Result;

use super::ShapeLayer;

enum Shapes {
    Points(Vec<Point>),
    Lines(Vec<Polyline>),
    Polygons(Vec<Polygon>),
}

impl Shapes {
    fn len(&self) -> usize {
        match self {
            Shapes::Points(shapes) => shapes.len(),
            Shapes::Lines(shapes) => shapes.len(),
            Shapes::Polygons(shapes) => shapes.len(),
        }
    }
}

/// Single-part geometry layer written as a `.shp` main file and a `.shx`
/// index. Shapes are collected and handed to the writer on close.
pub struct ShpLayer {
    writer: ShapeWriter<BufWriter<File>>,
    shapes: Shapes,
}

impl ShpLayer {
    pub fn create(shp_path: &Path, shx_path: &Path, kind: ShapeKind) -> Result<Self> {
        let shp = BufWriter::new(File::create(shp_path)?);
        let shx = BufWriter::new(File::create(shx_path)?);
        let shapes = match kind {
            ShapeKind::Point => Shapes::Points(Vec::new()),
            ShapeKind::PolyLine => Shapes::Lines(Vec::new()),
            ShapeKind::Polygon => Shapes::Polygons(Vec::new()),
        };

        Ok(ShpLayer {
            writer: ShapeWriter::with_shx(shp, shx),
            shapes,
        })
    }
}

fn vertices(xs: &[f64], ys: &[f64]) -> Result<Vec<Point>> {
    if xs.len() != ys.len() {
        return Err(format!("Got {} x and {} y coordinates", xs.len(), ys.len()).into());
    }
    if xs.is_empty() {
        return Err("Cannot write a shape without vertices".into());
    }
    Ok(xs.iter().zip(ys).map(|(&x, &y)| Point::new(x, y)).collect())
}

impl ShapeLayer for ShpLayer {
    fn write_object(&mut self, xs: &[f64], ys: &[f64]) -> Result<usize> {
        let mut points = vertices(xs, ys)?;
        match &mut self.shapes {
            Shapes::Points(shapes) => {
                if points.len() != 1 {
                    return Err(format!("A point needs 1 vertex, got {}", points.len()).into());
                }
                shapes.append(&mut points);
            },
            Shapes::Lines(shapes) => {
                // Single-node ways become a zero-length segment.
                if points.len() == 1 {
                    points.push(Point::new(points[0].x, points[0].y));
                }
                shapes.push(Polyline::new(points));
            },
            Shapes::Polygons(shapes) => shapes.push(Polygon::new(PolygonRing::Outer(points))),
        }
        Ok(self.shapes.len() - 1)
    }

    fn close(self) -> Result<()> {
        let ShpLayer { writer, shapes } = self;
        let count = shapes.len();
        match &shapes {
            Shapes::Points(points) => writer.write_shapes(points)?,
            Shapes::Lines(lines) => writer.write_shapes(lines)?,
            Shapes::Polygons(polygons) => writer.write_shapes(polygons)?,
        }
        trace!(shapes = count; "Wrote shape file");
        Ok(())
    }
}
