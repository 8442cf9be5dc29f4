pub mod attributes;
pub mod classify;
pub mod metadata;

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, error, info, trace};
use serde::Deserialize;

use crate::data::{
    osm::{Node, OsmId},
    shape::{MetaData, ShapeKind},
    OsmElements,
};
use crate::errors::{Error, Result};
use crate::shapefile::{layer_stem, ShapeLayer, ShapefileBackend};

use self::{attributes::write_attribute_table, classify::classify_way, metadata::extract_metadata};

pub const WGS84_PROJECTION: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"Degree\",0.017453292519943295]]";

fn enabled() -> bool {
    true
}

fn default_projection() -> String {
    WGS84_PROJECTION.to_string()
}

/// Which layers to write, and where.
#[derive(Deserialize, Debug, Clone)]
pub struct ConversionOptions {
    #[serde(default = "enabled")]
    pub polygons: bool,
    #[serde(default = "enabled")]
    pub lines: bool,
    #[serde(default = "enabled")]
    pub points: bool,
    /// Prefix of every output file, e.g. `out/berlin` gives `out/berlin-lines.shp`.
    pub filename: String,
    /// Give every tag key its own attribute column.
    #[serde(default)]
    pub convert_tags: bool,
    /// Written verbatim to each layer's `.prj` file.
    #[serde(default = "default_projection")]
    pub projection: String,
}

impl ConversionOptions {
    pub fn is_enabled(&self, kind: ShapeKind) -> bool {
        match kind {
            ShapeKind::Polygon => self.polygons,
            ShapeKind::PolyLine => self.lines,
            ShapeKind::Point => self.points,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Completed,
    CannotCreate(ShapeKind),
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStatus::Completed => write!(f, "Completed!"),
            ConversionStatus::CannotCreate(kind) => {
                write!(f, "Cannot create {} file!", kind.layer_suffix())
            },
        }
    }
}

/// Expected number of shapes per layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeCounts {
    pub areas: usize,
    pub ways: usize,
    pub points: usize,
}

impl ShapeCounts {
    pub fn for_kind(&self, kind: ShapeKind) -> usize {
        match kind {
            ShapeKind::Polygon => self.areas,
            ShapeKind::PolyLine => self.ways,
            ShapeKind::Point => self.points,
        }
    }
}

/// An open geometry layer plus the metadata of every object written to it, in
/// write order.
struct OutputLayer<L> {
    kind: ShapeKind,
    stem: String,
    layer: L,
    records: Vec<MetaData>,
}

impl<L: ShapeLayer> OutputLayer<L> {
    fn open<B>(
        backend: &mut B,
        options: &ConversionOptions,
        kind: ShapeKind,
    ) -> std::result::Result<Option<Self>, ConversionStatus>
    where
        B: ShapefileBackend<Layer = L>,
    {
        if !options.is_enabled(kind) {
            return Ok(None);
        }
        let stem = layer_stem(&options.filename, kind);
        match backend.create_layer(&stem, kind) {
            Ok(layer) => Ok(Some(OutputLayer {
                kind,
                stem,
                layer,
                records: Vec::new(),
            })),
            Err(err) => {
                error!(
                    layer = kind.layer_suffix(),
                    err = err.message.as_str();
                    "Could not create layer"
                );
                Err(ConversionStatus::CannotCreate(kind))
            },
        }
    }

    fn write(&mut self, xs: &[f64], ys: &[f64], metadata: MetaData) -> Result<()> {
        let index = self.layer.write_object(xs, ys)?;
        debug_assert_eq!(index, self.records.len());
        self.records.push(metadata);
        Ok(())
    }

    fn finish<B>(self, backend: &mut B, options: &ConversionOptions, expected: usize) -> Result<()>
    where
        B: ShapefileBackend<Layer = L>,
    {
        debug_assert_eq!(expected, self.records.len());
        self.layer.close()?;
        let table = backend.create_table(&self.stem)?;
        write_attribute_table(table, &self.records, options.convert_tags)?;
        backend.write_projection(&self.stem, &options.projection)?;
        info!(layer = self.kind.layer_suffix(), shapes = self.records.len(); "Layer written");
        Ok(())
    }
}

/// Text coordinates always use a decimal point, whatever the host locale.
fn parse_coordinate(node: &Node, axis: &str, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|err| {
        Error::from(format!("Node {} has invalid {} {:?}: {}", node.id, axis, text, err))
    })
}

fn missing_node(way_id: OsmId, node_ref: OsmId) -> Error {
    format!("Way {} references missing node {}", way_id, node_ref).into()
}

fn node_position(node: &Node) -> Result<(f64, f64)> {
    Ok((parse_coordinate(node, "lon", &node.lon)?, parse_coordinate(node, "lat", &node.lat)?))
}

/// Turns the ways and nodes of an .osm file into polygon, line and point layers.
///
/// Construction runs the counting pass: closed ways are expected to become
/// areas, open ones lines, and nodes no way uses become points. `convert` then
/// writes the layers, correcting the counts for rings that turn out to be lines.
pub struct Converter {
    elements: OsmElements,
    node_index: HashMap<OsmId, usize>,
    in_way: HashSet<OsmId>,
    counts: ShapeCounts,
}

impl Converter {
    pub fn new(elements: OsmElements) -> Result<Self> {
        let node_index = elements.node_index();
        let mut in_way = HashSet::new();
        let mut counts = ShapeCounts::default();

        for way in &elements.ways {
            if way.node_refs.is_empty() {
                return Err(format!("Way {} has no nodes", way.id).into());
            }
            if way.is_closed() {
                counts.areas += 1;
            } else {
                counts.ways += 1;
            }
            for node_ref in &way.node_refs {
                if !node_index.contains_key(node_ref) {
                    return Err(missing_node(way.id, *node_ref));
                }
                in_way.insert(*node_ref);
            }
        }
        counts.points = elements
            .nodes
            .iter()
            .filter(|node| !in_way.contains(&node.id))
            .count();

        Ok(Converter {
            elements,
            node_index,
            in_way,
            counts,
        })
    }

    pub fn counts(&self) -> ShapeCounts {
        self.counts
    }

    /// Writes every enabled layer. A layer that cannot be created stops the
    /// conversion with `CannotCreate`; layers closed before that stay on disk.
    pub fn convert<B: ShapefileBackend>(
        self,
        options: &ConversionOptions,
        backend: &mut B,
    ) -> Result<ConversionStatus> {
        let Converter {
            elements,
            node_index,
            mut in_way,
            mut counts,
        } = self;

        let mut lines = match OutputLayer::open(backend, options, ShapeKind::PolyLine) {
            Ok(layer) => layer,
            Err(status) => return Ok(status),
        };
        let mut polygons = match OutputLayer::open(backend, options, ShapeKind::Polygon) {
            Ok(layer) => layer,
            Err(status) => return Ok(status),
        };
        let mut points = match OutputLayer::open(backend, options, ShapeKind::Point) {
            Ok(layer) => layer,
            Err(status) => return Ok(status),
        };

        for way in &elements.ways {
            let kind = classify_way(way);
            if kind == ShapeKind::PolyLine && way.is_closed() {
                debug!(way_id = way.id; "Closed way written as a line");
                counts.areas -= 1;
                counts.ways += 1;
            }

            let mut xs = Vec::with_capacity(way.node_refs.len());
            let mut ys = Vec::with_capacity(way.node_refs.len());
            for node_ref in &way.node_refs {
                let Some(&position) = node_index.get(node_ref) else {
                    return Err(missing_node(way.id, *node_ref));
                };
                let (x, y) = node_position(&elements.nodes[position])?;
                xs.push(x);
                ys.push(y);
                in_way.insert(*node_ref);
            }
            let metadata = extract_metadata(&way.tags);

            let target = match kind {
                ShapeKind::Polygon => polygons.as_mut(),
                _ => lines.as_mut(),
            };
            match target {
                Some(layer) => layer.write(&xs, &ys, metadata)?,
                None => trace!(
                    way_id = way.id,
                    layer = kind.layer_suffix();
                    "Layer disabled, way dropped"
                ),
            }
        }

        if let Some(layer) = points.as_mut() {
            for node in elements.nodes.iter().filter(|node| !in_way.contains(&node.id)) {
                let (x, y) = node_position(node)?;
                layer.write(&[x], &[y], extract_metadata(&node.tags))?;
            }
        }

        for layer in [polygons, lines, points].into_iter().flatten() {
            let expected = counts.for_kind(layer.kind);
            layer.finish(backend, options, expected)?;
        }

        let status = ConversionStatus::Completed;
        info!(
            areas = counts.areas,
            ways = counts.ways,
            points = counts.points,
            status = status.to_string().as_str();
            "Conversion finished"
        );
        Ok(status)
    }
}
