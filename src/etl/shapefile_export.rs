use std::fs;
use std::path::Path;

use log::info;

use crate::convert::{ConversionOptions, ConversionStatus, Converter};
use crate::data::{shape::ShapeKind, OsmElements};
use crate::errors::Result;
use crate::etl::{parse_osm::read_cached_elements, Etl};
use crate::shapefile::{layer_stem, with_extension, FileBackend};

pub const ETL_NAME: &str = "shapefile_export";

const LAYER_EXTENSIONS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

pub struct ShapefileExportEtl<'a> {
    options: &'a ConversionOptions,
    status: Option<ConversionStatus>,
}

impl<'a> ShapefileExportEtl<'a> {
    pub fn new(options: &'a ConversionOptions) -> Self {
        ShapefileExportEtl {
            options,
            status: None,
        }
    }

    /// Outcome of the last load, if the stage got that far.
    pub fn status(&self) -> Option<ConversionStatus> {
        self.status
    }
}

impl Etl for ShapefileExportEtl<'_> {
    type Input = OsmElements;
    type Output = Converter;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    // Shapefiles are always rewritten.
    fn is_cached(&self, _dir: &Path) -> Result<bool> {
        Ok(false)
    }

    fn clean(&self, _dir: &Path) -> Result<()> {
        for kind in [ShapeKind::Polygon, ShapeKind::PolyLine, ShapeKind::Point] {
            let stem = layer_stem(&self.options.filename, kind);
            for extension in LAYER_EXTENSIONS {
                let path = with_extension(&stem, extension);
                if path.try_exists()? {
                    fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        read_cached_elements(dir)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let converter = Converter::new(input)?;
        let counts = converter.counts();
        info!(areas = counts.areas, ways = counts.ways, points = counts.points; "Counted shapes");
        Ok(converter)
    }

    fn load(&mut self, _dir: &Path, output: Self::Output) -> Result<()> {
        let status = output.convert(self.options, &mut FileBackend)?;
        self.status = Some(status);
        match status {
            ConversionStatus::Completed => Ok(()),
            ConversionStatus::CannotCreate(_) => Err(status.to_string().into()),
        }
    }
}
