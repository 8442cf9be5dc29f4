mod convert;
mod data;
mod errors;
mod etl;
mod shapefile;

use std::env;
use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::convert::ConversionOptions;
use crate::errors::Result;
use crate::etl::parse_osm::ParseOsmEtl;
use crate::etl::shapefile_export::ShapefileExportEtl;
use crate::etl::Etl;

const DEFAULT_CONFIG_PATH: &str = "config/osm2shp.json";

fn default_cache_dir() -> String {
    "output".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
pub struct UserConfig {
    pub data_path: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub options: ConversionOptions,
}

fn load_user_config(path: &str) -> Result<UserConfig> {
    let file = File::open(path)
        .map_err(|err| format!("Could not open config file {}: {}", path, err))?;
    Ok(serde_json::from_reader(file)?)
}

fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = Path::new(&config.cache_dir).join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(&config_path)?;
    setup_logging(&user_config.log_level);

    let output_dir = create_output_dir(&user_config)?;
    ParseOsmEtl::new(Path::new(&user_config.data_path)).process(&output_dir)?;

    let mut export = ShapefileExportEtl::new(&user_config.options);
    let result = export.process(&output_dir);
    if let Some(status) = export.status() {
        println!("{}", status);
    }
    result
}
