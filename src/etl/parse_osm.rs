use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{info, warn};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Node, OsmId, Tag, Way};
use crate::data::OsmElements;
use crate::errors::Result;
use crate::etl::Etl;

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "osm_elements.rkyv";

enum ParserState {
    Top,
    Node(Node),
    Way(Way),
    Relation,
}

pub struct ParseOsmEtl {
    data_path: PathBuf,
}

fn attribute_value(attribute: &Attribute) -> Result<String> {
    Ok(attribute.unescape_value()?.into_owned())
}

fn required<T>(value: Option<T>, element: &str, attribute: &str) -> Result<T> {
    value.ok_or_else(|| format!("Found <{}> without '{}' attribute", element, attribute).into())
}

impl ParseOsmEtl {
    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    fn parse_node(el: &BytesStart) -> Result<Node> {
        let mut id: Option<OsmId> = None;
        let mut lat: Option<String> = None;
        let mut lon: Option<String> = None;

        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            match attribute.key.as_ref() {
                b"id" => id = Some(attribute_value(&attribute)?.parse()?),
                b"lat" => lat = Some(attribute_value(&attribute)?),
                b"lon" => lon = Some(attribute_value(&attribute)?),
                _ => (),
            }
        }

        Ok(Node {
            id: required(id, "node", "id")?,
            lat: required(lat, "node", "lat")?,
            lon: required(lon, "node", "lon")?,
            tags: Vec::new(),
        })
    }

    fn parse_way(el: &BytesStart) -> Result<Way> {
        let mut id: Option<OsmId> = None;
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            if attribute.key.as_ref() == b"id" {
                id = Some(attribute_value(&attribute)?.parse()?);
            }
        }
        Ok(Way {
            id: required(id, "way", "id")?,
            node_refs: Vec::new(),
            tags: Vec::new(),
        })
    }

    fn parse_node_ref(el: &BytesStart) -> Result<OsmId> {
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            if attribute.key.as_ref() == b"ref" {
                return Ok(attribute_value(&attribute)?.parse()?);
            }
        }
        Err("Found <nd> without 'ref' attribute".into())
    }

    fn parse_tag(el: &BytesStart) -> Result<Tag> {
        let mut key: Option<String> = None;
        let mut value: Option<String> = None;
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            match attribute.key.as_ref() {
                b"k" => key = Some(attribute_value(&attribute)?),
                b"v" => value = Some(attribute_value(&attribute)?),
                _ => (),
            }
        }
        Ok(Tag {
            key: required(key, "tag", "k")?,
            value: required(value, "tag", "v")?,
        })
    }

    /// Adds an `<nd>` or `<tag>` child to the element being read.
    fn parse_child(el: &BytesStart, state: &mut ParserState) -> Result<()> {
        match (el.name().as_ref(), state) {
            (b"nd", ParserState::Way(way)) => way.node_refs.push(Self::parse_node_ref(el)?),
            (b"tag", ParserState::Way(way)) => way.tags.push(Self::parse_tag(el)?),
            (b"tag", ParserState::Node(node)) => node.tags.push(Self::parse_tag(el)?),
            _ => (),
        }
        Ok(())
    }

    fn push_way(elements: &mut OsmElements, way: Way) {
        if way.node_refs.is_empty() {
            warn!(way_id = way.id; "Skipping way without nodes");
        } else {
            elements.ways.push(way);
        }
    }

    fn create_osm_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let file_reader = BufReader::new(fs::File::open(&self.data_path)?);
        let input: Box<dyn BufRead> = if self.data_path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        Ok(reader)
    }

    pub fn new(data_path: &Path) -> ParseOsmEtl {
        ParseOsmEtl {
            data_path: data_path.to_path_buf(),
        }
    }
}

/// Loads the element model written by the `parse_osm` stage.
pub fn read_cached_elements(dir: &Path) -> Result<OsmElements> {
    let bytes = fs::read(dir.join(OUTPUT_FILE_NAME))?;
    let mut aligned = rkyv::AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(&bytes);

    // The cache is only ever written by `ParseOsmEtl::load`.
    let elements: OsmElements = unsafe { rkyv::from_bytes_unchecked(&aligned) }
        .map_err(|err| format!("Could not deserialize element cache: {:?}", err))?;
    Ok(elements)
}

impl Etl for ParseOsmEtl {
    type Input = Reader<Box<dyn BufRead>>;
    type Output = OsmElements;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        if self.is_cached(dir)? {
            fs::remove_file(Self::output_path(dir))?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        self.create_osm_reader()
    }

    fn transform(&mut self, mut reader: Self::Input) -> Result<Self::Output> {
        let mut buf = Vec::new();
        let mut elements = OsmElements::default();
        let mut state = ParserState::Top;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Text(_e) => return Err("Didn't expect to see Text in OSM file.".into()),
                Event::Start(e) => {
                    match e.name().as_ref() {
                        b"node" => state = ParserState::Node(Self::parse_node(&e)?),
                        b"way" => state = ParserState::Way(Self::parse_way(&e)?),
                        b"relation" => state = ParserState::Relation,
                        _ => Self::parse_child(&e, &mut state)?,
                    }
                },
                Event::Empty(e) => {
                    let at_top = matches!(state, ParserState::Top);
                    match (e.name().as_ref(), at_top) {
                        (b"node", true) => elements.nodes.push(Self::parse_node(&e)?),
                        (b"way", true) => Self::push_way(&mut elements, Self::parse_way(&e)?),
                        _ => Self::parse_child(&e, &mut state)?,
                    }
                },
                Event::End(e) => {
                    if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                        match std::mem::replace(&mut state, ParserState::Top) {
                            ParserState::Node(node) => elements.nodes.push(node),
                            ParserState::Way(way) => Self::push_way(&mut elements, way),
                            ParserState::Top | ParserState::Relation => (),
                        }
                    }
                },
                // Declarations, comments and the like carry no map data.
                _ => (),
            }
            buf.clear();
        };

        info!(nodes = elements.nodes.len(), ways = elements.ways.len(); "Parsed OSM elements");
        Ok(elements)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 256>(&output)
            .map_err(|err| format!("Could not serialize element cache: {:?}", err))?;
        fs::write(Self::output_path(dir), &bytes)?;
        Ok(())
    }
}
