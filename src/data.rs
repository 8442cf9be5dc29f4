use std::collections::HashMap;

use self::osm::{Node, OsmId, Way};

pub mod osm;
pub mod shape;

/// Nodes and ways as read from the .osm file, kept in document order. Relations
/// are discarded.

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Default, Clone)]
pub struct OsmElements {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
}

impl OsmElements {
    /// Position of each node in `nodes`, keyed by id. The first node wins if an
    /// id appears twice.
    pub fn node_index(&self) -> HashMap<OsmId, usize> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            index.entry(node.id).or_insert(position);
        }
        index
    }
}
