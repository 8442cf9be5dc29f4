pub type OsmId = i64;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Tag {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Coordinates stay as the text found in the file; they are only parsed when a
/// shape is built from them.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct Node {
    pub id: OsmId,
    pub lat: String,
    pub lon: String,
    pub tags: Vec<Tag>,
}

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone)]
pub struct Way {
    pub id: OsmId,
    pub node_refs: Vec<OsmId>,
    pub tags: Vec<Tag>,
}

impl Way {
    /// A way is closed when it starts and ends at the same node.
    pub fn is_closed(&self) -> bool {
        match (self.node_refs.first(), self.node_refs.last()) {
            (Some(first), Some(last)) => first == last,
            _ => false,
        }
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|tag| tag.key == key)
    }
}
