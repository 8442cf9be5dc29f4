use crate::data::{osm::Tag, shape::MetaData};

pub const NAME_KEY: &str = "name";

/// Splits an element's tags into its display name and the remaining key/value
/// pairs. Later tags overwrite earlier ones with the same key.
pub fn extract_metadata(tags: &[Tag]) -> MetaData {
    let mut metadata = MetaData::default();
    for tag in tags {
        if tag.key == NAME_KEY {
            metadata.name = tag.value.clone();
        } else {
            metadata.tags.insert(tag.key.clone(), tag.value.clone());
        }
    }
    metadata
}
