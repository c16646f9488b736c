use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ArtifactId;

const INDEX: &str = "state/index";
const ITEM_PREFIX: &str = "state/item/";

/// A store category: the namespace an edit's key lives in.
///
/// | category                   | keys                          |
/// |----------------------------|-------------------------------|
/// | `state/index`              | artifact identifiers          |
/// | `state/item/<id>/metadata` | `length`, `count`, `head`, .. |
/// | `state/item/<id>/data`     | `value`                       |
/// | `state/item/<id>/items`    | element positions             |
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category(String);

impl Category {
    /// The registry's identifier index.
    pub fn index() -> Self {
        Self(INDEX.to_string())
    }

    /// Scalar metadata of an artifact.
    pub fn metadata(id: &ArtifactId) -> Self {
        Self(format!("{ITEM_PREFIX}{id}/metadata"))
    }

    /// Scalar cell payload of a value artifact.
    pub fn data(id: &ArtifactId) -> Self {
        Self(format!("{ITEM_PREFIX}{id}/data"))
    }

    /// Per-element payloads of a collection artifact.
    pub fn items(id: &ArtifactId) -> Self {
        Self(format!("{ITEM_PREFIX}{id}/items"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_index(&self) -> bool {
        self.0 == INDEX
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Category({})", self.0)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_store_contract() {
        let id = ArtifactId::new("bar").unwrap();
        assert_eq!(Category::index().as_str(), "state/index");
        assert_eq!(Category::metadata(&id).as_str(), "state/item/bar/metadata");
        assert_eq!(Category::data(&id).as_str(), "state/item/bar/data");
        assert_eq!(Category::items(&id).as_str(), "state/item/bar/items");
    }

    #[test]
    fn only_index_is_index() {
        let id = ArtifactId::new("state").unwrap();
        assert!(Category::index().is_index());
        assert!(!Category::metadata(&id).is_index());
    }
}
