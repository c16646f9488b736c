use ospace_types::{CheckpointKind, DECIMAL_ALPHABET};
use serde::{Deserialize, Serialize};

/// Configuration for an [`ObjectSpace`](crate::ObjectSpace).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Alphabet of the ordered-key codec used for element positions.
    /// Changing it makes existing stores unreadable.
    pub key_alphabet: String,
    /// Kind used by [`ObjectSpace::checkpoint`](crate::ObjectSpace::checkpoint).
    pub default_checkpoint: CheckpointKind,
    /// Force every n-th checkpoint (starting with the first) to be full.
    /// `None` or `Some(0)` disables forcing.
    pub full_checkpoint_every: Option<u32>,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            key_alphabet: DECIMAL_ALPHABET.to_string(),
            default_checkpoint: CheckpointKind::Differential,
            full_checkpoint_every: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = SpaceConfig::default();
        assert_eq!(c.key_alphabet, "0123456789");
        assert_eq!(c.default_checkpoint, CheckpointKind::Differential);
        assert!(c.full_checkpoint_every.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: SpaceConfig = serde_json::from_str(r#"{"full_checkpoint_every": 10}"#).unwrap();
        assert_eq!(c.full_checkpoint_every, Some(10));
        assert_eq!(c.key_alphabet, DECIMAL_ALPHABET);
    }
}
