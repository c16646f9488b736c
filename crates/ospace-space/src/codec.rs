//! Element and key encoding.
//!
//! Element payloads are bincode; dictionary keys are JSON text so they stay
//! readable as store keys.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SpaceError, SpaceResult};

/// Anything that can live inside an artifact.
///
/// Set membership compares encoded bytes, so element types should encode
/// deterministically.
pub trait Element: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> Element for T {}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> SpaceResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SpaceError::Codec(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SpaceResult<T> {
    bincode::deserialize(bytes).map_err(|e| SpaceError::Codec(e.to_string()))
}

pub(crate) fn encode_key<K: Serialize + ?Sized>(key: &K) -> SpaceResult<String> {
    serde_json::to_string(key).map_err(|e| SpaceError::Codec(e.to_string()))
}

pub(crate) fn decode_key<K: DeserializeOwned>(key: &str) -> SpaceResult<K> {
    serde_json::from_str(key).map_err(|e| SpaceError::Codec(e.to_string()))
}
