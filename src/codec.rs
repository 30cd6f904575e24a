//! Wire encoding for items passed through a remote broker.
//!
//! Items are encoded with `serde_json` into a byte buffer.  JSON is
//! self-describing, which is what lets the arbitrary task payloads
//! round-trip without a schema, and an absent result error is
//! encoded as `null` so that its absence survives the trip too.

use crate::broker::BrokerError;

pub fn encode<T: serde::Serialize>(item: &T) -> Result<Vec<u8>, BrokerError> {
    serde_json::to_vec(item).map_err(|source| BrokerError::Serialization { source })
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, BrokerError> {
    serde_json::from_slice(bytes).map_err(|source| BrokerError::Deserialization { source })
}
