use serde::Serialize;
use serde::de::DeserializeOwned;

pub const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
#[error("Failed to serialize record: {0}")]
pub struct SerializationError(#[from] serde_json::Error);

pub fn encode<R: Serialize>(record: &R) -> Result<Vec<u8>, SerializationError> {
    Ok(serde_json::to_vec(record)?)
}

pub fn decode<R: DeserializeOwned>(payload: &[u8]) -> Result<R, SerializationError> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Person;
    use std::collections::HashMap;

    #[test]
    fn test_person_survives_encoding() {
        let person = Person::new("Zoë «Ω»", 42);
        let payload = encode(&person).unwrap();
        assert!(std::str::from_utf8(&payload).is_ok());
        assert_eq!(decode::<Person>(&payload).unwrap(), person);
    }

    #[test]
    fn test_encoding_is_compact_json() {
        let payload = encode(&Person::new("Ada", 36)).unwrap();
        assert_eq!(payload, br#"{"name":"Ada","age":36}"#);
    }

    #[test]
    fn test_non_string_map_keys_fail() {
        let mut record = HashMap::new();
        record.insert((1u8, 2u8), "pair");
        assert!(encode(&record).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let err = decode::<Person>(br#"{"name":"Ada"}"#).unwrap_err();
        assert!(err.to_string().contains("age"));
    }
}
