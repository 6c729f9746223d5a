use serde::{Deserialize, Serialize};

/// Record emitted by the producer.
///
/// Wire shape: `{"name": <string>, "age": <integer>}`. Only the producer and
/// the eventual consumer agree on it; the broker treats the body as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: impl Into<String>, age: u32) -> Self {
        Self {
            name: name.into(),
            age,
        }
    }

    /// The fixed synthetic record published on every tick.
    pub fn sample() -> Self {
        Self::new("Jane Doe", 21)
    }
}
