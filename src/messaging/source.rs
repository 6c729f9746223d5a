//! Record sources for the publish loop.
//!
//! Any `Stream` of serializable records can feed a [`Publisher`](super::Publisher).
//! Records are pulled lazily, one per tick, and never replayed.

use futures::stream::{self, Stream};

use crate::contracts::Person;

/// Endless stream of [`Person::sample`] records.
pub fn synthetic() -> impl Stream<Item = Person> + Send + Unpin {
    stream::repeat_with(Person::sample)
}

/// Finite source over pre-built records; the loop stops once it runs dry.
pub fn from_records<I>(records: I) -> stream::Iter<I::IntoIter>
where
    I: IntoIterator,
{
    stream::iter(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_synthetic_source_never_ends() {
        let records: Vec<Person> = synthetic().take(3).collect().await;
        assert_eq!(records, vec![Person::sample(); 3]);
    }

    #[tokio::test]
    async fn test_finite_source_runs_dry() {
        let mut source = from_records(vec![Person::new("a", 1)]);
        assert_eq!(source.next().await, Some(Person::new("a", 1)));
        assert_eq!(source.next().await, None);
    }
}
