use std::time::Duration;

use lapin::Queue;
use lapin::options::QueueDeclareOptions;
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};

/// Name and delivery guarantees of the destination queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub durable: bool,
}

impl QueueDescriptor {
    pub fn new(name: impl Into<String>, durable: bool) -> Self {
        Self {
            name: name.into(),
            durable,
        }
    }

    pub fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.durable,
            passive: false,
            ..Default::default()
        }
    }
}

/// Result of a successful declaration.
///
/// Two handles are equal when they reference the same queue; the counters are a
/// snapshot taken at declaration time and do not take part in equality.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    name: String,
    message_count: u32,
    consumer_count: u32,
}

impl QueueHandle {
    pub fn new(name: impl Into<String>, message_count: u32, consumer_count: u32) -> Self {
        Self {
            name: name.into(),
            message_count,
            consumer_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn consumer_count(&self) -> u32 {
        self.consumer_count
    }
}

impl PartialEq for QueueHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for QueueHandle {}

impl From<Queue> for QueueHandle {
    fn from(queue: Queue) -> Self {
        Self::new(
            queue.name().as_str(),
            queue.message_count(),
            queue.consumer_count(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeclareError {
    #[error("Queue {queue} already exists with conflicting attributes: {reason}")]
    Conflict { queue: String, reason: String },

    #[error("Queue declaration for {queue} rejected: {reason}")]
    Rejected { queue: String, reason: String },

    #[error("Queue declaration for {queue} timed out after {after:?}")]
    Timeout { queue: String, after: Duration },
}

impl DeclareError {
    /// Classifies a lapin failure; 406 PRECONDITION_FAILED means the queue
    /// exists with different attributes.
    pub fn from_lapin(queue: &str, error: lapin::Error) -> Self {
        match &error {
            lapin::Error::ProtocolError(amqp_error)
                if matches!(
                    amqp_error.kind(),
                    AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
                ) =>
            {
                DeclareError::Conflict {
                    queue: queue.to_string(),
                    reason: error.to_string(),
                }
            }
            _ => DeclareError::Rejected {
                queue: queue.to_string(),
                reason: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_options_follow_durability() {
        assert!(QueueDescriptor::new("q", true).declare_options().durable);
        assert!(!QueueDescriptor::new("q", false).declare_options().durable);
        assert!(!QueueDescriptor::new("q", true).declare_options().passive);
    }

    #[test]
    fn test_handles_compare_by_name() {
        let first = QueueHandle::new("testQ", 0, 0);
        let second = QueueHandle::new("testQ", 12, 1);
        assert_eq!(first, second);
        assert_ne!(first, QueueHandle::new("other", 0, 0));
    }

    fn soft_error(kind: AMQPSoftError) -> lapin::Error {
        lapin::Error::ProtocolError(lapin::protocol::AMQPError::new(
            AMQPErrorKind::Soft(kind),
            "inequivalent arg 'durable'".into(),
        ))
    }

    #[test]
    fn test_precondition_failure_is_conflict() {
        let err = DeclareError::from_lapin("testQ", soft_error(AMQPSoftError::PRECONDITIONFAILED));
        assert!(matches!(err, DeclareError::Conflict { ref queue, .. } if queue == "testQ"));
    }

    #[test]
    fn test_other_refusals_are_rejections() {
        let err = DeclareError::from_lapin("testQ", soft_error(AMQPSoftError::ACCESSREFUSED));
        assert!(matches!(err, DeclareError::Rejected { .. }));
    }
}
