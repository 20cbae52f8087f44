//! Events emitted by the OS SMS auto-retrieval integration.

use serde::{Deserialize, Serialize};

/// One event from the SMS retriever. The verification core only acts on
/// [`SmsEvent::Message`]; errors and timeouts are logged and dropped by the
/// consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsEvent {
    /// A raw message body was retrieved.
    Message(String),
    /// The retriever reported an error.
    Error(String),
    /// The OS listener timed out waiting for a message.
    Timeout,
}
