//! Message envelopes.
//!
//! User messages are opaque to the runtime: an envelope carries an
//! `Arc<dyn Any>` payload plus the optional sender pid and header map.
//! Envelopes are cheap to clone, which is what lets a future fan the same
//! result out to several pipe targets.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::pid::Pid;

/// Opaque user message payload.
pub type AnyMessage = Arc<dyn Any + Send + Sync>;

/// The delivery unit on a mailbox: message + sender + headers.
///
/// Immutable once posted. The builder-style constructors cover the common
/// cases:
///
/// ```ignore
/// let env = MessageEnvelope::new(JoinRoom { room: 7 })
///     .with_sender(reply_to)
///     .with_header("trace-id", "abc123");
/// ```
#[derive(Clone)]
pub struct MessageEnvelope {
    pub sender: Option<Pid>,
    pub message: AnyMessage,
    pub header: Option<Arc<HashMap<String, String>>>,
}

impl MessageEnvelope {
    pub fn new(message: impl Any + Send + Sync) -> Self {
        Self {
            sender: None,
            message: Arc::new(message),
            header: None,
        }
    }

    /// Wrap an already shared payload without another allocation.
    pub fn from_arc(message: AnyMessage) -> Self {
        Self {
            sender: None,
            message,
            header: None,
        }
    }

    pub fn with_sender(mut self, sender: Pid) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let header = Arc::make_mut(self.header.get_or_insert_with(Default::default));
        header.insert(key.into(), value.into());
        self
    }

    /// Downcast the payload to a concrete message type.
    pub fn message_as<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.header.as_ref()?.get(key).map(String::as_str)
    }
}

impl PartialEq for MessageEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.sender == other.sender
            && self.header == other.header
            && Arc::ptr_eq(&self.message, &other.message)
    }
}

impl fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("sender", &self.sender)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_round_trip() {
        let env = MessageEnvelope::new("hello".to_string());
        assert_eq!(env.message_as::<String>().map(String::as_str), Some("hello"));
        assert!(env.message_as::<u32>().is_none());
    }

    #[test]
    fn headers_accumulate() {
        let env = MessageEnvelope::new(1u8)
            .with_header("a", "1")
            .with_header("b", "2");
        assert_eq!(env.header_value("a"), Some("1"));
        assert_eq!(env.header_value("b"), Some("2"));
        assert_eq!(env.header_value("c"), None);
    }

    #[test]
    fn clones_share_payload() {
        let env = MessageEnvelope::new(42u64);
        let copy = env.clone();
        assert!(Arc::ptr_eq(&env.message, &copy.message));
    }
}
