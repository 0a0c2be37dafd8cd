//! Error types for event construction.

use thiserror::Error;

use crate::types::{EventSubtype, EventType};

/// Errors that can occur while building a [`LogEvent`](crate::LogEvent).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// A required field was not provided.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The message was empty or whitespace only.
    #[error("event message cannot be empty")]
    EmptyMessage,

    /// The subtype does not belong to the declared event type.
    #[error("subtype {subtype} does not belong to event type {event_type}")]
    SubtypeMismatch {
        /// Declared event type.
        event_type: EventType,
        /// Subtype that was supplied.
        subtype: EventSubtype,
    },

    /// A string did not name a known enum variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = EventError::MissingField("message");
        assert_eq!(err.to_string(), "missing required field: message");

        let err = EventError::EmptyMessage;
        assert_eq!(err.to_string(), "event message cannot be empty");

        let err = EventError::SubtypeMismatch {
            event_type: EventType::Build,
            subtype: EventSubtype::DeployStart,
        };
        assert_eq!(
            err.to_string(),
            "subtype deploy_start does not belong to event type build"
        );

        let err = EventError::UnknownVariant {
            kind: "severity",
            value: "loud".to_string(),
        };
        assert_eq!(err.to_string(), "unknown severity: loud");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventError>();
    }
}
