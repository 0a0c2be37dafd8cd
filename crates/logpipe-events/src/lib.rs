//! # logpipe-events
//!
//! Typed vocabulary of platform lifecycle events.
//!
//! This crate provides:
//!
//! - [`LogEvent`] - Immutable structured event record
//! - [`LogEventBuilder`] - Validating builder for events
//! - [`EventType`] / [`EventSubtype`] - Closed category and action enums
//! - [`ResourceType`] - Kind of entity an event describes
//! - [`Severity`] - Ordered severity levels
//! - [`EventMetadata`] - Domain-specific optional fields
//! - [`ResourceRef`] - Resource identifier normalization
//!
//! ## Example
//!
//! ```rust
//! use logpipe_events::{EventMetadata, EventSubtype, LogEvent, ResourceType, Severity};
//! use uuid::Uuid;
//!
//! let event = LogEvent::builder()
//!     .subtype(EventSubtype::BuildStart)
//!     .resource_type(ResourceType::Build)
//!     .resource_id(Uuid::new_v4())
//!     .severity(Severity::Info)
//!     .message("build #12 started")
//!     .metadata(EventMetadata::new().with_build_number(12))
//!     .source_service("builder")
//!     .build();
//!
//! assert!(event.is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod resource;
pub mod types;

// Re-export main types
pub use error::{EventError, Result};
pub use event::{EventId, EventMetadata, LogEvent, LogEventBuilder};
pub use resource::ResourceRef;
pub use types::{EventSubtype, EventType, ResourceType, Severity};
