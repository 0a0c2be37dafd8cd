//! The [`LogEvent`] record and its builder.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EventError, Result};
use crate::types::{EventSubtype, EventType, ResourceType, Severity};

/// Unique identifier for a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain-specific fields attached to an event.
///
/// Fields that do not apply to an event are left as `None` and are omitted
/// from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    // Build
    /// Sequential build number within a project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
    /// Commit being built or deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    /// Source branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Duration of the operation in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Process exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    // Deployment
    /// Version being deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Version being replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Target environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Share of traffic routed to the new version (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_percentage: Option<f64>,

    // Container
    /// Container identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Container name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Output stream a log line came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// CPU usage percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    /// Resident memory in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Result of a health probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<String>,

    // Security
    /// Who performed the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Source IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Client user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    // Ownership
    /// Owning project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Owning company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,

    /// Free-form extension fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EventMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Sets the build number.
    #[must_use]
    pub const fn with_build_number(mut self, n: u64) -> Self {
        self.build_number = Some(n);
        self
    }

    /// Sets the commit hash.
    #[must_use]
    pub fn with_commit_hash(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into());
        self
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Sets the exit code.
    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the previous version.
    #[must_use]
    pub fn with_previous_version(mut self, version: impl Into<String>) -> Self {
        self.previous_version = Some(version.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Sets the traffic percentage.
    #[must_use]
    pub const fn with_traffic_percentage(mut self, pct: f64) -> Self {
        self.traffic_percentage = Some(pct);
        self
    }

    /// Sets the container identifier.
    #[must_use]
    pub fn with_container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = Some(id.into());
        self
    }

    /// Sets the container name.
    #[must_use]
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Sets the output stream.
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Sets the CPU usage.
    #[must_use]
    pub const fn with_cpu_percent(mut self, pct: f64) -> Self {
        self.cpu_percent = Some(pct);
        self
    }

    /// Sets the memory usage.
    #[must_use]
    pub const fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    /// Sets the health status.
    #[must_use]
    pub fn with_health_status(mut self, status: impl Into<String>) -> Self {
        self.health_status = Some(status.into());
        self
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_actor_id(mut self, actor: impl Into<String>) -> Self {
        self.actor_id = Some(actor.into());
        self
    }

    /// Sets the source IP address.
    #[must_use]
    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Sets the owning project.
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Sets the owning company.
    #[must_use]
    pub fn with_company_id(mut self, id: impl Into<String>) -> Self {
        self.company_id = Some(id.into());
        self
    }

    /// Adds a free-form field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A structured lifecycle event.
///
/// Events are created once at the call site and never mutated afterwards;
/// the only later change is the storage side stamping `ingested_at` via
/// [`LogEvent::with_ingested_at`], which consumes the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unique identifier
    pub id: EventId,
    /// Coarse category
    pub event_type: EventType,
    /// Action within the category
    pub event_subtype: EventSubtype,
    /// Kind of entity the event is about
    pub resource_type: ResourceType,
    /// Entity the event is about
    pub resource_id: Uuid,
    /// Severity level
    pub severity: Severity,
    /// Human-readable summary
    pub message: String,
    /// Domain-specific fields
    #[serde(default, skip_serializing_if = "EventMetadata::is_empty")]
    pub metadata: EventMetadata,
    /// Service that produced the event
    pub source_service: String,
    /// Host that produced the event
    pub source_host: String,
    /// When the event was created
    pub event_timestamp: DateTime<Utc>,
    /// When the storage side received the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}

impl LogEvent {
    /// Creates a new event builder.
    #[must_use]
    pub fn builder() -> LogEventBuilder {
        LogEventBuilder::default()
    }

    /// Returns the event stamped with the given ingestion time.
    #[must_use]
    pub const fn with_ingested_at(mut self, at: DateTime<Utc>) -> Self {
        self.ingested_at = Some(at);
        self
    }

    /// Serializes the event as a single JSON line (without the newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses an event from a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a valid event.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }

    /// Checks the invariants the builder enforces, for events that arrived
    /// over the wire instead of through [`LogEventBuilder`].
    ///
    /// # Errors
    ///
    /// Returns an error if the subtype does not belong to the event type,
    /// the message is blank, or the source service is empty.
    pub fn validate(&self) -> Result<()> {
        if !self.event_subtype.belongs_to(self.event_type) {
            return Err(EventError::SubtypeMismatch {
                event_type: self.event_type,
                subtype: self.event_subtype,
            });
        }
        if self.message.trim().is_empty() {
            return Err(EventError::EmptyMessage);
        }
        if self.source_service.is_empty() {
            return Err(EventError::MissingField("source_service"));
        }
        Ok(())
    }
}

/// Builder for constructing log events.
///
/// `id` and `event_timestamp` default to a fresh identifier and the current
/// time; everything else except `metadata` and `source_host` is required.
#[derive(Debug, Default)]
pub struct LogEventBuilder {
    id: Option<EventId>,
    event_type: Option<EventType>,
    event_subtype: Option<EventSubtype>,
    resource_type: Option<ResourceType>,
    resource_id: Option<Uuid>,
    severity: Option<Severity>,
    message: Option<String>,
    metadata: EventMetadata,
    source_service: Option<String>,
    source_host: Option<String>,
    event_timestamp: Option<DateTime<Utc>>,
}

impl LogEventBuilder {
    /// Sets the event ID.
    #[must_use]
    pub const fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Declares the event type; checked against the subtype on build.
    #[must_use]
    pub const fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Sets the subtype.
    #[must_use]
    pub const fn subtype(mut self, subtype: EventSubtype) -> Self {
        self.event_subtype = Some(subtype);
        self
    }

    /// Sets the resource type.
    #[must_use]
    pub const fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Sets the resource ID.
    #[must_use]
    pub const fn resource_id(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// Sets the severity.
    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the producing service.
    #[must_use]
    pub fn source_service(mut self, service: impl Into<String>) -> Self {
        self.source_service = Some(service.into());
        self
    }

    /// Sets the producing host.
    #[must_use]
    pub fn source_host(mut self, host: impl Into<String>) -> Self {
        self.source_host = Some(host.into());
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub const fn event_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.event_timestamp = Some(ts);
        self
    }

    /// Builds the event.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, the message is
    /// blank, or the declared event type disagrees with the subtype.
    pub fn build(self) -> Result<LogEvent> {
        let event_subtype = self
            .event_subtype
            .ok_or(EventError::MissingField("event_subtype"))?;
        let event_type = match self.event_type {
            Some(declared) if !event_subtype.belongs_to(declared) => {
                return Err(EventError::SubtypeMismatch {
                    event_type: declared,
                    subtype: event_subtype,
                });
            }
            Some(declared) => declared,
            None => event_subtype.event_type(),
        };
        let resource_type = self
            .resource_type
            .ok_or(EventError::MissingField("resource_type"))?;
        let resource_id = self
            .resource_id
            .ok_or(EventError::MissingField("resource_id"))?;
        let severity = self.severity.ok_or(EventError::MissingField("severity"))?;
        let message = self.message.ok_or(EventError::MissingField("message"))?;
        if message.trim().is_empty() {
            return Err(EventError::EmptyMessage);
        }
        let source_service = self
            .source_service
            .filter(|s| !s.is_empty())
            .ok_or(EventError::MissingField("source_service"))?;

        Ok(LogEvent {
            id: self.id.unwrap_or_default(),
            event_type,
            event_subtype,
            resource_type,
            resource_id,
            severity,
            message,
            metadata: self.metadata,
            source_service,
            source_host: self.source_host.unwrap_or_default(),
            event_timestamp: self.event_timestamp.unwrap_or_else(Utc::now),
            ingested_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> LogEventBuilder {
        LogEvent::builder()
            .subtype(EventSubtype::BuildStart)
            .resource_type(ResourceType::Build)
            .resource_id(Uuid::new_v4())
            .severity(Severity::Info)
            .message("build #12 started")
            .source_service("builder")
            .source_host("host-a")
    }

    #[test]
    fn builder_fills_identity_and_timestamp() {
        let before = Utc::now();
        let event = base_builder().build().expect("valid event");

        assert_eq!(event.event_type, EventType::Build);
        assert_eq!(event.event_subtype, EventSubtype::BuildStart);
        assert!(!event.id.0.is_nil());
        assert!(event.event_timestamp >= before);
        assert!(event.ingested_at.is_none());
        assert_eq!(event.source_service, "builder");
    }

    #[test]
    fn builder_generates_distinct_ids() {
        let a = base_builder().build().expect("a");
        let b = base_builder().build().expect("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn builder_rejects_subtype_mismatch() {
        let result = base_builder()
            .event_type(EventType::Security)
            .build();

        assert_eq!(
            result.err(),
            Some(EventError::SubtypeMismatch {
                event_type: EventType::Security,
                subtype: EventSubtype::BuildStart,
            })
        );
    }

    #[test]
    fn builder_accepts_matching_declared_type() {
        let event = base_builder()
            .event_type(EventType::Build)
            .build()
            .expect("matching type");
        assert_eq!(event.event_type, EventType::Build);
    }

    #[test]
    fn builder_rejects_blank_message() {
        let result = base_builder().message("   ").build();
        assert_eq!(result.err(), Some(EventError::EmptyMessage));
    }

    #[test]
    fn builder_missing_fields() {
        let result = LogEvent::builder().build();
        assert_eq!(result.err(), Some(EventError::MissingField("event_subtype")));

        let result = base_builder().source_service("").build();
        assert_eq!(result.err(), Some(EventError::MissingField("source_service")));
    }

    #[test]
    fn absent_metadata_fields_are_omitted() {
        let metadata = EventMetadata::new()
            .with_build_number(12)
            .with_commit_hash("abc123");
        let event = base_builder().metadata(metadata).build().expect("event");

        let json = event.to_json_line().expect("serialize");
        assert!(json.contains("\"build_number\":12"));
        assert!(json.contains("\"commit_hash\":\"abc123\""));
        assert!(!json.contains("null"));
        assert!(!json.contains("traffic_percentage"));
        assert!(!json.contains("ingested_at"));
        assert!(!json.contains("extra"));
    }

    #[test]
    fn empty_metadata_is_omitted_entirely() {
        let event = base_builder().build().expect("event");
        let json = event.to_json_line().expect("serialize");
        assert!(!json.contains("metadata"));

        let parsed = LogEvent::from_json_line(&json).expect("parse");
        assert!(parsed.metadata.is_empty());
    }

    #[test]
    fn json_line_roundtrip_preserves_event() {
        let metadata = EventMetadata::new()
            .with_traffic_percentage(25.0)
            .with_extra("canary", serde_json::json!(true));
        let event = base_builder()
            .metadata(metadata)
            .build()
            .expect("event")
            .with_ingested_at(Utc::now());

        let line = event.to_json_line().expect("serialize");
        assert!(!line.contains('\n'));
        let parsed = LogEvent::from_json_line(&format!("{line}\n")).expect("parse");
        assert_eq!(parsed, event);
    }

    #[test]
    fn malformed_resource_id_fails_to_parse() {
        let event = base_builder().build().expect("event");
        let json = event
            .to_json_line()
            .expect("serialize")
            .replace(&event.resource_id.to_string(), "not-a-uuid");
        assert!(LogEvent::from_json_line(&json).is_err());
    }

    #[test]
    fn validate_catches_wire_only_violations() {
        let event = base_builder().build().expect("event");
        assert!(event.validate().is_ok());

        let mut mismatched = event.clone();
        mismatched.event_type = EventType::Audit;
        assert!(matches!(
            mismatched.validate(),
            Err(EventError::SubtypeMismatch { .. })
        ));

        let mut blank = event.clone();
        blank.message = "  ".to_string();
        assert!(matches!(blank.validate(), Err(EventError::EmptyMessage)));

        let mut anonymous = event;
        anonymous.source_service.clear();
        assert!(matches!(
            anonymous.validate(),
            Err(EventError::MissingField("source_service"))
        ));
    }

    #[test]
    fn metadata_is_empty() {
        assert!(EventMetadata::new().is_empty());
        assert!(!EventMetadata::new().with_exit_code(1).is_empty());
        assert!(!EventMetadata::new()
            .with_extra("k", serde_json::json!(1))
            .is_empty());
    }

    #[test]
    fn event_id_display() {
        let id = EventId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
