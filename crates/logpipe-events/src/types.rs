//! Enumerations that classify a log event.
//!
//! This module provides:
//! - [`EventType`] - Coarse category of an event
//! - [`EventSubtype`] - Fine-grained action, closed per event type
//! - [`ResourceType`] - Kind of entity an event is about
//! - [`Severity`] - Ordered severity levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Coarse category of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Build lifecycle.
    Build,
    /// Deployment lifecycle.
    Deployment,
    /// Container runtime.
    Container,
    /// Platform services.
    System,
    /// Authentication and access.
    Security,
    /// Changes to platform resources.
    Audit,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Build,
        Self::Deployment,
        Self::Container,
        Self::System,
        Self::Security,
        Self::Audit,
    ];

    /// Returns the wire name of this event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deployment => "deployment",
            Self::Container => "container",
            Self::System => "system",
            Self::Security => "security",
            Self::Audit => "audit",
        }
    }

    /// Returns the subtypes that belong to this event type.
    #[must_use]
    pub fn subtypes(&self) -> Vec<EventSubtype> {
        EventSubtype::ALL
            .iter()
            .copied()
            .filter(|s| s.event_type() == *self)
            .collect()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnknownVariant {
                kind: "event type",
                value: s.to_string(),
            })
    }
}

/// Fine-grained action within an [`EventType`].
///
/// Every subtype belongs to exactly one event type; see
/// [`EventSubtype::event_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubtype {
    // Build
    /// A build was started.
    BuildStart,
    /// A build finished (successfully or not, see severity).
    BuildComplete,
    /// A build failed before completion.
    BuildFailed,
    /// A build was cancelled.
    BuildCancelled,
    /// A line of build output.
    BuildLog,

    // Deployment
    /// A deployment was started.
    DeployStart,
    /// A deployment finished.
    DeployComplete,
    /// A deployment failed.
    DeployFailed,
    /// A deployment was rolled back.
    DeployRollback,
    /// Traffic was shifted between versions.
    TrafficShift,

    // Container
    /// A container started.
    ContainerStart,
    /// A container stopped.
    ContainerStop,
    /// A container exited unexpectedly.
    ContainerCrash,
    /// A line of container output.
    ContainerLog,
    /// A resource usage sample.
    ContainerStats,
    /// A health probe result.
    HealthCheck,

    // System
    /// A platform service started.
    ServiceStart,
    /// A platform service stopped.
    ServiceStop,
    /// Configuration changed.
    ConfigChange,
    /// A resource threshold was crossed.
    ResourceAlert,

    // Security
    /// Successful login.
    LoginSuccess,
    /// Failed login.
    LoginFailure,
    /// Access to a resource was denied.
    AccessDenied,
    /// An API key was created.
    ApiKeyCreated,
    /// An API key was revoked.
    ApiKeyRevoked,
    /// Behavior flagged as suspicious.
    SuspiciousActivity,

    // Audit
    /// A resource was created.
    ResourceCreated,
    /// A resource was updated.
    ResourceUpdated,
    /// A resource was deleted.
    ResourceDeleted,
    /// Permissions were changed.
    PermissionChanged,
}

impl EventSubtype {
    /// All subtypes, grouped by event type.
    pub const ALL: [Self; 30] = [
        Self::BuildStart,
        Self::BuildComplete,
        Self::BuildFailed,
        Self::BuildCancelled,
        Self::BuildLog,
        Self::DeployStart,
        Self::DeployComplete,
        Self::DeployFailed,
        Self::DeployRollback,
        Self::TrafficShift,
        Self::ContainerStart,
        Self::ContainerStop,
        Self::ContainerCrash,
        Self::ContainerLog,
        Self::ContainerStats,
        Self::HealthCheck,
        Self::ServiceStart,
        Self::ServiceStop,
        Self::ConfigChange,
        Self::ResourceAlert,
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::AccessDenied,
        Self::ApiKeyCreated,
        Self::ApiKeyRevoked,
        Self::SuspiciousActivity,
        Self::ResourceCreated,
        Self::ResourceUpdated,
        Self::ResourceDeleted,
        Self::PermissionChanged,
    ];

    /// Returns the event type this subtype belongs to.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::BuildStart
            | Self::BuildComplete
            | Self::BuildFailed
            | Self::BuildCancelled
            | Self::BuildLog => EventType::Build,
            Self::DeployStart
            | Self::DeployComplete
            | Self::DeployFailed
            | Self::DeployRollback
            | Self::TrafficShift => EventType::Deployment,
            Self::ContainerStart
            | Self::ContainerStop
            | Self::ContainerCrash
            | Self::ContainerLog
            | Self::ContainerStats
            | Self::HealthCheck => EventType::Container,
            Self::ServiceStart | Self::ServiceStop | Self::ConfigChange | Self::ResourceAlert => {
                EventType::System
            }
            Self::LoginSuccess
            | Self::LoginFailure
            | Self::AccessDenied
            | Self::ApiKeyCreated
            | Self::ApiKeyRevoked
            | Self::SuspiciousActivity => EventType::Security,
            Self::ResourceCreated
            | Self::ResourceUpdated
            | Self::ResourceDeleted
            | Self::PermissionChanged => EventType::Audit,
        }
    }

    /// Returns true if this subtype belongs to the given event type.
    #[must_use]
    pub fn belongs_to(&self, event_type: EventType) -> bool {
        self.event_type() == event_type
    }

    /// Returns the wire name of this subtype.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BuildStart => "build_start",
            Self::BuildComplete => "build_complete",
            Self::BuildFailed => "build_failed",
            Self::BuildCancelled => "build_cancelled",
            Self::BuildLog => "build_log",
            Self::DeployStart => "deploy_start",
            Self::DeployComplete => "deploy_complete",
            Self::DeployFailed => "deploy_failed",
            Self::DeployRollback => "deploy_rollback",
            Self::TrafficShift => "traffic_shift",
            Self::ContainerStart => "container_start",
            Self::ContainerStop => "container_stop",
            Self::ContainerCrash => "container_crash",
            Self::ContainerLog => "container_log",
            Self::ContainerStats => "container_stats",
            Self::HealthCheck => "health_check",
            Self::ServiceStart => "service_start",
            Self::ServiceStop => "service_stop",
            Self::ConfigChange => "config_change",
            Self::ResourceAlert => "resource_alert",
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::AccessDenied => "access_denied",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyRevoked => "api_key_revoked",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::ResourceCreated => "resource_created",
            Self::ResourceUpdated => "resource_updated",
            Self::ResourceDeleted => "resource_deleted",
            Self::PermissionChanged => "permission_changed",
        }
    }
}

impl fmt::Display for EventSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSubtype {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnknownVariant {
                kind: "event subtype",
                value: s.to_string(),
            })
    }
}

/// Kind of entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A single build.
    Build,
    /// A single deployment.
    Deployment,
    /// A project.
    Project,
    /// A company (tenant).
    Company,
    /// The platform itself.
    System,
}

impl ResourceType {
    /// All resource types.
    pub const ALL: [Self; 5] = [
        Self::Build,
        Self::Deployment,
        Self::Project,
        Self::Company,
        Self::System,
    ];

    /// Returns the wire name of this resource type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deployment => "deployment",
            Self::Project => "project",
            Self::Company => "company",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnknownVariant {
                kind: "resource type",
                value: s.to_string(),
            })
    }
}

/// Event severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Diagnostic detail
    Debug = 0,
    /// Normal operation
    Info = 1,
    /// Something unexpected but recoverable
    Warning = 2,
    /// An operation failed
    Error = 3,
    /// The component cannot continue
    Fatal = 4,
}

impl Severity {
    /// All severities, least severe first.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Fatal,
    ];

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EventError::UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            })
    }
}
