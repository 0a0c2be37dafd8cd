//! Domain-specific logging helpers.
//!
//! Each helper fills the metadata bag for its domain and picks the severity
//! from the outcome, then delegates to [`LogClient::log`].

use logpipe_events::{EventMetadata, EventSubtype, EventType, ResourceType, Severity};

use crate::client::LogClient;
use crate::error::Result;

/// Output stream name that marks a container log line as an error stream.
const STDERR: &str = "stderr";

impl LogClient {
    // ------------------------------------------------------------------------
    // Builds
    // ------------------------------------------------------------------------

    /// Records that a build started.
    pub fn build_start(
        &self,
        build_id: &str,
        build_number: u64,
        commit_hash: &str,
        branch: &str,
    ) -> Result<()> {
        self.log(
            EventType::Build,
            EventSubtype::BuildStart,
            ResourceType::Build,
            build_id,
            Severity::Info,
            format!("Build #{build_number} started on {branch}"),
            EventMetadata::new()
                .with_build_number(build_number)
                .with_commit_hash(commit_hash)
                .with_branch(branch),
        )
    }

    /// Records that a build finished. A failed build is logged at error.
    pub fn build_complete(
        &self,
        build_id: &str,
        build_number: u64,
        success: bool,
        duration_ms: u64,
        exit_code: Option<i32>,
    ) -> Result<()> {
        let (subtype, severity, outcome) = if success {
            (EventSubtype::BuildComplete, Severity::Info, "succeeded")
        } else {
            (EventSubtype::BuildFailed, Severity::Error, "failed")
        };
        let mut metadata = EventMetadata::new()
            .with_build_number(build_number)
            .with_duration_ms(duration_ms);
        metadata.exit_code = exit_code;

        self.log(
            EventType::Build,
            subtype,
            ResourceType::Build,
            build_id,
            severity,
            format!("Build #{build_number} {outcome} in {duration_ms}ms"),
            metadata,
        )
    }

    /// Records one line of build output.
    pub fn build_log(&self, build_id: &str, line: &str, stream: &str) -> Result<()> {
        let severity = if stream == STDERR {
            Severity::Warning
        } else {
            Severity::Info
        };
        self.log(
            EventType::Build,
            EventSubtype::BuildLog,
            ResourceType::Build,
            build_id,
            severity,
            line,
            EventMetadata::new().with_stream(stream),
        )
    }

    // ------------------------------------------------------------------------
    // Deployments
    // ------------------------------------------------------------------------

    /// Records that a deployment started.
    pub fn deploy_start(&self, deployment_id: &str, version: &str, environment: &str) -> Result<()> {
        self.log(
            EventType::Deployment,
            EventSubtype::DeployStart,
            ResourceType::Deployment,
            deployment_id,
            Severity::Info,
            format!("Deploying {version} to {environment}"),
            EventMetadata::new()
                .with_version(version)
                .with_environment(environment),
        )
    }

    /// Records that a deployment finished. A failed deployment is logged at error.
    pub fn deploy_complete(
        &self,
        deployment_id: &str,
        version: &str,
        success: bool,
        duration_ms: u64,
    ) -> Result<()> {
        let (subtype, severity, outcome) = if success {
            (EventSubtype::DeployComplete, Severity::Info, "completed")
        } else {
            (EventSubtype::DeployFailed, Severity::Error, "failed")
        };
        self.log(
            EventType::Deployment,
            subtype,
            ResourceType::Deployment,
            deployment_id,
            severity,
            format!("Deployment of {version} {outcome} in {duration_ms}ms"),
            EventMetadata::new()
                .with_version(version)
                .with_duration_ms(duration_ms),
        )
    }

    /// Records a rollback to an earlier version.
    pub fn deploy_rollback(
        &self,
        deployment_id: &str,
        from_version: &str,
        to_version: &str,
        reason: &str,
    ) -> Result<()> {
        self.log(
            EventType::Deployment,
            EventSubtype::DeployRollback,
            ResourceType::Deployment,
            deployment_id,
            Severity::Warning,
            format!("Rolled back from {from_version} to {to_version}: {reason}"),
            EventMetadata::new()
                .with_version(to_version)
                .with_previous_version(from_version),
        )
    }

    /// Records a change in the share of traffic sent to `version`.
    pub fn traffic_shift(&self, deployment_id: &str, version: &str, percentage: f64) -> Result<()> {
        self.log(
            EventType::Deployment,
            EventSubtype::TrafficShift,
            ResourceType::Deployment,
            deployment_id,
            Severity::Info,
            format!("Shifted {percentage}% of traffic to {version}"),
            EventMetadata::new()
                .with_version(version)
                .with_traffic_percentage(percentage),
        )
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    /// Records a health probe result. Unhealthy results are logged at warning.
    pub fn health_check(
        &self,
        deployment_id: &str,
        container_id: &str,
        healthy: bool,
        status: &str,
    ) -> Result<()> {
        let severity = if healthy {
            Severity::Info
        } else {
            Severity::Warning
        };
        let verdict = if healthy { "healthy" } else { "unhealthy" };
        self.log(
            EventType::Container,
            EventSubtype::HealthCheck,
            ResourceType::Deployment,
            deployment_id,
            severity,
            format!("Container {container_id} is {verdict}: {status}"),
            EventMetadata::new()
                .with_container_id(container_id)
                .with_health_status(status),
        )
    }

    /// Records that a container started.
    pub fn container_start(
        &self,
        deployment_id: &str,
        container_id: &str,
        container_name: &str,
    ) -> Result<()> {
        self.log(
            EventType::Container,
            EventSubtype::ContainerStart,
            ResourceType::Deployment,
            deployment_id,
            Severity::Info,
            format!("Container {container_name} started"),
            EventMetadata::new()
                .with_container_id(container_id)
                .with_container_name(container_name),
        )
    }

    /// Records that a container stopped.
    pub fn container_stop(
        &self,
        deployment_id: &str,
        container_id: &str,
        exit_code: Option<i32>,
    ) -> Result<()> {
        let mut metadata = EventMetadata::new().with_container_id(container_id);
        metadata.exit_code = exit_code;
        self.log(
            EventType::Container,
            EventSubtype::ContainerStop,
            ResourceType::Deployment,
            deployment_id,
            Severity::Info,
            format!("Container {container_id} stopped"),
            metadata,
        )
    }

    /// Records that a container crashed. Always logged at error.
    pub fn container_crash(
        &self,
        deployment_id: &str,
        container_id: &str,
        exit_code: Option<i32>,
        reason: &str,
    ) -> Result<()> {
        let mut metadata = EventMetadata::new().with_container_id(container_id);
        metadata.exit_code = exit_code;
        self.log(
            EventType::Container,
            EventSubtype::ContainerCrash,
            ResourceType::Deployment,
            deployment_id,
            Severity::Error,
            format!("Container {container_id} crashed: {reason}"),
            metadata,
        )
    }

    /// Records one line of container output. `stderr` lines are logged at warning.
    pub fn container_log(
        &self,
        deployment_id: &str,
        container_id: &str,
        line: &str,
        stream: &str,
    ) -> Result<()> {
        let severity = if stream == STDERR {
            Severity::Warning
        } else {
            Severity::Info
        };
        self.log(
            EventType::Container,
            EventSubtype::ContainerLog,
            ResourceType::Deployment,
            deployment_id,
            severity,
            line,
            EventMetadata::new()
                .with_container_id(container_id)
                .with_stream(stream),
        )
    }

    /// Records a container resource usage sample.
    pub fn container_stats(
        &self,
        deployment_id: &str,
        container_id: &str,
        cpu_percent: f64,
        memory_bytes: u64,
    ) -> Result<()> {
        self.log(
            EventType::Container,
            EventSubtype::ContainerStats,
            ResourceType::Deployment,
            deployment_id,
            Severity::Debug,
            format!("Container {container_id}: cpu {cpu_percent:.1}%, memory {memory_bytes} bytes"),
            EventMetadata::new()
                .with_container_id(container_id)
                .with_cpu_percent(cpu_percent)
                .with_memory_bytes(memory_bytes),
        )
    }

    // ------------------------------------------------------------------------
    // System, security, audit
    // ------------------------------------------------------------------------

    /// Records a platform event such as a service start or config change.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEvent`](crate::ClientError::InvalidEvent)
    /// if `subtype` is not a system subtype.
    pub fn system_event(
        &self,
        subtype: EventSubtype,
        resource_id: &str,
        severity: Severity,
        message: &str,
        metadata: EventMetadata,
    ) -> Result<()> {
        self.log(
            EventType::System,
            subtype,
            ResourceType::System,
            resource_id,
            severity,
            message,
            metadata,
        )
    }

    /// Records a security event.
    ///
    /// Login failures and access denials are logged at warning, suspicious
    /// activity at error, everything else at info.
    pub fn security_event(
        &self,
        subtype: EventSubtype,
        resource_type: ResourceType,
        resource_id: &str,
        message: &str,
        metadata: EventMetadata,
    ) -> Result<()> {
        let severity = match subtype {
            EventSubtype::LoginFailure | EventSubtype::AccessDenied => Severity::Warning,
            EventSubtype::SuspiciousActivity => Severity::Error,
            _ => Severity::Info,
        };
        self.log(
            EventType::Security,
            subtype,
            resource_type,
            resource_id,
            severity,
            message,
            metadata,
        )
    }

    /// Records an audit trail entry for a change made by `actor_id`.
    pub fn audit_event(
        &self,
        subtype: EventSubtype,
        resource_type: ResourceType,
        resource_id: &str,
        actor_id: &str,
        message: &str,
    ) -> Result<()> {
        self.log(
            EventType::Audit,
            subtype,
            resource_type,
            resource_id,
            Severity::Info,
            message,
            EventMetadata::new().with_actor_id(actor_id),
        )
    }
}
