//! Control-plane resource kinds for Converge
//!
//! This crate implements [`converge_cloud::ResourceHandler`] for the
//! resource kinds of the cloud platform, on top of a typed
//! [`ControlPlane`] client.
//!
//! # Resource kinds
//!
//! - [`OrganizationHandler`]: full-body updates, lock through the update call
//! - [`ProjectHandler`]: quota, flavors, alerting profile, backups, servers
//! - [`BackupCredentialHandler`]: S3 credentials used by project backups
//!
//! Read-only lookups (flavor catalogue, organizations, Kubernetes profiles,
//! billing rules, AWS cloud credentials) live in [`flavors`] and [`lookup`].
//!
//! # Example
//!
//! ```ignore
//! use converge_cloud::AttributeMap;
//! use converge_platform::Platform;
//!
//! let settings = converge_config::load()?;
//! let platform = Platform::connect(&settings)?;
//!
//! let desired = AttributeMap::new()
//!     .with("name", "proj1")
//!     .with("cloud_credential_id", "42");
//! let (id, observed) = platform.projects().create(&platform.context(), &desired).await?;
//! ```

pub mod api;
pub mod backup_credential;
pub mod error;
pub mod flatten;
pub mod flavors;
pub mod http;
pub mod lookup;
pub mod organization;
pub mod project;
pub mod units;
pub mod validate;

pub use api::{ClientResult, CloudType, ControlPlane, ServerRole};
pub use backup_credential::BackupCredentialHandler;
pub use error::{PlatformError, Result};
pub use flavors::{Flavor, FlavorFilter, list_flavors};
pub use http::HttpControlPlane;
pub use lookup::{
    list_aws_cloud_credentials, list_billing_rules, list_kubernetes_profiles, list_organizations,
    organization_details,
};
pub use organization::OrganizationHandler;
pub use project::ProjectHandler;

use converge_cloud::{PollConfig, ReconcileContext, Reconciler};
use converge_config::{PollSettings, Settings, WaitSettings};
use std::sync::Arc;

pub fn poll_config(wait: &WaitSettings) -> PollConfig {
    PollConfig::new(wait.timeout(), wait.interval(), wait.initial_delay())
}

/// Reconcile context for the configured waits
pub fn reconcile_context(poll: &PollSettings) -> ReconcileContext {
    ReconcileContext::new(
        poll_config(&poll.read_after_write),
        poll_config(&poll.backup_disable),
    )
}

/// Shared client plus one reconciler per resource kind
pub struct Platform {
    client: Arc<dyn ControlPlane>,
    poll: PollSettings,
}

impl Platform {
    pub fn new(client: Arc<dyn ControlPlane>, poll: PollSettings) -> Self {
        Self { client, poll }
    }

    /// Connect over HTTP with loaded settings
    pub fn connect(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let client = HttpControlPlane::new(&settings.client)?;
        Ok(Self::new(Arc::new(client), settings.poll.clone()))
    }

    pub fn client(&self) -> &Arc<dyn ControlPlane> {
        &self.client
    }

    pub fn context(&self) -> ReconcileContext {
        reconcile_context(&self.poll)
    }

    pub fn organizations(&self) -> Reconciler<OrganizationHandler> {
        Reconciler::new(OrganizationHandler::new(self.client.clone()))
    }

    pub fn projects(&self) -> Reconciler<ProjectHandler> {
        Reconciler::new(ProjectHandler::new(self.client.clone()))
    }

    pub fn backup_credentials(&self) -> Reconciler<BackupCredentialHandler> {
        Reconciler::new(BackupCredentialHandler::new(self.client.clone()))
    }
}
