//! Resource handler trait definition

use crate::action::{Identity, Operation, WaitPredicate};
use crate::error::ClientError;
use crate::poll::PollConfig;
use crate::schema::Schema;
use crate::value::AttributeMap;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Remote side of one resource kind
///
/// Every kind (organization, project, backup credential, ...) implements
/// this trait so the reconciler can drive it without knowing the endpoints.
/// Implementations map one planned [`Operation`] onto one or more remote
/// calls and flatten remote records into an [`AttributeMap`].
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Attribute universe of the kind
    fn schema(&self) -> &Schema;

    /// Create the base entity from the attributes the create call carries
    async fn create_base(&self, desired: &AttributeMap) -> Result<Identity, ClientError>;

    /// Carry out one planned step against an existing entity
    async fn apply(
        &self,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<(), ClientError>;

    /// Observe the entity; `None` when the backend does not know it
    async fn read(&self, identity: &Identity) -> Result<Option<AttributeMap>, ClientError>;

    /// Evaluate a `WaitFor` predicate once
    async fn probe(
        &self,
        identity: &Identity,
        predicate: &WaitPredicate,
    ) -> Result<bool, ClientError>;

    /// Delete owned children ahead of the entity; returns how many were deleted
    async fn delete_children(&self, _identity: &Identity) -> Result<usize, ClientError> {
        Ok(0)
    }

    /// Delete the entity itself
    async fn delete_base(&self, identity: &Identity) -> Result<(), ClientError>;
}

/// Immutable per-invocation inputs of the reconciler
#[derive(Debug, Clone, Default)]
pub struct ReconcileContext {
    /// Read-after-write confirmation
    pub confirm: PollConfig,
    /// `WaitFor` steps and child removal; a step's own timeout overrides
    /// `wait.timeout`
    pub wait: PollConfig,
    pub cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(confirm: PollConfig, wait: PollConfig) -> Self {
        Self {
            confirm,
            wait,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
