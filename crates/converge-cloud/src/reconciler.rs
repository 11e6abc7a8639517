//! Create / Read / Update / Delete orchestration
//!
//! The reconciler composes the diff engine, the planner, a
//! [`ResourceHandler`] and the poller. Every operation runs its steps
//! strictly in order and stops at the first failure; nothing is rolled back,
//! and once the remote system has assigned an identity every error carries it.

use crate::action::{Identity, Operation, WaitPredicate};
use crate::diff::{diff, reflects};
use crate::error::{ClientError, ErrorKind, ReconcileError, Result};
use crate::planner::Planner;
use crate::poll::{PollConfig, PollError, Poller};
use crate::provider::{ReconcileContext, ResourceHandler};
use crate::schema::PlanRule;
use crate::state::{PhaseTracker, ResourcePhase};
use crate::value::AttributeMap;
use tracing::{debug, info, warn};

pub struct Reconciler<H> {
    handler: H,
}

impl<H: ResourceHandler> Reconciler<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn kind(&self) -> &'static str {
        self.handler.schema().kind()
    }

    fn error(
        &self,
        operation: impl Into<String>,
        identity: Option<&Identity>,
        kind: ErrorKind,
    ) -> ReconcileError {
        ReconcileError::new(self.kind(), operation, identity.cloned(), kind)
    }

    /// Create the resource and every dependent sub-operation, then wait until
    /// a read reflects the declared state.
    pub async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &AttributeMap,
    ) -> Result<(Identity, AttributeMap)> {
        let schema = self.handler.schema();
        let changes = diff(schema, &AttributeMap::new(), desired)
            .map_err(|kind| self.error("create", None, kind))?;
        let plan = Planner::new(schema)
            .with_wait_timeout(ctx.wait.timeout)
            .plan(&changes, None)
            .map_err(|kind| self.error("create", None, kind))?;

        info!(kind = self.kind(), plan = %plan.summary(), "Creating resource");

        if ctx.is_cancelled() {
            return Err(self.error("create", None, ErrorKind::Cancelled));
        }

        let mut phase = PhaseTracker::new(self.kind(), ResourcePhase::Absent);
        phase.advance(ResourcePhase::Creating);

        let identity = self
            .handler
            .create_base(desired)
            .await
            .map_err(|e| self.error("create", None, e.into_kind(None)))?;
        info!(kind = self.kind(), identity = %identity, "Base resource created");

        for operation in plan.iter().filter(|op| **op != Operation::Create) {
            self.execute(ctx, &identity, operation, desired).await?;
        }

        let observed = self
            .confirm(ctx, &identity, desired, "create", &mut phase)
            .await?;
        Ok((identity, observed))
    }

    /// Single read of the current remote state; `None` when the resource is
    /// gone.
    pub async fn read(
        &self,
        ctx: &ReconcileContext,
        identity: &Identity,
    ) -> Result<Option<AttributeMap>> {
        if ctx.is_cancelled() {
            return Err(self.error("read", Some(identity), ErrorKind::Cancelled));
        }

        let observed = self
            .handler
            .read(identity)
            .await
            .map_err(|e| self.error("read", Some(identity), e.into_kind(None)))?;

        match observed {
            Some(observed) => {
                self.handler
                    .schema()
                    .conform(&observed)
                    .map_err(|kind| self.error("read", Some(identity), kind))?;
                Ok(Some(observed))
            }
            None => {
                debug!(kind = self.kind(), identity = %identity, "Resource not found");
                Ok(None)
            }
        }
    }

    /// Move the resource from `previous` to `desired` with the minimal plan
    pub async fn update(
        &self,
        ctx: &ReconcileContext,
        identity: &Identity,
        previous: &AttributeMap,
        desired: &AttributeMap,
    ) -> Result<AttributeMap> {
        let schema = self.handler.schema();
        let changes = diff(schema, previous, desired)
            .map_err(|kind| self.error("update", Some(identity), kind))?;
        let plan = Planner::new(schema)
            .with_wait_timeout(ctx.wait.timeout)
            .plan(&changes, Some(identity))
            .map_err(|kind| self.error("update", Some(identity), kind))?;

        let mut phase = PhaseTracker::new(self.kind(), ResourcePhase::Present);
        if plan.is_empty() {
            debug!(kind = self.kind(), identity = %identity, "No changes to apply");
        } else {
            info!(
                kind = self.kind(),
                identity = %identity,
                plan = %plan.summary(),
                "Updating resource"
            );
            phase.advance(ResourcePhase::Updating);
        }

        for operation in plan.iter() {
            self.execute(ctx, identity, operation, desired).await?;
        }

        self.confirm(ctx, identity, desired, "update", &mut phase)
            .await
    }

    /// Delete the resource; deleting an absent resource succeeds.
    ///
    /// A locked resource is unlocked first and owned children are removed
    /// before the resource itself.
    pub async fn delete(&self, ctx: &ReconcileContext, identity: &Identity) -> Result<()> {
        let Some(observed) = self.read(ctx, identity).await? else {
            info!(kind = self.kind(), identity = %identity, "Resource already absent");
            return Ok(());
        };

        let mut phase = PhaseTracker::new(self.kind(), ResourcePhase::Present);
        phase.advance(ResourcePhase::Deleting);
        info!(kind = self.kind(), identity = %identity, "Deleting resource");

        let locked = self
            .handler
            .schema()
            .attributes()
            .find(|a| a.rule == PlanRule::Lock)
            .is_some_and(|a| observed.get_bool(a.name));
        if locked {
            if let Err(e) = self
                .handler
                .apply(identity, &Operation::Lock(false), &observed)
                .await
            {
                warn!(
                    kind = self.kind(),
                    identity = %identity,
                    error = %e,
                    "Unlock before delete failed, continuing"
                );
            }
        }

        let removed = self
            .handler
            .delete_children(identity)
            .await
            .map_err(|e| self.error("delete(children)", Some(identity), e.into_kind(None)))?;
        if removed > 0 {
            debug!(kind = self.kind(), identity = %identity, removed, "Waiting for children");
            let wait = Operation::WaitFor {
                predicate: WaitPredicate::ChildrenRemoved,
                timeout: ctx.wait.timeout,
            };
            self.execute(ctx, identity, &wait, &observed).await?;
        }

        if ctx.is_cancelled() {
            return Err(self.error("delete", Some(identity), ErrorKind::Cancelled));
        }

        match self.handler.delete_base(identity).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(kind = self.kind(), identity = %identity, "Already deleted remotely");
            }
            Err(e) => return Err(self.error("delete", Some(identity), e.into_kind(None))),
        }

        Poller::new(ctx.confirm)
            .with_cancellation(ctx.cancel.clone())
            .wait_until(
                "delete confirmation",
                || self.handler.read(identity),
                |observed| observed.is_none(),
            )
            .await
            .map_err(|e| {
                self.error(
                    "delete",
                    Some(identity),
                    e.into_kind(|e: ClientError| e.into_kind(None)),
                )
            })?;

        phase.advance(ResourcePhase::Absent);
        info!(kind = self.kind(), identity = %identity, "Resource deleted");
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ReconcileContext,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(self.error(operation.to_string(), Some(identity), ErrorKind::Cancelled));
        }

        debug!(
            kind = self.kind(),
            identity = %identity,
            operation = %operation,
            "Executing operation"
        );

        match operation {
            Operation::WaitFor { predicate, timeout } => {
                let config = PollConfig {
                    timeout: *timeout,
                    ..ctx.wait
                };
                Poller::new(config)
                    .with_cancellation(ctx.cancel.clone())
                    .wait_until(
                        &predicate.to_string(),
                        || self.handler.probe(identity, predicate),
                        |done| *done,
                    )
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        self.error(
                            operation.to_string(),
                            Some(identity),
                            e.into_kind(|e: ClientError| e.into_kind(None)),
                        )
                    })
            }
            _ => self
                .handler
                .apply(identity, operation, desired)
                .await
                .map_err(|e| {
                    self.error(
                        operation.to_string(),
                        Some(identity),
                        e.into_kind(operation.field()),
                    )
                }),
        }
    }

    /// Poll reads until the declared state is observable
    async fn confirm(
        &self,
        ctx: &ReconcileContext,
        identity: &Identity,
        desired: &AttributeMap,
        operation: &str,
        phase: &mut PhaseTracker,
    ) -> Result<AttributeMap> {
        let schema = self.handler.schema();
        let result = Poller::new(ctx.confirm)
            .with_cancellation(ctx.cancel.clone())
            .wait_until(
                "read-after-write",
                || self.handler.read(identity),
                |observed| {
                    observed
                        .as_ref()
                        .is_some_and(|o| reflects(schema, desired, o))
                },
            )
            .await;

        match result {
            Ok(Some(observed)) => {
                phase.advance(ResourcePhase::Present);
                info!(kind = self.kind(), identity = %identity, "Resource confirmed");
                Ok(observed)
            }
            Ok(None) | Err(PollError::Timeout { .. }) => {
                phase.advance(ResourcePhase::NotFoundAfterWrite);
                warn!(
                    kind = self.kind(),
                    identity = %identity,
                    "Resource not observable after write"
                );
                Err(self.error(operation, Some(identity), ErrorKind::NotFoundAfterWrite))
            }
            Err(e) => Err(self.error(
                operation,
                Some(identity),
                e.into_kind(|e: ClientError| e.into_kind(None)),
            )),
        }
    }
}
