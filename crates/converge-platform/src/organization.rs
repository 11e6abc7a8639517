//! Organization resource
//!
//! The update call takes the full body, so every settable attribute belongs
//! to the same field group and the lock is sent through it as well.

use crate::api::{ControlPlane, OrganizationBody};
use crate::flatten::flatten_organization;
use crate::validate::{self, numeric_identity, string};
use async_trait::async_trait;
use converge_cloud::{
    AttrKind, AttrMode, AttrSpec, AttrValue, AttributeMap, ClientError, Identity, Operation,
    PlanRule, ResourceHandler, Schema, WaitPredicate,
};
use std::sync::Arc;
use tracing::debug;

pub const KIND: &str = "organization";

const DEFAULT_DISCOUNT_RATE: f64 = 100.0;

fn field(name: &'static str, kind: AttrKind) -> AttrSpec {
    AttrSpec::optional(name, kind).rule(PlanRule::Field("organization"))
}

pub fn organization_schema() -> Schema {
    Schema::new(KIND)
        .attr(AttrSpec::required("name", AttrKind::Str).rule(PlanRule::Field("organization")))
        .attr(AttrSpec::required("full_name", AttrKind::Str).rule(PlanRule::Field("organization")))
        .attr(field("address", AttrKind::Str))
        .attr(field("billing_email", AttrKind::Str))
        .attr(field("city", AttrKind::Str))
        .attr(field("country", AttrKind::Str))
        .attr(
            AttrSpec::optional_computed("discount_rate", AttrKind::Float)
                .rule(PlanRule::Field("organization")),
        )
        .attr(field("email", AttrKind::Str))
        .attr(
            AttrSpec::optional_computed("managers_can_change_subscription", AttrKind::Bool)
                .rule(PlanRule::Field("organization")),
        )
        .attr(field("phone", AttrKind::Str))
        .attr(field("vat_number", AttrKind::Str))
        .attr(AttrSpec::computed("created_at", AttrKind::Str))
        .attr(AttrSpec::computed("is_read_only", AttrKind::Bool))
        .attr(AttrSpec::computed("partner_id", AttrKind::Str))
        .attr(AttrSpec::computed("partner_name", AttrKind::Str))
        .attr(AttrSpec::optional("lock", AttrKind::Bool).rule(PlanRule::Lock).post_create())
        .check("name", validate::organization_name)
        .check("full_name", validate::not_empty)
        .check("discount_rate", validate::percentage)
}

/// Full request body; `id` is only set for updates
pub fn organization_body(desired: &AttributeMap, id: Option<i32>) -> OrganizationBody {
    OrganizationBody {
        id,
        name: string(desired, "name"),
        full_name: string(desired, "full_name"),
        address: string(desired, "address"),
        billing_email: string(desired, "billing_email"),
        city: string(desired, "city"),
        country: string(desired, "country"),
        discount_rate: desired
            .get_float("discount_rate")
            .unwrap_or(DEFAULT_DISCOUNT_RATE),
        email: string(desired, "email"),
        // Only an explicit `false` turns it off
        is_eligible_update_subscription: desired
            .get("managers_can_change_subscription")
            .and_then(AttrValue::as_bool)
            .unwrap_or(true),
        phone: string(desired, "phone"),
        vat_number: string(desired, "vat_number"),
        is_locked: id.map(|_| desired.get_bool("lock")),
    }
}

/// `desired` with every omitted optional-computed attribute taken from
/// `current`, so a full-body update keeps what the remote system holds
pub fn keep_remote_values(
    schema: &Schema,
    desired: &AttributeMap,
    current: &AttributeMap,
) -> AttributeMap {
    let mut merged = desired.clone();
    for spec in schema
        .attributes()
        .filter(|a| a.mode == AttrMode::OptionalComputed)
    {
        if desired.get(spec.name).is_none() {
            if let Some(value) = current.get(spec.name) {
                merged.insert(spec.name, value.clone());
            }
        }
    }
    merged
}

pub struct OrganizationHandler {
    client: Arc<dyn ControlPlane>,
    schema: Schema,
}

impl OrganizationHandler {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            schema: organization_schema(),
        }
    }
}

#[async_trait]
impl ResourceHandler for OrganizationHandler {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create_base(&self, desired: &AttributeMap) -> Result<Identity, ClientError> {
        let id = self
            .client
            .create_organization(&organization_body(desired, None))
            .await?;
        Identity::parse(id).ok_or_else(|| ClientError::Decode("empty organization id".to_string()))
    }

    async fn apply(
        &self,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<(), ClientError> {
        let id = numeric_identity(identity)?;
        let current = self
            .client
            .organization(id)
            .await?
            .map(|org| flatten_organization(&org))
            .unwrap_or_default();
        let desired = keep_remote_values(&self.schema, desired, &current);
        let mut body = organization_body(&desired, Some(id));
        match operation {
            Operation::Update { .. } => {}
            Operation::Lock(lock) => body.is_locked = Some(*lock),
            other => {
                return Err(ClientError::Invalid {
                    field: other.field().unwrap_or("operation").to_string(),
                    reason: format!("{} is not supported by {}", other, KIND),
                });
            }
        }
        debug!(organization_id = id, operation = %operation, "Updating organization");
        self.client.update_organization(&body).await
    }

    async fn read(&self, identity: &Identity) -> Result<Option<AttributeMap>, ClientError> {
        let id = numeric_identity(identity)?;
        Ok(self
            .client
            .organization(id)
            .await?
            .map(|org| flatten_organization(&org)))
    }

    async fn probe(
        &self,
        _identity: &Identity,
        _predicate: &WaitPredicate,
    ) -> Result<bool, ClientError> {
        // No slot or children to wait on
        Ok(true)
    }

    async fn delete_base(&self, identity: &Identity) -> Result<(), ClientError> {
        let id = numeric_identity(identity)?;
        self.client.delete_organization(id).await
    }
}
