//! Backup credential resource (S3 target used by project backups)

use crate::api::{BackupCredentialBody, ControlPlane};
use crate::flatten::flatten_backup_credential;
use crate::validate::{self, numeric_identity, optional_id, string};
use async_trait::async_trait;
use converge_cloud::{
    AttrKind, AttrSpec, AttributeMap, ClientError, Identity, Operation, PlanRule,
    ResourceHandler, Schema, WaitPredicate,
};
use std::sync::Arc;
use tracing::debug;

pub const KIND: &str = "backup_credential";

pub fn backup_credential_schema() -> Schema {
    Schema::new(KIND)
        .attr(AttrSpec::required("name", AttrKind::Str).rule(PlanRule::Field("credential")))
        .attr(
            AttrSpec::required("s3_access_key_id", AttrKind::Str)
                .rule(PlanRule::Field("credential")),
        )
        .attr(
            AttrSpec::required("s3_secret_access_key", AttrKind::Str)
                .rule(PlanRule::Field("credential"))
                .write_only(),
        )
        .attr(AttrSpec::required("s3_endpoint", AttrKind::Str).force_new())
        .attr(AttrSpec::required("s3_region", AttrKind::Str).force_new())
        .attr(AttrSpec::optional_computed("organization_id", AttrKind::Str).force_new())
        .attr(AttrSpec::computed("organization_name", AttrKind::Str))
        .attr(AttrSpec::computed("is_default", AttrKind::Bool))
        .attr(AttrSpec::optional("lock", AttrKind::Bool).rule(PlanRule::Lock).post_create())
        .check("name", validate::project_name)
        .check("s3_access_key_id", validate::not_empty)
        .check("s3_secret_access_key", validate::not_empty)
        .check("s3_endpoint", validate::not_empty)
        .check("s3_region", validate::not_empty)
        .check("organization_id", validate::int_string)
}

pub struct BackupCredentialHandler {
    client: Arc<dyn ControlPlane>,
    schema: Schema,
}

impl BackupCredentialHandler {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            schema: backup_credential_schema(),
        }
    }

    fn create_body(desired: &AttributeMap) -> Result<BackupCredentialBody, ClientError> {
        Ok(BackupCredentialBody {
            id: None,
            s3_name: string(desired, "name"),
            s3_access_key_id: string(desired, "s3_access_key_id"),
            s3_secret_access_key: string(desired, "s3_secret_access_key"),
            s3_endpoint: desired.get_str("s3_endpoint").map(str::to_string),
            s3_region: desired.get_str("s3_region").map(str::to_string),
            organization_id: optional_id(desired, "organization_id")?,
        })
    }

    /// Endpoint, region and organization are fixed at creation
    fn update_body(id: i32, desired: &AttributeMap) -> BackupCredentialBody {
        BackupCredentialBody {
            id: Some(id),
            s3_name: string(desired, "name"),
            s3_access_key_id: string(desired, "s3_access_key_id"),
            s3_secret_access_key: string(desired, "s3_secret_access_key"),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ResourceHandler for BackupCredentialHandler {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create_base(&self, desired: &AttributeMap) -> Result<Identity, ClientError> {
        let body = Self::create_body(desired)?;
        let id = self.client.create_backup_credential(&body).await?;
        Identity::parse(id)
            .ok_or_else(|| ClientError::Decode("empty backup credential id".to_string()))
    }

    async fn apply(
        &self,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<(), ClientError> {
        let id = numeric_identity(identity)?;
        debug!(credential_id = id, operation = %operation, "Applying backup credential step");
        match operation {
            Operation::Update { .. } => {
                self.client
                    .update_backup_credential(&Self::update_body(id, desired))
                    .await
            }
            Operation::Lock(lock) => self.client.lock_backup_credential(id, *lock).await,
            other => Err(ClientError::Invalid {
                field: other.field().unwrap_or("operation").to_string(),
                reason: format!("{} is not supported by {}", other, KIND),
            }),
        }
    }

    async fn read(&self, identity: &Identity) -> Result<Option<AttributeMap>, ClientError> {
        let id = numeric_identity(identity)?;
        Ok(self
            .client
            .backup_credential(id)
            .await?
            .map(|credential| flatten_backup_credential(&credential)))
    }

    async fn probe(
        &self,
        _identity: &Identity,
        _predicate: &WaitPredicate,
    ) -> Result<bool, ClientError> {
        Ok(true)
    }

    async fn delete_base(&self, identity: &Identity) -> Result<(), ClientError> {
        let id = numeric_identity(identity)?;
        self.client.delete_backup_credential(id).await
    }
}
