//! Project resource
//!
//! A project is created in one call carrying most of its attributes. Quota,
//! lock and servers are applied right after, in that order. Updates map each
//! planned step onto the dedicated endpoint of its attribute.

use crate::api::{
    ControlPlane, CreateProjectBody, CreateServerBody, NodeLabel, QuotaDto, ServerRole,
};
use crate::flatten::flatten_project;
use crate::units::date_to_rfc3339;
use crate::validate::{
    self, numeric_identity, optional_id, parse_id, required_id, string,
};
use async_trait::async_trait;
use converge_cloud::value::{record_int, record_str};
use converge_cloud::{
    AttrKind, AttrSpec, AttrValue, AttributeMap, ClientError, Dependency, Identity, Operation,
    PlanRule, Record, ResourceHandler, Schema, SubResource, WaitPredicate, collect_pages,
};
use std::sync::Arc;
use tracing::{debug, info};

pub const KIND: &str = "project";

const SERVER_ATTRIBUTES: [(&str, ServerRole); 3] = [
    ("server_bastion", ServerRole::Bastion),
    ("server_kubemaster", ServerRole::Kubemaster),
    ("server_kubeworker", ServerRole::Kubeworker),
];

pub fn project_schema() -> Schema {
    Schema::new(KIND)
        .attr(AttrSpec::required("name", AttrKind::Str).force_new())
        .attr(AttrSpec::required("cloud_credential_id", AttrKind::Str).force_new())
        .attr(AttrSpec::optional_computed("access_profile_id", AttrKind::Str).force_new())
        .attr(AttrSpec::optional_computed("kubernetes_profile_id", AttrKind::Str).force_new())
        .attr(AttrSpec::optional_computed("organization_id", AttrKind::Str).force_new())
        .attr(AttrSpec::optional("auto_upgrade", AttrKind::Bool).force_new())
        .attr(
            AttrSpec::optional("alerting_profile_id", AttrKind::Str)
                .rule(PlanRule::Profile("alerting")),
        )
        .attr(AttrSpec::computed("alerting_profile_name", AttrKind::Str))
        .attr(
            AttrSpec::optional("backup_credential_id", AttrKind::Str)
                .rule(PlanRule::Exclusive("backup")),
        )
        .attr(AttrSpec::optional("monitoring", AttrKind::Bool).rule(PlanRule::Field("monitoring")))
        .attr(
            AttrSpec::optional("expiration_date", AttrKind::Str)
                .rule(PlanRule::Field("lifetime")),
        )
        .attr(AttrSpec::optional("flavors", AttrKind::Set).rule(PlanRule::Binding("flavors")))
        .attr(AttrSpec::computed("quota_id", AttrKind::Str))
        .attr(
            AttrSpec::optional("quota_cpu_units", AttrKind::Int)
                .rule(PlanRule::Field("quota"))
                .post_create(),
        )
        .attr(
            AttrSpec::optional("quota_disk_size", AttrKind::Int)
                .rule(PlanRule::Field("quota"))
                .post_create(),
        )
        .attr(
            AttrSpec::optional("quota_ram_size", AttrKind::Int)
                .rule(PlanRule::Field("quota"))
                .post_create(),
        )
        // Load balancer settings are only accepted by the create call and
        // never reported back.
        .attr(AttrSpec::optional("taikun_lb_flavor", AttrKind::Str).force_new().write_only())
        .attr(AttrSpec::optional("router_id_start_range", AttrKind::Int).force_new().write_only())
        .attr(AttrSpec::optional("router_id_end_range", AttrKind::Int).force_new().write_only())
        .attr(
            AttrSpec::optional("server_bastion", AttrKind::List)
                .rule(PlanRule::Children)
                .post_create()
                .keyed_by(&["name", "disk_size", "flavor"]),
        )
        .attr(
            AttrSpec::optional("server_kubemaster", AttrKind::List)
                .rule(PlanRule::Children)
                .force_new()
                .post_create()
                .keyed_by(&["name", "disk_size", "flavor", "kubernetes_node_label"]),
        )
        .attr(
            AttrSpec::optional("server_kubeworker", AttrKind::List)
                .rule(PlanRule::Children)
                .post_create()
                .keyed_by(&["name", "disk_size", "flavor", "kubernetes_node_label"]),
        )
        .attr(AttrSpec::optional("lock", AttrKind::Bool).rule(PlanRule::Lock).post_create())
        .dependency(Dependency::AllOrNone(&[
            "taikun_lb_flavor",
            "router_id_start_range",
            "router_id_end_range",
        ]))
        .dependency(Dependency::Requires {
            attribute: "server_kubemaster",
            requires: "server_bastion",
        })
        .dependency(Dependency::Requires {
            attribute: "server_kubeworker",
            requires: "server_bastion",
        })
        .check("name", validate::project_name)
        .check("cloud_credential_id", validate::int_string)
        .check("access_profile_id", validate::int_string)
        .check("kubernetes_profile_id", validate::int_string)
        .check("organization_id", validate::int_string)
        .check("alerting_profile_id", validate::int_string)
        .check("backup_credential_id", validate::int_string)
        .check("expiration_date", validate::date)
        .check("taikun_lb_flavor", validate::not_empty)
        .check("router_id_start_range", validate::router_id)
        .check("router_id_end_range", validate::router_id)
        .check("server_bastion", validate::at_most_one)
        .check("server_bastion", server_records)
        .check("server_kubemaster", validate::odd_count)
        .check("server_kubemaster", server_records)
        .check("server_kubeworker", server_records)
}

/// Every declared server needs a valid name, a flavor and a disk size
fn server_records(value: &AttrValue) -> Result<(), String> {
    for record in value.as_list().unwrap_or(&[]) {
        let name = record.get("name").cloned().unwrap_or_else(|| AttrValue::str(""));
        validate::project_name(&name).map_err(|reason| format!("server name: {}", reason))?;
        if record_str(record, "flavor").is_none() {
            return Err(format!("server {} has no flavor", name));
        }
        if record_int(record, "disk_size").unwrap_or(0) <= 0 {
            return Err(format!("server {} has no disk size", name));
        }
    }
    Ok(())
}

pub struct ProjectHandler {
    client: Arc<dyn ControlPlane>,
    schema: Schema,
}

impl ProjectHandler {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            schema: project_schema(),
        }
    }

    fn create_body(desired: &AttributeMap) -> Result<CreateProjectBody, ClientError> {
        let backup = optional_id(desired, "backup_credential_id")?;
        let expired_at = desired
            .get_str("expiration_date")
            .map(date_to_rfc3339)
            .transpose()
            .map_err(|reason| ClientError::Invalid {
                field: "expiration_date".to_string(),
                reason,
            })?;

        let mut body = CreateProjectBody {
            name: string(desired, "name"),
            cloud_credential_id: required_id(desired, "cloud_credential_id")?,
            is_kubernetes: true,
            flavors: desired.get_set("flavors").into_iter().collect(),
            access_profile_id: optional_id(desired, "access_profile_id")?,
            alerting_profile_id: optional_id(desired, "alerting_profile_id")?,
            kubernetes_profile_id: optional_id(desired, "kubernetes_profile_id")?,
            organization_id: optional_id(desired, "organization_id")?,
            is_backup_enabled: backup.is_some(),
            s3_credential_id: backup,
            is_auto_upgrade: desired.get_bool("auto_upgrade"),
            is_monitoring_enabled: desired.get_bool("monitoring"),
            expired_at,
            ..Default::default()
        };
        if let Some(flavor) = desired.get_str("taikun_lb_flavor") {
            body.taikun_lb_flavor = Some(flavor.to_string());
            body.router_id_start_range = desired.get_int("router_id_start_range").map(|v| v as i32);
            body.router_id_end_range = desired.get_int("router_id_end_range").map(|v| v as i32);
        }
        Ok(body)
    }

    /// Quota attributes left unset mean unlimited
    async fn edit_quota(&self, project_id: i32, desired: &AttributeMap) -> Result<(), ClientError> {
        let details = self
            .client
            .project_servers(project_id)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("project {}", project_id)))?;

        let mut quota = QuotaDto::unlimited();
        if let Some(cpu) = desired.get_int("quota_cpu_units") {
            quota.cpu = cpu;
            quota.is_cpu_unlimited = false;
        }
        if let Some(disk) = desired.get_int("quota_disk_size") {
            quota.disk_size = disk;
            quota.is_disk_size_unlimited = false;
        }
        if let Some(ram) = desired.get_int("quota_ram_size") {
            quota.ram = ram;
            quota.is_ram_unlimited = false;
        }
        self.client.edit_quota(details.project.quota_id, &quota).await
    }

    async fn extend_lifetime(
        &self,
        project_id: i32,
        desired: &AttributeMap,
    ) -> Result<(), ClientError> {
        let expire_at = desired
            .get_str("expiration_date")
            .map(date_to_rfc3339)
            .transpose()
            .map_err(|reason| ClientError::Invalid {
                field: "expiration_date".to_string(),
                reason,
            })?;
        self.client.extend_lifetime(project_id, expire_at).await
    }

    async fn attach_slot(&self, project_id: i32, attribute: &str, id: &str) -> Result<(), ClientError> {
        let slot_id = parse_id(attribute, id)?;
        match attribute {
            "alerting_profile_id" => self.client.attach_alerting_profile(project_id, slot_id).await,
            "backup_credential_id" => self.client.enable_backup(project_id, slot_id).await,
            _ => Err(unsupported(attribute)),
        }
    }

    async fn detach_slot(&self, project_id: i32, attribute: &str, id: &str) -> Result<(), ClientError> {
        match attribute {
            "alerting_profile_id" => self.client.detach_alerting_profile(project_id).await,
            "backup_credential_id" => {
                let credential_id = parse_id(attribute, id)?;
                self.client.disable_backup(project_id, credential_id).await
            }
            _ => Err(unsupported(attribute)),
        }
    }

    async fn unbind_flavors(
        &self,
        project_id: i32,
        names: impl Iterator<Item = &String>,
    ) -> Result<(), ClientError> {
        let bound = collect_pages(|offset| self.client.bound_flavors(project_id, offset)).await?;
        let names: Vec<&String> = names.collect();
        let binding_ids: Vec<i32> = bound
            .iter()
            .filter(|b| names.contains(&&b.name))
            .map(|b| b.id)
            .collect();

        if binding_ids.is_empty() {
            debug!(project_id, "No bound flavor matches, nothing to unbind");
            return Ok(());
        }
        self.client.unbind_flavors(&binding_ids).await
    }

    async fn create_server(
        &self,
        project_id: i32,
        role: ServerRole,
        record: &Record,
    ) -> Result<(), ClientError> {
        let labels = match role {
            ServerRole::Bastion => Vec::new(),
            _ => node_labels(record),
        };
        let body = CreateServerBody {
            project_id,
            name: record_str(record, "name").unwrap_or_default().to_string(),
            count: 1,
            disk_size: record_int(record, "disk_size").unwrap_or_default(),
            flavor: record_str(record, "flavor").unwrap_or_default().to_string(),
            role: role.code(),
            kubernetes_node_labels: labels,
        };
        let id = self.client.create_server(&body).await?;
        info!(project_id, server = %body.name, role = role.label(), id = %id, "Server created");
        Ok(())
    }

    /// Delete the server a record describes; a server already gone is fine
    async fn delete_server(&self, project_id: i32, record: &Record) -> Result<(), ClientError> {
        let server_id = match record_str(record, "id") {
            Some(raw) => Some(parse_id("id", raw)?),
            None => {
                let name = record_str(record, "name").unwrap_or_default();
                self.client
                    .project_servers(project_id)
                    .await?
                    .and_then(|details| details.data.into_iter().find(|s| s.name == name))
                    .map(|s| s.id)
            }
        };

        match server_id {
            Some(id) => self.client.delete_servers(project_id, &[id]).await,
            None => {
                debug!(project_id, "Server already absent");
                Ok(())
            }
        }
    }
}

fn node_labels(record: &Record) -> Vec<NodeLabel> {
    record
        .get("kubernetes_node_label")
        .and_then(AttrValue::as_list)
        .unwrap_or(&[])
        .iter()
        .map(|label| NodeLabel {
            key: record_str(label, "key").unwrap_or_default().to_string(),
            value: record_str(label, "value").unwrap_or_default().to_string(),
        })
        .collect()
}

fn server_role(attribute: &str) -> Option<ServerRole> {
    SERVER_ATTRIBUTES
        .iter()
        .find(|(name, _)| *name == attribute)
        .map(|(_, role)| *role)
}

fn unsupported(what: impl std::fmt::Display) -> ClientError {
    ClientError::Invalid {
        field: what.to_string(),
        reason: format!("not supported by {}", KIND),
    }
}

#[async_trait]
impl ResourceHandler for ProjectHandler {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create_base(&self, desired: &AttributeMap) -> Result<Identity, ClientError> {
        let body = Self::create_body(desired)?;
        let id = self.client.create_project(&body).await?;
        Identity::parse(id).ok_or_else(|| ClientError::Decode("empty project id".to_string()))
    }

    async fn apply(
        &self,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<(), ClientError> {
        let project_id = numeric_identity(identity)?;
        debug!(project_id, operation = %operation, "Applying project step");

        match operation {
            Operation::Update { field } => match field.as_str() {
                "quota" => self.edit_quota(project_id, desired).await,
                "monitoring" => self.client.toggle_monitoring(project_id).await,
                "lifetime" => self.extend_lifetime(project_id, desired).await,
                other => Err(unsupported(format!("update({})", other))),
            },
            Operation::Attach(SubResource::Slot { attribute, id }) => {
                self.attach_slot(project_id, attribute, id).await
            }
            Operation::Detach(SubResource::Slot { attribute, id }) => {
                self.detach_slot(project_id, attribute, id).await
            }
            Operation::Attach(SubResource::Child { attribute, record }) => {
                let role = server_role(attribute).ok_or_else(|| unsupported(attribute))?;
                self.create_server(project_id, role, record).await
            }
            Operation::Detach(SubResource::Child { record, .. }) => {
                self.delete_server(project_id, record).await
            }
            Operation::Bind { ids, .. } => {
                let flavors: Vec<String> = ids.iter().cloned().collect();
                self.client.bind_flavors(project_id, &flavors).await
            }
            Operation::Unbind { ids, .. } => self.unbind_flavors(project_id, ids.iter()).await,
            Operation::Lock(lock) => self.client.lock_project(project_id, *lock).await,
            Operation::Create | Operation::WaitFor { .. } => Err(unsupported(operation)),
        }
    }

    async fn read(&self, identity: &Identity) -> Result<Option<AttributeMap>, ClientError> {
        let project_id = numeric_identity(identity)?;
        let Some(details) = self.client.project_servers(project_id).await? else {
            return Ok(None);
        };

        let bound = collect_pages(|offset| self.client.bound_flavors(project_id, offset)).await?;
        let Some(quota) = self.client.project_quota(details.project.quota_id).await? else {
            debug!(project_id, quota_id = details.project.quota_id, "Quota not visible yet");
            return Ok(None);
        };

        Ok(Some(flatten_project(&details, &bound, &quota)))
    }

    async fn probe(
        &self,
        identity: &Identity,
        predicate: &WaitPredicate,
    ) -> Result<bool, ClientError> {
        let project_id = numeric_identity(identity)?;
        let details = self.client.project_servers(project_id).await?;
        Ok(match predicate {
            WaitPredicate::SlotReleased { .. } => {
                details.is_none_or(|d| !d.project.is_backup_enabled)
            }
            WaitPredicate::ChildrenRemoved => details.is_none_or(|d| d.data.is_empty()),
        })
    }

    async fn delete_children(&self, identity: &Identity) -> Result<usize, ClientError> {
        let project_id = numeric_identity(identity)?;
        let Some(details) = self.client.project_servers(project_id).await? else {
            return Ok(0);
        };

        let server_ids: Vec<i32> = details.data.iter().map(|s| s.id).collect();
        if server_ids.is_empty() {
            return Ok(0);
        }
        info!(project_id, count = server_ids.len(), "Deleting project servers");
        self.client.delete_servers(project_id, &server_ids).await?;
        Ok(server_ids.len())
    }

    async fn delete_base(&self, identity: &Identity) -> Result<(), ClientError> {
        let project_id = numeric_identity(identity)?;
        self.client.delete_project(project_id).await
    }
}
