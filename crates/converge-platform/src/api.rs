//! Control-plane client interface and wire types

use async_trait::async_trait;
use converge_cloud::{ClientError, Page};
use serde::{Deserialize, Serialize};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// Organizations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationDto {
    pub id: i32,
    pub name: String,
    pub full_name: String,
    pub address: String,
    pub billing_email: String,
    pub city: String,
    pub country: String,
    pub created_at: String,
    pub discount_rate: f64,
    pub email: String,
    pub is_eligible_update_subscription: bool,
    pub is_locked: bool,
    pub is_read_only: bool,
    pub partner_id: i32,
    pub partner_name: String,
    pub phone: String,
    pub vat_number: String,
    /// Only reported by the list call
    pub cloud_credentials: i32,
    pub users: i32,
}

/// Body of the organization create and update calls.
///
/// The update call always carries the full body; `id` and `is_locked` are
/// only sent on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub name: String,
    pub full_name: String,
    pub address: String,
    pub billing_email: String,
    pub city: String,
    pub country: String,
    pub discount_rate: f64,
    pub email: String,
    pub is_eligible_update_subscription: bool,
    pub phone: String,
    pub vat_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    pub name: String,
    pub cloud_credential_id: i32,
    pub is_kubernetes: bool,
    pub flavors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting_profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<i32>,
    pub is_backup_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_credential_id: Option<i32>,
    pub is_auto_upgrade: bool,
    pub is_monitoring_enabled: bool,
    /// RFC 3339 timestamp
    pub expired_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taikun_lb_flavor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id_start_range: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id_end_range: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectDetailsDto {
    pub project_id: i32,
    pub project_name: String,
    pub access_profile_id: i32,
    /// 0 when no alerting profile is attached
    pub alerting_profile_id: i32,
    pub alerting_profile_name: String,
    pub cloud_id: i32,
    pub kubernetes_profile_id: i32,
    pub organization_id: i32,
    pub quota_id: i32,
    pub is_auto_upgrade: bool,
    pub is_monitoring_enabled: bool,
    pub is_backup_enabled: bool,
    pub s3_credential_id: i32,
    pub is_locked: bool,
    pub expired_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabel {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerDto {
    pub id: i32,
    pub name: String,
    /// "Bastion", "Kubemaster" or "Kubeworker"
    pub role: String,
    pub disk_size: i64,
    pub flavor: String,
    pub ip_address: String,
    pub status: String,
    pub kubernetes_health: String,
    pub created_by: String,
    pub last_modified: String,
    pub last_modified_by: String,
    pub kubernetes_node_labels: Vec<NodeLabel>,
}

/// Project details together with its servers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectServersDto {
    pub project: ProjectDetailsDto,
    pub data: Vec<ServerDto>,
}

/// Server role as the create call encodes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerRole {
    Bastion,
    Kubemaster,
    Kubeworker,
}

impl ServerRole {
    pub fn code(self) -> i32 {
        match self {
            ServerRole::Bastion => 100,
            ServerRole::Kubemaster => 200,
            ServerRole::Kubeworker => 300,
        }
    }

    /// Name reported by reads
    pub fn label(self) -> &'static str {
        match self {
            ServerRole::Bastion => "Bastion",
            ServerRole::Kubemaster => "Kubemaster",
            ServerRole::Kubeworker => "Kubeworker",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerBody {
    pub project_id: i32,
    pub name: String,
    pub count: i32,
    pub disk_size: i64,
    pub flavor: String,
    pub role: i32,
    pub kubernetes_node_labels: Vec<NodeLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaDto {
    pub cpu: i64,
    pub is_cpu_unlimited: bool,
    pub ram: i64,
    pub is_ram_unlimited: bool,
    pub disk_size: i64,
    pub is_disk_size_unlimited: bool,
}

impl QuotaDto {
    pub fn unlimited() -> Self {
        Self {
            is_cpu_unlimited: true,
            is_ram_unlimited: true,
            is_disk_size_unlimited: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundFlavorDto {
    /// Binding id, used to unbind
    pub id: i32,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Backup credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupCredentialDto {
    pub id: i32,
    pub s3_name: String,
    pub s3_access_key_id: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub organization_id: i32,
    pub organization_name: String,
    pub is_locked: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCredentialBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub s3_name: String,
    pub s3_access_key_id: String,
    pub s3_secret_access_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<i32>,
}

// ---------------------------------------------------------------------------
// Flavor catalogue
// ---------------------------------------------------------------------------

/// Cloud behind a cloud credential; decides the unit of flavor memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudType {
    Aws,
    Azure,
    #[serde(rename = "openstack")]
    OpenStack,
    Gcp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlavorDto {
    pub name: String,
    pub cpu: i32,
    /// Unit depends on the cloud type
    pub ram: f64,
}

/// Catalogue filter, memory bounds already in the cloud's unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlavorQuery {
    pub start_cpu: i32,
    pub end_cpu: i32,
    pub start_ram: f64,
    pub end_ram: f64,
    pub sort_by: &'static str,
    pub sort_direction: &'static str,
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesProfileDto {
    pub id: i32,
    pub name: String,
    pub cni: String,
    pub expose_node_port_on_bastion: bool,
    pub octavia_enabled: bool,
    #[serde(rename = "taikunLBEnabled")]
    pub taikun_lb_enabled: bool,
    pub is_locked: bool,
    pub organization_id: i32,
    pub organization_name: String,
    pub created_by: String,
    pub last_modified: String,
    pub last_modified_by: String,
}

impl KubernetesProfileDto {
    pub fn load_balancing_solution(&self) -> &'static str {
        if self.octavia_enabled {
            "Octavia"
        } else if self.taikun_lb_enabled {
            "Taikun"
        } else {
            "None"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingLabelDto {
    pub id: i32,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationCredentialRef {
    pub operation_credential_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingRuleDto {
    pub id: i32,
    pub name: String,
    pub metric_name: String,
    /// "Count" or "Sum"
    #[serde(rename = "type")]
    pub rule_type: String,
    pub price: f64,
    pub labels: Vec<BillingLabelDto>,
    pub operation_credential: OperationCredentialRef,
    pub created_by: String,
    pub last_modified: String,
    pub last_modified_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsCloudCredentialDto {
    pub id: i32,
    pub name: String,
    pub region: String,
    pub availability_zone: String,
    pub organization_id: i32,
    pub organization_name: String,
    pub is_default: bool,
    pub is_locked: bool,
    pub created_by: String,
    pub last_modified: String,
    pub last_modified_by: String,
}

/// Typed calls against the control plane.
///
/// Every call is a single request/response; retries are the poller's job.
/// Reads of a single entity return `Ok(None)` when the backend does not know
/// it, never `NotFound`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // Organizations
    async fn create_organization(&self, body: &OrganizationBody) -> ClientResult<String>;
    async fn organization(&self, id: i32) -> ClientResult<Option<OrganizationDto>>;
    async fn update_organization(&self, body: &OrganizationBody) -> ClientResult<()>;
    async fn delete_organization(&self, id: i32) -> ClientResult<()>;
    /// Organizations visible to the caller, optionally narrowed to one id
    async fn organizations(
        &self,
        id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<OrganizationDto>>;

    // Projects
    async fn create_project(&self, body: &CreateProjectBody) -> ClientResult<String>;
    async fn project_servers(&self, project_id: i32) -> ClientResult<Option<ProjectServersDto>>;
    async fn lock_project(&self, project_id: i32, lock: bool) -> ClientResult<()>;
    async fn toggle_monitoring(&self, project_id: i32) -> ClientResult<()>;
    async fn extend_lifetime(&self, project_id: i32, expire_at: Option<String>)
    -> ClientResult<()>;
    async fn delete_project(&self, project_id: i32) -> ClientResult<()>;

    // Quotas
    async fn project_quota(&self, quota_id: i32) -> ClientResult<Option<QuotaDto>>;
    async fn edit_quota(&self, quota_id: i32, quota: &QuotaDto) -> ClientResult<()>;

    // Flavor bindings
    async fn bound_flavors(
        &self,
        project_id: i32,
        offset: usize,
    ) -> ClientResult<Page<BoundFlavorDto>>;
    async fn bind_flavors(&self, project_id: i32, flavors: &[String]) -> ClientResult<()>;
    async fn unbind_flavors(&self, binding_ids: &[i32]) -> ClientResult<()>;

    // Servers
    async fn create_server(&self, body: &CreateServerBody) -> ClientResult<String>;
    async fn delete_servers(&self, project_id: i32, server_ids: &[i32]) -> ClientResult<()>;

    // Alerting profiles
    async fn attach_alerting_profile(&self, project_id: i32, profile_id: i32)
    -> ClientResult<()>;
    async fn detach_alerting_profile(&self, project_id: i32) -> ClientResult<()>;

    // Backups
    async fn enable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()>;
    async fn disable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()>;

    // Backup credentials
    async fn create_backup_credential(&self, body: &BackupCredentialBody)
    -> ClientResult<String>;
    async fn backup_credential(&self, id: i32) -> ClientResult<Option<BackupCredentialDto>>;
    async fn update_backup_credential(&self, body: &BackupCredentialBody) -> ClientResult<()>;
    async fn lock_backup_credential(&self, id: i32, lock: bool) -> ClientResult<()>;
    async fn delete_backup_credential(&self, id: i32) -> ClientResult<()>;

    // Cloud credentials
    async fn cloud_type(&self, cloud_credential_id: i32) -> ClientResult<CloudType>;
    async fn cloud_flavors(
        &self,
        cloud_credential_id: i32,
        query: &FlavorQuery,
        offset: usize,
    ) -> ClientResult<Page<FlavorDto>>;
    async fn aws_cloud_credentials(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<AwsCloudCredentialDto>>;

    // Profiles and billing
    async fn kubernetes_profiles(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<KubernetesProfileDto>>;
    async fn billing_rules(&self, offset: usize) -> ClientResult<Page<BillingRuleDto>>;
}
