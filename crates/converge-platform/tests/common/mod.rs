use async_trait::async_trait;
use converge_cloud::{ClientError, Page, PollConfig, ReconcileContext};
use converge_platform::api::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Page size of the fake's list endpoints, small enough to force paging
const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct Backend {
    next_id: i32,
    next_quota: i32,
    next_binding: i32,
    next_server: i32,
    organizations: HashMap<i32, OrganizationDto>,
    projects: HashMap<i32, ProjectServersDto>,
    quotas: HashMap<i32, QuotaDto>,
    bindings: HashMap<i32, Vec<BoundFlavorDto>>,
    credentials: HashMap<i32, BackupCredentialDto>,
    cloud_types: HashMap<i32, CloudType>,
    catalogue: Vec<FlavorDto>,
    kubernetes_profiles: Vec<KubernetesProfileDto>,
    billing_rules: Vec<BillingRuleDto>,
    aws_credentials: Vec<AwsCloudCredentialDto>,
    /// Reads that still report freshly written entities as missing
    read_lag: u32,
    /// Project reads that still report a disabled backup as enabled
    backup_release_after: u32,
    releasing: u32,
    calls: Vec<String>,
    failures: Vec<(String, ClientError)>,
}

/// In-memory control plane whose reads lag its writes
pub struct FakeControlPlane {
    backend: Mutex<Backend>,
}

const READS: [&str; 11] = [
    "organization(",
    "organizations(",
    "kubernetes_profiles(",
    "billing_rules(",
    "aws_cloud_credentials(",
    "project_servers(",
    "project_quota(",
    "bound_flavors(",
    "backup_credential(",
    "cloud_type(",
    "cloud_flavors(",
];

#[allow(dead_code)]
impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend {
                next_id: 1000,
                next_quota: 6,
                next_binding: 100,
                next_server: 500,
                ..Default::default()
            }),
        }
    }

    /// The next `reads` entity reads report nothing
    pub fn with_read_lag(self, reads: u32) -> Self {
        self.backend.lock().unwrap().read_lag = reads;
        self
    }

    /// A disabled backup keeps reporting itself enabled for `reads` reads
    pub fn with_backup_release_after(self, reads: u32) -> Self {
        self.backend.lock().unwrap().backup_release_after = reads;
        self
    }

    /// Fail every call whose log entry starts with `prefix`
    pub fn fail_on(self, prefix: &str, error: ClientError) -> Self {
        self.backend
            .lock()
            .unwrap()
            .failures
            .push((prefix.to_string(), error));
        self
    }

    pub fn with_cloud(self, id: i32, cloud: CloudType, catalogue: Vec<FlavorDto>) -> Self {
        {
            let mut backend = self.backend.lock().unwrap();
            backend.cloud_types.insert(id, cloud);
            backend.catalogue = catalogue;
        }
        self
    }

    pub fn with_kubernetes_profiles(self, profiles: Vec<KubernetesProfileDto>) -> Self {
        self.backend.lock().unwrap().kubernetes_profiles = profiles;
        self
    }

    pub fn with_billing_rules(self, rules: Vec<BillingRuleDto>) -> Self {
        self.backend.lock().unwrap().billing_rules = rules;
        self
    }

    pub fn with_aws_credentials(self, credentials: Vec<AwsCloudCredentialDto>) -> Self {
        self.backend.lock().unwrap().aws_credentials = credentials;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.backend.lock().unwrap().calls.clone()
    }

    /// Calls that change remote state
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|r| c.starts_with(r)))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn project(&self, id: i32) -> Option<ProjectServersDto> {
        self.backend.lock().unwrap().projects.get(&id).cloned()
    }

    pub fn quota_of(&self, project_id: i32) -> Option<QuotaDto> {
        let backend = self.backend.lock().unwrap();
        let quota_id = backend.projects.get(&project_id)?.project.quota_id;
        backend.quotas.get(&quota_id).cloned()
    }

    pub fn bound(&self, project_id: i32) -> Vec<String> {
        let mut names: Vec<String> = self
            .backend
            .lock()
            .unwrap()
            .bindings
            .get(&project_id)
            .map(|b| b.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn organization_locked(&self, id: i32) -> Option<bool> {
        self.backend
            .lock()
            .unwrap()
            .organizations
            .get(&id)
            .map(|o| o.is_locked)
    }

    fn call<T>(
        &self,
        entry: String,
        f: impl FnOnce(&mut Backend) -> ClientResult<T>,
    ) -> ClientResult<T> {
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(entry.clone());
        if let Some((_, error)) = backend
            .failures
            .iter()
            .find(|(prefix, _)| entry.starts_with(prefix.as_str()))
        {
            return Err(error.clone());
        }
        f(&mut backend)
    }
}

impl Backend {
    fn allocate(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn lagging(&mut self) -> bool {
        if self.read_lag > 0 {
            self.read_lag -= 1;
            return true;
        }
        false
    }

    fn project_mut(&mut self, id: i32) -> ClientResult<&mut ProjectServersDto> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| ClientError::NotFound(format!("project {}", id)))
    }

    fn unlocked_project(&mut self, id: i32) -> ClientResult<&mut ProjectServersDto> {
        let project = self.project_mut(id)?;
        if project.project.is_locked {
            return Err(ClientError::Rejected {
                status: 400,
                message: format!("project {} is locked", id),
            });
        }
        Ok(project)
    }

    fn bind(&mut self, project_id: i32, flavors: &[String]) {
        let mut new = Vec::new();
        for name in flavors {
            self.next_binding += 1;
            new.push(BoundFlavorDto {
                id: self.next_binding,
                name: name.clone(),
            });
        }
        self.bindings.entry(project_id).or_default().extend(new);
    }
}

fn page<T: Clone>(items: &[T], offset: usize) -> Page<T> {
    Page::new(
        items.iter().skip(offset).take(PAGE_SIZE).cloned().collect(),
        items.len(),
    )
}

fn role_label(code: i32) -> &'static str {
    match code {
        100 => ServerRole::Bastion.label(),
        200 => ServerRole::Kubemaster.label(),
        _ => ServerRole::Kubeworker.label(),
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create_organization(&self, body: &OrganizationBody) -> ClientResult<String> {
        self.call(format!("create_organization({})", body.name), |b| {
            let id = b.allocate();
            b.organizations.insert(
                id,
                OrganizationDto {
                    id,
                    name: body.name.clone(),
                    full_name: body.full_name.clone(),
                    discount_rate: body.discount_rate,
                    is_eligible_update_subscription: body.is_eligible_update_subscription,
                    created_at: "2026-10-19T00:00:00Z".to_string(),
                    users: 1,
                    ..Default::default()
                },
            );
            Ok(id.to_string())
        })
    }

    async fn organization(&self, id: i32) -> ClientResult<Option<OrganizationDto>> {
        self.call(format!("organization({})", id), |b| {
            if b.lagging() {
                return Ok(None);
            }
            Ok(b.organizations.get(&id).cloned())
        })
    }

    async fn update_organization(&self, body: &OrganizationBody) -> ClientResult<()> {
        let id = body.id.unwrap_or_default();
        self.call(
            format!("update_organization({}, lock={:?})", id, body.is_locked),
            |b| {
                let org = b
                    .organizations
                    .get_mut(&id)
                    .ok_or_else(|| ClientError::NotFound(format!("organization {}", id)))?;
                org.name = body.name.clone();
                org.full_name = body.full_name.clone();
                org.address = body.address.clone();
                org.city = body.city.clone();
                org.discount_rate = body.discount_rate;
                org.is_eligible_update_subscription = body.is_eligible_update_subscription;
                if let Some(lock) = body.is_locked {
                    org.is_locked = lock;
                }
                Ok(())
            },
        )
    }

    async fn delete_organization(&self, id: i32) -> ClientResult<()> {
        self.call(format!("delete_organization({})", id), |b| {
            b.organizations
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| ClientError::NotFound(format!("organization {}", id)))
        })
    }

    async fn organizations(
        &self,
        id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<OrganizationDto>> {
        self.call(format!("organizations({:?}, {})", id, offset), |b| {
            let mut orgs: Vec<OrganizationDto> = b
                .organizations
                .values()
                .filter(|o| id.is_none_or(|id| o.id == id))
                .cloned()
                .collect();
            orgs.sort_by_key(|o| o.id);
            Ok(page(&orgs, offset))
        })
    }

    async fn create_project(&self, body: &CreateProjectBody) -> ClientResult<String> {
        self.call(format!("create_project({})", body.name), |b| {
            let id = b.allocate();
            b.next_quota += 1;
            let quota_id = b.next_quota;
            b.quotas.insert(quota_id, QuotaDto::unlimited());
            b.projects.insert(
                id,
                ProjectServersDto {
                    project: ProjectDetailsDto {
                        project_id: id,
                        project_name: body.name.clone(),
                        cloud_id: body.cloud_credential_id,
                        access_profile_id: body.access_profile_id.unwrap_or(1),
                        alerting_profile_id: body.alerting_profile_id.unwrap_or(0),
                        kubernetes_profile_id: body.kubernetes_profile_id.unwrap_or(1),
                        organization_id: body.organization_id.unwrap_or(1),
                        quota_id,
                        is_auto_upgrade: body.is_auto_upgrade,
                        is_monitoring_enabled: body.is_monitoring_enabled,
                        is_backup_enabled: body.is_backup_enabled,
                        s3_credential_id: body.s3_credential_id.unwrap_or(0),
                        expired_at: body.expired_at.clone(),
                        ..Default::default()
                    },
                    data: Vec::new(),
                },
            );
            b.bind(id, &body.flavors);
            Ok(id.to_string())
        })
    }

    async fn project_servers(&self, project_id: i32) -> ClientResult<Option<ProjectServersDto>> {
        self.call(format!("project_servers({})", project_id), |b| {
            if b.lagging() {
                return Ok(None);
            }
            let releasing = b.releasing > 0;
            if releasing {
                b.releasing -= 1;
            }
            Ok(b.projects.get(&project_id).cloned().map(|mut details| {
                details.project.is_backup_enabled |= releasing;
                details
            }))
        })
    }

    async fn lock_project(&self, project_id: i32, lock: bool) -> ClientResult<()> {
        self.call(format!("lock_project({}, {})", project_id, lock), |b| {
            b.project_mut(project_id)?.project.is_locked = lock;
            Ok(())
        })
    }

    async fn toggle_monitoring(&self, project_id: i32) -> ClientResult<()> {
        self.call(format!("toggle_monitoring({})", project_id), |b| {
            let project = &mut b.unlocked_project(project_id)?.project;
            project.is_monitoring_enabled = !project.is_monitoring_enabled;
            Ok(())
        })
    }

    async fn extend_lifetime(
        &self,
        project_id: i32,
        expire_at: Option<String>,
    ) -> ClientResult<()> {
        self.call(
            format!("extend_lifetime({}, {:?})", project_id, expire_at),
            |b| {
                b.unlocked_project(project_id)?.project.expired_at = expire_at;
                Ok(())
            },
        )
    }

    async fn delete_project(&self, project_id: i32) -> ClientResult<()> {
        self.call(format!("delete_project({})", project_id), |b| {
            let details = b.unlocked_project(project_id)?;
            if !details.data.is_empty() {
                return Err(ClientError::Rejected {
                    status: 400,
                    message: "project still has servers".to_string(),
                });
            }
            b.projects.remove(&project_id);
            b.bindings.remove(&project_id);
            Ok(())
        })
    }

    async fn project_quota(&self, quota_id: i32) -> ClientResult<Option<QuotaDto>> {
        self.call(format!("project_quota({})", quota_id), |b| {
            Ok(b.quotas.get(&quota_id).cloned())
        })
    }

    async fn edit_quota(&self, quota_id: i32, quota: &QuotaDto) -> ClientResult<()> {
        self.call(format!("edit_quota({})", quota_id), |b| {
            let current = b
                .quotas
                .get_mut(&quota_id)
                .ok_or_else(|| ClientError::NotFound(format!("quota {}", quota_id)))?;
            *current = quota.clone();
            Ok(())
        })
    }

    async fn bound_flavors(
        &self,
        project_id: i32,
        offset: usize,
    ) -> ClientResult<Page<BoundFlavorDto>> {
        self.call(format!("bound_flavors({}, {})", project_id, offset), |b| {
            Ok(page(
                b.bindings.get(&project_id).map(Vec::as_slice).unwrap_or(&[]),
                offset,
            ))
        })
    }

    async fn bind_flavors(&self, project_id: i32, flavors: &[String]) -> ClientResult<()> {
        self.call(format!("bind_flavors({}, {:?})", project_id, flavors), |b| {
            b.unlocked_project(project_id)?;
            b.bind(project_id, flavors);
            Ok(())
        })
    }

    async fn unbind_flavors(&self, binding_ids: &[i32]) -> ClientResult<()> {
        self.call(format!("unbind_flavors({:?})", binding_ids), |b| {
            for bound in b.bindings.values_mut() {
                bound.retain(|f| !binding_ids.contains(&f.id));
            }
            Ok(())
        })
    }

    async fn create_server(&self, body: &CreateServerBody) -> ClientResult<String> {
        self.call(format!("create_server({}, {})", body.name, body.role), |b| {
            b.next_server += 1;
            let id = b.next_server;
            let project = b.unlocked_project(body.project_id)?;
            project.data.push(ServerDto {
                id,
                name: body.name.clone(),
                role: role_label(body.role).to_string(),
                disk_size: body.disk_size,
                flavor: body.flavor.clone(),
                status: "Ready".to_string(),
                kubernetes_node_labels: body.kubernetes_node_labels.clone(),
                ..Default::default()
            });
            Ok(id.to_string())
        })
    }

    async fn delete_servers(&self, project_id: i32, server_ids: &[i32]) -> ClientResult<()> {
        self.call(
            format!("delete_servers({}, {:?})", project_id, server_ids),
            |b| {
                let project = b.unlocked_project(project_id)?;
                project.data.retain(|s| !server_ids.contains(&s.id));
                Ok(())
            },
        )
    }

    async fn attach_alerting_profile(
        &self,
        project_id: i32,
        profile_id: i32,
    ) -> ClientResult<()> {
        self.call(
            format!("attach_alerting_profile({}, {})", project_id, profile_id),
            |b| {
                let project = &mut b.unlocked_project(project_id)?.project;
                project.alerting_profile_id = profile_id;
                project.alerting_profile_name = format!("profile-{}", profile_id);
                Ok(())
            },
        )
    }

    async fn detach_alerting_profile(&self, project_id: i32) -> ClientResult<()> {
        self.call(format!("detach_alerting_profile({})", project_id), |b| {
            let project = &mut b.unlocked_project(project_id)?.project;
            project.alerting_profile_id = 0;
            project.alerting_profile_name.clear();
            Ok(())
        })
    }

    async fn enable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()> {
        self.call(
            format!("enable_backup({}, {})", project_id, credential_id),
            |b| {
                let releasing = b.releasing > 0;
                let project = &mut b.unlocked_project(project_id)?.project;
                if project.is_backup_enabled || releasing {
                    return Err(ClientError::Rejected {
                        status: 400,
                        message: "backup is still enabled".to_string(),
                    });
                }
                project.is_backup_enabled = true;
                project.s3_credential_id = credential_id;
                Ok(())
            },
        )
    }

    async fn disable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()> {
        self.call(
            format!("disable_backup({}, {})", project_id, credential_id),
            |b| {
                let project = &mut b.unlocked_project(project_id)?.project;
                project.is_backup_enabled = false;
                project.s3_credential_id = 0;
                b.releasing = b.backup_release_after;
                Ok(())
            },
        )
    }

    async fn create_backup_credential(
        &self,
        body: &BackupCredentialBody,
    ) -> ClientResult<String> {
        self.call(format!("create_backup_credential({})", body.s3_name), |b| {
            let id = b.allocate();
            let organization_id = body.organization_id.unwrap_or(1);
            b.credentials.insert(
                id,
                BackupCredentialDto {
                    id,
                    s3_name: body.s3_name.clone(),
                    s3_access_key_id: body.s3_access_key_id.clone(),
                    s3_endpoint: body.s3_endpoint.clone().unwrap_or_default(),
                    s3_region: body.s3_region.clone().unwrap_or_default(),
                    organization_id,
                    organization_name: format!("org-{}", organization_id),
                    ..Default::default()
                },
            );
            Ok(id.to_string())
        })
    }

    async fn backup_credential(&self, id: i32) -> ClientResult<Option<BackupCredentialDto>> {
        self.call(format!("backup_credential({})", id), |b| {
            if b.lagging() {
                return Ok(None);
            }
            Ok(b.credentials.get(&id).cloned())
        })
    }

    async fn update_backup_credential(&self, body: &BackupCredentialBody) -> ClientResult<()> {
        let id = body.id.unwrap_or_default();
        self.call(format!("update_backup_credential({})", id), |b| {
            let credential = b
                .credentials
                .get_mut(&id)
                .ok_or_else(|| ClientError::NotFound(format!("credential {}", id)))?;
            credential.s3_name = body.s3_name.clone();
            credential.s3_access_key_id = body.s3_access_key_id.clone();
            Ok(())
        })
    }

    async fn lock_backup_credential(&self, id: i32, lock: bool) -> ClientResult<()> {
        self.call(format!("lock_backup_credential({}, {})", id, lock), |b| {
            let credential = b
                .credentials
                .get_mut(&id)
                .ok_or_else(|| ClientError::NotFound(format!("credential {}", id)))?;
            credential.is_locked = lock;
            Ok(())
        })
    }

    async fn delete_backup_credential(&self, id: i32) -> ClientResult<()> {
        self.call(format!("delete_backup_credential({})", id), |b| {
            b.credentials
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| ClientError::NotFound(format!("credential {}", id)))
        })
    }

    async fn cloud_type(&self, cloud_credential_id: i32) -> ClientResult<CloudType> {
        self.call(format!("cloud_type({})", cloud_credential_id), |b| {
            b.cloud_types.get(&cloud_credential_id).copied().ok_or_else(|| {
                ClientError::NotFound(format!("cloud credential {}", cloud_credential_id))
            })
        })
    }

    async fn cloud_flavors(
        &self,
        cloud_credential_id: i32,
        query: &FlavorQuery,
        offset: usize,
    ) -> ClientResult<Page<FlavorDto>> {
        self.call(
            format!("cloud_flavors({}, {})", cloud_credential_id, offset),
            |b| {
                let mut matching: Vec<FlavorDto> = b
                    .catalogue
                    .iter()
                    .filter(|f| f.cpu >= query.start_cpu && f.cpu <= query.end_cpu)
                    .filter(|f| f.ram >= query.start_ram && f.ram <= query.end_ram)
                    .cloned()
                    .collect();
                if query.sort_by == "name" {
                    matching.sort_by(|a, b| a.name.cmp(&b.name));
                }
                Ok(page(&matching, offset))
            },
        )
    }

    async fn aws_cloud_credentials(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<AwsCloudCredentialDto>> {
        self.call(
            format!("aws_cloud_credentials({:?}, {})", organization_id, offset),
            |b| {
                let owned = owned_by(&b.aws_credentials, organization_id, |c| c.organization_id);
                Ok(page(&owned, offset))
            },
        )
    }

    async fn kubernetes_profiles(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<KubernetesProfileDto>> {
        self.call(
            format!("kubernetes_profiles({:?}, {})", organization_id, offset),
            |b| {
                let owned = owned_by(&b.kubernetes_profiles, organization_id, |p| p.organization_id);
                Ok(page(&owned, offset))
            },
        )
    }

    async fn billing_rules(&self, offset: usize) -> ClientResult<Page<BillingRuleDto>> {
        self.call(format!("billing_rules({})", offset), |b| {
            Ok(page(&b.billing_rules, offset))
        })
    }
}

/// Entries of `items` owned by `organization_id`, or all of them
fn owned_by<T: Clone>(
    items: &[T],
    organization_id: Option<i32>,
    owner: impl Fn(&T) -> i32,
) -> Vec<T> {
    items
        .iter()
        .filter(|item| organization_id.is_none_or(|id| owner(item) == id))
        .cloned()
        .collect()
}

/// Confirmation: 60s budget with a 5s interval; waits: 300s
pub fn context() -> ReconcileContext {
    ReconcileContext::new(
        PollConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(5),
            Duration::from_secs(2),
        ),
        PollConfig::new(
            Duration::from_secs(300),
            Duration::from_secs(5),
            Duration::from_secs(2),
        ),
    )
}
