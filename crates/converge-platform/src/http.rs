//! REST implementation of [`ControlPlane`]
//!
//! Every request carries the bearer token and the API version as the `v`
//! query parameter. Status codes are classified once, in [`classify`], so
//! the poller and reconciler only ever see [`ClientError`].

use crate::api::*;
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use converge_cloud::{ClientError, Page};
use converge_config::{ClientSettings, ENV_API_TOKEN};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const USER_AGENT: &str = concat!("converge/", env!("CARGO_PKG_VERSION"));

/// Control plane reached over HTTPS
pub struct HttpControlPlane {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    api_version: String,
}

impl HttpControlPlane {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let api_token = settings
            .api_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(PlatformError::MissingToken(ENV_API_TOKEN))?;

        let endpoint = settings.endpoint.trim_end_matches('/').to_string();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(PlatformError::InvalidEndpoint {
                endpoint,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        tracing::debug!(endpoint = %endpoint, api_version = %settings.api_version, "Control plane client ready");

        Ok(Self {
            client,
            endpoint,
            api_token,
            api_version: settings.api_version.clone(),
        })
    }

    /// `path` may already carry a query string
    fn url(&self, path: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}/api/v1/{}{}v={}",
            self.endpoint, path, separator, self.api_version
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_token)
            .header("User-Agent", USER_AGENT)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "Control plane call failed");
        Err(classify(status, body))
    }

    async fn call(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send(request).await.map(|_| ())
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Identity from a create response
    async fn create(&self, request: RequestBuilder) -> ClientResult<String> {
        let created: CreatedResponse = self.fetch(request).await?;
        created.id()
    }

    /// First element of a list filtered by id; `None` for an empty list or 404
    async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> ClientResult<Option<T>> {
        match self
            .fetch::<ListEnvelope<T>>(self.request(Method::GET, path))
            .await
        {
            Ok(list) => Ok(list.data.into_iter().next()),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_page<T: DeserializeOwned>(&self, path: &str) -> ClientResult<Page<T>> {
        let list: ListEnvelope<T> = self.fetch(self.request(Method::GET, path)).await?;
        Ok(Page::new(list.data, list.total_count))
    }
}

/// Map a non-success status onto the client error model
pub fn classify(status: StatusCode, body: String) -> ClientError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body
    };

    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(message)
    } else if status.is_server_error() {
        ClientError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        ClientError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    if error.is_decode() {
        ClientError::Decode(error.to_string())
    } else {
        ClientError::Transport(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    total_count: usize,
}

/// Create calls answer with the new id as a string or a number
#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: serde_json::Value,
}

impl CreatedResponse {
    fn id(&self) -> ClientResult<String> {
        match &self.id {
            serde_json::Value::String(id) => Ok(id.clone()),
            serde_json::Value::Number(id) => Ok(id.to_string()),
            other => Err(ClientError::Decode(format!("unexpected id {}", other))),
        }
    }
}

/// Cloud credential listing groups credentials per cloud
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardEnvelope {
    #[serde(default)]
    amazon: Vec<AwsCloudCredentialDto>,
    #[serde(default)]
    total_count_aws: usize,
}

/// Append `key=value` when a filter is given
fn with_filter(path: String, key: &str, value: Option<i32>) -> String {
    match value {
        Some(value) => format!("{}&{}={}", path, key, value),
        None => path,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudCredentialDto {
    cloud_type: String,
}

fn parse_cloud_type(raw: &str) -> ClientResult<CloudType> {
    match raw.to_ascii_lowercase().as_str() {
        "aws" => Ok(CloudType::Aws),
        "azure" => Ok(CloudType::Azure),
        "openstack" => Ok(CloudType::OpenStack),
        "gcp" | "google" => Ok(CloudType::Gcp),
        other => Err(ClientError::Decode(format!("unknown cloud type {:?}", other))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockBody {
    id: i32,
    mode: &'static str,
}

fn lock_mode(lock: bool) -> &'static str {
    if lock { "lock" } else { "unlock" }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_organization(&self, body: &OrganizationBody) -> ClientResult<String> {
        self.create(self.request(Method::POST, "Organizations/create").json(body))
            .await
    }

    async fn organization(&self, id: i32) -> ClientResult<Option<OrganizationDto>> {
        self.fetch_one(&format!("Organizations?id={}", id)).await
    }

    async fn update_organization(&self, body: &OrganizationBody) -> ClientResult<()> {
        self.call(self.request(Method::PUT, "Organizations/update").json(body))
            .await
    }

    async fn delete_organization(&self, id: i32) -> ClientResult<()> {
        self.call(self.request(Method::DELETE, &format!("Organizations/{}", id)))
            .await
    }

    async fn organizations(
        &self,
        id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<OrganizationDto>> {
        self.fetch_page(&with_filter(
            format!("Organizations?offset={}", offset),
            "id",
            id,
        ))
        .await
    }

    async fn create_project(&self, body: &CreateProjectBody) -> ClientResult<String> {
        self.create(self.request(Method::POST, "Projects/create").json(body))
            .await
    }

    async fn project_servers(&self, project_id: i32) -> ClientResult<Option<ProjectServersDto>> {
        match self
            .fetch(self.request(Method::GET, &format!("Servers/{}", project_id)))
            .await
        {
            Ok(details) => Ok(Some(details)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn lock_project(&self, project_id: i32, lock: bool) -> ClientResult<()> {
        let body = LockBody {
            id: project_id,
            mode: lock_mode(lock),
        };
        self.call(self.request(Method::POST, "Projects/lockmanager").json(&body))
            .await
    }

    async fn toggle_monitoring(&self, project_id: i32) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Projects/monitoring")
                .json(&json!({ "projectId": project_id })),
        )
        .await
    }

    async fn extend_lifetime(
        &self,
        project_id: i32,
        expire_at: Option<String>,
    ) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Projects/extend/lifetime")
                .json(&json!({ "projectId": project_id, "expireAt": expire_at })),
        )
        .await
    }

    async fn delete_project(&self, project_id: i32) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Projects/delete")
                .json(&json!({ "projectId": project_id })),
        )
        .await
    }

    async fn project_quota(&self, quota_id: i32) -> ClientResult<Option<QuotaDto>> {
        self.fetch_one(&format!("ProjectQuotas?id={}", quota_id))
            .await
    }

    async fn edit_quota(&self, quota_id: i32, quota: &QuotaDto) -> ClientResult<()> {
        self.call(
            self.request(Method::PUT, &format!("ProjectQuotas/edit/{}", quota_id))
                .json(quota),
        )
        .await
    }

    async fn bound_flavors(
        &self,
        project_id: i32,
        offset: usize,
    ) -> ClientResult<Page<BoundFlavorDto>> {
        self.fetch_page(&format!(
            "ProjectFlavors?projectId={}&offset={}",
            project_id, offset
        ))
        .await
    }

    async fn bind_flavors(&self, project_id: i32, flavors: &[String]) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Flavors/bind")
                .json(&json!({ "projectId": project_id, "flavors": flavors })),
        )
        .await
    }

    async fn unbind_flavors(&self, binding_ids: &[i32]) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Flavors/unbind")
                .json(&json!({ "ids": binding_ids })),
        )
        .await
    }

    async fn create_server(&self, body: &CreateServerBody) -> ClientResult<String> {
        self.create(self.request(Method::POST, "Servers/create").json(body))
            .await
    }

    async fn delete_servers(&self, project_id: i32, server_ids: &[i32]) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Servers/delete")
                .json(&json!({ "projectId": project_id, "serverIds": server_ids })),
        )
        .await
    }

    async fn attach_alerting_profile(
        &self,
        project_id: i32,
        profile_id: i32,
    ) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "AlertingProfiles/attach")
                .json(&json!({ "projectId": project_id, "alertingProfileId": profile_id })),
        )
        .await
    }

    async fn detach_alerting_profile(&self, project_id: i32) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "AlertingProfiles/detach")
                .json(&json!({ "projectId": project_id })),
        )
        .await
    }

    async fn enable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Backup/enable")
                .json(&json!({ "projectId": project_id, "s3CredentialId": credential_id })),
        )
        .await
    }

    async fn disable_backup(&self, project_id: i32, credential_id: i32) -> ClientResult<()> {
        self.call(
            self.request(Method::POST, "Backup/disable")
                .json(&json!({ "projectId": project_id, "s3CredentialId": credential_id })),
        )
        .await
    }

    async fn create_backup_credential(
        &self,
        body: &BackupCredentialBody,
    ) -> ClientResult<String> {
        self.create(self.request(Method::POST, "S3Credentials").json(body))
            .await
    }

    async fn backup_credential(&self, id: i32) -> ClientResult<Option<BackupCredentialDto>> {
        self.fetch_one(&format!("S3Credentials?id={}", id)).await
    }

    async fn update_backup_credential(&self, body: &BackupCredentialBody) -> ClientResult<()> {
        self.call(self.request(Method::PUT, "S3Credentials").json(body))
            .await
    }

    async fn lock_backup_credential(&self, id: i32, lock: bool) -> ClientResult<()> {
        let body = LockBody {
            id,
            mode: lock_mode(lock),
        };
        self.call(self.request(Method::POST, "S3Credentials/lockmanager").json(&body))
            .await
    }

    async fn delete_backup_credential(&self, id: i32) -> ClientResult<()> {
        self.call(self.request(Method::DELETE, &format!("S3Credentials/{}", id)))
            .await
    }

    async fn cloud_type(&self, cloud_credential_id: i32) -> ClientResult<CloudType> {
        let credential: CloudCredentialDto = self
            .fetch_one(&format!("CloudCredentials?id={}", cloud_credential_id))
            .await?
            .ok_or_else(|| {
                ClientError::NotFound(format!("cloud credential {}", cloud_credential_id))
            })?;
        parse_cloud_type(&credential.cloud_type)
    }

    async fn cloud_flavors(
        &self,
        cloud_credential_id: i32,
        query: &FlavorQuery,
        offset: usize,
    ) -> ClientResult<Page<FlavorDto>> {
        self.fetch_page(&format!(
            "CloudCredentials/flavors/{}?startCpu={}&endCpu={}&startRam={}&endRam={}&sortBy={}&sortDirection={}&offset={}",
            cloud_credential_id,
            query.start_cpu,
            query.end_cpu,
            query.start_ram,
            query.end_ram,
            query.sort_by,
            query.sort_direction,
            offset
        ))
        .await
    }

    async fn aws_cloud_credentials(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<AwsCloudCredentialDto>> {
        let path = with_filter(
            format!("CloudCredentials/list?offset={}", offset),
            "organizationId",
            organization_id,
        );
        let list: DashboardEnvelope = self.fetch(self.request(Method::GET, &path)).await?;
        Ok(Page::new(list.amazon, list.total_count_aws))
    }

    async fn kubernetes_profiles(
        &self,
        organization_id: Option<i32>,
        offset: usize,
    ) -> ClientResult<Page<KubernetesProfileDto>> {
        self.fetch_page(&with_filter(
            format!("KubernetesProfiles?offset={}", offset),
            "organizationId",
            organization_id,
        ))
        .await
    }

    async fn billing_rules(&self, offset: usize) -> ClientResult<Page<BillingRuleDto>> {
        self.fetch_page(&format!("Prometheus/billing/rules?offset={}", offset))
            .await
    }
}
