//! Read-only lookups: organizations, Kubernetes profiles, billing rules and
//! AWS cloud credentials.
//!
//! Each lookup pages through its list call and flattens every entry.

use crate::api::ControlPlane;
use crate::flatten::{
    flatten_aws_cloud_credential, flatten_billing_rule, flatten_kubernetes_profile,
    flatten_organization_details,
};
use converge_cloud::{AttributeMap, ClientError, collect_pages};
use tracing::debug;

/// One organization by id, or the caller's own organization when `id` is
/// `None`
pub async fn organization_details(
    client: &dyn ControlPlane,
    id: Option<i32>,
) -> Result<AttributeMap, ClientError> {
    let page = client.organizations(id, 0).await?;
    let org = page.items.into_iter().next().ok_or_else(|| {
        ClientError::NotFound(match id {
            Some(id) => format!("organization with ID {} not found", id),
            None => "no organization visible to the caller".to_string(),
        })
    })?;
    Ok(flatten_organization_details(&org))
}

pub async fn list_organizations(
    client: &dyn ControlPlane,
) -> Result<Vec<AttributeMap>, ClientError> {
    let dtos = collect_pages(|offset| client.organizations(None, offset)).await?;
    debug!(count = dtos.len(), "Fetched organizations");
    Ok(dtos.iter().map(flatten_organization_details).collect())
}

pub async fn list_kubernetes_profiles(
    client: &dyn ControlPlane,
    organization_id: Option<i32>,
) -> Result<Vec<AttributeMap>, ClientError> {
    let dtos = collect_pages(|offset| client.kubernetes_profiles(organization_id, offset)).await?;
    debug!(?organization_id, count = dtos.len(), "Fetched Kubernetes profiles");
    Ok(dtos.iter().map(flatten_kubernetes_profile).collect())
}

pub async fn list_billing_rules(
    client: &dyn ControlPlane,
) -> Result<Vec<AttributeMap>, ClientError> {
    let dtos = collect_pages(|offset| client.billing_rules(offset)).await?;
    debug!(count = dtos.len(), "Fetched billing rules");
    Ok(dtos.iter().map(flatten_billing_rule).collect())
}

pub async fn list_aws_cloud_credentials(
    client: &dyn ControlPlane,
    organization_id: Option<i32>,
) -> Result<Vec<AttributeMap>, ClientError> {
    let dtos =
        collect_pages(|offset| client.aws_cloud_credentials(organization_id, offset)).await?;
    debug!(?organization_id, count = dtos.len(), "Fetched AWS cloud credentials");
    Ok(dtos.iter().map(flatten_aws_cloud_credential).collect())
}
