//! Flavor catalogue of a cloud credential
//!
//! The catalogue reports memory in the unit of the underlying cloud. Filters
//! and results are normalised to GiB here.

use crate::api::{CloudType, ControlPlane, FlavorDto, FlavorQuery};
use crate::units::{
    bytes_to_gibibytes, gibibytes_to_bytes, gibibytes_to_mebibytes, mebibytes_to_gibibytes,
};
use converge_cloud::{ClientError, collect_pages};
use serde::{Deserialize, Serialize};

/// Flavor with memory in GiB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    pub cpu: i32,
    pub ram_gib: f64,
}

/// CPU and memory bounds of a catalogue query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlavorFilter {
    pub min_cpu: i32,
    pub max_cpu: i32,
    pub min_ram_gib: i32,
    pub max_ram_gib: i32,
}

impl Default for FlavorFilter {
    fn default() -> Self {
        Self {
            min_cpu: 2,
            max_cpu: 36,
            min_ram_gib: 2,
            max_ram_gib: 500,
        }
    }
}

impl FlavorFilter {
    pub fn validate(&self) -> Result<(), ClientError> {
        let invalid = |field: &str, reason: &str| ClientError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        if !(2..=36).contains(&self.min_cpu) || !(2..=36).contains(&self.max_cpu) {
            return Err(invalid("cpu", "must be between 2 and 36"));
        }
        if !(2..=500).contains(&self.min_ram_gib) || !(2..=500).contains(&self.max_ram_gib) {
            return Err(invalid("ram", "must be between 2 and 500"));
        }
        if self.min_cpu > self.max_cpu || self.min_ram_gib > self.max_ram_gib {
            return Err(invalid("range", "minimum exceeds maximum"));
        }
        Ok(())
    }

    /// Wire query in the memory unit of `cloud`
    pub fn to_query(&self, cloud: CloudType) -> FlavorQuery {
        let convert = |gib: i32| match cloud {
            CloudType::Gcp => gibibytes_to_bytes(gib as f64),
            _ => gibibytes_to_mebibytes(gib as f64),
        };
        FlavorQuery {
            start_cpu: self.min_cpu,
            end_cpu: self.max_cpu,
            start_ram: convert(self.min_ram_gib),
            end_ram: convert(self.max_ram_gib),
            sort_by: "name",
            sort_direction: "asc",
        }
    }
}

/// Normalise one catalogue entry to GiB
pub fn flatten_flavor(cloud: CloudType, dto: &FlavorDto) -> Flavor {
    let ram_gib = match cloud {
        CloudType::Aws | CloudType::OpenStack => mebibytes_to_gibibytes(dto.ram),
        CloudType::Azure => dto.ram,
        CloudType::Gcp => bytes_to_gibibytes(dto.ram),
    };
    Flavor {
        name: dto.name.clone(),
        cpu: dto.cpu,
        ram_gib,
    }
}

/// All flavors of a cloud credential matching `filter`
pub async fn list_flavors(
    client: &dyn ControlPlane,
    cloud_credential_id: i32,
    filter: &FlavorFilter,
) -> Result<Vec<Flavor>, ClientError> {
    filter.validate()?;
    let cloud = client.cloud_type(cloud_credential_id).await?;
    let query = filter.to_query(cloud);

    let dtos = collect_pages(|offset| client.cloud_flavors(cloud_credential_id, &query, offset))
        .await?;

    tracing::debug!(
        cloud_credential_id,
        count = dtos.len(),
        "Fetched flavor catalogue"
    );
    Ok(dtos.iter().map(|dto| flatten_flavor(cloud, dto)).collect())
}
