//! Remote records to attribute maps
//!
//! Pure functions. Identifiers become strings, and sentinel values the
//! backend uses for "nothing set" are left out so that absent and unset
//! stay equivalent.

use crate::api::{
    AwsCloudCredentialDto, BackupCredentialDto, BillingRuleDto, BoundFlavorDto,
    KubernetesProfileDto, NodeLabel, OrganizationDto, ProjectServersDto, QuotaDto, ServerDto,
    ServerRole,
};
use crate::units::rfc3339_to_date;
use converge_cloud::{AttrValue, AttributeMap, Record};

pub fn flatten_organization(org: &OrganizationDto) -> AttributeMap {
    let mut state = AttributeMap::new()
        .with("name", org.name.as_str())
        .with("full_name", org.full_name.as_str())
        .with("address", org.address.as_str())
        .with("billing_email", org.billing_email.as_str())
        .with("city", org.city.as_str())
        .with("country", org.country.as_str())
        .with("created_at", org.created_at.as_str())
        .with("discount_rate", org.discount_rate)
        .with("email", org.email.as_str())
        .with(
            "managers_can_change_subscription",
            org.is_eligible_update_subscription,
        )
        .with("lock", org.is_locked)
        .with("is_read_only", org.is_read_only)
        .with("partner_name", org.partner_name.as_str())
        .with("phone", org.phone.as_str())
        .with("vat_number", org.vat_number.as_str());
    state.insert_opt("partner_id", optional_id(org.partner_id));
    state
}

pub fn flatten_project(
    details: &ProjectServersDto,
    bound_flavors: &[BoundFlavorDto],
    quota: &QuotaDto,
) -> AttributeMap {
    let project = &details.project;
    let mut state = AttributeMap::new()
        .with("name", project.project_name.as_str())
        .with("cloud_credential_id", id_string(project.cloud_id))
        .with("alerting_profile_name", project.alerting_profile_name.as_str())
        .with("auto_upgrade", project.is_auto_upgrade)
        .with("monitoring", project.is_monitoring_enabled)
        .with("lock", project.is_locked)
        .with("quota_id", id_string(project.quota_id))
        .with(
            "flavors",
            AttrValue::set(bound_flavors.iter().map(|f| f.name.as_str())),
        );

    state.insert_opt("access_profile_id", optional_id(project.access_profile_id));
    state.insert_opt(
        "kubernetes_profile_id",
        optional_id(project.kubernetes_profile_id),
    );
    state.insert_opt("organization_id", optional_id(project.organization_id));
    state.insert_opt(
        "expiration_date",
        rfc3339_to_date(project.expired_at.as_deref()),
    );
    state.insert_opt("alerting_profile_id", optional_id(project.alerting_profile_id));
    if project.is_backup_enabled {
        state.insert("backup_credential_id", id_string(project.s3_credential_id));
    }
    if !quota.is_cpu_unlimited {
        state.insert("quota_cpu_units", quota.cpu);
    }
    if !quota.is_disk_size_unlimited {
        state.insert("quota_disk_size", quota.disk_size);
    }
    if !quota.is_ram_unlimited {
        state.insert("quota_ram_size", quota.ram);
    }

    for (attribute, role) in [
        ("server_bastion", ServerRole::Bastion),
        ("server_kubemaster", ServerRole::Kubemaster),
        ("server_kubeworker", ServerRole::Kubeworker),
    ] {
        let records: Vec<Record> = details
            .data
            .iter()
            .filter(|s| s.role == role.label())
            .map(|s| server_record(s, role))
            .collect();
        state.insert(attribute, records);
    }

    state
}

fn server_record(server: &ServerDto, role: ServerRole) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), AttrValue::Str(id_string(server.id)));
    record.insert("name".into(), AttrValue::str(&server.name));
    record.insert("disk_size".into(), AttrValue::Int(server.disk_size));
    record.insert("flavor".into(), AttrValue::str(&server.flavor));
    record.insert("ip".into(), AttrValue::str(&server.ip_address));
    record.insert("status".into(), AttrValue::str(&server.status));
    record.insert(
        "kubernetes_health".into(),
        AttrValue::str(&server.kubernetes_health),
    );
    record.insert("created_by".into(), AttrValue::str(&server.created_by));
    record.insert("last_modified".into(), AttrValue::str(&server.last_modified));
    record.insert(
        "last_modified_by".into(),
        AttrValue::str(&server.last_modified_by),
    );
    if role != ServerRole::Bastion && !server.kubernetes_node_labels.is_empty() {
        record.insert(
            "kubernetes_node_label".into(),
            AttrValue::List(
                server
                    .kubernetes_node_labels
                    .iter()
                    .map(label_record)
                    .collect(),
            ),
        );
    }
    record
}

fn label_record(label: &NodeLabel) -> Record {
    let mut record = Record::new();
    record.insert("key".into(), AttrValue::str(&label.key));
    record.insert("value".into(), AttrValue::str(&label.value));
    record
}

/// Secrets are never part of the observed state
pub fn flatten_backup_credential(credential: &BackupCredentialDto) -> AttributeMap {
    let mut state = AttributeMap::new()
        .with("name", credential.s3_name.as_str())
        .with("s3_access_key_id", credential.s3_access_key_id.as_str())
        .with("s3_endpoint", credential.s3_endpoint.as_str())
        .with("s3_region", credential.s3_region.as_str())
        .with("organization_name", credential.organization_name.as_str())
        .with("lock", credential.is_locked)
        .with("is_default", credential.is_default);
    state.insert_opt("organization_id", optional_id(credential.organization_id));
    state
}

/// Organization lookup: the resource view plus usage counters
pub fn flatten_organization_details(org: &OrganizationDto) -> AttributeMap {
    flatten_organization(org)
        .with("id", id_string(org.id))
        .with("cloud_credentials", i64::from(org.cloud_credentials))
        .with("users", i64::from(org.users))
}

pub fn flatten_kubernetes_profile(profile: &KubernetesProfileDto) -> AttributeMap {
    let mut state = AttributeMap::new()
        .with("id", id_string(profile.id))
        .with("name", profile.name.as_str())
        .with("cni", profile.cni.as_str())
        .with("bastion_proxy_enabled", profile.expose_node_port_on_bastion)
        .with("load_balancing_solution", profile.load_balancing_solution())
        .with("is_locked", profile.is_locked)
        .with("organization_name", profile.organization_name.as_str())
        .with("created_by", profile.created_by.as_str())
        .with("last_modified", profile.last_modified.as_str())
        .with("last_modified_by", profile.last_modified_by.as_str());
    state.insert_opt("organization_id", optional_id(profile.organization_id));
    state
}

pub fn flatten_billing_rule(rule: &BillingRuleDto) -> AttributeMap {
    let labels: Vec<Record> = rule
        .labels
        .iter()
        .map(|label| {
            let mut record = Record::new();
            record.insert("key".into(), AttrValue::str(&label.label));
            record.insert("value".into(), AttrValue::str(&label.value));
            record.insert("id".into(), AttrValue::Str(id_string(label.id)));
            record
        })
        .collect();

    let mut state = AttributeMap::new()
        .with("id", id_string(rule.id))
        .with("name", rule.name.as_str())
        .with("metric_name", rule.metric_name.as_str())
        .with("type", rule.rule_type.as_str())
        .with("price", rule.price)
        .with("label", labels)
        .with("created_by", rule.created_by.as_str())
        .with("last_modified", rule.last_modified.as_str())
        .with("last_modified_by", rule.last_modified_by.as_str());
    state.insert_opt(
        "billing_credential_id",
        optional_id(rule.operation_credential.operation_credential_id),
    );
    state
}

/// Access keys are never part of the observed state
pub fn flatten_aws_cloud_credential(credential: &AwsCloudCredentialDto) -> AttributeMap {
    let mut state = AttributeMap::new()
        .with("id", id_string(credential.id))
        .with("name", credential.name.as_str())
        .with("region", credential.region.as_str())
        .with("availability_zone", credential.availability_zone.as_str())
        .with("organization_name", credential.organization_name.as_str())
        .with("is_default", credential.is_default)
        .with("lock", credential.is_locked)
        .with("created_by", credential.created_by.as_str())
        .with("last_modified", credential.last_modified.as_str())
        .with("last_modified_by", credential.last_modified_by.as_str());
    state.insert_opt("organization_id", optional_id(credential.organization_id));
    state
}

fn id_string(id: i32) -> String {
    id.to_string()
}

/// `None` for the 0 sentinel
fn optional_id(id: i32) -> Option<String> {
    (id != 0).then(|| id_string(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProjectDetailsDto;

    fn details() -> ProjectServersDto {
        ProjectServersDto {
            project: ProjectDetailsDto {
                project_id: 1001,
                project_name: "proj1".into(),
                cloud_id: 42,
                quota_id: 7,
                expired_at: Some("2030-01-31T00:00:00Z".into()),
                ..Default::default()
            },
            data: vec![ServerDto {
                id: 5,
                name: "bastion".into(),
                role: "Bastion".into(),
                disk_size: 30,
                flavor: "m1.small".into(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_project_sentinels_are_omitted() {
        let state = flatten_project(&details(), &[], &QuotaDto::unlimited());

        assert_eq!(state.get_str("name"), Some("proj1"));
        assert_eq!(state.get_str("cloud_credential_id"), Some("42"));
        assert_eq!(state.get_str("expiration_date"), Some("31/01/2030"));
        assert!(state.get("alerting_profile_id").is_none());
        assert!(state.get("access_profile_id").is_none());
        assert!(state.get("kubernetes_profile_id").is_none());
        assert!(state.get("organization_id").is_none());
        assert!(state.get("backup_credential_id").is_none());
        assert!(state.get("quota_cpu_units").is_none());
        assert!(state.get("quota_ram_size").is_none());
    }

    #[test]
    fn test_project_quota_and_flavors() {
        let mut details = details();
        details.project.is_backup_enabled = true;
        details.project.s3_credential_id = 3;
        let quota = QuotaDto {
            cpu: 16,
            is_cpu_unlimited: false,
            ram: 64,
            ..QuotaDto::unlimited()
        };
        let flavors = vec![
            BoundFlavorDto {
                id: 1,
                name: "m1.small".into(),
            },
            BoundFlavorDto {
                id: 2,
                name: "m1.large".into(),
            },
        ];

        let state = flatten_project(&details, &flavors, &quota);

        assert_eq!(state.get_int("quota_cpu_units"), Some(16));
        assert!(state.get("quota_ram_size").is_none());
        assert_eq!(state.get_str("backup_credential_id"), Some("3"));
        assert_eq!(state.get_set("flavors").len(), 2);
    }

    #[test]
    fn test_servers_split_by_role() {
        let state = flatten_project(&details(), &[], &QuotaDto::unlimited());
        let bastions = state.get_records("server_bastion");
        assert_eq!(bastions.len(), 1);
        assert_eq!(bastions[0].get("id"), Some(&AttrValue::str("5")));
        assert_eq!(bastions[0].get("disk_size"), Some(&AttrValue::Int(30)));
        assert!(state.get_records("server_kubeworker").is_empty());
    }

    #[test]
    fn test_backup_credential_has_no_secret() {
        let state = flatten_backup_credential(&BackupCredentialDto {
            id: 9,
            s3_name: "backups".into(),
            ..Default::default()
        });
        assert!(state.get("s3_secret_access_key").is_none());
        assert!(state.get("organization_id").is_none());
        assert_eq!(state.get_str("name"), Some("backups"));
    }

    #[test]
    fn test_kubernetes_profile_load_balancer() {
        let profile = KubernetesProfileDto {
            id: 4,
            name: "default".into(),
            organization_id: 0,
            taikun_lb_enabled: true,
            ..Default::default()
        };
        let state = flatten_kubernetes_profile(&profile);
        assert_eq!(state.get_str("id"), Some("4"));
        assert_eq!(state.get_str("load_balancing_solution"), Some("Taikun"));
        assert!(state.get("organization_id").is_none());
    }

    #[test]
    fn test_billing_rule_labels() {
        let rule = BillingRuleDto {
            id: 2,
            name: "cpu".into(),
            price: 1.5,
            labels: vec![crate::api::BillingLabelDto {
                id: 8,
                label: "env".into(),
                value: "prod".into(),
            }],
            operation_credential: crate::api::OperationCredentialRef {
                operation_credential_id: 3,
            },
            ..Default::default()
        };
        let state = flatten_billing_rule(&rule);
        let labels = state.get_records("label");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].get("key"), Some(&AttrValue::str("env")));
        assert_eq!(state.get_str("billing_credential_id"), Some("3"));
        assert_eq!(state.get_float("price"), Some(1.5));
    }
}
