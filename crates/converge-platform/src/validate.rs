//! Value checks and request field helpers shared by the resource kinds

use crate::units::parse_date;
use converge_cloud::{AttrValue, AttributeMap, ClientError, Identity};

/// 3 to 30 characters from `allowed`
fn check_name(value: &AttrValue, allowed: fn(char) -> bool, hint: &str) -> Result<(), String> {
    let name = value.as_str().unwrap_or_default();
    if !(3..=30).contains(&name.chars().count()) {
        return Err("length must be between 3 and 30".to_string());
    }
    if !name.chars().all(allowed) {
        return Err(format!("expected only alphanumeric characters or {}", hint));
    }
    Ok(())
}

pub fn project_name(value: &AttrValue) -> Result<(), String> {
    check_name(value, |c| c.is_ascii_alphanumeric() || c == '-', "(-)")
}

pub fn organization_name(value: &AttrValue) -> Result<(), String> {
    check_name(
        value,
        |c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'),
        "(_-.)",
    )
}

pub fn not_empty(value: &AttrValue) -> Result<(), String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err("must not be empty".to_string()),
    }
}

/// Identifier attributes are strings holding an integer; `""` is unset
pub fn int_string(value: &AttrValue) -> Result<(), String> {
    let raw = value.as_str().unwrap_or_default();
    if raw.is_empty() {
        return Ok(());
    }
    raw.parse::<i32>()
        .map(|_| ())
        .map_err(|_| format!("expected an integer id, got {:?}", raw))
}

pub fn date(value: &AttrValue) -> Result<(), String> {
    parse_date(value.as_str().unwrap_or_default()).map(|_| ())
}

pub fn router_id(value: &AttrValue) -> Result<(), String> {
    match value.as_int() {
        Some(id) if (1..=255).contains(&id) => Ok(()),
        _ => Err("must be between 1 and 255".to_string()),
    }
}

pub fn percentage(value: &AttrValue) -> Result<(), String> {
    match value.as_float() {
        Some(rate) if (0.0..=100.0).contains(&rate) => Ok(()),
        _ => Err("must be between 0 and 100".to_string()),
    }
}

pub fn at_most_one(value: &AttrValue) -> Result<(), String> {
    match value.as_list() {
        Some(records) if records.len() > 1 => {
            Err(format!("at most one allowed, got {}", records.len()))
        }
        _ => Ok(()),
    }
}

/// Control-plane quorum needs an odd number of masters
pub fn odd_count(value: &AttrValue) -> Result<(), String> {
    match value.as_list() {
        Some(records) if !records.is_empty() && records.len() % 2 != 1 => Err(format!(
            "there must be an odd number of kubemasters (currently {})",
            records.len()
        )),
        _ => Ok(()),
    }
}

/// Numeric form of a resource identity
pub fn numeric_identity(identity: &Identity) -> Result<i32, ClientError> {
    identity.as_i32().ok_or_else(|| ClientError::Invalid {
        field: "id".to_string(),
        reason: format!("{:?} is not a numeric id", identity.as_str()),
    })
}

/// Parse an id carried as a string attribute; `None` when unset
pub fn optional_id(state: &AttributeMap, attribute: &str) -> Result<Option<i32>, ClientError> {
    state
        .get_str(attribute)
        .map(|raw| parse_id(attribute, raw))
        .transpose()
}

pub fn required_id(state: &AttributeMap, attribute: &str) -> Result<i32, ClientError> {
    optional_id(state, attribute)?.ok_or_else(|| ClientError::Invalid {
        field: attribute.to_string(),
        reason: "required attribute is not set".to_string(),
    })
}

pub fn parse_id(field: &str, raw: &str) -> Result<i32, ClientError> {
    raw.parse().map_err(|_| ClientError::Invalid {
        field: field.to_string(),
        reason: format!("expected an integer id, got {:?}", raw),
    })
}

pub fn string(state: &AttributeMap, attribute: &str) -> String {
    state.get_str(attribute).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_cloud::Record;

    #[test]
    fn test_names() {
        assert!(project_name(&AttrValue::str("proj-1")).is_ok());
        assert!(project_name(&AttrValue::str("p1")).is_err());
        assert!(project_name(&AttrValue::str("proj_1")).is_err());
        assert!(organization_name(&AttrValue::str("my.org_1")).is_ok());
        assert!(organization_name(&AttrValue::str("MyOrg")).is_err());
    }

    #[test]
    fn test_kubemaster_count_must_be_odd() {
        let masters = |n: usize| AttrValue::List(vec![Record::new(); n]);
        assert!(odd_count(&masters(0)).is_ok());
        assert!(odd_count(&masters(3)).is_ok());
        assert!(odd_count(&masters(2)).is_err());
    }

    #[test]
    fn test_ids() {
        let state = AttributeMap::new()
            .with("cloud_credential_id", "42")
            .with("organization_id", "abc");
        assert_eq!(required_id(&state, "cloud_credential_id").unwrap(), 42);
        assert_eq!(optional_id(&state, "access_profile_id").unwrap(), None);
        assert!(optional_id(&state, "organization_id").is_err());
        assert!(numeric_identity(&Identity::from("x1")).is_err());
    }

    #[test]
    fn test_empty_id_is_unset() {
        assert!(int_string(&AttrValue::str("")).is_ok());
        assert!(int_string(&AttrValue::str("17")).is_ok());
        assert!(int_string(&AttrValue::str("x")).is_err());

        let state = AttributeMap::new().with("organization_id", "");
        assert_eq!(optional_id(&state, "organization_id").unwrap(), None);
    }

    #[test]
    fn test_ranges() {
        assert!(router_id(&AttrValue::Int(255)).is_ok());
        assert!(router_id(&AttrValue::Int(0)).is_err());
        assert!(percentage(&AttrValue::Float(100.0)).is_ok());
        assert!(percentage(&AttrValue::Float(100.5)).is_err());
        assert!(date(&AttrValue::str("01/02/2031")).is_ok());
    }
}
