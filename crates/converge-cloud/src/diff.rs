//! Attribute diff engine

use crate::error::ErrorKind;
use crate::schema::{AttrKind, AttrMode, AttrSpec, Schema};
use crate::value::{AttrValue, AttributeMap};
use std::collections::{BTreeMap, BTreeSet};

/// Change of one attribute between two states
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Unchanged,
    /// Scalar or record-list change; a missing side is the kind's zero value
    ScalarChanged { old: AttrValue, new: AttrValue },
    SetChanged {
        added: BTreeSet<String>,
        removed: BTreeSet<String>,
    },
}

impl Change {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// Per-attribute diff between a previous and a next state
#[derive(Debug, Clone)]
pub struct ChangeSet {
    changes: BTreeMap<String, Change>,
    target: AttributeMap,
}

impl ChangeSet {
    pub fn get(&self, attribute: &str) -> &Change {
        self.changes.get(attribute).unwrap_or(&Change::Unchanged)
    }

    pub fn has_change(&self, attribute: &str) -> bool {
        self.get(attribute).is_changed()
    }

    pub fn changed(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes
            .iter()
            .filter(|(_, c)| c.is_changed())
            .map(|(k, c)| (k.as_str(), c))
    }

    pub fn is_empty(&self) -> bool {
        self.changed().next().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes.iter().map(|(k, c)| (k.as_str(), c))
    }

    /// The state this change set leads to
    pub fn target(&self) -> &AttributeMap {
        &self.target
    }
}

/// Compute the change set that moves `previous` to `next`.
///
/// Both states must conform to `schema`. Every schema attribute gets an
/// entry; attributes only the remote system sets are always unchanged.
pub fn diff(
    schema: &Schema,
    previous: &AttributeMap,
    next: &AttributeMap,
) -> std::result::Result<ChangeSet, ErrorKind> {
    schema.conform(previous)?;
    schema.conform(next)?;

    let changes = schema
        .attributes()
        .map(|spec| (spec.name.to_string(), diff_attribute(spec, previous, next)))
        .collect();

    Ok(ChangeSet {
        changes,
        target: next.clone(),
    })
}

fn diff_attribute(spec: &AttrSpec, previous: &AttributeMap, next: &AttributeMap) -> Change {
    match spec.mode {
        AttrMode::Computed => return Change::Unchanged,
        AttrMode::OptionalComputed if !is_declared(spec, next) => return Change::Unchanged,
        _ => {}
    }
    if spec.write_only && (previous.get(spec.name).is_none() || next.get(spec.name).is_none()) {
        return Change::Unchanged;
    }

    let old = previous.get(spec.name).cloned().unwrap_or_else(|| spec.kind.zero());
    let new = next.get(spec.name).cloned().unwrap_or_else(|| spec.kind.zero());

    match spec.kind {
        AttrKind::Set => {
            let old = old.as_set().cloned().unwrap_or_default();
            let new = new.as_set().cloned().unwrap_or_default();
            let added: BTreeSet<String> = new.difference(&old).cloned().collect();
            let removed: BTreeSet<String> = old.difference(&new).cloned().collect();
            if added.is_empty() && removed.is_empty() {
                Change::Unchanged
            } else {
                Change::SetChanged { added, removed }
            }
        }
        AttrKind::List => {
            if record_keys(spec, &old) == record_keys(spec, &new) {
                Change::Unchanged
            } else {
                Change::ScalarChanged { old, new }
            }
        }
        _ if old == new => Change::Unchanged,
        _ => Change::ScalarChanged { old, new },
    }
}

/// Whether `state` declares `spec`. An optional-computed attribute counts as
/// declared at its zero value too, so `false` or `0.0` can be asked for; an
/// empty string still means unset.
fn is_declared(spec: &AttrSpec, state: &AttributeMap) -> bool {
    match (spec.mode, state.get(spec.name)) {
        (AttrMode::OptionalComputed, Some(AttrValue::Str(s))) => !s.is_empty(),
        (AttrMode::OptionalComputed, value) => value.is_some(),
        _ => state.contains(spec.name),
    }
}

fn record_keys(spec: &AttrSpec, value: &AttrValue) -> Vec<String> {
    let mut keys: Vec<String> = value
        .as_list()
        .unwrap_or(&[])
        .iter()
        .map(|r| spec.record_identity(r))
        .collect();
    keys.sort();
    keys
}

/// Whether `observed` reflects every attribute declared in `desired`.
///
/// Attributes the caller left unset and write-only attributes the backend
/// never returns are not compared.
pub fn reflects(schema: &Schema, desired: &AttributeMap, observed: &AttributeMap) -> bool {
    match diff(schema, observed, desired) {
        Ok(changes) => changes
            .changed()
            .all(|(name, _)| schema.get(name).is_none_or(|spec| !is_declared(spec, desired))),
        Err(_) => false,
    }
}

/// Apply the set-valued parts of a change set to `state`.
///
/// Used to check that planned add/remove steps reproduce the target bindings.
pub fn apply_set_changes(state: &AttributeMap, changes: &ChangeSet) -> AttributeMap {
    let mut result = state.clone();
    for (attribute, change) in changes.changed() {
        if let Change::SetChanged { added, removed } = change {
            let mut current = state.get_set(attribute);
            current.retain(|id| !removed.contains(id));
            current.extend(added.iter().cloned());
            result.insert(attribute, AttrValue::Set(current));
        }
    }
    result
}
