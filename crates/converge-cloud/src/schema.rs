//! Resource schemas
//!
//! A schema fixes the attribute universe of a resource kind, the type of
//! each attribute and the rule the planner uses to turn a change of that
//! attribute into remote operations.

use crate::error::ErrorKind;
use crate::value::{AttrValue, AttributeMap, Record};
use std::collections::BTreeMap;

/// Type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Str,
    Int,
    Bool,
    Float,
    Set,
    List,
}

impl AttrKind {
    pub fn zero(self) -> AttrValue {
        match self {
            AttrKind::Str => AttrValue::Str(String::new()),
            AttrKind::Int => AttrValue::Int(0),
            AttrKind::Bool => AttrValue::Bool(false),
            AttrKind::Float => AttrValue::Float(0.0),
            AttrKind::Set => AttrValue::Set(Default::default()),
            AttrKind::List => AttrValue::List(Vec::new()),
        }
    }

    pub fn matches(self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (AttrKind::Str, AttrValue::Str(_))
                | (AttrKind::Int, AttrValue::Int(_))
                | (AttrKind::Bool, AttrValue::Bool(_))
                | (AttrKind::Float, AttrValue::Float(_))
                | (AttrKind::Set, AttrValue::Set(_))
                | (AttrKind::List, AttrValue::List(_))
        )
    }
}

impl std::fmt::Display for AttrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrKind::Str => write!(f, "string"),
            AttrKind::Int => write!(f, "int"),
            AttrKind::Bool => write!(f, "bool"),
            AttrKind::Float => write!(f, "float"),
            AttrKind::Set => write!(f, "set"),
            AttrKind::List => write!(f, "list"),
        }
    }
}

/// Who supplies the value of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    Required,
    Optional,
    /// Declared by the caller or, when omitted, chosen by the remote system
    OptionalComputed,
    /// Only ever reported by the remote system
    Computed,
}

/// How a change of one attribute is carried out on an existing resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRule {
    /// Cannot change in place; a change requires replacing the resource
    Immutable,
    /// Sent through the update call of the named field group
    Field(&'static str),
    /// Reference slot detached and re-attached synchronously
    Profile(&'static str),
    /// Singleton slot whose disable is confirmed through a status field
    Exclusive(&'static str),
    /// Set of remote identities bound to the resource
    Binding(&'static str),
    /// Owned child records created and deleted one by one
    Children,
    /// Lock toggle
    Lock,
}

/// Declaration of one attribute
#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kind: AttrKind,
    pub mode: AttrMode,
    pub rule: PlanRule,
    /// Any change on an existing resource requires replacing it
    pub force_new: bool,
    /// Never returned by reads (secrets)
    pub write_only: bool,
    /// Cannot be carried by the create call; applied right after it
    pub post_create: bool,
    /// Record fields that identify one element of a record list
    pub record_key: &'static [&'static str],
}

impl AttrSpec {
    fn new(name: &'static str, kind: AttrKind, mode: AttrMode) -> Self {
        Self {
            name,
            kind,
            mode,
            rule: PlanRule::Immutable,
            force_new: false,
            write_only: false,
            post_create: false,
            record_key: &[],
        }
    }

    pub fn required(name: &'static str, kind: AttrKind) -> Self {
        Self::new(name, kind, AttrMode::Required)
    }

    pub fn optional(name: &'static str, kind: AttrKind) -> Self {
        Self::new(name, kind, AttrMode::Optional)
    }

    pub fn optional_computed(name: &'static str, kind: AttrKind) -> Self {
        Self::new(name, kind, AttrMode::OptionalComputed)
    }

    pub fn computed(name: &'static str, kind: AttrKind) -> Self {
        Self::new(name, kind, AttrMode::Computed)
    }

    pub fn rule(mut self, rule: PlanRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn post_create(mut self) -> Self {
        self.post_create = true;
        self
    }

    pub fn keyed_by(mut self, fields: &'static [&'static str]) -> Self {
        self.record_key = fields;
        self
    }

    pub fn is_settable(&self) -> bool {
        self.mode != AttrMode::Computed
    }

    /// Canonical identity of a record of this list attribute.
    ///
    /// Only the `record_key` fields take part, so remote-assigned fields
    /// (id, ip, status) never make two records differ.
    pub fn record_identity(&self, record: &Record) -> String {
        let keyed: BTreeMap<&str, &AttrValue> = if self.record_key.is_empty() {
            record.iter().map(|(k, v)| (k.as_str(), v)).collect()
        } else {
            self.record_key
                .iter()
                .filter_map(|k| record.get(*k).map(|v| (*k, v)))
                .filter(|(_, v)| !v.is_zero())
                .collect()
        };
        serde_json::to_string(&keyed).unwrap_or_default()
    }
}

/// Cross-attribute constraint checked before any remote call
#[derive(Debug, Clone)]
pub enum Dependency {
    /// Either every attribute of the group is set or none is
    AllOrNone(&'static [&'static str]),
    /// `attribute` may only be set when `requires` is set too
    Requires {
        attribute: &'static str,
        requires: &'static str,
    },
}

/// Value check on a single attribute
pub type ValueCheck = fn(&AttrValue) -> std::result::Result<(), String>;

/// Attribute universe of one resource kind
#[derive(Debug, Clone)]
pub struct Schema {
    kind: &'static str,
    attributes: Vec<AttrSpec>,
    dependencies: Vec<Dependency>,
    checks: Vec<(&'static str, ValueCheck)>,
}

impl Schema {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
            dependencies: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn attr(mut self, spec: AttrSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn check(mut self, attribute: &'static str, check: ValueCheck) -> Self {
        self.checks.push((attribute, check));
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&AttrSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &AttrSpec> {
        self.attributes.iter()
    }

    /// Verify that every key is declared and every value has the declared type
    pub fn conform(&self, state: &AttributeMap) -> std::result::Result<(), ErrorKind> {
        for (key, value) in state.iter() {
            let spec = self.get(key).ok_or_else(|| ErrorKind::SchemaMismatch {
                attribute: key.clone(),
                reason: format!("not an attribute of {}", self.kind),
            })?;
            if !spec.kind.matches(value) {
                return Err(ErrorKind::SchemaMismatch {
                    attribute: key.clone(),
                    reason: format!("expected {}", spec.kind),
                });
            }
        }
        Ok(())
    }

    /// Local validation of a declared state: required attributes, value
    /// checks and dependent-attribute groups.
    pub fn validate(&self, desired: &AttributeMap) -> std::result::Result<(), ErrorKind> {
        self.conform(desired)?;

        for spec in self.attributes.iter().filter(|a| a.mode == AttrMode::Required) {
            if !desired.contains(spec.name) {
                return Err(ErrorKind::InvalidValue {
                    attribute: spec.name.to_string(),
                    reason: "required attribute is not set".to_string(),
                });
            }
        }

        for (attribute, check) in &self.checks {
            if let Some(value) = desired.get(attribute) {
                check(value).map_err(|reason| ErrorKind::InvalidValue {
                    attribute: attribute.to_string(),
                    reason,
                })?;
            }
        }

        for dependency in &self.dependencies {
            match dependency {
                Dependency::AllOrNone(group) => {
                    let missing: Vec<String> = group
                        .iter()
                        .filter(|a| !desired.contains(a))
                        .map(|a| a.to_string())
                        .collect();
                    if !missing.is_empty() && missing.len() != group.len() {
                        return Err(ErrorKind::IncompleteDependentAttributes {
                            attributes: group.iter().map(|a| a.to_string()).collect(),
                            missing,
                        });
                    }
                }
                Dependency::Requires {
                    attribute,
                    requires,
                } => {
                    if desired.contains(attribute) && !desired.contains(requires) {
                        return Err(ErrorKind::IncompleteDependentAttributes {
                            attributes: vec![attribute.to_string(), requires.to_string()],
                            missing: vec![requires.to_string()],
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
