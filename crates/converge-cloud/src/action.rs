//! Operation and plan types for remote resource reconciliation

use crate::value::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Identity assigned by the remote system at creation time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for an empty identity ("not yet created")
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used by endpoints that key resources by integer id
    pub fn as_i32(&self) -> Option<i32> {
        self.0.parse().ok()
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sub-resource a resource is attached to or detached from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    /// Slot holding the identity of another resource (profile, backup target)
    Slot { attribute: String, id: String },
    /// One owned child record (a server)
    Child { attribute: String, record: Record },
}

impl SubResource {
    pub fn attribute(&self) -> &str {
        match self {
            SubResource::Slot { attribute, .. } | SubResource::Child { attribute, .. } => {
                attribute
            }
        }
    }
}

/// Condition a `WaitFor` step polls the backend for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPredicate {
    /// The exclusive slot bound to `attribute` reports itself disabled
    SlotReleased { attribute: String },
    /// No owned children remain
    ChildrenRemoved,
}

impl fmt::Display for WaitPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPredicate::SlotReleased { attribute } => write!(f, "{} released", attribute),
            WaitPredicate::ChildrenRemoved => write!(f, "children removed"),
        }
    }
}

/// One remote step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the base entity
    Create,
    /// Send the update call of a field group
    Update { field: String },
    Attach(SubResource),
    Detach(SubResource),
    Bind {
        attribute: String,
        ids: BTreeSet<String>,
    },
    Unbind {
        attribute: String,
        ids: BTreeSet<String>,
    },
    WaitFor {
        predicate: WaitPredicate,
        timeout: Duration,
    },
    Lock(bool),
}

impl Operation {
    /// Attribute or field the operation acts on, for diagnostics
    pub fn field(&self) -> Option<&str> {
        match self {
            Operation::Create | Operation::WaitFor { .. } => None,
            Operation::Update { field } => Some(field),
            Operation::Attach(sub) | Operation::Detach(sub) => Some(sub.attribute()),
            Operation::Bind { attribute, .. } | Operation::Unbind { attribute, .. } => {
                Some(attribute)
            }
            Operation::Lock(_) => Some("lock"),
        }
    }

    /// Whether the step changes remote state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::WaitFor { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update { field } => write!(f, "update({})", field),
            Operation::Attach(SubResource::Slot { attribute, id }) => {
                write!(f, "attach({}={})", attribute, id)
            }
            Operation::Attach(SubResource::Child { attribute, .. }) => {
                write!(f, "attach({})", attribute)
            }
            Operation::Detach(SubResource::Slot { attribute, id }) => {
                write!(f, "detach({}={})", attribute, id)
            }
            Operation::Detach(SubResource::Child { attribute, .. }) => {
                write!(f, "detach({})", attribute)
            }
            Operation::Bind { attribute, ids } => write!(f, "bind({}, {:?})", attribute, ids),
            Operation::Unbind { attribute, ids } => {
                write!(f, "unbind({}, {:?})", attribute, ids)
            }
            Operation::WaitFor { predicate, timeout } => {
                write!(f, "wait_for({}, {:?})", predicate, timeout)
            }
            Operation::Lock(true) => write!(f, "lock"),
            Operation::Lock(false) => write!(f, "unlock"),
        }
    }
}

/// Ordered sequence of operations for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_changes(&self) -> bool {
        self.operations.iter().any(Operation::is_mutating)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn position(&self, predicate: impl Fn(&Operation) -> bool) -> Option<usize> {
        self.operations.iter().position(predicate)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in &self.operations {
            match op {
                Operation::Create => summary.create += 1,
                Operation::Update { .. } | Operation::Lock(_) => summary.update += 1,
                Operation::Attach(_) | Operation::Bind { .. } => summary.attach += 1,
                Operation::Detach(_) | Operation::Unbind { .. } => summary.detach += 1,
                Operation::WaitFor { .. } => summary.wait += 1,
            }
        }
        summary
    }
}

/// Summary of planned operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub attach: usize,
    pub detach: usize,
    pub wait: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to attach, {} to detach, {} waits",
            self.create, self.update, self.attach, self.detach, self.wait
        )
    }
}
