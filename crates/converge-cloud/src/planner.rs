//! Operation planner
//!
//! Turns a [`ChangeSet`] into an ordered [`Plan`]. The ordering is fixed:
//!
//! 1. detach / disable / unbind steps, each exclusive disable followed by a
//!    `WaitFor` when its replacement is enabled later in the plan
//! 2. attach / enable / bind steps and field-group updates
//! 3. the lock toggle
//!
//! Planning is local: every validation failure is reported before any
//! operation reaches the remote system.

use crate::action::{Identity, Operation, Plan, SubResource, WaitPredicate};
use crate::diff::{Change, ChangeSet};
use crate::error::ErrorKind;
use crate::schema::{AttrSpec, PlanRule, Schema};
use crate::value::{AttrValue, Record};
use std::collections::BTreeSet;
use std::time::Duration;

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct Planner<'a> {
    schema: &'a Schema,
    wait_timeout: Duration,
}

#[derive(Default)]
struct Phases {
    removals: Vec<Operation>,
    additions: Vec<Operation>,
    groups: BTreeSet<&'static str>,
    lock: Option<bool>,
}

impl<'a> Planner<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Timeout attached to generated `WaitFor` steps
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Plan the operations that move a resource to `changes.target()`.
    ///
    /// Without an identity the plan starts with `Create` and only covers the
    /// attributes the create call cannot carry.
    pub fn plan(
        &self,
        changes: &ChangeSet,
        identity: Option<&Identity>,
    ) -> std::result::Result<Plan, ErrorKind> {
        self.schema.validate(changes.target())?;

        let creating = identity.is_none();
        let mut phases = Phases::default();

        for spec in self.schema.attributes() {
            let change = changes.get(spec.name);
            if !change.is_changed() || (creating && !spec.post_create) {
                continue;
            }
            self.plan_attribute(spec, change, creating, &mut phases)?;
        }

        let mut operations = Vec::new();
        if creating {
            operations.push(Operation::Create);
        }
        operations.extend(phases.removals);
        operations.extend(phases.additions);
        if let Some(lock) = phases.lock {
            operations.push(Operation::Lock(lock));
        }

        Ok(Plan::new(operations))
    }

    fn plan_attribute(
        &self,
        spec: &AttrSpec,
        change: &Change,
        creating: bool,
        phases: &mut Phases,
    ) -> std::result::Result<(), ErrorKind> {
        let attribute = spec.name.to_string();

        if spec.force_new && !creating {
            return Err(ErrorKind::RequiresReplacement { attribute });
        }

        match (spec.rule, change) {
            (PlanRule::Immutable, _) => {
                if !creating {
                    return Err(ErrorKind::RequiresReplacement { attribute });
                }
            }
            (PlanRule::Field(group), _) => {
                if phases.groups.insert(group) {
                    phases.additions.push(Operation::Update {
                        field: group.to_string(),
                    });
                }
            }
            (PlanRule::Profile(_) | PlanRule::Exclusive(_), Change::ScalarChanged { old, new }) => {
                let old = slot_id(old);
                let new = slot_id(new);

                if let Some(old) = &old {
                    phases.removals.push(Operation::Detach(SubResource::Slot {
                        attribute: attribute.clone(),
                        id: old.clone(),
                    }));
                }
                if let Some(new) = new {
                    if old.is_some() && matches!(spec.rule, PlanRule::Exclusive(_)) {
                        phases.removals.push(Operation::WaitFor {
                            predicate: WaitPredicate::SlotReleased {
                                attribute: attribute.clone(),
                            },
                            timeout: self.wait_timeout,
                        });
                    }
                    phases.additions.push(Operation::Attach(SubResource::Slot {
                        attribute,
                        id: new,
                    }));
                }
            }
            (PlanRule::Binding(_), Change::SetChanged { added, removed }) => {
                if !removed.is_empty() {
                    phases.removals.push(Operation::Unbind {
                        attribute: attribute.clone(),
                        ids: removed.clone(),
                    });
                }
                if !added.is_empty() {
                    phases.additions.push(Operation::Bind {
                        attribute,
                        ids: added.clone(),
                    });
                }
            }
            (PlanRule::Children, Change::ScalarChanged { old, new }) => {
                let (removed, added) = split_records(spec, old, new);
                for record in removed {
                    phases.removals.push(Operation::Detach(SubResource::Child {
                        attribute: attribute.clone(),
                        record,
                    }));
                }
                for record in added {
                    phases.additions.push(Operation::Attach(SubResource::Child {
                        attribute: attribute.clone(),
                        record,
                    }));
                }
            }
            (PlanRule::Lock, Change::ScalarChanged { new, .. }) => {
                phases.lock = Some(new.as_bool().unwrap_or(false));
            }
            (rule, change) => {
                return Err(ErrorKind::SchemaMismatch {
                    attribute,
                    reason: format!("rule {:?} cannot plan change {:?}", rule, change),
                });
            }
        }
        Ok(())
    }
}

fn slot_id(value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::Str(s) if !s.is_empty() => Some(s.clone()),
        AttrValue::Int(i) if *i != 0 => Some(i.to_string()),
        _ => None,
    }
}

/// Records only in `old` and records only in `new`, compared by identity
fn split_records(spec: &AttrSpec, old: &AttrValue, new: &AttrValue) -> (Vec<Record>, Vec<Record>) {
    let old = old.as_list().unwrap_or(&[]);
    let new = new.as_list().unwrap_or(&[]);
    let old_keys: BTreeSet<String> = old.iter().map(|r| spec.record_identity(r)).collect();
    let new_keys: BTreeSet<String> = new.iter().map(|r| spec.record_identity(r)).collect();

    let removed = old
        .iter()
        .filter(|r| !new_keys.contains(&spec.record_identity(r)))
        .cloned()
        .collect();
    let added = new
        .iter()
        .filter(|r| !old_keys.contains(&spec.record_identity(r)))
        .cloned()
        .collect();
    (removed, added)
}
