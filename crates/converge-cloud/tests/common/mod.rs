use async_trait::async_trait;
use converge_cloud::{
    AttrKind, AttrSpec, AttrValue, AttributeMap, ClientError, Dependency, Identity, Operation,
    PlanRule, PollConfig, ReconcileContext, ResourceHandler, Schema, SubResource, WaitPredicate,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn widget_schema() -> Schema {
    Schema::new("widget")
        .attr(AttrSpec::required("name", AttrKind::Str))
        .attr(AttrSpec::optional("size", AttrKind::Int).rule(PlanRule::Field("sizing")))
        .attr(AttrSpec::optional("profile", AttrKind::Str).rule(PlanRule::Profile("profile")))
        .attr(AttrSpec::optional("backup", AttrKind::Str).rule(PlanRule::Exclusive("backup")))
        .attr(AttrSpec::optional("tags", AttrKind::Set).rule(PlanRule::Binding("tags")))
        .attr(AttrSpec::optional("lock", AttrKind::Bool).rule(PlanRule::Lock).post_create())
        .attr(AttrSpec::optional("zone", AttrKind::Str))
        .attr(AttrSpec::optional("zone_range", AttrKind::Int))
        .dependency(Dependency::AllOrNone(&["zone", "zone_range"]))
}

/// In-memory backend whose reads lag its writes
pub struct FakeWidgets {
    schema: Schema,
    store: Mutex<HashMap<String, AttributeMap>>,
    next_id: Mutex<i32>,
    calls: Mutex<Vec<String>>,
    lagging_reads: Mutex<u32>,
    release_after: Mutex<u32>,
    failures: Mutex<HashMap<String, ClientError>>,
    children: Mutex<usize>,
}

#[allow(dead_code)]
impl FakeWidgets {
    pub fn new() -> Self {
        Self {
            schema: widget_schema(),
            store: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1000),
            calls: Mutex::new(Vec::new()),
            lagging_reads: Mutex::new(0),
            release_after: Mutex::new(0),
            failures: Mutex::new(HashMap::new()),
            children: Mutex::new(0),
        }
    }

    /// The next `reads` reads report the widget as missing
    pub fn with_read_lag(self, reads: u32) -> Self {
        *self.lagging_reads.lock().unwrap() = reads;
        self
    }

    /// The backup slot reports itself released after `probes` probes
    pub fn with_release_after(self, probes: u32) -> Self {
        *self.release_after.lock().unwrap() = probes;
        self
    }

    /// Fail the call whose log entry starts with `prefix`
    pub fn fail_on(self, prefix: &str, error: ClientError) -> Self {
        self.failures.lock().unwrap().insert(prefix.to_string(), error);
        self
    }

    pub fn with_children(self, count: usize) -> Self {
        *self.children.lock().unwrap() = count;
        self
    }

    pub fn seed(&self, id: &str, state: AttributeMap) {
        self.store.lock().unwrap().insert(id.to_string(), state);
    }

    pub fn stored(&self, id: &str) -> Option<AttributeMap> {
        self.store.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change remote state
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("read") && !c.starts_with("probe"))
            .collect()
    }

    fn record(&self, call: String) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call.clone());
        let failures = self.failures.lock().unwrap();
        match failures.iter().find(|(prefix, _)| call.starts_with(prefix.as_str())) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn with_widget<T>(
        &self,
        identity: &Identity,
        f: impl FnOnce(&mut AttributeMap) -> T,
    ) -> Result<T, ClientError> {
        let mut store = self.store.lock().unwrap();
        let widget = store
            .get_mut(identity.as_str())
            .ok_or_else(|| ClientError::NotFound(identity.to_string()))?;
        Ok(f(widget))
    }
}

#[async_trait]
impl ResourceHandler for FakeWidgets {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn create_base(&self, desired: &AttributeMap) -> Result<Identity, ClientError> {
        self.record("create".to_string())?;
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let identity = Identity::from(*next_id);

        let mut base = desired.clone();
        base.remove("lock");
        self.seed(identity.as_str(), base);
        Ok(identity)
    }

    async fn apply(
        &self,
        identity: &Identity,
        operation: &Operation,
        desired: &AttributeMap,
    ) -> Result<(), ClientError> {
        self.record(operation.to_string())?;
        self.with_widget(identity, |widget| match operation {
            Operation::Update { .. } => {
                widget.insert_opt("size", desired.get_int("size"));
            }
            Operation::Attach(SubResource::Slot { attribute, id }) => {
                widget.insert(attribute.as_str(), id.as_str());
            }
            Operation::Detach(SubResource::Slot { attribute, .. }) => {
                widget.remove(attribute);
            }
            Operation::Bind { attribute, ids } => {
                let mut bound = widget.get_set(attribute);
                bound.extend(ids.iter().cloned());
                widget.insert(attribute.as_str(), AttrValue::Set(bound));
            }
            Operation::Unbind { attribute, ids } => {
                let mut bound = widget.get_set(attribute);
                bound.retain(|id| !ids.contains(id));
                widget.insert(attribute.as_str(), AttrValue::Set(bound));
            }
            Operation::Lock(lock) => widget.insert("lock", *lock),
            _ => {}
        })
    }

    async fn read(&self, identity: &Identity) -> Result<Option<AttributeMap>, ClientError> {
        self.record(format!("read({})", identity))?;
        let mut lag = self.lagging_reads.lock().unwrap();
        if *lag > 0 {
            *lag -= 1;
            return Ok(None);
        }
        Ok(self.stored(identity.as_str()))
    }

    async fn probe(
        &self,
        _identity: &Identity,
        predicate: &WaitPredicate,
    ) -> Result<bool, ClientError> {
        self.record(format!("probe({})", predicate))?;
        match predicate {
            WaitPredicate::SlotReleased { .. } => {
                let mut remaining = self.release_after.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(false);
                }
                Ok(true)
            }
            WaitPredicate::ChildrenRemoved => Ok(*self.children.lock().unwrap() == 0),
        }
    }

    async fn delete_children(&self, _identity: &Identity) -> Result<usize, ClientError> {
        let mut children = self.children.lock().unwrap();
        let removed = *children;
        if removed > 0 {
            self.record(format!("delete_children({})", removed))?;
        }
        *children = 0;
        Ok(removed)
    }

    async fn delete_base(&self, identity: &Identity) -> Result<(), ClientError> {
        self.record(format!("delete({})", identity))?;
        self.store
            .lock()
            .unwrap()
            .remove(identity.as_str())
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(identity.to_string()))
    }
}

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
