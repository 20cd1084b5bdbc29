//! The variable collection.
//!
//! `VariableStore` keeps every live [`Variable`] keyed by id and writes the
//! whole collection through to [`Storage`] on each mutation. Collection
//! changes (create, update, delete) are persisted before they are applied in
//! memory, so a failed write leaves the store as it was.

use std::collections::BTreeMap;

use stated_models::{
    slugify, ExpireAction, Value, VariableEvent, VariableFields, VariableId, VariableRecord,
    VariableState,
};
use stated_persistence::Storage;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::scheduler::TimerKey;
use crate::variable::{Expired, Services, ValueUpdate, Variable};

/// Seconds before a failed expiry delete is tried again.
const DELETE_RETRY_SECS: i64 = 30;

/// Live variables plus their durable storage.
pub struct VariableStore {
    variables: BTreeMap<VariableId, Variable>,
    storage: Box<dyn Storage>,
    services: Services,
}

impl VariableStore {
    /// Creates an empty store. Call [`load`](Self::load) to read persisted
    /// variables.
    pub fn new(storage: Box<dyn Storage>, services: Services) -> Self {
        Self {
            variables: BTreeMap::new(),
            storage,
            services,
        }
    }

    /// Replaces the live collection with the persisted one.
    ///
    /// Storage is the only source of truth: values come back coerced under
    /// their stored type and no TTL survives a restart.
    pub fn load(&mut self) -> Result<usize> {
        let records = self.storage.load()?;

        for (_, mut variable) in std::mem::take(&mut self.variables) {
            variable.teardown();
        }

        for record in records {
            let variable = Variable::new(record, &self.services);
            self.variables.insert(variable.id().clone(), variable);
        }

        info!(count = self.variables.len(), "loaded variables");
        Ok(self.variables.len())
    }

    /// Derives the id a variable named `name` would get.
    pub fn suggest_id(name: &str) -> VariableId {
        VariableId::suggest(name)
    }

    pub fn contains(&self, id: &VariableId) -> bool {
        self.variables.contains_key(id)
    }

    /// Returns the live variable with `id`.
    pub fn get(&self, id: &VariableId) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// Returns a snapshot of the variable with `id`.
    pub fn state(&self, id: &VariableId) -> Option<VariableState> {
        self.variables.get(id).map(Variable::state)
    }

    /// Returns snapshots of every variable, ordered by id.
    pub fn list(&self) -> Vec<VariableState> {
        self.variables.values().map(Variable::state).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Returns the durable records of every variable, ordered by id.
    pub fn records(&self) -> Vec<VariableRecord> {
        self.variables.values().map(Variable::to_record).collect()
    }

    /// Creates a variable from `fields`.
    ///
    /// The id is the slug of the name, suffixed `_2`, `_3`, ... on
    /// collision. Absent fields take creation defaults.
    pub fn create(&mut self, fields: &VariableFields) -> Result<VariableId> {
        let name = fields.name.as_deref().unwrap_or_default();
        let base = slugify(name);
        if base.is_empty() {
            return Err(RuntimeError::InvalidArgument(format!(
                "name '{}' does not produce a usable id",
                name
            )));
        }

        let mut id = VariableId::from(base.as_str());
        let mut suffix = 2;
        while self.variables.contains_key(&id) {
            id = VariableId::from(format!("{}_{}", base, suffix));
            suffix += 1;
        }

        self.insert(VariableRecord::from_fields(id.clone(), fields))?;
        Ok(id)
    }

    fn insert(&mut self, record: VariableRecord) -> Result<()> {
        let variable = Variable::new(record, &self.services);

        let mut records = self.records();
        records.push(variable.to_record());
        self.storage.save(&records)?;

        debug!(variable_id = %variable.id(), var_type = %variable.var_type(), "created variable");
        self.services
            .events
            .publish(VariableEvent::Created(variable.state()));
        self.variables.insert(variable.id().clone(), variable);
        Ok(())
    }

    /// Shallow-merges `fields` over the variable with `id`.
    pub fn update(&mut self, id: &VariableId, fields: &VariableFields) -> Result<()> {
        let current = self
            .variables
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        let merged = current.to_record().merged(fields);

        // Persist what the variable will hold once coerced
        let prospective = Variable::new(merged.clone(), &self.services).to_record();
        let records: Vec<VariableRecord> = self
            .variables
            .values()
            .map(|v| {
                if v.id() == id {
                    prospective.clone()
                } else {
                    v.to_record()
                }
            })
            .collect();
        self.storage.save(&records)?;

        if let Some(variable) = self.variables.get_mut(id) {
            variable.update_config(&merged);
        }
        debug!(variable_id = %id, "updated variable");
        Ok(())
    }

    /// Updates the variable `suggest_id(name)` if it exists, else creates it
    /// under exactly that id. Returns the id and whether it was created.
    pub fn upsert(&mut self, name: &str, fields: &VariableFields) -> Result<(VariableId, bool)> {
        let id = Self::suggest_id(name);
        if id.as_str().is_empty() {
            return Err(RuntimeError::InvalidArgument(format!(
                "name '{}' does not produce a usable id",
                name
            )));
        }

        let mut fields = fields.clone();
        fields.name.get_or_insert_with(|| name.to_string());

        if self.variables.contains_key(&id) {
            self.update(&id, &fields)?;
            Ok((id, false))
        } else {
            self.insert(VariableRecord::from_fields(id.clone(), &fields))?;
            Ok((id, true))
        }
    }

    /// Removes the variable with `id`. Unknown ids are a logged no-op.
    pub fn delete(&mut self, id: &VariableId) -> Result<bool> {
        if !self.variables.contains_key(id) {
            warn!(variable_id = %id, "cannot delete: variable does not exist");
            return Ok(false);
        }

        let records: Vec<VariableRecord> = self
            .variables
            .values()
            .filter(|v| v.id() != id)
            .map(Variable::to_record)
            .collect();
        self.storage.save(&records)?;

        if let Some(mut variable) = self.variables.remove(id) {
            variable.teardown();
        }
        self.services.events.publish(VariableEvent::Removed {
            variable_id: id.clone(),
        });
        debug!(variable_id = %id, "deleted variable");
        Ok(true)
    }

    /// Removes every variable whose id starts with the slug of `prefix`.
    /// Returns how many were removed.
    pub fn delete_prefix(&mut self, prefix: &str) -> Result<usize> {
        let slug = slugify(prefix);
        if slug.is_empty() {
            return Err(RuntimeError::InvalidArgument(format!(
                "prefix '{}' is empty after normalization",
                prefix
            )));
        }

        let matching: Vec<VariableId> = self
            .variables
            .keys()
            .filter(|id| id.as_str().starts_with(&slug))
            .cloned()
            .collect();

        if matching.is_empty() {
            info!(prefix = %slug, "no variables match prefix");
            return Ok(0);
        }

        let mut count = 0;
        for id in &matching {
            if self.delete(id)? {
                count += 1;
            }
        }

        info!(prefix = %slug, count, "deleted variables by prefix");
        Ok(count)
    }

    fn variable_mut(&mut self, id: &VariableId) -> Result<&mut Variable> {
        self.variables
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    /// Writes a value to the variable with `id`.
    pub fn set_value(&mut self, id: &VariableId, update: ValueUpdate) -> Result<()> {
        self.variable_mut(id)?.set_value(update)?;
        self.persist()
    }

    /// Arms a TTL on the variable with `id`.
    pub fn arm_ttl(
        &mut self,
        id: &VariableId,
        seconds: i64,
        expire_to: Option<&Value>,
        expire_action: ExpireAction,
    ) -> Result<()> {
        self.variable_mut(id)?
            .arm_ttl(seconds, expire_to, expire_action)
    }

    /// Toggles the variable with `id`. Returns false if it is not a boolean.
    pub fn toggle(&mut self, id: &VariableId) -> Result<bool> {
        let toggled = self.variable_mut(id)?.toggle();
        if toggled {
            self.persist()?;
        }
        Ok(toggled)
    }

    /// Delivers a fired timer. Timers for removed variables are ignored.
    pub fn on_ttl_fired(&mut self, key: &TimerKey) -> Result<Expired> {
        let Some(variable) = self.variables.get_mut(&key.variable_id) else {
            debug!(timer = %key, "timer fired for removed variable");
            return Ok(Expired::Ignored);
        };

        let expired = variable.on_ttl_fired(key.generation);
        match expired {
            Expired::Ignored => {}
            Expired::Reset => self.persist()?,
            Expired::Delete => {
                if let Err(e) = self.delete(&key.variable_id) {
                    self.retry_delete(&key.variable_id);
                    return Err(e);
                }
            }
        }
        Ok(expired)
    }

    /// Re-arms a delete expiry whose removal could not be saved.
    fn retry_delete(&mut self, id: &VariableId) {
        let Some(variable) = self.variables.get_mut(id) else {
            return;
        };
        warn!(
            variable_id = %id,
            retry_secs = DELETE_RETRY_SECS,
            "expiry delete not saved, retrying"
        );
        if let Err(e) = variable.arm_ttl(DELETE_RETRY_SECS, None, ExpireAction::Delete) {
            warn!(variable_id = %id, error = %e, "could not re-arm expiry delete");
        }
    }

    /// Cancels every armed TTL.
    pub fn cancel_all_ttls(&mut self) {
        for variable in self.variables.values_mut() {
            variable.cancel_ttl();
        }
    }

    fn persist(&self) -> Result<()> {
        self.storage.save(&self.records())?;
        Ok(())
    }
}
