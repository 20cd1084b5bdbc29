//! A single live variable and its TTL state machine.
//!
//! A [`Variable`] owns its coerced value and at most one armed TTL. It talks
//! to the outside world only through [`Services`]: timers go to the
//! [`Scheduler`], notifications go to the [`EventSink`]. Persistence is the
//! owning store's job.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use stated_events::EventSink;
use stated_models::{
    Attributes, ChangeEvent, ExpireAction, Expiry, Value, VariableEvent, VariableId,
    VariableRecord, VariableState, VariableType,
};
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::scheduler::{Scheduler, TimerHandle, TimerKey};

/// Collaborators shared by every variable of a store.
#[derive(Clone)]
pub struct Services {
    /// Arms TTL timers.
    pub scheduler: Arc<dyn Scheduler>,
    /// Receives change events and state writes.
    pub events: Arc<dyn EventSink>,
    generations: Arc<AtomicU64>,
}

impl Services {
    /// Creates a new set of services.
    pub fn new(scheduler: Arc<dyn Scheduler>, events: Arc<dyn EventSink>) -> Self {
        Self {
            scheduler,
            events,
            generations: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generations are unique across the store so a variable that is removed
    /// and recreated under the same id never matches an old timer.
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Arguments of a value write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueUpdate {
    /// Raw value, coerced under the variable's type.
    pub value: Value,
    /// TTL in seconds. `None` cancels any armed TTL.
    pub ttl: Option<i64>,
    /// Value applied when a `Reset` TTL fires. Defaults to the type's reset value.
    pub expire_to: Option<Value>,
    /// What happens when the TTL fires.
    pub expire_action: ExpireAction,
    /// Attributes merged key by key.
    pub attributes: Option<Attributes>,
}

impl ValueUpdate {
    /// Creates an update writing `value` with no TTL.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Arms a TTL of `seconds`.
    pub fn with_ttl(mut self, seconds: i64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// Sets the value applied on reset.
    pub fn with_expire_to(mut self, value: impl Into<Value>) -> Self {
        self.expire_to = Some(value.into());
        self
    }

    /// Sets the expire action.
    pub fn with_expire_action(mut self, action: ExpireAction) -> Self {
        self.expire_action = action;
        self
    }

    /// Sets the attributes to merge.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Checks a TTL and returns it as a duration.
pub fn validate_ttl(seconds: i64) -> Result<Duration> {
    if seconds < 1 {
        return Err(RuntimeError::InvalidArgument(format!(
            "ttl must be at least 1 second, got {}",
            seconds
        )));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| RuntimeError::InvalidArgument(format!("ttl {} is out of range", seconds)))
}

fn deadline(ttl: Duration) -> Result<DateTime<Utc>> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| RuntimeError::InvalidArgument("ttl is out of range".to_string()))
}

/// Outcome of a timer delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expired {
    /// The timer was stale or cancelled.
    Ignored,
    /// The value was reset.
    Reset,
    /// The variable must be removed by its owner.
    Delete,
}

struct ArmedTtl {
    expiry: Expiry,
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

/// A live variable.
pub struct Variable {
    record: VariableRecord,
    ttl: Option<ArmedTtl>,
    services: Services,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("record", &self.record)
            .field("expiry", &self.expiry())
            .finish()
    }
}

impl Variable {
    /// Builds a live variable from a record. The value is coerced under the
    /// record's type and an empty name falls back to the id. No TTL is armed.
    pub fn new(mut record: VariableRecord, services: &Services) -> Self {
        record.value = record.var_type.coerce(&record.value);
        if record.name.is_empty() {
            record.name = record.id.to_string();
        }
        Self {
            record,
            ttl: None,
            services: services.clone(),
        }
    }

    pub fn id(&self) -> &VariableId {
        &self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn var_type(&self) -> VariableType {
        self.record.var_type
    }

    pub fn value(&self) -> &Value {
        &self.record.value
    }

    pub fn attributes(&self) -> &Attributes {
        &self.record.attributes
    }

    /// Returns the armed TTL, if any.
    pub fn expiry(&self) -> Option<&Expiry> {
        self.ttl.as_ref().map(|t| &t.expiry)
    }

    /// Returns the display state.
    pub fn display_state(&self) -> Option<String> {
        self.record.var_type.display_state(&self.record.value)
    }

    /// Returns an observable snapshot.
    pub fn state(&self) -> VariableState {
        VariableState {
            id: self.record.id.clone(),
            name: self.record.name.clone(),
            var_type: self.record.var_type,
            state: self.display_state(),
            value: self.record.value.clone(),
            icon: self.record.icon.clone(),
            attributes: self.record.attributes.clone(),
            expiry: self.expiry().cloned(),
        }
    }

    /// Returns the durable record (never includes TTL state).
    pub fn to_record(&self) -> VariableRecord {
        self.record.clone()
    }

    /// Writes a new value, then arms or cancels the TTL.
    ///
    /// The TTL is validated first; an invalid TTL leaves the variable
    /// untouched.
    pub fn set_value(&mut self, update: ValueUpdate) -> Result<()> {
        let ttl = update.ttl.map(validate_ttl).transpose()?;
        let expires_at = ttl.map(deadline).transpose()?;

        let coerced = self.record.var_type.coerce(&update.value);
        if let Some(attributes) = update.attributes {
            self.record.attributes.extend(attributes);
        }
        self.commit(coerced);

        match expires_at {
            Some(expires_at) => {
                self.arm_at(expires_at, update.expire_to.as_ref(), update.expire_action)
            }
            None => self.cancel_ttl(),
        }

        self.write_state();
        Ok(())
    }

    /// Arms a TTL, replacing any armed one.
    pub fn arm_ttl(
        &mut self,
        seconds: i64,
        expire_to: Option<&Value>,
        expire_action: ExpireAction,
    ) -> Result<()> {
        let expires_at = deadline(validate_ttl(seconds)?)?;
        self.arm_at(expires_at, expire_to, expire_action);
        self.write_state();
        Ok(())
    }

    fn arm_at(
        &mut self,
        expires_at: DateTime<Utc>,
        expire_to: Option<&Value>,
        expire_action: ExpireAction,
    ) {
        self.cancel_ttl();

        let var_type = self.record.var_type;
        let expire_to = expire_to
            .map(|v| var_type.coerce(v))
            .unwrap_or_else(|| var_type.default_value());

        let generation = self.services.next_generation();
        let key = TimerKey {
            variable_id: self.record.id.clone(),
            generation,
        };
        let handle = self.services.scheduler.schedule_at(expires_at, key);

        debug!(
            variable_id = %self.record.id,
            generation,
            expires_at = %expires_at,
            action = %expire_action,
            "armed ttl"
        );

        self.ttl = Some(ArmedTtl {
            expiry: Expiry {
                expires_at,
                expire_to,
                expire_action,
            },
            generation,
            handle,
        });
    }

    /// Cancels the armed TTL, if any.
    pub fn cancel_ttl(&mut self) {
        if let Some(armed) = self.ttl.take() {
            debug!(
                variable_id = %self.record.id,
                generation = armed.generation,
                "cancelled ttl"
            );
            armed.handle.cancel();
        }
    }

    /// Handles a timer delivery for `generation`.
    pub fn on_ttl_fired(&mut self, generation: u64) -> Expired {
        let armed = match self.ttl.take() {
            Some(armed) if armed.generation == generation => armed,
            other => {
                self.ttl = other;
                debug!(variable_id = %self.record.id, generation, "ignoring stale timer");
                return Expired::Ignored;
            }
        };

        let Expiry {
            expire_to,
            expire_action,
            ..
        } = armed.expiry;

        info!(variable_id = %self.record.id, action = %expire_action, "ttl expired");

        match expire_action {
            ExpireAction::Delete => Expired::Delete,
            ExpireAction::Reset => {
                // The type may have changed since arming
                let value = self.record.var_type.coerce(&expire_to);
                self.commit(value);
                self.write_state();
                Expired::Reset
            }
        }
    }

    /// Flips a boolean variable. Returns false for other types.
    pub fn toggle(&mut self) -> bool {
        if self.record.var_type != VariableType::Boolean {
            warn!(
                variable_id = %self.record.id,
                var_type = %self.record.var_type,
                "cannot toggle: not a boolean variable"
            );
            return false;
        }

        let flipped = Value::Bool(!self.record.value.is_truthy());
        self.commit(flipped);
        self.write_state();
        true
    }

    /// Applies a new configuration.
    ///
    /// Name, type, icon and attributes are replaced by the record's; the
    /// value is re-coerced under the new type. An armed TTL is left alone.
    pub fn update_config(&mut self, record: &VariableRecord) {
        let old_state = self.display_state();
        self.record.name = if record.name.is_empty() {
            record.id.to_string()
        } else {
            record.name.clone()
        };
        self.record.var_type = record.var_type;
        self.record.icon = record.icon.clone();
        self.record.attributes = record.attributes.clone();

        let value = record.var_type.coerce(&record.value);
        self.commit_from(old_state, value);
        self.write_state();
    }

    /// Cancels any TTL ahead of removal.
    pub fn teardown(&mut self) {
        self.cancel_ttl();
    }

    /// Stores `value`, emitting a change event if the display state moves.
    fn commit(&mut self, value: Value) {
        let old_state = self.display_state();
        self.commit_from(old_state, value);
    }

    /// Stores `value`, comparing the result against a display state taken
    /// before any type change.
    fn commit_from(&mut self, old_state: Option<String>, value: Value) {
        self.record.value = value;
        let new_state = self.display_state();

        if old_state != new_state {
            self.services
                .events
                .publish(VariableEvent::Changed(ChangeEvent::new(
                    self.record.id.clone(),
                    self.record.name.clone(),
                    self.record.var_type,
                    old_state,
                    new_state,
                )));
        }
    }

    fn write_state(&self) {
        self.services
            .events
            .publish(VariableEvent::StateWritten(self.state()));
    }
}

impl Drop for Variable {
    fn drop(&mut self) {
        self.cancel_ttl();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use serde_json::json;
    use stated_events::EventBus;
    use stated_models::{VariableEventKind, VariableFields};

    struct Fixture {
        scheduler: ManualScheduler,
        bus: Arc<EventBus>,
        services: Services,
    }

    fn fixture() -> Fixture {
        let scheduler = ManualScheduler::new();
        let bus = Arc::new(EventBus::new());
        let services = Services::new(Arc::new(scheduler.clone()), bus.clone());
        Fixture {
            scheduler,
            bus,
            services,
        }
    }

    fn variable(fx: &Fixture, id: &str, value: impl Into<Value>, var_type: VariableType) -> Variable {
        let record = VariableRecord::from_fields(
            VariableId::from(id),
            &VariableFields::new().with_value(value).with_type(var_type),
        );
        Variable::new(record, &fx.services)
    }

    fn changes(bus: &EventBus) -> Vec<(Option<String>, Option<String>)> {
        bus.recent(None)
            .iter()
            .filter_map(|e| e.as_change())
            .map(|c| (c.old_state.clone(), c.new_state.clone()))
            .collect()
    }

    fn generation(fx: &Fixture) -> u64 {
        fx.scheduler.pending()[0].1.generation
    }

    #[test]
    fn test_new_coerces_value_and_defaults_name() {
        let fx = fixture();
        let record = VariableRecord {
            id: VariableId::from("x"),
            name: String::new(),
            value: Value::from("7"),
            var_type: VariableType::Number,
            icon: None,
            attributes: Attributes::new(),
        };

        let var = Variable::new(record, &fx.services);

        assert_eq!(var.value(), &Value::Int(7));
        assert_eq!(var.name(), "x");
        assert!(var.expiry().is_none());
    }

    #[test]
    fn test_set_value_emits_change_only_on_transition() {
        let fx = fixture();
        let mut var = variable(&fx, "light", false, VariableType::Boolean);

        var.set_value(ValueUpdate::new("on")).unwrap();
        var.set_value(ValueUpdate::new(true)).unwrap();

        assert_eq!(
            changes(&fx.bus),
            vec![(Some("off".to_string()), Some("on".to_string()))]
        );
        let writes = fx
            .bus
            .recent(None)
            .iter()
            .filter(|e| e.kind() == VariableEventKind::StateWritten)
            .count();
        assert_eq!(writes, 2);
    }

    #[test]
    fn test_set_value_merges_attributes() {
        let fx = fixture();
        let mut var = variable(&fx, "x", "a", VariableType::String);
        let first = json!({"room": "kitchen", "level": 1}).as_object().cloned().unwrap();
        let second = json!({"level": 2}).as_object().cloned().unwrap();

        var.set_value(ValueUpdate::new("b").with_attributes(first)).unwrap();
        var.set_value(ValueUpdate::new("c").with_attributes(second)).unwrap();

        assert_eq!(var.attributes()["room"], json!("kitchen"));
        assert_eq!(var.attributes()["level"], json!(2));
    }

    #[test]
    fn test_set_value_with_ttl_arms_and_without_cancels() {
        let fx = fixture();
        let mut var = variable(&fx, "x", 0i64, VariableType::Number);

        var.set_value(ValueUpdate::new(5i64).with_ttl(30)).unwrap();
        assert!(var.expiry().is_some());
        assert_eq!(fx.scheduler.pending_count(), 1);

        var.set_value(ValueUpdate::new(6i64)).unwrap();
        assert!(var.expiry().is_none());
        assert_eq!(fx.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_invalid_ttl_has_no_effect() {
        let fx = fixture();
        let mut var = variable(&fx, "x", 1i64, VariableType::Number);

        let result = var.set_value(ValueUpdate::new(9i64).with_ttl(0));

        assert!(matches!(result, Err(RuntimeError::InvalidArgument(_))));
        assert_eq!(var.value(), &Value::Int(1));
        assert!(fx.bus.is_empty());
        assert!(var.arm_ttl(-5, None, ExpireAction::Reset).is_err());
    }

    #[test]
    fn test_arm_twice_keeps_one_timer() {
        let fx = fixture();
        let mut var = variable(&fx, "x", true, VariableType::Boolean);

        var.arm_ttl(10, None, ExpireAction::Reset).unwrap();
        let first = generation(&fx);
        var.arm_ttl(20, None, ExpireAction::Reset).unwrap();

        assert_eq!(fx.scheduler.pending_count(), 1);
        assert_ne!(generation(&fx), first);
        assert_eq!(var.on_ttl_fired(first), Expired::Ignored);
        assert!(var.expiry().is_some());
    }

    #[test]
    fn test_reset_fires_to_type_default() {
        let fx = fixture();
        let mut var = variable(&fx, "light", false, VariableType::Boolean);

        var.set_value(ValueUpdate::new(true).with_ttl(60)).unwrap();
        assert_eq!(var.expiry().unwrap().expire_to, Value::Bool(false));

        let gen = generation(&fx);
        assert_eq!(var.on_ttl_fired(gen), Expired::Reset);

        assert_eq!(var.display_state().as_deref(), Some("off"));
        assert!(var.expiry().is_none());
        assert_eq!(changes(&fx.bus).len(), 2);
    }

    #[test]
    fn test_reset_recoerces_under_current_type() {
        let fx = fixture();
        let mut var = variable(&fx, "x", "a", VariableType::String);

        var.arm_ttl(60, Some(&Value::from("42")), ExpireAction::Reset)
            .unwrap();
        let gen = generation(&fx);

        let mut record = var.to_record();
        record.var_type = VariableType::Number;
        var.update_config(&record);
        assert!(var.expiry().is_some());

        var.on_ttl_fired(gen);
        assert_eq!(var.value(), &Value::Int(42));
    }

    #[test]
    fn test_delete_action_reports_delete() {
        let fx = fixture();
        let mut var = variable(&fx, "x", true, VariableType::Boolean);

        var.arm_ttl(5, None, ExpireAction::Delete).unwrap();
        let gen = generation(&fx);

        assert_eq!(var.on_ttl_fired(gen), Expired::Delete);
        assert_eq!(var.value(), &Value::Bool(true));
        assert!(changes(&fx.bus).is_empty());
    }

    #[test]
    fn test_toggle_boolean() {
        let fx = fixture();
        let mut var = variable(&fx, "x", Value::Null, VariableType::Boolean);
        assert_eq!(var.display_state().as_deref(), Some("off"));

        assert!(var.toggle());
        assert_eq!(var.value(), &Value::Bool(true));
        assert!(var.toggle());
        assert_eq!(var.value(), &Value::Bool(false));
        assert_eq!(changes(&fx.bus).len(), 2);
    }

    #[test]
    fn test_toggle_non_boolean_is_noop() {
        let fx = fixture();
        let mut var = variable(&fx, "x", "hello", VariableType::String);

        assert!(!var.toggle());

        assert_eq!(var.value(), &Value::from("hello"));
        assert!(fx.bus.is_empty());
    }

    #[test]
    fn test_update_config_recoerces_value() {
        let fx = fixture();
        let mut var = variable(&fx, "x", "12", VariableType::String);

        let mut record = var.to_record();
        record.var_type = VariableType::Number;
        record.name = "Counter".to_string();
        var.update_config(&record);

        assert_eq!(var.value(), &Value::Int(12));
        assert_eq!(var.name(), "Counter");
        assert!(changes(&fx.bus).is_empty());
    }

    #[test]
    fn test_update_config_type_change_emits_change() {
        let fx = fixture();
        let mut var = variable(&fx, "lamp", 1i64, VariableType::Number);

        let mut record = var.to_record();
        record.var_type = VariableType::Boolean;
        var.update_config(&record);

        assert_eq!(var.value(), &Value::Bool(true));
        assert_eq!(
            changes(&fx.bus),
            vec![(Some("1".to_string()), Some("on".to_string()))]
        );
    }

    #[test]
    fn test_update_config_boolean_to_string_emits_change() {
        let fx = fixture();
        let mut var = variable(&fx, "flag", true, VariableType::Boolean);

        let mut record = var.to_record();
        record.var_type = VariableType::String;
        var.update_config(&record);

        assert_eq!(
            changes(&fx.bus),
            vec![(Some("on".to_string()), Some("true".to_string()))]
        );
    }

    #[test]
    fn test_state_snapshot_includes_expiry() {
        let fx = fixture();
        let mut var = variable(&fx, "x", 3i64, VariableType::Number);

        var.arm_ttl(10, Some(&Value::from("1.5")), ExpireAction::Reset)
            .unwrap();
        let state = var.state();

        assert_eq!(state.state.as_deref(), Some("3"));
        assert_eq!(state.expiry.unwrap().expire_to, Value::Float(1.5));
        assert!(var.to_record().attributes.get("expires_at").is_none());
    }

    #[test]
    fn test_drop_cancels_timer() {
        let fx = fixture();
        let mut var = variable(&fx, "x", true, VariableType::Boolean);
        var.arm_ttl(10, None, ExpireAction::Reset).unwrap();

        drop(var);

        assert_eq!(fx.scheduler.pending_count(), 0);
    }
}
