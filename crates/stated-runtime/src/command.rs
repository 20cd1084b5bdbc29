//! Commands accepted by the runtime.

use stated_models::{
    Attributes, ExpireAction, Value, VariableFields, VariableId, VariableType,
};
use tracing::debug;

use crate::error::Result;
use crate::store::VariableStore;
use crate::variable::{validate_ttl, ValueUpdate};

/// Upsert a variable by name, optionally arming a TTL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetCommand {
    pub name: String,
    pub value: Option<Value>,
    pub var_type: Option<VariableType>,
    pub icon: Option<String>,
    pub attributes: Option<Attributes>,
    pub ttl: Option<i64>,
    pub expire_to: Option<Value>,
    pub expire_action: ExpireAction,
}

impl SetCommand {
    /// Creates a command for the variable named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_type(mut self, var_type: VariableType) -> Self {
        self.var_type = Some(var_type);
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_ttl(mut self, seconds: i64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn with_expire_to(mut self, value: impl Into<Value>) -> Self {
        self.expire_to = Some(value.into());
        self
    }

    pub fn with_expire_action(mut self, action: ExpireAction) -> Self {
        self.expire_action = action;
        self
    }

    /// Returns the collection fields this command writes.
    pub fn fields(&self) -> VariableFields {
        VariableFields {
            name: Some(self.name.clone()),
            value: self.value.clone(),
            var_type: self.var_type,
            icon: self.icon.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// A command against the variable store.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Upsert by name plus optional TTL.
    Set(SetCommand),
    /// Remove the variable whose id is the slug of `name`.
    Delete { name: String },
    /// Remove every variable whose id starts with the slug of `prefix`.
    DeletePrefix { prefix: String },
    /// Write a value to an existing variable.
    SetValue { id: VariableId, update: ValueUpdate },
    /// Flip an existing boolean variable.
    Toggle { id: VariableId },
}

/// Result of applying a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Set { id: VariableId, created: bool },
    Deleted { id: VariableId, existed: bool },
    DeletedPrefix { count: usize },
    ValueSet { id: VariableId },
    Toggled { id: VariableId, toggled: bool },
}

impl Command {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set(_) => "set",
            Command::Delete { .. } => "delete",
            Command::DeletePrefix { .. } => "delete_prefix",
            Command::SetValue { .. } => "set_value",
            Command::Toggle { .. } => "toggle",
        }
    }

    /// Applies the command to `store`.
    pub fn apply(self, store: &mut VariableStore) -> Result<CommandOutcome> {
        debug!(command = self.name(), "applying command");

        match self {
            Command::Set(set) => {
                // Reject a bad TTL before touching the collection
                if let Some(ttl) = set.ttl {
                    validate_ttl(ttl)?;
                }

                let (id, created) = store.upsert(&set.name, &set.fields())?;
                if let Some(ttl) = set.ttl {
                    store.arm_ttl(&id, ttl, set.expire_to.as_ref(), set.expire_action)?;
                }
                Ok(CommandOutcome::Set { id, created })
            }
            Command::Delete { name } => {
                let id = VariableStore::suggest_id(&name);
                let existed = store.delete(&id)?;
                Ok(CommandOutcome::Deleted { id, existed })
            }
            Command::DeletePrefix { prefix } => {
                let count = store.delete_prefix(&prefix)?;
                Ok(CommandOutcome::DeletedPrefix { count })
            }
            Command::SetValue { id, update } => {
                store.set_value(&id, update)?;
                Ok(CommandOutcome::ValueSet { id })
            }
            Command::Toggle { id } => {
                let toggled = store.toggle(&id)?;
                Ok(CommandOutcome::Toggled { id, toggled })
            }
        }
    }
}
