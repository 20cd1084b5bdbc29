//! Variable configuration, expiry and state types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::VariableId;
use crate::value::{Value, VariableType};

/// User-supplied metadata attached to a variable.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// What happens to a variable when its TTL runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpireAction {
    /// Set the value to the expiry value (or the type default).
    #[default]
    Reset,
    /// Remove the variable from the store.
    Delete,
}

impl ExpireAction {
    /// Returns the canonical lowercase name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpireAction::Reset => "reset",
            ExpireAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ExpireAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown expire action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown expire action '{0}' (expected reset or delete)")]
pub struct ParseExpireActionError(pub String);

impl FromStr for ExpireAction {
    type Err = ParseExpireActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reset" => Ok(ExpireAction::Reset),
            "delete" => Ok(ExpireAction::Delete),
            _ => Err(ParseExpireActionError(s.to_string())),
        }
    }
}

/// An armed TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expiry {
    /// When the TTL fires.
    pub expires_at: DateTime<Utc>,
    /// Value applied on reset, already coerced at arm time.
    pub expire_to: Value,
    /// Action taken when the TTL fires.
    pub expire_action: ExpireAction,
}

fn default_raw_value() -> Value {
    Value::String(String::new())
}

/// The durable record of a variable.
///
/// TTL state is never part of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Stable identifier.
    pub id: VariableId,

    /// Display name. Empty names fall back to the id.
    #[serde(default)]
    pub name: String,

    /// Last committed value.
    #[serde(default = "default_raw_value")]
    pub value: Value,

    /// Variable type.
    #[serde(rename = "type", alias = "var_type", default)]
    pub var_type: VariableType,

    /// Optional display icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// User-supplied metadata.
    #[serde(default)]
    pub attributes: Attributes,
}

impl VariableRecord {
    /// Creates a record from partial fields, applying creation defaults
    /// (`string` type, empty-string value).
    pub fn from_fields(id: VariableId, fields: &VariableFields) -> Self {
        Self {
            name: fields.name.clone().unwrap_or_else(|| id.to_string()),
            value: fields.value.clone().unwrap_or_else(default_raw_value),
            var_type: fields.var_type.unwrap_or_default(),
            icon: fields.icon.clone(),
            attributes: fields.attributes.clone().unwrap_or_default(),
            id,
        }
    }

    /// Returns the name, or the id when the name is empty.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Returns a copy with `fields` shallow-merged over this record.
    ///
    /// Present fields overwrite; absent fields keep their value. Attributes
    /// are merged key by key. The id never changes.
    pub fn merged(&self, fields: &VariableFields) -> Self {
        let mut merged = self.clone();
        if let Some(name) = &fields.name {
            merged.name = name.clone();
        }
        if let Some(value) = &fields.value {
            merged.value = value.clone();
        }
        if let Some(var_type) = fields.var_type {
            merged.var_type = var_type;
        }
        if let Some(icon) = &fields.icon {
            merged.icon = Some(icon.clone());
        }
        if let Some(attributes) = &fields.attributes {
            merged
                .attributes
                .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

/// A partial variable configuration used for create and update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableFields {
    pub name: Option<String>,
    pub value: Option<Value>,
    pub var_type: Option<VariableType>,
    pub icon: Option<String>,
    pub attributes: Option<Attributes>,
}

impl VariableFields {
    /// Creates an empty set of fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the raw value.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the type.
    pub fn with_type(mut self, var_type: VariableType) -> Self {
        self.var_type = Some(var_type);
        self
    }

    /// Sets the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Sets the attributes to merge.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Externally observable snapshot of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableState {
    pub id: VariableId,
    pub name: String,
    pub var_type: VariableType,
    /// Display state (`on`/`off` for booleans, absent for null values).
    pub state: Option<String>,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    /// The armed TTL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Expiry>,
}

impl VariableState {
    /// Returns the user attributes plus `var_type` and, while a TTL is armed,
    /// `expires_at` and `expire_action`.
    pub fn extra_attributes(&self) -> Attributes {
        let mut attrs = self.attributes.clone();
        attrs.insert("var_type".to_string(), self.var_type.as_str().into());
        if let Some(expiry) = &self.expiry {
            attrs.insert(
                "expires_at".to_string(),
                expiry.expires_at.to_rfc3339().into(),
            );
            attrs.insert(
                "expire_action".to_string(),
                expiry.expire_action.as_str().into(),
            );
        }
        attrs
    }
}
