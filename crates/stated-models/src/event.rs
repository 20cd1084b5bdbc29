//! Events emitted by variables and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, VariableId};
use crate::value::VariableType;
use crate::variable::VariableState;

/// A variable's display state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique identifier for the event.
    pub id: EventId,
    /// The variable that changed.
    pub variable_id: VariableId,
    /// Display name of the variable at the time of the change.
    pub name: String,
    /// Type of the variable at the time of the change.
    pub var_type: VariableType,
    /// Display state before the change.
    pub old_state: Option<String>,
    /// Display state after the change.
    pub new_state: Option<String>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates a new change event stamped with the current time.
    pub fn new(
        variable_id: VariableId,
        name: impl Into<String>,
        var_type: VariableType,
        old_state: Option<String>,
        new_state: Option<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            variable_id,
            name: name.into(),
            var_type,
            old_state,
            new_state,
            timestamp: Utc::now(),
        }
    }
}

/// Kind of a [`VariableEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableEventKind {
    Created,
    Changed,
    StateWritten,
    Removed,
}

/// Everything the variable engine publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VariableEvent {
    /// A variable was added to the store.
    Created(VariableState),
    /// A variable's display state changed.
    Changed(ChangeEvent),
    /// A variable's observable state was written (value, attributes or TTL).
    StateWritten(VariableState),
    /// A variable was removed from the store.
    Removed { variable_id: VariableId },
}

impl VariableEvent {
    /// Returns the variable this event is about.
    pub fn variable_id(&self) -> &VariableId {
        match self {
            VariableEvent::Created(state) => &state.id,
            VariableEvent::Changed(change) => &change.variable_id,
            VariableEvent::StateWritten(state) => &state.id,
            VariableEvent::Removed { variable_id } => variable_id,
        }
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> VariableEventKind {
        match self {
            VariableEvent::Created(_) => VariableEventKind::Created,
            VariableEvent::Changed(_) => VariableEventKind::Changed,
            VariableEvent::StateWritten(_) => VariableEventKind::StateWritten,
            VariableEvent::Removed { .. } => VariableEventKind::Removed,
        }
    }

    /// Returns the change payload if this is a change event.
    pub fn as_change(&self) -> Option<&ChangeEvent> {
        match self {
            VariableEvent::Changed(change) => Some(change),
            _ => None,
        }
    }
}
