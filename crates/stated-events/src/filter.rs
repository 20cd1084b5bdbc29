//! Event filtering for subscriptions and history queries.

use stated_models::{VariableEvent, VariableEventKind, VariableId};

/// Filter criteria for variable events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by exact variable id.
    pub variable_id: Option<VariableId>,
    /// Filter by variable id prefix.
    pub id_prefix: Option<String>,
    /// Filter by event kinds (any of).
    pub kinds: Option<Vec<VariableEventKind>>,
}

impl EventFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only change events.
    pub fn changes() -> Self {
        Self::new().with_kind(VariableEventKind::Changed)
    }

    /// Sets the variable id filter.
    pub fn with_variable_id(mut self, variable_id: VariableId) -> Self {
        self.variable_id = Some(variable_id);
        self
    }

    /// Sets the id prefix filter.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// Adds an accepted event kind.
    pub fn with_kind(mut self, kind: VariableEventKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Returns true if the event matches this filter.
    pub fn matches(&self, event: &VariableEvent) -> bool {
        if let Some(ref variable_id) = self.variable_id {
            if event.variable_id() != variable_id {
                return false;
            }
        }

        if let Some(ref prefix) = self.id_prefix {
            if !event.variable_id().as_str().starts_with(prefix.as_str()) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }

        true
    }
}
