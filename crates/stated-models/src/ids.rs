//! Type-safe ID wrappers and slug normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

/// Macro to generate ID newtypes with common functionality.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from an existing string (for deserialization/testing).
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(VariableId);
define_id!(EventId);

impl VariableId {
    /// Suggests the ID for a human-readable name.
    ///
    /// The result may be empty when the name has no ASCII alphanumerics.
    pub fn suggest(name: &str) -> Self {
        Self(slugify(name))
    }
}

impl EventId {
    /// Creates a new random ID.
    pub fn new() -> Self {
        Self(format!("evt-{}", Uuid::new_v4()))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern matching every maximal run of non-slug characters.
fn separator_runs() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static pattern is valid"))
}

/// Normalizes text into slug form.
///
/// Lowercases the input, collapses each run of characters outside
/// `[a-z0-9]` into a single `_`, and strips leading and trailing `_`.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    separator_runs()
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Kitchen Light"), "kitchen_light");
        assert_eq!(slugify("kitchen_light"), "kitchen_light");
    }

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("Garage -- Door!!"), "garage_door");
        assert_eq!(slugify("a...b///c"), "a_b_c");
    }

    #[test]
    fn test_slugify_strips_edges() {
        assert_eq!(slugify("  --Porch Light--  "), "porch_light");
        assert_eq!(slugify("kitchen_"), "kitchen");
    }

    #[test]
    fn test_slugify_non_ascii() {
        assert_eq!(slugify("Café Lights"), "caf_lights");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        let once = slugify("Living Room / Lamp 2");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn test_variable_id_suggest() {
        let id = VariableId::suggest("Kitchen Light");
        assert_eq!(id.as_str(), "kitchen_light");
    }

    #[test]
    fn test_event_id_prefix() {
        let id = EventId::new();
        assert!(id.as_str().starts_with("evt-"));
        assert_ne!(id, EventId::new());
    }

    #[test]
    fn test_id_serialization() {
        let id = VariableId::from_string("porch");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"porch\"");

        let parsed: VariableId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_display() {
        let id = VariableId::from_string("kitchen_fan");
        assert_eq!(format!("{}", id), "kitchen_fan");
    }
}
