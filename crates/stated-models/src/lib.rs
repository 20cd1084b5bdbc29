//! Core data models for Stated.
//!
//! This crate provides the fundamental data types used throughout the
//! Stated runtime-variable engine: ids, typed values and their coercion
//! rules, durable variable records, and the events variables emit.

pub mod event;
pub mod ids;
pub mod value;
pub mod variable;

// Re-export main types
pub use event::{ChangeEvent, VariableEvent, VariableEventKind};
pub use ids::{slugify, EventId, VariableId};
pub use value::{ParseVariableTypeError, Value, VariableType, STATE_OFF, STATE_ON};
pub use variable::{
    Attributes, ExpireAction, Expiry, ParseExpireActionError, VariableFields, VariableRecord,
    VariableState,
};
