//! Variable engine for Stated.
//!
//! This crate holds the runtime-variable lifecycle:
//! - `Variable` - one typed value with at most one armed TTL
//! - `VariableStore` - the collection, written through to storage
//! - `Command` - the operations callers apply to the store
//! - `Runtime` - main entry point owning the store and its timers
//!
//! # Example
//!
//! ```no_run
//! use stated_runtime::{Command, Runtime, RuntimeConfig, SetCommand};
//! use stated_models::VariableType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RuntimeConfig::new().with_state_dir("/tmp/stated");
//!     let mut runtime = Runtime::new(config).await?;
//!     runtime.start().await?;
//!
//!     // Turn the light on for five minutes
//!     runtime
//!         .execute(Command::Set(
//!             SetCommand::new("Kitchen Light")
//!                 .with_value(true)
//!                 .with_type(VariableType::Boolean)
//!                 .with_ttl(300),
//!         ))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! ## TTL
//!
//! Arming a TTL cancels any armed one and schedules a one-shot timer tagged
//! with a fresh generation. When it fires the variable either resets to its
//! expiry value or is removed. Timers whose generation no longer matches are
//! ignored. TTLs are never persisted; after a restart no TTL is armed.
//!
//! ## Change events
//!
//! A `Changed` event is published only when a variable's display state
//! (`on`/`off` for booleans, the string form otherwise) actually moves.

pub mod command;
pub mod config;
pub mod error;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod variable;

pub use command::{Command, CommandOutcome, SetCommand};
pub use config::{RuntimeConfig, DEFAULT_STORAGE_FILE};
pub use error::{Result, RuntimeError};
pub use runtime::Runtime;
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TimerKey, TokioScheduler};
pub use store::VariableStore;
pub use variable::{validate_ttl, Expired, Services, ValueUpdate, Variable};
