//! Change-event fan-out for Stated.
//!
//! This crate provides the `EventSink` seam the variable engine publishes
//! through, and `EventBus`, its in-process implementation:
//! - Pub/sub notifications using `mpsc` channels, optionally filtered
//! - A bounded history of recent events
//!
//! # Example
//!
//! ```no_run
//! use stated_events::{EventBus, EventFilter};
//!
//! let bus = EventBus::new();
//!
//! // Subscribe to display-state changes only
//! let receiver = bus.subscribe_filtered(EventFilter::changes());
//!
//! while let Ok(event) = receiver.recv() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod bus;
pub mod filter;

pub use bus::{EventBus, EventSink, DEFAULT_HISTORY_LIMIT};
pub use filter::EventFilter;
