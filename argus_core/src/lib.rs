//! Shared runtime engine for ARGUS hardware-control processes.
//!
//! Every process in the fleet embeds the same runtime: it publishes named
//! services, accepts named commands, and runs a single-threaded dispatch
//! loop that serializes all state changes while events arrive asynchronously
//! from the network bus and from local callers.
//!
//! The pieces:
//!
//! - [`queue::WorkQueue`] — generic worker queue with explicit lifecycle and
//!   head-of-line-blocking backpressure,
//! - [`machine::StateMachine`] — the event dispatcher built on the same
//!   mutex + condvar pattern,
//! - [`event`] — event definitions ([`event::EventSlot`]) and instances
//!   ([`event::Event`]), payloads typed by `argus_codec` schemas,
//! - [`bus`] — the transport seam with an in-process loopback,
//! - [`config`] — TOML configuration shared by all processes.

pub mod bus;
pub mod config;
pub mod event;
pub mod machine;
pub mod queue;
pub mod state;

pub use bus::{Bus, BusError, BusMessage, LoopbackBus};
pub use config::{ConfigError, ConfigLoader, LogLevel, RuntimeConfig, SharedConfig};
pub use event::{Event, EventHandle, EventKind, EventOrigin, EventSlot};
pub use machine::StateMachine;
pub use queue::WorkQueue;
