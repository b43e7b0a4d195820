//! Network bus seam.
//!
//! The runtime never talks to a transport directly; it goes through the
//! [`Bus`] trait. Real processes plug in the site transport, tests and the
//! demo binary use the in-process [`LoopbackBus`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

/// Transport failures.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// No peer has registered the named command or service.
    #[error("no subscriber or server for '{0}'")]
    NoTarget(String),

    /// The transport itself failed.
    #[error("bus transport error: {0}")]
    Transport(String),
}

/// One delivery from the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub name: String,
    pub payload: Vec<u8>,
    pub timestamp: SystemTime,
    /// Transport quality word, carried through to the event.
    pub quality: i32,
}

/// Sink invoked for every delivery of a subscribed name.
pub type BusSink = Box<dyn Fn(BusMessage) + Send + Sync>;

/// Transport abstraction: named fire-and-forget commands plus named
/// subscriptions.
pub trait Bus: Send + Sync {
    /// Send a command payload to whoever serves `name`.
    fn send_command(&self, name: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Register a sink for every future delivery of `name`.
    fn subscribe(&self, name: &str, sink: BusSink) -> Result<(), BusError>;
}

/// In-process bus: deliveries run synchronously on the sender's thread.
#[derive(Default)]
pub struct LoopbackBus {
    sinks: Mutex<HashMap<String, Vec<BusSink>>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bus for LoopbackBus {
    fn send_command(&self, name: &str, payload: &[u8]) -> Result<(), BusError> {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(targets) = sinks.get(name) else {
            return Err(BusError::NoTarget(name.to_string()));
        };

        debug!(name, bytes = payload.len(), "loopback delivery");
        for sink in targets {
            sink(BusMessage {
                name: name.to_string(),
                payload: payload.to_vec(),
                timestamp: SystemTime::now(),
                quality: 0,
            });
        }
        Ok(())
    }

    fn subscribe(&self, name: &str, sink: BusSink) -> Result<(), BusError> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(sink);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn delivers_to_subscribers() {
        let bus = LoopbackBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(
            "DRIVE/MOVE",
            Box::new(move |msg| {
                assert_eq!(msg.name, "DRIVE/MOVE");
                assert_eq!(msg.payload, vec![1, 2, 3]);
                h.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        bus.send_command("DRIVE/MOVE", &[1, 2, 3]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let bus = LoopbackBus::new();
        assert!(matches!(
            bus.send_command("NOWHERE/CMD", &[]),
            Err(BusError::NoTarget(_))
        ));
    }

    #[test]
    fn multiple_sinks_all_fire() {
        let bus = LoopbackBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = Arc::clone(&hits);
            bus.subscribe(
                "T/SVC",
                Box::new(move |_| {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }
        bus.send_command("T/SVC", &[]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
