//! Reserved machine states and the state registry entry.
//!
//! User-defined operational states start at [`USER_MIN`]; everything below
//! is runtime-owned. [`KEEP_STATE`] never names a real state, it is the
//! sentinel a handler returns to stay where it is.

/// Handler return sentinel: keep the current state.
pub const KEEP_STATE: i32 = -42;

/// Peer or resource not reachable.
pub const NOT_AVAILABLE: i32 = -2;

/// Process alive but the dispatch loop is not running.
pub const NOT_READY: i32 = -1;

/// Dispatch loop running, no user state entered yet.
pub const READY: i32 = 0;

/// First state id available to user code.
pub const USER_MIN: i32 = 1;

/// Recoverable error state.
pub const ERROR: i32 = 0x100;

/// Unrecoverable error; the dispatch loop refuses further events.
pub const FATAL_ERROR: i32 = 0xffff;

/// Name and description of one registered state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDesc {
    pub name: String,
    pub description: String,
}

impl StateDesc {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// The runtime-owned states every machine carries from construction.
pub(crate) fn default_states() -> Vec<(i32, StateDesc)> {
    vec![
        (
            NOT_AVAILABLE,
            StateDesc::new("NotAvailable", "Resource not available"),
        ),
        (NOT_READY, StateDesc::new("NotReady", "Dispatch loop not running")),
        (READY, StateDesc::new("Ready", "Dispatch loop running")),
        (ERROR, StateDesc::new("ERROR", "Recoverable error")),
        (
            FATAL_ERROR,
            StateDesc::new("FATAL", "Unrecoverable error, events are discarded"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_distinct() {
        let ids = [KEEP_STATE, NOT_AVAILABLE, NOT_READY, READY, ERROR, FATAL_ERROR];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn defaults_cover_the_reserved_range() {
        let states = default_states();
        assert!(states.iter().any(|(id, _)| *id == NOT_READY));
        assert!(states.iter().any(|(id, _)| *id == READY));
        assert!(states.iter().any(|(id, _)| *id == FATAL_ERROR));
        // The sentinel is not a real state.
        assert!(!states.iter().any(|(id, _)| *id == KEEP_STATE));
    }
}
