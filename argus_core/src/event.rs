//! Event definitions and event instances.
//!
//! An [`EventSlot`] is the registered definition of a command or a service
//! subscription: name, payload schema, allowed-state list, optional handler
//! and documentation. An [`Event`] is one occurrence flowing through the
//! dispatch FIFO: a reference to its slot plus the payload bytes, a
//! timestamp and a quality word. Events are immutable after construction.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use argus_codec::{CodecError, Schema, Value};

/// What kind of definition a slot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A state-changing request addressed to this machine.
    Command,
    /// A service published elsewhere that this machine subscribed to.
    Subscription,
}

/// Where an event instance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Built locally from console text or by the process itself.
    Local,
    /// Delivered by the network bus.
    Bus,
    /// Produced by the runtime (shutdown requests and the like).
    Synthetic,
}

/// Handler invoked by the dispatch loop; returns the requested next state
/// (or [`crate::state::KEEP_STATE`]).
pub type Handler = Box<dyn Fn(&Event) -> i32 + Send + Sync>;

/// Registered definition of a command or subscription.
pub struct EventSlot {
    name: String,
    kind: EventKind,
    schema: Schema,
    /// States in which this event may be dispatched. Empty means all.
    allowed_states: Vec<i32>,
    handler: Mutex<Option<Handler>>,
    description: Mutex<String>,
}

impl EventSlot {
    pub(crate) fn new(
        name: &str,
        kind: EventKind,
        schema: Schema,
        allowed_states: Vec<i32>,
    ) -> Arc<Self> {
        // Negative ids are runtime-owned and never gate dispatch.
        let allowed_states: Vec<i32> =
            allowed_states.into_iter().filter(|s| *s >= 0).collect();
        Arc::new(Self {
            name: name.to_string(),
            kind,
            schema,
            allowed_states,
            handler: Mutex::new(None),
            description: Mutex::new(String::new()),
        })
    }

    /// Full event name, "MACHINE/NAME" form.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Payload schema this event was registered with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn allowed_states(&self) -> &[i32] {
        &self.allowed_states
    }

    /// Whether this event may be dispatched in `state`. An empty allowed
    /// list admits every state.
    pub fn is_allowed_in(&self, state: i32) -> bool {
        self.allowed_states.is_empty() || self.allowed_states.contains(&state)
    }

    pub fn description(&self) -> String {
        self.description
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Invoke the handler, if any, with the dispatcher's serialization
    /// guarantee. Returns the requested next state.
    pub(crate) fn invoke(&self, event: &Event) -> Option<i32> {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handler.as_ref().map(|h| h(event))
    }

    fn set_handler(&self, handler: Handler) {
        *self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn set_description(&self, text: &str) {
        *self
            .description
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = text.to_string();
    }
}

/// Caller-side handle to a registered slot. Attaches the handler and the
/// documentation string, builder style.
#[derive(Clone)]
pub struct EventHandle {
    slot: Arc<EventSlot>,
}

impl EventHandle {
    pub(crate) fn new(slot: Arc<EventSlot>) -> Self {
        Self { slot }
    }

    /// The underlying registered slot; needed by transport bridges that
    /// build [`Event::from_bus`] instances for it.
    pub fn slot(&self) -> &Arc<EventSlot> {
        &self.slot
    }

    /// Attach the handler invoked when this event is dispatched.
    pub fn assign<F>(self, handler: F) -> Self
    where
        F: Fn(&Event) -> i32 + Send + Sync + 'static,
    {
        self.slot.set_handler(Box::new(handler));
        self
    }

    /// Attach the help text shown by the remote describe output.
    pub fn describe(self, text: &str) -> Self {
        self.slot.set_description(text);
        self
    }

    pub fn name(&self) -> &str {
        self.slot.name()
    }

    pub fn schema(&self) -> &Schema {
        self.slot.schema()
    }
}

/// One event occurrence, immutable after construction.
pub struct Event {
    slot: Arc<EventSlot>,
    payload: Vec<u8>,
    time: SystemTime,
    quality: i32,
    origin: EventOrigin,
}

impl Event {
    /// Build an event from a console argument line, encoding the payload
    /// through the slot's schema.
    pub fn from_text(slot: &Arc<EventSlot>, text: &str) -> Result<Self, CodecError> {
        let payload = slot.schema().encode(text)?;
        Ok(Self {
            slot: Arc::clone(slot),
            payload,
            time: SystemTime::now(),
            quality: 0,
            origin: EventOrigin::Local,
        })
    }

    /// Build an event from a bus delivery. The payload is taken as-is; size
    /// validation happens when the handler decodes it.
    pub fn from_bus(
        slot: &Arc<EventSlot>,
        payload: Vec<u8>,
        time: SystemTime,
        quality: i32,
    ) -> Self {
        Self {
            slot: Arc::clone(slot),
            payload,
            time,
            quality,
            origin: EventOrigin::Bus,
        }
    }

    /// Build a runtime-internal event with an empty payload.
    pub fn synthetic(slot: &Arc<EventSlot>) -> Self {
        Self {
            slot: Arc::clone(slot),
            payload: Vec::new(),
            time: SystemTime::now(),
            quality: 0,
            origin: EventOrigin::Synthetic,
        }
    }

    pub fn name(&self) -> &str {
        self.slot.name()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn time(&self) -> SystemTime {
        self.time
    }

    pub fn quality(&self) -> i32 {
        self.quality
    }

    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    pub(crate) fn slot(&self) -> &Arc<EventSlot> {
        &self.slot
    }

    /// Decode the payload through the slot's schema.
    pub fn values(&self) -> Result<Vec<Value>, CodecError> {
        self.slot.schema().decode_values(&self.payload)
    }

    /// Decode the payload back into a console line.
    pub fn text(&self) -> Result<String, CodecError> {
        self.slot.schema().decode(&self.payload)
    }
}
