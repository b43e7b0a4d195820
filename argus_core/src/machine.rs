//! Finite-state-machine event dispatcher.
//!
//! A [`StateMachine`] owns a state registry, an event registry and a dispatch
//! FIFO. Producers on any thread post events; one dedicated dispatcher thread
//! runs [`StateMachine::run`], popping and handling one event per iteration.
//! All state changes go through the dispatcher, so handlers never race each
//! other and the current state is only ever written by one thread.
//!
//! The registry lock and the FIFO lock are separate: registering events or
//! rendering help output never blocks event posting, and vice versa.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use argus_codec::{CodecError, Schema};
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::event::{Event, EventHandle, EventKind, EventSlot};
use crate::state::{self, StateDesc};

const DEFAULT_POLL: Duration = Duration::from_millis(10);

struct Registry {
    states: BTreeMap<i32, StateDesc>,
    events: Vec<Arc<EventSlot>>,
}

/// Serialized event dispatcher with a typed state registry.
pub struct StateMachine {
    name: String,
    registry: Mutex<Registry>,
    fifo: Mutex<VecDeque<Event>>,
    cond: Condvar,
    current: AtomicI32,
    /// Raw exit-request word from `stop(code)`. Zero means no exit requested,
    /// so `stop(0)` is ignored and `run()` returns `code - 1`.
    exit_request: AtomicI32,
    running: AtomicBool,
    buffering: AtomicBool,
    poll_ms: AtomicU64,
}

impl StateMachine {
    /// Create a machine named `name` with the runtime-owned states
    /// registered and the current state at NotReady.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registry: Mutex::new(Registry {
                states: state::default_states().into_iter().collect(),
                events: Vec::new(),
            }),
            fifo: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            current: AtomicI32::new(state::NOT_READY),
            exit_request: AtomicI32::new(0),
            running: AtomicBool::new(false),
            buffering: AtomicBool::new(true),
            poll_ms: AtomicU64::new(DEFAULT_POLL.as_millis() as u64),
        }
    }

    /// Create a machine and apply loop settings from the configuration.
    pub fn with_config(name: &str, config: &RuntimeConfig) -> Self {
        let machine = Self::new(name);
        machine
            .poll_ms
            .store(config.poll_interval_ms, Ordering::Relaxed);
        machine
            .buffering
            .store(config.buffer_events, Ordering::Relaxed);
        machine
    }

    /// Machine name, the prefix of every event it owns.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── State registry ───

    /// Register a user state. Ids below [`state::USER_MIN`] and duplicates
    /// are rejected with a warning.
    pub fn add_state(&self, id: i32, name: &str, description: &str) -> bool {
        if id < state::USER_MIN {
            warn!(machine = %self.name, id, name, "state id is reserved");
            return false;
        }
        let mut reg = self.registry();
        if reg.states.contains_key(&id) {
            warn!(machine = %self.name, id, name, "state id already registered");
            return false;
        }
        reg.states.insert(id, StateDesc::new(name, description));
        true
    }

    /// Current state, readable from any thread.
    pub fn state(&self) -> i32 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn has_state(&self, id: i32) -> bool {
        id != state::KEEP_STATE && self.registry().states.contains_key(&id)
    }

    /// Look up a state id by its registered name.
    pub fn state_index(&self, name: &str) -> Option<i32> {
        self.registry()
            .states
            .iter()
            .find(|(_, desc)| desc.name == name)
            .map(|(id, _)| *id)
    }

    pub fn state_name(&self, id: i32) -> Option<String> {
        self.registry().states.get(&id).map(|d| d.name.clone())
    }

    pub fn state_desc(&self, id: i32) -> Option<String> {
        self.registry()
            .states
            .get(&id)
            .map(|d| d.description.clone())
    }

    /// "Name[id]" rendering used in logs and remote output.
    pub fn state_description(&self, id: i32) -> String {
        match self.registry().states.get(&id) {
            Some(desc) => format!("{}[{}]", desc.name, id),
            None => format!("Unknown[{id}]"),
        }
    }

    /// Manual nudge into Ready, outside the dispatch loop.
    pub fn set_ready(&self) {
        self.set_state(state::READY, "set_ready");
    }

    /// Manual nudge back to NotReady, outside the dispatch loop.
    pub fn set_not_ready(&self) {
        self.set_state(state::NOT_READY, "set_not_ready");
    }

    fn set_state(&self, new: i32, why: &str) {
        let old = self.current.swap(new, Ordering::SeqCst);
        if old != new {
            info!(
                machine = %self.name,
                from = %self.state_description(old),
                to = %self.state_description(new),
                why,
                "state changed"
            );
        }
    }

    // ─── Event registry ───

    /// Register a command with its payload format and allowed-state list
    /// (empty = allowed in every state). The returned handle attaches the
    /// handler and documentation. `name` is qualified with the machine name
    /// unless it already contains a `/`.
    pub fn add_event(&self, name: &str, allowed_states: &[i32], fmt: &str) -> EventHandle {
        let full = self.qualify(name);
        let schema = Schema::compile(fmt, false);
        if !schema.valid() {
            warn!(machine = %self.name, event = %full, fmt, "event format invalid");
        }

        let mut reg = self.registry();
        if let Some(existing) = reg.events.iter().find(|s| s.name() == full) {
            warn!(machine = %self.name, event = %full, "event already registered");
            return EventHandle::new(Arc::clone(existing));
        }

        let slot = EventSlot::new(&full, EventKind::Command, schema, allowed_states.to_vec());
        reg.events.push(Arc::clone(&slot));
        debug!(machine = %self.name, event = %full, fmt, "event registered");
        EventHandle::new(slot)
    }

    /// Subscribe to a service published elsewhere on the bus. The payload is
    /// opaque until a handler is attached that knows its layout.
    pub fn subscribe(&self, service: &str) -> EventHandle {
        let schema = Schema::compile("", false);
        let mut reg = self.registry();
        if let Some(existing) = reg.events.iter().find(|s| s.name() == service) {
            warn!(machine = %self.name, service, "already subscribed");
            return EventHandle::new(Arc::clone(existing));
        }

        let slot = EventSlot::new(service, EventKind::Subscription, schema, Vec::new());
        reg.events.push(Arc::clone(&slot));
        debug!(machine = %self.name, service, "subscribed");
        EventHandle::new(slot)
    }

    /// Remove a registration. Returns whether it was present.
    pub fn unsubscribe(&self, handle: &EventHandle) -> bool {
        let mut reg = self.registry();
        let before = reg.events.len();
        reg.events.retain(|s| !Arc::ptr_eq(s, handle.slot()));
        before != reg.events.len()
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.find_slot(name).is_some()
    }

    fn qualify(&self, name: &str) -> String {
        if name.contains('/') {
            name.to_string()
        } else {
            format!("{}/{}", self.name, name)
        }
    }

    fn find_slot(&self, name: &str) -> Option<Arc<EventSlot>> {
        let full = self.qualify(name);
        self.registry()
            .events
            .iter()
            .find(|s| s.name() == full)
            .cloned()
    }

    // ─── Posting ───

    /// Append an event to the dispatch FIFO.
    ///
    /// Discarded with a warning (returns `false`) when the machine is in
    /// FatalError, or when it is not running and buffering is off.
    pub fn post(&self, event: Event) -> bool {
        if self.state() == state::FATAL_ERROR {
            warn!(machine = %self.name, event = %event.name(), "discarded, machine is in FATAL");
            return false;
        }
        if !self.running.load(Ordering::SeqCst) && !self.buffering.load(Ordering::SeqCst) {
            warn!(machine = %self.name, event = %event.name(), "discarded, loop not running and buffering is off");
            return false;
        }

        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        fifo.push_back(event);
        self.cond.notify_one();
        true
    }

    /// Resolve a console line "CMD args..." against the event registry,
    /// encode the arguments through the command's schema and post the event.
    ///
    /// An unknown command is logged and returns `Ok(false)`; malformed
    /// arguments surface as the codec error.
    pub fn post_text(&self, line: &str) -> Result<bool, CodecError> {
        let line = line.trim();
        let (cmd, args) = match line.find(char::is_whitespace) {
            Some(split) => (&line[..split], line[split..].trim_start()),
            None => (line, ""),
        };

        let Some(slot) = self.find_slot(cmd) else {
            warn!(machine = %self.name, command = cmd, "unknown command");
            return Ok(false);
        };

        let event = Event::from_text(&slot, args).map_err(|err| {
            warn!(machine = %self.name, command = cmd, %err, "argument conversion failed");
            err
        })?;
        Ok(self.post(event))
    }

    /// Accept (default) or reject posts while the loop is not running.
    pub fn set_buffering(&self, enable: bool) {
        self.buffering.store(enable, Ordering::SeqCst);
    }

    /// Request loop exit with a nonzero code; `run()` returns `code - 1`.
    /// `stop(0)` is ignored, zero meaning "no exit requested".
    pub fn stop(&self, code: i32) {
        if code == 0 {
            warn!(machine = %self.name, "stop(0) ignored");
            return;
        }
        self.exit_request.store(code, Ordering::SeqCst);
        let _fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_one();
    }

    // ─── Dispatch loop ───

    /// Run the dispatch loop until [`StateMachine::stop`] or a fatal state.
    ///
    /// Must be entered from NotReady; transitions to Ready. Returns
    /// `code - 1` on a requested exit (final state NotReady) or -1 on a
    /// fatal exit (state left at FatalError).
    pub fn run(&self) -> i32 {
        self.run_with(|| state::KEEP_STATE)
    }

    /// Like [`StateMachine::run`], with a hook applied after every iteration.
    /// The hook's return value obeys the same new-state rules as a handler.
    pub fn run_with<F: FnMut() -> i32>(&self, mut hook: F) -> i32 {
        if self.state() != state::NOT_READY {
            error!(
                machine = %self.name,
                state = %self.state_description(self.state()),
                "run() requires NotReady"
            );
            return -1;
        }

        self.running.store(true, Ordering::SeqCst);
        self.set_state(state::READY, "run loop started");

        loop {
            let code = self.exit_request.swap(0, Ordering::SeqCst);
            if code != 0 {
                info!(machine = %self.name, code, "loop exit requested");
                self.running.store(false, Ordering::SeqCst);
                self.set_state(state::NOT_READY, "run loop stopped");
                return code - 1;
            }

            let event = self.pop_event();
            if let Some(event) = event {
                if !self.dispatch(&event) {
                    break;
                }
            }

            if !self.handle_new_state(hook(), "execute hook") {
                break;
            }
        }

        error!(machine = %self.name, "loop terminated by fatal state");
        self.running.store(false, Ordering::SeqCst);
        -1
    }

    fn pop_event(&self) -> Option<Event> {
        let poll = Duration::from_millis(self.poll_ms.load(Ordering::Relaxed).max(1));
        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        if fifo.is_empty() {
            // Bounded wait so exit requests are seen even without traffic.
            let (guard, _) = self
                .cond
                .wait_timeout(fifo, poll)
                .unwrap_or_else(PoisonError::into_inner);
            fifo = guard;
        }
        fifo.pop_front()
    }

    /// Dispatch one event. Returns `false` when the loop must die.
    fn dispatch(&self, event: &Event) -> bool {
        let current = self.state();

        if current == state::FATAL_ERROR {
            warn!(machine = %self.name, event = %event.name(), "discarded, machine is in FATAL");
            return true;
        }

        let slot = event.slot();
        if !slot.is_allowed_in(current) {
            warn!(
                machine = %self.name,
                event = %event.name(),
                state = %self.state_description(current),
                "discarded, not allowed in current state"
            );
            return true;
        }

        match slot.invoke(event) {
            Some(rc) => self.handle_new_state(rc, event.name()),
            None => {
                warn!(machine = %self.name, event = %event.name(), "discarded, no handler attached");
                true
            }
        }
    }

    /// Apply a requested state. Returns `false` only for FatalError.
    fn handle_new_state(&self, rc: i32, why: &str) -> bool {
        if rc == state::KEEP_STATE || rc == self.state() {
            return true;
        }
        if rc == state::FATAL_ERROR {
            self.set_state(state::FATAL_ERROR, why);
            return false;
        }
        if !self.has_state(rc) {
            warn!(machine = %self.name, requested = rc, why, "unknown state requested, keeping current");
            return true;
        }
        self.set_state(rc, why);
        true
    }

    // ─── Introspection ───

    /// Registered event names with this machine's prefix stripped.
    pub fn list_event_names(&self) -> Vec<String> {
        let prefix = format!("{}/", self.name);
        self.registry()
            .events
            .iter()
            .map(|s| {
                s.name()
                    .strip_prefix(&prefix)
                    .unwrap_or(s.name())
                    .to_string()
            })
            .collect()
    }

    /// Human-readable state table; the current state is starred.
    pub fn print_states(&self) -> String {
        let current = self.state();
        let reg = self.registry();
        let mut out = String::new();
        for (id, desc) in &reg.states {
            let marker = if *id == current { " <--" } else { "" };
            out.push_str(&format!("{}[{}]: {}{}\n", desc.name, id, desc.description, marker));
        }
        out
    }

    /// Human-readable event table, optionally filtered by substring.
    pub fn print_events(&self, filter: Option<&str>) -> String {
        let reg = self.registry();
        let mut out = String::new();
        for slot in &reg.events {
            if let Some(f) = filter {
                if !slot.name().contains(f) {
                    continue;
                }
            }
            out.push_str(&format!("{}[{}]", slot.name(), slot.schema().format()));
            if !slot.allowed_states().is_empty() {
                let states: Vec<String> = slot
                    .allowed_states()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                out.push_str(&format!(" allowed={}", states.join(",")));
            }
            let doc = slot.description();
            if !doc.is_empty() {
                out.push_str(&format!("  {doc}"));
            }
            out.push('\n');
        }
        out
    }

    /// Like [`StateMachine::print_events`], restricted to events allowed in
    /// the current state.
    pub fn print_allowed_events(&self) -> String {
        let current = self.state();
        let reg = self.registry();
        let mut out = String::new();
        for slot in &reg.events {
            if slot.is_allowed_in(current) {
                out.push_str(&format!("{}[{}]\n", slot.name(), slot.schema().format()));
            }
        }
        out
    }
}
