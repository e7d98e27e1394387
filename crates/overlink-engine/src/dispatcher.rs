//! Handler registry mapping event kinds to behavior callbacks.
//!
//! The engine core stays behavior-free: everything the peer *does* in
//! response to an event lives in handlers registered here. A handler
//! inspects the event and returns the actions it wants applied; it
//! never touches the overlay or the engine tables directly.

use std::collections::HashMap;

use overlink_types::{Action, EngineEvent, EventKind};
use tracing::{debug, trace};

/// Behavior callback: inspects an event, returns follow-up actions.
pub type Handler = Box<dyn FnMut(&EngineEvent) -> Vec<Action> + Send>;

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Routes engine events to registered handlers.
///
/// At most one handler per [`EventKind`]; registering a second handler
/// for the same kind replaces the first. Events whose kind has no
/// handler are dropped after a trace log — an unhandled event is a
/// configuration choice, not an error.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Handler>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any previous handler.
    pub fn register<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&EngineEvent) -> Vec<Action> + Send + 'static,
    {
        if self.handlers.insert(kind, Box::new(handler)).is_some() {
            debug!(%kind, "replaced event handler");
        }
    }

    /// Hands an event to the handler for its kind and returns the
    /// actions that handler requested.
    pub fn dispatch(&mut self, event: &EngineEvent) -> Vec<Action> {
        match self.handlers.get_mut(&event.kind()) {
            Some(handler) => handler(event),
            None => {
                trace!(kind = %event.kind(), "no handler registered; event dropped");
                Vec::new()
            }
        }
    }

    /// True if a handler is registered for `kind`.
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
