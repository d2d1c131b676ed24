//! Event dispatch by envelope type.
//!
//! The registry is assembled once through [`HandlerRegistryBuilder`] and then
//! moved into the channel driver. It has no registration method, so the set of
//! handlers cannot change while a session is running.

use std::{collections::HashMap, fmt};

use tracing::{trace, warn};

use super::types::Envelope;

/// Callback invoked for one event type.
pub type EventHandler = Box<dyn FnMut(&Envelope) + Send + 'static>;

/// Fixed mapping from event type to handler.
pub struct HandlerRegistry {
    handlers: HashMap<String, EventHandler>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// A registry without handlers. Every envelope is ignored.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Invoke the handler registered for `envelope.event_type`.
    ///
    /// Returns `false` when no handler is registered; such envelopes are
    /// silently ignored.
    pub fn dispatch(&mut self, envelope: &Envelope) -> bool {
        match self.handlers.get_mut(&envelope.event_type) {
            Some(handler) => {
                handler(envelope);
                true
            }
            None => {
                trace!(event_type = %envelope.event_type, "No handler registered");
                false
            }
        }
    }

    /// Check if a handler is registered for an event type.
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("event_types", &types)
            .finish()
    }
}

/// Builder for [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, EventHandler>,
}

impl HandlerRegistryBuilder {
    /// Register the handler of an event type.
    ///
    /// Registering the same type twice keeps the last handler.
    #[must_use]
    pub fn on<F>(mut self, event_type: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&Envelope) + Send + 'static,
    {
        let event_type = event_type.into();
        if self
            .handlers
            .insert(event_type.clone(), Box::new(handler))
            .is_some()
        {
            warn!(%event_type, "Handler registered twice, keeping the last one");
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[test]
    fn dispatch_invokes_matching_handler_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut registry = HandlerRegistry::builder()
            .on("move", move |envelope| {
                log.lock().unwrap().push(envelope.payload.clone());
            })
            .build();

        for ply in 1..=3 {
            assert!(registry.dispatch(&Envelope::versioned("move", json!(ply), ply)));
        }

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn unregistered_types_are_ignored() {
        let mut registry = HandlerRegistry::builder().on("n", |_| {}).build();
        assert!(!registry.dispatch(&Envelope::new("featured", json!({}))));
        assert!(registry.handles("n"));
        assert!(!registry.handles("featured"));
    }

    #[test]
    fn duplicate_registration_keeps_last() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&hits);
        let second = Arc::clone(&hits);
        let mut registry = HandlerRegistry::builder()
            .on("n", move |_| first.lock().unwrap().push("first"))
            .on("n", move |_| second.lock().unwrap().push("second"))
            .build();

        registry.dispatch(&Envelope::new("n", json!(1)));
        assert_eq!(registry.len(), 1);
        assert_eq!(*hits.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn handlers_may_keep_state() {
        let total = Arc::new(Mutex::new(0u64));
        let sink = Arc::clone(&total);
        let mut count = 0u64;
        let mut registry = HandlerRegistry::builder()
            .on("tick", move |_| {
                count += 1;
                *sink.lock().unwrap() = count;
            })
            .build();

        registry.dispatch(&Envelope::new("tick", json!(null)));
        registry.dispatch(&Envelope::new("tick", json!(null)));
        assert_eq!(*total.lock().unwrap(), 2);
    }

    #[test]
    fn empty_registry_and_debug() {
        let registry = HandlerRegistry::empty();
        assert!(registry.is_empty());
        let registry = HandlerRegistry::builder().on("b", |_| {}).on("a", |_| {}).build();
        assert_eq!(
            format!("{registry:?}"),
            r#"HandlerRegistry { event_types: ["a", "b"] }"#
        );
    }
}
