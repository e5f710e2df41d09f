//! In-process typed publish/subscribe bus.
//!
//! The bus is the sole coupling between the recognition engine and the
//! generation orchestrator — neither references the other directly, which
//! keeps both independently testable. It is an explicitly constructed,
//! injectable object owned by the process bootstrap, not ambient global
//! state.
//!
//! Semantics: synchronous fan-out to all current subscribers of a topic, in
//! subscription order; subscribing does not replay past events; there is no
//! retained history.

use crate::model::RecognitionResult;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Named event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RecognitionQueued,
    RecognitionStart,
    RecognitionSuccess,
    RecognitionError,
    GenerationQueued,
    GenerationStart,
    GenerationSuccess,
    GenerationError,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::RecognitionQueued => "recognition:queued",
            Topic::RecognitionStart => "recognition:start",
            Topic::RecognitionSuccess => "recognition:success",
            Topic::RecognitionError => "recognition:error",
            Topic::GenerationQueued => "generation:queued",
            Topic::GenerationStart => "generation:start",
            Topic::GenerationSuccess => "generation:success",
            Topic::GenerationError => "generation:error",
        };
        f.write_str(name)
    }
}

/// Which generation step an event is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSubtype {
    Markdown,
    Docx,
    Pdf,
    /// The overall four-step pipeline.
    All,
}

impl GenerationSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationSubtype::Markdown => "markdown",
            GenerationSubtype::Docx => "docx",
            GenerationSubtype::Pdf => "pdf",
            GenerationSubtype::All => "all",
        }
    }
}

impl fmt::Display for GenerationSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline lifecycle event with its payload.
///
/// `key` is the entity (page) identifier throughout. Recognition results
/// travel as `Arc` so fan-out does not clone potentially large box lists.
#[derive(Debug, Clone)]
pub enum BusEvent {
    RecognitionQueued {
        key: String,
    },
    RecognitionStart {
        key: String,
    },
    RecognitionSuccess {
        key: String,
        result: Arc<RecognitionResult>,
    },
    RecognitionError {
        key: String,
        error: String,
    },
    GenerationQueued {
        key: String,
    },
    GenerationStart {
        key: String,
        subtype: GenerationSubtype,
    },
    GenerationSuccess {
        key: String,
        subtype: GenerationSubtype,
    },
    GenerationError {
        key: String,
        subtype: GenerationSubtype,
        error: String,
    },
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::RecognitionQueued { .. } => Topic::RecognitionQueued,
            BusEvent::RecognitionStart { .. } => Topic::RecognitionStart,
            BusEvent::RecognitionSuccess { .. } => Topic::RecognitionSuccess,
            BusEvent::RecognitionError { .. } => Topic::RecognitionError,
            BusEvent::GenerationQueued { .. } => Topic::GenerationQueued,
            BusEvent::GenerationStart { .. } => Topic::GenerationStart,
            BusEvent::GenerationSuccess { .. } => Topic::GenerationSuccess,
            BusEvent::GenerationError { .. } => Topic::GenerationError,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BusEvent::RecognitionQueued { key }
            | BusEvent::RecognitionStart { key }
            | BusEvent::RecognitionSuccess { key, .. }
            | BusEvent::RecognitionError { key, .. }
            | BusEvent::GenerationQueued { key }
            | BusEvent::GenerationStart { key, .. }
            | BusEvent::GenerationSuccess { key, .. }
            | BusEvent::GenerationError { key, .. } => key,
        }
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Typed publish/subscribe channel with named topics.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<(Topic, Handler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one topic. Handlers are invoked synchronously
    /// during [`EventBus::publish`], in subscription order.
    pub fn on(&self, topic: Topic, handler: impl Fn(&BusEvent) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push((topic, Arc::new(handler)));
    }

    /// Fan an event out to every current subscriber of its topic.
    ///
    /// The subscriber list is snapshotted before invocation so a handler
    /// may itself publish or subscribe without deadlocking.
    pub fn publish(&self, event: &BusEvent) {
        trace!(topic = %event.topic(), key = event.key(), "publish");
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.lock().expect("event bus lock poisoned");
            subscribers
                .iter()
                .filter(|(topic, _)| *topic == event.topic())
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };
        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(key: &str) -> BusEvent {
        BusEvent::RecognitionQueued { key: key.into() }
    }

    #[test]
    fn fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            bus.on(Topic::RecognitionQueued, move |_| {
                seen.lock().unwrap().push(tag);
            });
        }

        bus.publish(&queued("p1"));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(&queued("p1"));

        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        bus.on(Topic::RecognitionQueued, move |_| {
            *counter.lock().unwrap() += 1;
        });

        assert_eq!(*seen.lock().unwrap(), 0, "past events must not replay");
        bus.publish(&queued("p2"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn other_topics_not_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        bus.on(Topic::RecognitionError, move |_| {
            *counter.lock().unwrap() += 1;
        });

        bus.publish(&queued("p1"));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = Arc::clone(&bus);
        let inner_seen = Arc::clone(&seen);
        bus.on(Topic::RecognitionSuccess, move |event| {
            inner_seen.lock().unwrap().push("success");
            inner_bus.publish(&BusEvent::GenerationQueued {
                key: event.key().to_string(),
            });
        });
        let outer_seen = Arc::clone(&seen);
        bus.on(Topic::GenerationQueued, move |_| {
            outer_seen.lock().unwrap().push("gen-queued");
        });

        bus.publish(&BusEvent::RecognitionSuccess {
            key: "p1".into(),
            result: Arc::new(crate::model::RecognitionResult {
                success: true,
                text: String::new(),
                raw_text: None,
                boxes: vec![],
                image_dims: Default::default(),
            }),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["success", "gen-queued"]);
    }

    #[test]
    fn topic_names_match_wire_format() {
        assert_eq!(Topic::RecognitionSuccess.to_string(), "recognition:success");
        assert_eq!(Topic::GenerationError.to_string(), "generation:error");
    }
}
