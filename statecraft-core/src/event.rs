//! Transition lifecycle notifications.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;

/// Lifecycle phase of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Published after the transition is allowed, before the action runs.
    Transitioning,
    /// Published after the subject is saved and history recorded.
    Transitioned,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Transitioning => f.write_str("transitioning"),
            EventKind::Transitioned => f.write_str("transitioned"),
        }
    }
}

/// Event data delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: EventKind,
    pub subject_type: String,
    pub subject_id: Option<String>,
    pub state_machine: String,
    pub from: String,
    pub to: String,
    /// Guard in string form.
    pub guard: Option<String>,
    pub action: Option<String>,
}

/// Destination of lifecycle notifications.
pub trait NotificationBus: Send + Sync {
    fn publish(&self, event: &TransitionEvent);
}

/// Filter for subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only these phases (empty = all).
    pub kinds: Vec<EventKind>,
    /// Only events for these machines (empty = all).
    pub machines: Vec<String>,
    /// Only events FROM these states (empty = all).
    pub from_states: Vec<String>,
    /// Only events TO these states (empty = all).
    pub to_states: Vec<String>,
}

impl EventFilter {
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn machine(mut self, machine: impl Into<String>) -> Self {
        self.machines.push(machine.into());
        self
    }

    /// Returns true if the event matches this filter.
    pub fn matches(&self, event: &TransitionEvent) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.machines.is_empty() || self.machines.contains(&event.state_machine))
            && (self.from_states.is_empty() || self.from_states.contains(&event.from))
            && (self.to_states.is_empty() || self.to_states.contains(&event.to))
    }
}

type Listener = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

#[derive(Clone)]
enum Delivery {
    Listener(Listener),
    Channel(mpsc::Sender<TransitionEvent>),
}

#[derive(Clone)]
struct Subscription {
    filter: EventFilter,
    delivery: Delivery,
}

/// In-process notification bus with filtered subscriptions.
///
/// Listeners run synchronously on the publishing thread, in no particular
/// order. Channel subscriptions whose receiver was dropped are removed on the
/// next publish.
#[derive(Default)]
pub struct EventBus {
    subscriptions: DashMap<String, Subscription>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener. Returns the subscription id.
    pub fn subscribe<F>(&self, filter: EventFilter, listener: F) -> String
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.insert(filter, Delivery::Listener(Arc::new(listener)))
    }

    /// Subscribes a channel.
    ///
    /// Returns (subscription_id, receiver).
    pub fn subscribe_channel(
        &self,
        filter: EventFilter,
    ) -> (String, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel();
        (self.insert(filter, Delivery::Channel(tx)), rx)
    }

    fn insert(&self, filter: EventFilter, delivery: Delivery) -> String {
        let subscription_id = format!("sub-{}", uuid::Uuid::new_v4());
        self.subscriptions
            .insert(subscription_id.clone(), Subscription { filter, delivery });
        tracing::debug!(subscription_id = %subscription_id, "subscribed to transition events");
        subscription_id
    }

    /// Unsubscribes.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    /// Returns the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl NotificationBus for EventBus {
    fn publish(&self, event: &TransitionEvent) {
        // Snapshot matches first; listeners may (un)subscribe re-entrantly.
        let targets: Vec<(String, Delivery)> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().filter.matches(event))
            .map(|entry| (entry.key().clone(), entry.value().delivery.clone()))
            .collect();

        for (subscription_id, delivery) in targets {
            match delivery {
                Delivery::Listener(listener) => listener(event),
                Delivery::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        tracing::debug!(subscription_id = %subscription_id, "receiver dropped, removing subscription");
                        self.subscriptions.remove(&subscription_id);
                    }
                }
            }
        }
    }
}
