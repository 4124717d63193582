//! Change notifications emitted by the fact store.
//!
//! # Responsibility
//! - Keep per-event subscriber lists.
//! - Call subscribers synchronously, in subscription order.
//!
//! # Invariants
//! - Events carry no payload: subscribers re-read what they display.
//! - Subscription ids are never reused within one notifier.

use log::debug;
use std::collections::BTreeMap;

/// Named change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreEvent {
    FactsChanged,
    ActivitiesChanged,
    TagsChanged,
}

impl StoreEvent {
    /// Stable signal name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FactsChanged => "facts-changed",
            Self::ActivitiesChanged => "activities-changed",
            Self::TagsChanged => "tags-changed",
        }
    }
}

/// Handle returned by `ChangeNotifier::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn() + Send + Sync>;

/// Observer registry keyed by event.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: BTreeMap<SubscriptionId, (StoreEvent, Callback)>,
    next_id: u64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `event`.
    pub fn subscribe(
        &mut self,
        event: StoreEvent,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, (event, Box::new(callback)));
        id
    }

    /// Removes a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Calls every subscriber of `event`.
    pub fn emit(&self, event: StoreEvent) {
        debug!("event=store_signal module=service signal={}", event.as_str());
        for (subscribed, callback) in self.subscribers.values() {
            if *subscribed == event {
                callback();
            }
        }
    }

    pub fn subscriber_count(&self, event: StoreEvent) -> usize {
        self.subscribers
            .values()
            .filter(|(subscribed, _)| *subscribed == event)
            .count()
    }
}
