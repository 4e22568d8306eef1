use crate::stream::ReportStream;
use crate::types::TimeValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A report delivered to subscribers during [`crate::Context::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEvent<T> {
    pub timestamp: TimeValue,
    /// Native sensor (channel) index within the interface.
    pub sensor: i32,
    pub value: T,
}

impl<T> ReportEvent<T> {
    /// Same timestamp and sensor, converted value.
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> ReportEvent<U> {
        ReportEvent {
            timestamp: self.timestamp,
            sensor: self.sensor,
            value: f(&self.value),
        }
    }
}

/// The current state of an interface along with the timestamp of the report
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceState<T> {
    pub timestamp: TimeValue,
    pub value: T,
}

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscriber callback.
pub type Handler<T> = Arc<dyn Fn(&ReportEvent<T>) + Send + Sync>;

/// Common surface of typed interfaces and adapters.
///
/// Subscribing starts the interface lazily; unsubscribing never stops it.
pub trait ReportSource: Send + Sync {
    type Report: Clone + Send + Sync + 'static;
    type State;

    /// Query the current state directly, independent of subscriptions.
    fn state(&self) -> crate::Result<InterfaceState<Self::State>>;

    /// Begin receiving reports. Idempotent.
    fn start(&self) -> crate::Result<()>;

    fn subscribe_handler(&self, handler: Handler<Self::Report>) -> crate::Result<SubscriptionId>;

    /// Remove a subscriber. Returns false if it was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Receive reports through a bounded channel instead of a callback.
    fn stream(&self) -> crate::Result<ReportStream<Self::Report>>;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    fn subscribe<F>(&self, handler: F) -> crate::Result<SubscriptionId>
    where
        F: Fn(&ReportEvent<Self::Report>) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_handler(Arc::new(handler))
    }
}

/// Ordered subscriber list.
///
/// Handlers are called on a snapshot, so a handler may subscribe or
/// unsubscribe while being called.
pub(crate) struct Subscribers<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, handler: Handler<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        crate::lock(&self.handlers).push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = crate::lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub(crate) fn clear(&self) {
        crate::lock(&self.handlers).clear();
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        crate::lock(&self.handlers)
            .iter()
            .any(|(existing, _)| *existing == id)
    }

    pub(crate) fn len(&self) -> usize {
        crate::lock(&self.handlers).len()
    }

    pub(crate) fn emit(&self, event: &ReportEvent<T>) {
        let snapshot: Vec<Handler<T>> = crate::lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }
}
