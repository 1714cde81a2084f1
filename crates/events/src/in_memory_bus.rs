//! In-process bus for the engine's schedule events.
//!
//! Fan-out over `std::sync::mpsc`. A subscriber may carry a filter, which is
//! how tenant-scoped listeners see only their own periods and invoices.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use cadence_core::TenantId;

use crate::bus::{EventBus, Subscription};
use crate::envelope::EventEnvelope;

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send>;

struct Subscriber<M> {
    sender: mpsc::Sender<M>,
    filter: Option<Filter<M>>,
}

impl<M> Subscriber<M> {
    fn wants(&self, message: &M) -> bool {
        self.filter.as_ref().is_none_or(|f| f(message))
    }
}

/// Synchronous pub/sub with no IO. Disconnected subscribers are pruned on publish.
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the messages accepted by `filter`.
    pub fn subscribe_where<F>(&self, filter: F) -> Subscription<M>
    where
        F: Fn(&M) -> bool + Send + 'static,
    {
        self.attach(Some(Box::new(filter)))
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    fn attach(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel();
        // Poisoned: the subscription stays silent.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { sender, filter });
        }
        Subscription::new(receiver)
    }
}

impl<E: 'static> InMemoryEventBus<EventEnvelope<E>> {
    /// Subscribe to one tenant's events.
    pub fn subscribe_tenant(&self, tenant_id: TenantId) -> Subscription<EventEnvelope<E>> {
        self.subscribe_where(move |env: &EventEnvelope<E>| env.tenant_id() == tenant_id)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> std::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|sub| !sub.wants(&message) || sub.sender.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.attach(None)
    }
}
