//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes committed domain events to whoever listens (logging,
//! cache invalidation, audit). It is:
//!
//! - **Transport-agnostic**: in-memory channels today, a broker later
//! - **Broadcast**: every subscription receives every published message
//! - **Not storage**: the store is the source of truth, the bus only notifies

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to an event stream.
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// while let Ok(event) = subscription.recv() {
///     handle(event);
/// }
/// ```
///
/// Subscriptions are meant for a single consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail (e.g. a poisoned lock, a broker outage). Callers decide
/// whether that matters; the control panel logs it and carries on because the
/// change itself is already committed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
