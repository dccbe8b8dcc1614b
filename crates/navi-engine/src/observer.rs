//! Explicit subscribe/unsubscribe fan-out used by the orchestrator and the
//! conversation mapper.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end handed to a subscriber. Dropping it unsubscribes lazily.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(v) = self.rx.try_recv() {
            out.push(v);
        }
        out
    }
}

#[derive(Debug)]
pub struct Observers<T> {
    next_id: u64,
    senders: Vec<(SubscriptionId, mpsc::UnboundedSender<T>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            senders: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.senders.push((id, tx));
        Subscription { id, rx }
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(sid, _)| *sid != id);
        self.senders.len() != before
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl<T: Clone> Observers<T> {
    /// Deliver to every live subscriber, pruning the ones whose receiver is gone.
    pub fn emit(&mut self, value: &T) {
        self.senders.retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }
}
