use crate::scoring::ScoreResult;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ScoringUpdate { wpm: f64 },
    TestCompleted {
        tester: String,
        score: ScoreResult,
        new_record: bool,
    },
    LanguageChanged { tag: String },
}

/// Receives events synchronously on the publishing thread. Listeners that
/// touch a rendering surface must hand off on their own.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Forwards a clone of every event into a channel.
pub struct ChannelListener {
    tx: Sender<Event>,
}

impl ChannelListener {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }
}

impl Listener for ChannelListener {
    fn on_event(&self, event: &Event) {
        // a dropped receiver just means nobody is watching any more
        let _ = self.tx.send(event.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered publish/subscribe. Delivery follows subscription order and
/// `publish` returns after every listener ran.
#[derive(Default)]
pub struct NotificationBus {
    listeners: Vec<(ListenerId, Arc<dyn Listener>)>,
    next_id: u64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn publish(&self, event: &Event) {
        for (_, listener) in &self.listeners {
            listener.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
