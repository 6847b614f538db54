//! Replication-boundary contracts: the events that cross between the
//! authoritative and rendering sides, an ordered scoped publish/subscribe
//! bus, and the single re-armable timer that drives the animation tick.
//!
//! The bus intentionally stays narrow: reliable in-order delivery to every
//! matching subscriber is the only guarantee the core asks of the hosting
//! replication framework, so that is the whole surface modelled here.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use lightconfig::CardConfig;

/// Identity of a replicated card instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardId(pub String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        CardId(id.into())
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery scope of a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The shared stimulus channel ("light").
    Light,
    /// Events addressed to one card instance.
    Card(CardId),
    /// Session-wide notifications.
    Session,
}

/// Events crossing the replication boundary.
///
/// `Display` renders the original wire names so logs stay comparable with
/// other participants in the session.
#[derive(Debug, Clone)]
pub enum Event {
    /// Stimulus tap; consumed by the toggle animator.
    Trigger,
    /// Packed 0xRRGGBB color published once per animation tick.
    ChangeLight(u32),
    /// Reconfiguration of a card's background source.
    UpdateShape(CardConfig),
    /// One-shot notification that a synchronous-load background finished.
    SynchronousCardLoaded { card: CardId },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Trigger => f.write_str("trigger"),
            Event::ChangeLight(_) => f.write_str("changeLight"),
            Event::UpdateShape(_) => f.write_str("updateShape"),
            Event::SynchronousCardLoaded { .. } => f.write_str("synchronousCardLoaded"),
        }
    }
}

struct SubscriberEntry {
    scope: Scope,
    sender: Sender<Event>,
}

/// In-process stand-in for the session's publish/subscribe bus.
///
/// Every subscriber receives the events published to its scope in publish
/// order. Handles are cheap to clone and safe to share with worker threads,
/// which is how the background loader reports `SynchronousCardLoaded`.
#[derive(Clone, Default)]
pub struct Bus {
    subscribers: Arc<Mutex<Vec<SubscriberEntry>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for one scope and returns its mailbox.
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        let (sender, receiver) = unbounded();
        let mut subscribers = self.subscribers.lock().expect("bus lock poisoned");
        subscribers.push(SubscriberEntry { scope, sender });
        Subscription { receiver }
    }

    /// Delivers `event` to every subscriber of `scope`, dropping mailboxes
    /// whose receiving half has gone away.
    pub fn publish(&self, scope: &Scope, event: Event) {
        let mut subscribers = self.subscribers.lock().expect("bus lock poisoned");
        subscribers.retain(|entry| {
            if entry.scope != *scope {
                return true;
            }
            match entry.sender.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(%event, "dropping disconnected subscriber");
                    false
                }
            }
        });
    }
}

/// Receiving side of a bus subscription.
pub struct Subscription {
    receiver: Receiver<Event>,
}

impl Subscription {
    /// Takes the next pending event without blocking.
    pub fn try_next(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Drains every pending event in delivery order.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

/// A single re-armable repeating timer.
///
/// This replaces the original chain of one-shot deferred calls: the driving
/// loop arms the ticker when an animation starts, asks it each iteration how
/// many whole periods have elapsed, and disarms it when the animator goes
/// idle. A duplicate chain cannot exist because there is only one deadline.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Arms the timer; the first tick falls one period after `now`.
    pub fn arm(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn disarm(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// Returns how many whole periods have elapsed by `now`, advancing the
    /// deadline past them. Returns 0 while disarmed.
    pub fn poll(&mut self, now: Instant) -> u32 {
        let Some(mut next) = self.next else {
            return 0;
        };
        let mut ticks = 0;
        while next <= now {
            ticks += 1;
            next += self.period;
        }
        self.next = Some(next);
        ticks
    }
}
