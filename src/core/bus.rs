use flume::{Receiver, Sender};
use parking_lot::Mutex;
use strum::{Display, EnumDiscriminants};

/// Application-level notifications published by the terminal controller.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(EventKind), derive(Hash, Display))]
pub enum AppEvent {
    ConnectionOpened { device: String, summary: String },
    ConnectionClosed { device: String },
    DataReceived { bytes: usize },
    DataSent { bytes: usize },
    ErrorOccurred(String),
    PortDetected(String),
    PortRemoved(String),
}

struct Subscriber {
    kinds: Option<Vec<EventKind>>,
    tx: Sender<AppEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Publish/subscribe hub owned by the application, one channel per subscriber.
///
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe(&self) -> Receiver<AppEvent> {
        self.register(None)
    }

    /// Receive only events of the listed kinds.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Receiver<AppEvent> {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<EventKind>>) -> Receiver<AppEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(Subscriber { kinds, tx });
        rx
    }

    /// Returns how many subscribers the event was delivered to.
    pub fn publish(&self, event: AppEvent) -> usize {
        let kind = EventKind::from(&event);
        let mut delivered = 0;
        self.subscribers.lock().retain(|sub| {
            if !sub.wants(kind) {
                return !sub.tx.is_disconnected();
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        log::trace!("Published {kind} to {delivered} subscriber(s)");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_its_own_copy() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.publish(AppEvent::PortDetected("COM3".into())), 2);
        assert_eq!(a.try_recv().unwrap(), AppEvent::PortDetected("COM3".into()));
        assert_eq!(b.try_recv().unwrap(), AppEvent::PortDetected("COM3".into()));
    }

    #[test]
    fn filtered_subscription_skips_other_kinds() {
        let bus = EventBus::new();
        let errors = bus.subscribe_to(&[EventKind::ErrorOccurred]);
        bus.publish(AppEvent::DataSent { bytes: 4 });
        bus.publish(AppEvent::ErrorOccurred("boom".into()));
        assert_eq!(errors.try_iter().collect::<Vec<_>>(), vec![AppEvent::ErrorOccurred("boom".into())]);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.publish(AppEvent::DataReceived { bytes: 1 }), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.len(), 1);
        assert_eq!(EventKind::PortRemoved.to_string(), "PortRemoved");
    }
}
