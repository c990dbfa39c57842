//! Subscription Hub: per-run event fan-out to streaming subscribers.
//!
//! Layered over [`crate::event_bus`]'s broadcast-based [`EventHub`](crate::event_bus::EventHub):
//! that hub's `Lagged(n)` semantics are a good fit for a single shared stream,
//! but subscribers here need a bounded per-subscriber queue with exactly one
//! synthetic overflow marker per sustained episode of backpressure, not a
//! silent gap count. Each subscriber gets its own bounded `flume` channel;
//! publishing a run's events walks that run's subscriber set and tracks the
//! overflow state independently per subscriber.

use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event_bus::Event;

/// What a subscriber receives: either a real workflow event, or a marker
/// summarizing a burst of events it couldn't keep up with.
#[derive(Clone, Debug)]
pub enum SubscriptionEvent {
    Event(Event),
    Overflow { dropped: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("run {0} has no active subscription channel")]
    UnknownRun(Uuid),
    #[error("subscriber {0} is not connected to this run")]
    UnknownSubscriber(Uuid),
}

struct Subscriber {
    sender: flume::Sender<SubscriptionEvent>,
    in_overflow: bool,
    dropped: u64,
}

#[derive(Default)]
struct RunSubscribers {
    subscribers: FxHashMap<Uuid, Subscriber>,
}

/// Registry of per-run, per-subscriber bounded event queues.
pub struct SubscriptionHub {
    runs: RwLock<FxHashMap<Uuid, RunSubscribers>>,
    queue_capacity: usize,
}

impl SubscriptionHub {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            runs: RwLock::new(FxHashMap::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Registers a run so it can accept subscribers, a no-op if already connected.
    pub async fn connect(&self, run_id: Uuid) {
        self.runs.write().await.entry(run_id).or_default();
    }

    /// Subscribes to a run's events, returning a subscriber id and receiver.
    /// Implicitly connects the run if it hasn't been already.
    pub async fn subscribe(&self, run_id: Uuid) -> (Uuid, flume::Receiver<SubscriptionEvent>) {
        let (sender, receiver) = flume::bounded(self.queue_capacity);
        let subscriber_id = Uuid::new_v4();
        let mut runs = self.runs.write().await;
        runs.entry(run_id).or_default().subscribers.insert(
            subscriber_id,
            Subscriber {
                sender,
                in_overflow: false,
                dropped: 0,
            },
        );
        (subscriber_id, receiver)
    }

    /// Removes a single subscriber from a run.
    pub async fn unsubscribe(&self, run_id: Uuid, subscriber_id: Uuid) -> Result<(), SubscriptionError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(SubscriptionError::UnknownRun(run_id))?;
        run.subscribers
            .remove(&subscriber_id)
            .ok_or(SubscriptionError::UnknownSubscriber(subscriber_id))?;
        Ok(())
    }

    /// Drops every subscriber for a run and forgets the run entirely.
    pub async fn disconnect(&self, run_id: Uuid) {
        self.runs.write().await.remove(&run_id);
    }

    /// Publishes `event` to every subscriber of `run_id`, in subscriber
    /// registration order, so a single run's events are never interleaved
    /// out of order for a given subscriber. Subscribers with a full queue
    /// enter an overflow episode: their dropped count grows silently until
    /// the queue drains, at which point one [`SubscriptionEvent::Overflow`]
    /// marker is delivered before the backlog resumes.
    pub async fn publish(&self, run_id: Uuid, event: Event) -> Result<(), SubscriptionError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(SubscriptionError::UnknownRun(run_id))?;

        for subscriber in run.subscribers.values_mut() {
            if subscriber.in_overflow {
                if subscriber
                    .sender
                    .try_send(SubscriptionEvent::Overflow {
                        dropped: subscriber.dropped,
                    })
                    .is_ok()
                {
                    subscriber.in_overflow = false;
                    subscriber.dropped = 0;
                } else {
                    subscriber.dropped += 1;
                    continue;
                }
            }

            match subscriber.sender.try_send(SubscriptionEvent::Event(event.clone())) {
                Ok(()) => {}
                Err(_) => {
                    subscriber.in_overflow = true;
                    subscriber.dropped += 1;
                }
            }
        }

        Ok(())
    }

    #[must_use]
    pub async fn subscriber_count(&self, run_id: Uuid) -> usize {
        self.runs
            .read()
            .await
            .get(&run_id)
            .map(|run| run.subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::node_message("test", "hello")
    }

    #[tokio::test]
    async fn publish_to_unknown_run_errors() {
        let hub = SubscriptionHub::new(4);
        let err = hub.publish(Uuid::new_v4(), sample_event()).await;
        assert!(matches!(err, Err(SubscriptionError::UnknownRun(_))));
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let hub = SubscriptionHub::new(4);
        let run_id = Uuid::new_v4();
        hub.connect(run_id).await;
        let (_id, rx) = hub.subscribe(run_id).await;

        hub.publish(run_id, Event::node_message("a", "first")).await.unwrap();
        hub.publish(run_id, Event::node_message("b", "second")).await.unwrap();

        let first = rx.recv_async().await.unwrap();
        let second = rx.recv_async().await.unwrap();
        assert!(matches!(first, SubscriptionEvent::Event(e) if e.message() == "first"));
        assert!(matches!(second, SubscriptionEvent::Event(e) if e.message() == "second"));
    }

    #[tokio::test]
    async fn overflow_emits_single_marker_after_episode() {
        let hub = SubscriptionHub::new(1);
        let run_id = Uuid::new_v4();
        hub.connect(run_id).await;
        let (_id, rx) = hub.subscribe(run_id).await;

        // Fill the one-slot queue, then overflow it twice.
        hub.publish(run_id, sample_event()).await.unwrap();
        hub.publish(run_id, sample_event()).await.unwrap();
        hub.publish(run_id, sample_event()).await.unwrap();

        // Drain the original event, freeing a slot for the overflow marker.
        let first = rx.recv_async().await.unwrap();
        assert!(matches!(first, SubscriptionEvent::Event(_)));

        // Give the next publish a chance to deliver the marker.
        hub.publish(run_id, sample_event()).await.unwrap();
        let marker = rx.recv_async().await.unwrap();
        assert!(matches!(marker, SubscriptionEvent::Overflow { dropped: 2 }));
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscriber() {
        let hub = SubscriptionHub::new(4);
        let run_id = Uuid::new_v4();
        hub.connect(run_id).await;
        let (subscriber_id, _rx) = hub.subscribe(run_id).await;
        assert_eq!(hub.subscriber_count(run_id).await, 1);

        hub.unsubscribe(run_id, subscriber_id).await.unwrap();
        assert_eq!(hub.subscriber_count(run_id).await, 0);
    }

    #[tokio::test]
    async fn disconnect_drops_all_subscribers() {
        let hub = SubscriptionHub::new(4);
        let run_id = Uuid::new_v4();
        hub.connect(run_id).await;
        hub.subscribe(run_id).await;
        hub.subscribe(run_id).await;

        hub.disconnect(run_id).await;
        let err = hub.publish(run_id, sample_event()).await;
        assert!(matches!(err, Err(SubscriptionError::UnknownRun(_))));
    }
}
