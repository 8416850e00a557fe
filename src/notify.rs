use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// The opaque token viewers receive; they re-fetch the club state on it.
pub const UPDATE_TOKEN: &str = "update";

struct Viewer {
    id: u64,
    tx: UnboundedSender<String>,
}

/// A live viewer's registration under one club channel. Hold on to the
/// receiver for updates and pass `id` back to unsubscribe.
pub struct Subscription {
    pub club_id: i64,
    pub id: u64,
    pub rx: UnboundedReceiver<String>,
}

/// Fan-out registry of live-view connections grouped by club.
///
/// Constructed once at startup and handed to every request handler, so
/// tests can swap in their own instance. Channels hold no history: a
/// viewer that connects mid-publish catches up by fetching the club
/// state, not by replay.
#[derive(Default)]
pub struct Notifier {
    channels: DashMap<i64, Vec<Viewer>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under the club's channel, creating the
    /// channel on first use.
    pub fn subscribe(&self, club_id: i64) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        self.channels.entry(club_id).or_default().push(Viewer { id, tx });

        log::debug!("Viewer {} joined club {} channel", id, club_id);
        Subscription { club_id, id, rx }
    }

    /// Removes a connection; a no-op if it already dropped out.
    pub fn unsubscribe(&self, club_id: i64, id: u64) {
        if let Some(mut viewers) = self.channels.get_mut(&club_id) {
            viewers.retain(|v| v.id != id);
        }
    }

    /// Delivers `message` to every viewer of the club in registration
    /// order. A viewer whose receiver is gone counts as disconnected and
    /// is dropped from the channel.
    pub fn publish(&self, club_id: i64, message: &str) {
        let Some(mut viewers) = self.channels.get_mut(&club_id) else {
            return;
        };

        viewers.retain(|viewer| match viewer.tx.send(message.to_owned()) {
            Ok(()) => true,
            Err(_) => {
                log::debug!(
                    "Dropping closed viewer {} from club {} channel",
                    viewer.id,
                    club_id
                );
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_club_subscribers() {
        let notifier = Notifier::new();
        let mut first = notifier.subscribe(1);
        let mut second = notifier.subscribe(1);

        notifier.publish(1, UPDATE_TOKEN);

        assert_eq!(first.rx.recv().await.unwrap(), UPDATE_TOKEN);
        assert_eq!(second.rx.recv().await.unwrap(), UPDATE_TOKEN);
    }

    #[tokio::test]
    async fn no_cross_club_leakage() {
        let notifier = Notifier::new();
        let mut club_a = notifier.subscribe(1);
        let mut club_b = notifier.subscribe(2);

        notifier.publish(1, UPDATE_TOKEN);

        assert_eq!(club_a.rx.recv().await.unwrap(), UPDATE_TOKEN);
        assert!(club_b.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribed_viewer_stops_receiving() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe(1);

        notifier.unsubscribe(1, sub.id);
        notifier.publish(1, UPDATE_TOKEN);

        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_receiver_is_dropped_on_publish() {
        let notifier = Notifier::new();
        let dead = notifier.subscribe(1);
        let mut live = notifier.subscribe(1);
        drop(dead.rx);

        notifier.publish(1, UPDATE_TOKEN);
        notifier.publish(1, UPDATE_TOKEN);

        assert_eq!(live.rx.recv().await.unwrap(), UPDATE_TOKEN);
        assert_eq!(live.rx.recv().await.unwrap(), UPDATE_TOKEN);
        assert_eq!(notifier.channels.get(&1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_to_unknown_club_is_a_no_op() {
        let notifier = Notifier::new();
        notifier.publish(7, UPDATE_TOKEN);
    }
}
