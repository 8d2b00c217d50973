use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pressroom_core::config::BroadcastConfig;
use pressroom_core::{EventKind, PressroomError, StatusEvent};
use pressroom_protocol::ServerFrame;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("observer limit reached ({max})")]
    CapacityReached { max: usize },

    #[error("unknown observer: {id}")]
    UnknownObserver { id: String },
}

impl From<BroadcastError> for PressroomError {
    fn from(e: BroadcastError) -> Self {
        match e {
            BroadcastError::CapacityReached { max } => PressroomError::TooManyObservers { max },
            BroadcastError::UnknownObserver { id } => {
                PressroomError::Protocol(format!("unknown observer {id}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BroadcastError>;

/// Handed to the socket task on connect. The receiver yields serialized
/// frames; it ends when the manager prunes the observer.
#[derive(Debug)]
pub struct ObserverConnection {
    pub id: String,
    pub rx: mpsc::Receiver<String>,
}

struct Observer {
    kinds: HashSet<EventKind>,
    tx: mpsc::Sender<String>,
    last_heartbeat_at: DateTime<Utc>,
    missed: u32,
}

impl Observer {
    /// An empty subscription set means every kind.
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// Registry of live observers and fan-out of status events.
///
/// Delivery never waits on a socket: each observer owns a bounded queue and
/// a full or closed queue gets that observer pruned.
pub struct BroadcastManager {
    observers: Mutex<HashMap<String, Observer>>,
    seq: AtomicU64,
    max_observers: usize,
    queue_depth: usize,
    missed_limit: u32,
}

impl BroadcastManager {
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            max_observers: config.max_observers,
            queue_depth: config.queue_depth.max(1),
            missed_limit: config.missed_heartbeats.max(1),
        }
    }

    pub fn connect(&self, kinds: Vec<EventKind>) -> Result<ObserverConnection> {
        let mut observers = self.observers.lock().unwrap();
        if observers.len() >= self.max_observers {
            warn!(max = self.max_observers, "observer refused: limit reached");
            return Err(BroadcastError::CapacityReached {
                max: self.max_observers,
            });
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.queue_depth);
        observers.insert(
            id.clone(),
            Observer {
                kinds: kinds.into_iter().collect(),
                tx,
                last_heartbeat_at: Utc::now(),
                missed: 0,
            },
        );
        info!(observer_id = %id, observers = observers.len(), "observer connected");
        Ok(ObserverConnection { id, rx })
    }

    pub fn disconnect(&self, id: &str) -> Result<()> {
        let removed = self.observers.lock().unwrap().remove(id);
        match removed {
            Some(_) => {
                info!(observer_id = %id, "observer disconnected");
                Ok(())
            }
            None => Err(BroadcastError::UnknownObserver { id: id.to_string() }),
        }
    }

    /// Replace the observer's subscription set.
    pub fn subscribe(&self, id: &str, kinds: Vec<EventKind>) -> Result<()> {
        let mut observers = self.observers.lock().unwrap();
        let observer = observers
            .get_mut(id)
            .ok_or_else(|| BroadcastError::UnknownObserver { id: id.to_string() })?;
        observer.kinds = kinds.into_iter().collect();
        debug!(observer_id = %id, kinds = observer.kinds.len(), "subscription updated");
        Ok(())
    }

    /// Any ping or pong from the client counts as proof of life.
    pub fn record_heartbeat(&self, id: &str) -> Result<()> {
        let mut observers = self.observers.lock().unwrap();
        let observer = observers
            .get_mut(id)
            .ok_or_else(|| BroadcastError::UnknownObserver { id: id.to_string() })?;
        observer.missed = 0;
        observer.last_heartbeat_at = Utc::now();
        Ok(())
    }

    /// Fan `event` out to every subscribed observer. Returns how many
    /// observers accepted it.
    pub fn publish_event(&self, event: StatusEvent) -> usize {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind;
        let payload = ServerFrame::event(seq, event).to_text();

        let targets: Vec<(String, mpsc::Sender<String>)> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| o.wants(kind))
            .map(|(id, o)| (id.clone(), o.tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(observer_id = %id, seq, %kind, error = %e, "event delivery failed");
                    failed.push(id);
                }
            }
        }
        self.prune(&failed, "delivery failed");
        delivered
    }

    /// One heartbeat pass: bump every observer's missed count, prune those
    /// at the limit and ping the rest. Returns the number pruned.
    pub fn sweep(&self) -> usize {
        let ping = ServerFrame::Ping.to_text();
        let mut stale = Vec::new();
        let mut to_ping = Vec::new();
        {
            let mut observers = self.observers.lock().unwrap();
            for (id, observer) in observers.iter_mut() {
                observer.missed += 1;
                if observer.missed >= self.missed_limit {
                    debug!(observer_id = %id, last_heartbeat_at = %observer.last_heartbeat_at, "heartbeat missed");
                    stale.push(id.clone());
                } else {
                    to_ping.push((id.clone(), observer.tx.clone()));
                }
            }
        }

        for (id, tx) in to_ping {
            if tx.try_send(ping.clone()).is_err() {
                stale.push(id);
            }
        }
        self.prune(&stale, "heartbeat timeout")
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    /// Dropping the sender ends the observer's receiver, which closes its socket.
    fn prune(&self, ids: &[String], reason: &str) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut observers = self.observers.lock().unwrap();
        let mut pruned = 0;
        for id in ids {
            if observers.remove(id).is_some() {
                info!(observer_id = %id, reason, "observer pruned");
                pruned += 1;
            }
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager(max_observers: usize, queue_depth: usize) -> BroadcastManager {
        BroadcastManager::new(&BroadcastConfig {
            max_observers,
            queue_depth,
            ..BroadcastConfig::default()
        })
    }

    fn event(kind: EventKind) -> StatusEvent {
        StatusEvent::new(kind, "job-1", "running")
    }

    fn parse(text: &str) -> ServerFrame {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn slow_observer_does_not_hold_back_the_rest() {
        let mgr = manager(64, 4);
        let mut readers: Vec<ObserverConnection> =
            (0..4).map(|_| mgr.connect(vec![]).unwrap()).collect();
        let slow = mgr.connect(vec![]).unwrap();

        // Readers drain after every event; the slow observer never reads.
        for round in 0..10u64 {
            mgr.publish_event(event(EventKind::PublishAttempt));
            for reader in readers.iter_mut() {
                let text = tokio::time::timeout(Duration::from_millis(100), reader.rx.recv())
                    .await
                    .expect("reader starved")
                    .expect("reader pruned");
                match parse(&text) {
                    ServerFrame::Event { seq, .. } => assert_eq!(seq, round),
                    other => panic!("unexpected frame {other:?}"),
                }
            }
        }

        assert_eq!(mgr.len(), 4);
        assert!(mgr.disconnect(&slow.id).is_err());
    }

    #[tokio::test]
    async fn pruned_observer_sees_end_of_stream_after_backlog() {
        let mgr = manager(64, 2);
        let mut slow = mgr.connect(vec![]).unwrap();
        for _ in 0..3 {
            mgr.publish_event(event(EventKind::JobTriggered));
        }
        assert_eq!(mgr.len(), 0);
        assert!(slow.rx.recv().await.is_some());
        assert!(slow.rx.recv().await.is_some());
        assert!(slow.rx.recv().await.is_none());
    }

    #[test]
    fn connections_beyond_capacity_are_refused() {
        let mgr = manager(2, 8);
        let a = mgr.connect(vec![]).unwrap();
        let _b = mgr.connect(vec![]).unwrap();
        assert_eq!(
            mgr.connect(vec![]).unwrap_err(),
            BroadcastError::CapacityReached { max: 2 }
        );

        mgr.disconnect(&a.id).unwrap();
        assert!(mgr.connect(vec![]).is_ok());
    }

    #[test]
    fn events_reach_only_subscribed_kinds() {
        let mgr = manager(8, 8);
        let mut failures = mgr.connect(vec![EventKind::JobFailed]).unwrap();
        let mut everything = mgr.connect(vec![]).unwrap();

        assert_eq!(mgr.publish_event(event(EventKind::JobTriggered)), 1);
        assert_eq!(mgr.publish_event(event(EventKind::JobFailed)), 2);

        assert!(matches!(
            parse(&failures.rx.try_recv().unwrap()),
            ServerFrame::Event { seq: 1, .. }
        ));
        assert!(failures.rx.try_recv().is_err());
        assert!(everything.rx.try_recv().is_ok());
        assert!(everything.rx.try_recv().is_ok());
    }

    #[test]
    fn subscribe_replaces_the_kind_set() {
        let mgr = manager(8, 8);
        let mut obs = mgr.connect(vec![EventKind::JobFailed]).unwrap();
        mgr.subscribe(&obs.id, vec![EventKind::JobCompleted]).unwrap();

        assert_eq!(mgr.publish_event(event(EventKind::JobFailed)), 0);
        assert_eq!(mgr.publish_event(event(EventKind::JobCompleted)), 1);
        assert!(obs.rx.try_recv().is_ok());

        assert!(matches!(
            mgr.subscribe("nope", vec![]),
            Err(BroadcastError::UnknownObserver { .. })
        ));
    }

    #[test]
    fn silent_observers_are_pruned_after_missed_heartbeats() {
        let mgr = manager(8, 8);
        let mut silent = mgr.connect(vec![]).unwrap();
        let mut alive = mgr.connect(vec![]).unwrap();

        // missed_heartbeats defaults to 3
        assert_eq!(mgr.sweep(), 0);
        mgr.record_heartbeat(&alive.id).unwrap();
        assert_eq!(mgr.sweep(), 0);
        mgr.record_heartbeat(&alive.id).unwrap();
        assert_eq!(mgr.sweep(), 1);

        assert_eq!(mgr.len(), 1);
        assert!(mgr.record_heartbeat(&silent.id).is_err());
        assert_eq!(parse(&alive.rx.try_recv().unwrap()), ServerFrame::Ping);
        assert_eq!(parse(&silent.rx.try_recv().unwrap()), ServerFrame::Ping);
    }

    #[test]
    fn closed_receiver_is_pruned_on_next_event() {
        let mgr = manager(8, 8);
        let gone = mgr.connect(vec![]).unwrap();
        drop(gone.rx);
        assert_eq!(mgr.publish_event(event(EventKind::JobCompleted)), 0);
        assert_eq!(mgr.len(), 0);
    }

    #[test]
    fn broadcast_errors_map_to_wire_codes() {
        let err: PressroomError = BroadcastError::CapacityReached { max: 64 }.into();
        assert_eq!(err.code(), "TOO_MANY_OBSERVERS");
    }
}
