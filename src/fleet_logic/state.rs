//! Subscriber registry and fan-out. Connection tasks register a bounded
//! send queue per client; the pump stamps each reading and pushes it to a
//! snapshot of the registry without ever blocking on a slow client.

use crate::fleet_logic::classify::classify;
use crate::fleet_logic::model::Reading;
use crate::fleet_logic::store::ReadingStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type ClientId = usize;

/// Per-client send queue depth. A subscriber that falls this far behind
/// misses the rest of the tick and picks up again on the next one.
pub const CLIENT_QUEUE_CAPACITY: usize = 8192;

/// Per-tick delivery outcome, kept for observability only; faulted clients
/// are skipped for the rest of the tick but never removed here.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub readings: usize,
    pub subscribers: usize,
    pub delivered: usize,
    pub faulted: Vec<ClientId>,
}

#[derive(Clone)]
pub struct AppState {
    clients: Arc<Mutex<HashMap<ClientId, mpsc::Sender<Arc<str>>>>>,
    store: Arc<dyn ReadingStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            store,
        }
    }

    pub fn register(&self, client_id: ClientId, tx: mpsc::Sender<Arc<str>>) {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .insert(client_id, tx);
    }

    pub fn unregister(&self, client_id: ClientId) {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .len()
    }

    /// Stamps every reading in batch order and fans it out to the
    /// subscriber set as it existed when the call began. Clients joining
    /// mid-broadcast catch the next batch; a full or closed queue marks
    /// the client faulted for the remainder of this one.
    pub fn broadcast(&self, batch: &[Reading]) -> DeliveryReport {
        let targets: Vec<(ClientId, mpsc::Sender<Arc<str>>)> = {
            let guard = self.clients.lock().expect("client registry lock poisoned");
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut faulted: HashSet<ClientId> = HashSet::new();
        let mut delivered = 0usize;

        for reading in batch {
            let mut stamped = reading.clone();
            stamped.data_status = Some(classify(reading));

            let line: Arc<str> = match serde_json::to_string(&stamped) {
                Ok(json) => json.into(),
                Err(err) => {
                    log::error!("failed to encode reading: {err}");
                    continue;
                }
            };

            for (client_id, tx) in &targets {
                if faulted.contains(client_id) {
                    continue;
                }
                match tx.try_send(Arc::clone(&line)) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        log::debug!("client {client_id} dropped from this tick: {err}");
                        faulted.insert(*client_id);
                    }
                }
            }

            self.store.save(&stamped);
        }

        DeliveryReport {
            readings: batch.len(),
            subscribers: targets.len(),
            delivered,
            faulted: faulted.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet_logic::model::READINGS_PER_DEVICE;
    use crate::fleet_logic::simulator::generate_batch;
    use crate::fleet_logic::store::NoopStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct RecordingStore {
        saved: Mutex<Vec<Reading>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReadingStore for RecordingStore {
        fn save(&self, reading: &Reading) {
            self.saved.lock().unwrap().push(reading.clone());
        }
    }

    fn batch(devices: usize) -> Vec<Reading> {
        let mut rng = StdRng::seed_from_u64(11);
        generate_batch(devices, 1_754_000_000_000, &mut rng)
    }

    fn stamped(batch: &[Reading]) -> Vec<Reading> {
        batch
            .iter()
            .map(|r| {
                let mut s = r.clone();
                s.data_status = Some(classify(r));
                s
            })
            .collect()
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<Reading> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[test]
    fn fan_out_delivers_the_whole_batch_to_every_client_in_order() {
        let state = AppState::new(Arc::new(NoopStore));
        let (tx1, mut rx1) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let (tx2, mut rx2) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        state.register(1, tx1);
        state.register(2, tx2);

        let batch = batch(3);
        let report = state.broadcast(&batch);

        assert_eq!(report.readings, batch.len());
        assert_eq!(report.subscribers, 2);
        assert_eq!(report.delivered, 2 * batch.len());
        assert!(report.faulted.is_empty());

        let expected = stamped(&batch);
        assert_eq!(drain(&mut rx1), expected);
        assert_eq!(drain(&mut rx2), expected);
    }

    #[test]
    fn every_delivered_reading_carries_a_severity_stamp() {
        let state = AppState::new(Arc::new(NoopStore));
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        state.register(1, tx);

        state.broadcast(&batch(2));
        let received = drain(&mut rx);
        assert!(!received.is_empty());
        assert!(received.iter().all(|r| r.data_status.is_some()));
    }

    #[test]
    fn a_closed_client_faults_without_touching_the_others() {
        let state = AppState::new(Arc::new(NoopStore));
        let (tx1, mut rx1) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let (tx2, rx2) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        state.register(1, tx1);
        state.register(2, tx2);
        drop(rx2);

        let batch = batch(2);
        let report = state.broadcast(&batch);

        assert_eq!(report.faulted, vec![2]);
        assert_eq!(report.delivered, batch.len());
        assert_eq!(drain(&mut rx1).len(), batch.len());

        // The registry never removes a faulted client on its own.
        assert_eq!(state.client_count(), 2);
    }

    #[test]
    fn a_full_queue_faults_for_the_rest_of_the_tick() {
        let state = AppState::new(Arc::new(NoopStore));
        let (tx, mut rx) = mpsc::channel(2);
        state.register(1, tx);

        let batch = batch(1);
        let report = state.broadcast(&batch);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.faulted, vec![1]);
        // The prefix that fit is still in batch order.
        let received = drain(&mut rx);
        assert_eq!(received, stamped(&batch)[..2].to_vec());
    }

    #[test]
    fn unregistered_clients_receive_nothing_further() {
        let state = AppState::new(Arc::new(NoopStore));
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        state.register(1, tx);

        state.broadcast(&batch(1));
        state.unregister(1);
        state.broadcast(&batch(1));

        assert_eq!(drain(&mut rx).len(), READINGS_PER_DEVICE);
        assert_eq!(state.client_count(), 0);
    }

    #[test]
    fn the_store_sees_every_stamped_reading_even_with_no_subscribers() {
        let store = Arc::new(RecordingStore::new());
        let state = AppState::new(Arc::clone(&store) as Arc<dyn ReadingStore>);

        let batch = batch(2);
        let report = state.broadcast(&batch);
        assert_eq!(report.subscribers, 0);
        assert_eq!(report.delivered, 0);

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), batch.len());
        assert!(saved.iter().all(|r| r.data_status.is_some()));
    }
}
