use super::*;
use crate::identity::NetworkIdentity;
use crate::protocol::{ClientPackage, Frame, Position};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

fn package(x: f32, y: f32, z: f32) -> ClientPackage {
    ClientPackage::new(NetworkIdentity::create(), Position::new(x, y, z))
}

fn directory() -> (Arc<ClientRecordStore<String>>, ConnectionDirectory<String>) {
    let records = Arc::new(ClientRecordStore::new());
    let directory = ConnectionDirectory::new(Arc::clone(&records));
    (records, directory)
}

fn frame(text: &str) -> Frame {
    Frame::from(text)
}

// ── ClientRecordStore ────────────────────────────────────────────────────────

#[test]
fn test_upsert_inserts_then_replaces() {
    let store = ClientRecordStore::new();
    let first = package(1.0, 2.0, 3.0);
    let second = ClientPackage::new(first.identity, Position::new(4.0, 5.0, 6.0));

    store.upsert("conn-a".to_string(), first).unwrap();
    assert_eq!(store.get(&"conn-a".to_string()).unwrap().package, Some(first));

    store.upsert("conn-a".to_string(), second).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(&"conn-a".to_string()).unwrap().package, Some(second));
}

#[test]
fn test_remove_is_noop_when_absent() {
    let store: ClientRecordStore<String> = ClientRecordStore::new();
    assert!(store.remove(&"missing".to_string()).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_snapshot_skips_pending_records() {
    let store = ClientRecordStore::new();
    store.open("pending".to_string()).unwrap();
    store.upsert("reported".to_string(), package(1.0, 1.0, 1.0)).unwrap();

    assert_eq!(store.len(), 2);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].0, "reported");
}

#[test]
fn test_encode_snapshot() {
    let store = ClientRecordStore::new();
    let pkg = package(1.0, 2.0, 3.0);
    store.upsert(7u64, pkg).unwrap();

    let encoded = ClientRecordStore::encode(&store.snapshot());
    assert_eq!(encoded, vec![format!("{}/1/2/3", pkg.identity)]);
    assert_eq!(ClientRecordStore::<u64>::decode(&encoded[0]).unwrap(), pkg);
}

#[test]
fn test_apply_only_updates_registered_keys() {
    let store = ClientRecordStore::new();
    let key = "conn-a".to_string();

    assert_eq!(
        store.apply(&key, package(1.0, 1.0, 1.0), None),
        Ok(UpdateOutcome::NotRegistered)
    );
    assert!(store.is_empty());

    store.open(key.clone()).unwrap();
    assert_eq!(
        store.apply(&key, package(1.0, 1.0, 1.0), None),
        Ok(UpdateOutcome::Applied)
    );
}

#[test]
fn test_apply_after_remove_does_not_resurrect() {
    let store = ClientRecordStore::new();
    let key = "conn-a".to_string();
    store.open(key.clone()).unwrap();
    store.remove(&key);

    let outcome = store.apply(&key, package(9.0, 9.0, 9.0), None).unwrap();
    assert_eq!(outcome, UpdateOutcome::NotRegistered);
    assert!(!store.contains(&key));
}

#[test]
fn test_apply_rejects_stale_sequence() {
    let store = ClientRecordStore::new();
    let key = "conn-a".to_string();
    store.open(key.clone()).unwrap();

    let newer = package(2.0, 0.0, 0.0);
    let older = ClientPackage::new(newer.identity, Position::new(1.0, 0.0, 0.0));

    assert_eq!(store.apply(&key, newer, Some(5)), Ok(UpdateOutcome::Applied));
    assert_eq!(store.apply(&key, older, Some(4)), Ok(UpdateOutcome::Stale));
    assert_eq!(store.apply(&key, older, Some(5)), Ok(UpdateOutcome::Stale));

    let record = store.get(&key).unwrap();
    assert_eq!(record.package, Some(newer));
    assert_eq!(record.last_seq, Some(5));

    // Unsequenced updates keep last-writer-wins
    assert_eq!(store.apply(&key, older, None), Ok(UpdateOutcome::Applied));
    assert_eq!(store.get(&key).unwrap().package, Some(older));
}

#[test]
fn test_reset_keeps_connection_registered() {
    let store = ClientRecordStore::new();
    let key = "conn-a".to_string();
    let pkg = package(1.0, 2.0, 3.0);
    store.open(key.clone()).unwrap();
    store.apply(&key, pkg, None).unwrap();

    assert_eq!(store.reset(&key), Some(pkg));
    assert!(store.contains(&key));
    assert!(store.snapshot().is_empty());
}

#[test]
fn test_sealed_store_rejects_writes_but_allows_removal() {
    let store = ClientRecordStore::new();
    let key = "conn-a".to_string();
    store.open(key.clone()).unwrap();
    store.seal();

    assert_eq!(store.open("conn-b".to_string()), Err(StoreError::StoreUnavailable));
    assert_eq!(
        store.upsert(key.clone(), package(1.0, 1.0, 1.0)),
        Err(StoreError::StoreUnavailable)
    );
    assert_eq!(
        store.apply(&key, package(1.0, 1.0, 1.0), None),
        Err(StoreError::StoreUnavailable)
    );

    assert!(store.remove(&key).is_some());
    assert!(store.is_empty());
}

#[test]
fn test_concurrent_upsert_remove_disjoint_keys() {
    let store = Arc::new(ClientRecordStore::new());
    let mut handles = vec![];

    // Even workers end with their key present, odd workers remove it again
    for i in 0..16u64 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let identity = NetworkIdentity::create();
            for step in 0..200 {
                let pkg = ClientPackage::new(identity, Position::new(step as f32, i as f32, 0.0));
                store.upsert(i, pkg).unwrap();
            }
            if i % 2 == 1 {
                store.remove(&i);
            }
            identity
        }));
    }

    let identities: HashMap<u64, NetworkIdentity> = handles
        .into_iter()
        .enumerate()
        .map(|(i, h)| (i as u64, h.join().unwrap()))
        .collect();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 8);
    for (key, pkg) in snapshot {
        assert_eq!(key % 2, 0);
        assert_eq!(pkg.identity, identities[&key]);
        assert_eq!(pkg.position, Position::new(199.0, key as f32, 0.0));
    }
}

#[test]
fn test_concurrent_writers_same_key_keep_records_whole() {
    let store = Arc::new(ClientRecordStore::new());
    let mut handles = vec![];

    // Each writer uses a position whose components all equal its index
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..500 {
                let v = i as f32;
                store.upsert("shared", package(v, v, v)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let record = store.get(&"shared").unwrap().package.unwrap();
    let p = record.position;
    assert_eq!(p.x, p.y);
    assert_eq!(p.y, p.z);
}

// ── ConnectionDirectory ──────────────────────────────────────────────────────

#[test]
fn test_register_and_lookup() {
    let (_records, directory) = directory();
    let (tx, _rx) = mpsc::channel(8);

    directory
        .register(ConnectionHandle::new(1), "conn-1".to_string(), tx)
        .unwrap();

    assert!(directory.contains(ConnectionHandle::new(1)));
    assert_eq!(
        directory.client_id(ConnectionHandle::new(1)),
        Some("conn-1".to_string())
    );
    assert_eq!(directory.len(), 1);
}

#[test]
fn test_duplicate_register_fails_and_leaves_directory_unchanged() {
    let (_records, directory) = directory();
    let (tx1, _rx1) = mpsc::channel(8);
    let (tx2, _rx2) = mpsc::channel(8);
    let handle = ConnectionHandle::new(1);

    directory.register(handle, "first".to_string(), tx1).unwrap();
    let result = directory.register(handle, "second".to_string(), tx2);

    assert_eq!(result, Err(DirectoryError::DuplicateConnection(handle)));
    assert_eq!(directory.len(), 1);
    assert_eq!(directory.client_id(handle), Some("first".to_string()));
}

#[test]
fn test_unregister_removes_record() {
    let (records, directory) = directory();
    let (tx, _rx) = mpsc::channel(8);
    let handle = ConnectionHandle::new(3);

    directory.register(handle, "conn-3".to_string(), tx).unwrap();
    records.upsert("conn-3".to_string(), package(1.0, 2.0, 3.0)).unwrap();

    assert_eq!(directory.unregister(handle), Some("conn-3".to_string()));
    assert!(directory.is_empty());
    assert!(records.snapshot().is_empty());
    assert!(!records.contains(&"conn-3".to_string()));

    // Second unregister is a no-op
    assert_eq!(directory.unregister(handle), None);
}

#[test]
fn test_broadcast_except_skips_registered_sender() {
    let (_records, directory) = directory();
    let mut receivers = vec![];
    for i in 0..4 {
        let (tx, rx) = mpsc::channel(8);
        directory
            .register(ConnectionHandle::new(i), format!("conn-{}", i), tx)
            .unwrap();
        receivers.push(rx);
    }

    let report = directory.broadcast_except(ConnectionHandle::new(0), &frame("hello"));
    assert_eq!(report, BroadcastReport { delivered: 3, failed: 0 });

    assert!(receivers[0].try_recv().is_err());
    for rx in receivers.iter_mut().skip(1) {
        assert_eq!(&*rx.try_recv().unwrap(), "hello");
    }
}

#[test]
fn test_broadcast_except_unknown_sender_reaches_everyone() {
    let (_records, directory) = directory();
    let mut receivers = vec![];
    for i in 0..3 {
        let (tx, rx) = mpsc::channel(8);
        directory
            .register(ConnectionHandle::new(i), format!("conn-{}", i), tx)
            .unwrap();
        receivers.push(rx);
    }

    let report = directory.broadcast_except(ConnectionHandle::new(99), &frame("hi"));
    assert_eq!(report.delivered, 3);
    for rx in receivers.iter_mut() {
        assert!(rx.try_recv().is_ok());
    }
}

#[test]
fn test_broadcast_failure_does_not_abort_other_deliveries() {
    let (_records, directory) = directory();

    // Closed queue: receiver dropped right away
    let (closed_tx, closed_rx) = mpsc::channel(8);
    drop(closed_rx);
    directory
        .register(ConnectionHandle::new(1), "gone".to_string(), closed_tx)
        .unwrap();

    // Full queue
    let (full_tx, _full_rx) = mpsc::channel(1);
    full_tx.try_send(frame("backlog")).unwrap();
    directory
        .register(ConnectionHandle::new(2), "slow".to_string(), full_tx)
        .unwrap();

    let (ok_tx, mut ok_rx) = mpsc::channel(8);
    directory
        .register(ConnectionHandle::new(3), "healthy".to_string(), ok_tx)
        .unwrap();

    let report = directory.broadcast_except(ConnectionHandle::new(0), &frame("update"));
    assert_eq!(report, BroadcastReport { delivered: 1, failed: 2 });
    assert_eq!(&*ok_rx.try_recv().unwrap(), "update");
}

#[test]
fn test_send_to_single_connection() {
    let (_records, directory) = directory();
    let (tx, mut rx) = mpsc::channel(8);
    directory
        .register(ConnectionHandle::new(1), "conn-1".to_string(), tx)
        .unwrap();

    assert!(directory.send_to(ConnectionHandle::new(1), &frame("direct")));
    assert!(!directory.send_to(ConnectionHandle::new(2), &frame("nobody")));
    assert_eq!(&*rx.try_recv().unwrap(), "direct");
}

#[test]
fn test_directory_keyed_by_network_identity() {
    let records = Arc::new(ClientRecordStore::new());
    let directory = ConnectionDirectory::new(Arc::clone(&records));
    let identity = NetworkIdentity::create();
    let (tx, _rx) = mpsc::channel(8);

    directory.register(ConnectionHandle::new(1), identity, tx).unwrap();
    records
        .upsert(identity, ClientPackage::new(identity, Position::new(1.0, 0.0, 0.0)))
        .unwrap();

    directory.unregister(ConnectionHandle::new(1));
    assert!(records.is_empty());
}
