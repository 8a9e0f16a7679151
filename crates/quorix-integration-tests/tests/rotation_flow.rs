//! End-to-end: rotation preserves the public key and keeps a backup.
//!
//! After a 2-of-3 DKG, every party rotates with its prior keyshare. The
//! new shares must carry the same aggregate public key, and each store
//! must hold the prior generation as backup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use url::Url;

use quorix_coordinator::{Coordinator, CoordinatorConfig, CoordinatorEvent};
use quorix_engine::mock::MockEngine;
use quorix_store::{KeyShareStore, MemoryStore};
use quorix_token::{SessionToken, BOOTSTRAP_WINDOW_MS};
use quorix_types::{now_ms, KeyShare};

use quorix_integration_tests::hub::{self, HubConfig};
use quorix_integration_tests::{init_tracing, test_group, test_party_id};

fn coordinator_for(addr: SocketAddr, index: u8, store: KeyShareStore) -> Coordinator {
    let config = CoordinatorConfig::new(
        Url::parse("http://127.0.0.1:9").expect("relay url"),
        Url::parse(&format!("ws://{addr}")).expect("ws url"),
    );
    let mut coordinator = Coordinator::new(config, Arc::new(MockEngine), store);
    coordinator.set_credentials(test_party_id(index), format!("bearer-{index}"));
    coordinator.set_group(test_group(2, 3)).expect("group");
    coordinator
}

async fn run_keygen(mut coordinator: Coordinator) -> KeyShare {
    let mut events = coordinator.events();
    coordinator.start_keygen().await.expect("start keygen");
    while coordinator.poll_inbound().await.expect("poll") {}
    loop {
        match events.try_recv().expect("completion event") {
            CoordinatorEvent::KeygenComplete(record) => break record,
            _ => continue,
        }
    }
}

async fn run_rotation(mut coordinator: Coordinator, prior: KeyShare) -> KeyShare {
    let mut events = coordinator.events();
    coordinator.start_rotation(prior).await.expect("start rotation");
    while coordinator.poll_inbound().await.expect("poll") {}
    loop {
        match events.try_recv().expect("completion event") {
            CoordinatorEvent::RotationComplete(record) => break record,
            _ => continue,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rotation_preserves_public_key() {
    init_tracing();
    let group = test_group(2, 3);
    let stores: Vec<KeyShareStore> = (0..3)
        .map(|_| KeyShareStore::new(Arc::new(MemoryStore::new())))
        .collect();

    // Initial DKG.
    let keygen_hub = hub::start(HubConfig::success(group.group_id.clone(), 3)).await;
    let mut coordinators: Vec<Coordinator> = (0..3u8)
        .map(|i| coordinator_for(keygen_hub, i, stores[usize::from(i)].clone()))
        .collect();
    let encoded = coordinators[0].create_keygen_token().expect("token");
    let token =
        SessionToken::parse(&encoded, now_ms(), BOOTSTRAP_WINDOW_MS).expect("token parse");
    for coordinator in coordinators.iter_mut().skip(1) {
        coordinator.adopt_token(&token).expect("adopt token");
    }
    let handles: Vec<_> = coordinators.into_iter().map(|c| tokio::spawn(run_keygen(c))).collect();
    let originals: Vec<KeyShare> = tokio::time::timeout(Duration::from_secs(30), join_all(handles))
        .await
        .expect("keygen deadline")
        .into_iter()
        .map(|r| r.expect("keygen task"))
        .collect();

    // Rotation, every party consuming its prior share.
    let rotation_hub = hub::start(HubConfig::success(group.group_id.clone(), 3)).await;
    let mut coordinators: Vec<Coordinator> = (0..3u8)
        .map(|i| coordinator_for(rotation_hub, i, stores[usize::from(i)].clone()))
        .collect();
    let encoded = coordinators[0]
        .create_rotation_token("standard")
        .expect("rotation token");
    let token =
        SessionToken::parse(&encoded, now_ms(), BOOTSTRAP_WINDOW_MS).expect("token parse");
    assert_eq!(token.rotation_type.as_deref(), Some("standard"));
    for coordinator in coordinators.iter_mut().skip(1) {
        coordinator.adopt_token(&token).expect("adopt token");
    }
    let handles: Vec<_> = coordinators
        .into_iter()
        .zip(originals.clone())
        .map(|(c, prior)| tokio::spawn(run_rotation(c, prior)))
        .collect();
    let rotated: Vec<KeyShare> = tokio::time::timeout(Duration::from_secs(30), join_all(handles))
        .await
        .expect("rotation deadline")
        .into_iter()
        .map(|r| r.expect("rotation task"))
        .collect();

    for i in 0..3 {
        assert_eq!(rotated[i].public_key, originals[i].public_key);

        // Current generation is the rotated share, backup is the prior.
        let current = stores[i]
            .load(&originals[i].group_id, originals[i].party_index)
            .expect("load")
            .expect("current present");
        assert_eq!(current, rotated[i]);
        let backup = stores[i]
            .load_backup(&originals[i].group_id, originals[i].party_index)
            .expect("load backup")
            .expect("backup present");
        assert_eq!(backup, originals[i]);
    }
}
