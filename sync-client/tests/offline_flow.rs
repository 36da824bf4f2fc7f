//! End-to-end behavior of the offline client over in-memory collaborators.

use offline_sync_client::{
    ClientConfig, ManualClock, ManualNetworkMonitor, MemoryStore, MockRemote, Mutation,
    OfflineClient, Payload, RemoteError, TerminalFailure, TerminalReason, WriteOutcome,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    store: MemoryStore,
    network: ManualNetworkMonitor,
    remote: MockRemote,
    clock: ManualClock,
    failures: mpsc::UnboundedReceiver<TerminalFailure>,
    client: OfflineClient,
}

fn fixture(online: bool, config: ClientConfig) -> Fixture {
    init_tracing();
    let store = MemoryStore::new();
    let network = ManualNetworkMonitor::new(online);
    let remote = MockRemote::new();
    let clock = ManualClock::new(1_700_000_000_000);
    let (tx, failures) = mpsc::unbounded_channel();

    let client = OfflineClient::builder(
        Arc::new(store.clone()),
        Arc::new(network.clone()),
        Arc::new(remote.clone()),
    )
    .config(config)
    .clock(Arc::new(clock.clone()))
    .failure_sink(Arc::new(tx))
    .build()
    .unwrap();

    Fixture {
        store,
        network,
        remote,
        clock,
        failures,
        client,
    }
}

async fn accepted() -> Result<(), RemoteError> {
    Ok(())
}

fn product(name: &str) -> Payload {
    Payload::encode(&json!({ "name": name })).unwrap()
}

async fn write_offline(f: &Fixture, name: &str) {
    let outcome = f
        .client
        .write(Mutation::insert("products", product(name)), accepted)
        .await
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Queued(_)));
}

// ===========================================
// Cache Tests
// ===========================================

#[tokio::test]
async fn cache_reads_are_stable_within_ttl() {
    let f = fixture(false, ClientConfig::default());
    f.client
        .cache_write("products:1", &json!({"name": "X"}), None)
        .await
        .unwrap();

    let first: Option<serde_json::Value> = f.client.cache_read("products:1").await;
    f.clock.advance(Duration::from_secs(10));
    let second: Option<serde_json::Value> = f.client.cache_read("products:1").await;

    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn expired_entry_is_absent_regardless_of_room() {
    let f = fixture(false, ClientConfig::default().with_cache_max_size(50));
    f.client
        .cache_write("short", &1, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    f.clock.advance(Duration::from_millis(1_001));

    assert_eq!(f.client.cache_read::<i32>("short").await, None);
    assert!(!f.client.cache_has("short").await);
    assert!(f.store.peek("@offline_sync:cache_short").is_none());
}

#[tokio::test]
async fn lru_scenario_through_client() {
    let f = fixture(false, ClientConfig::default().with_cache_max_size(2));

    f.client.cache_write("a", &1, None).await.unwrap();
    f.clock.advance(Duration::from_millis(1));
    f.client.cache_write("b", &2, None).await.unwrap();
    f.clock.advance(Duration::from_millis(1));
    assert_eq!(f.client.cache_read::<i32>("a").await, Some(1));
    f.clock.advance(Duration::from_millis(1));
    f.client.cache_write("c", &3, None).await.unwrap();

    assert!(!f.client.cache_has("b").await);
    assert!(f.client.cache_has("a").await);
    assert!(f.client.cache_has("c").await);
    assert_eq!(f.client.cache_stats().await.size, 2);
}

// ===========================================
// Write Path Tests
// ===========================================

#[tokio::test]
async fn offline_write_queues_and_patches_cache() {
    let f = fixture(false, ClientConfig::default());
    let calls = AtomicUsize::new(0);

    let outcome = f
        .client
        .write(
            Mutation::insert("products", product("X")).with_cache_patch(
                "products:list",
                |current| {
                    let mut list = current
                        .and_then(|v| v.as_array().cloned())
                        .unwrap_or_default();
                    list.push(json!({"name": "X"}));
                    Some(json!(list))
                },
            ),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), RemoteError>(())
            },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, WriteOutcome::Queued(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.client.pending_count().await, 1);
    assert_eq!(
        f.client.cache_read::<serde_json::Value>("products:list").await,
        Some(json!([{"name": "X"}]))
    );
    assert!(f.store.peek("@offline_sync:pending_actions").is_some());
}

#[tokio::test]
async fn flush_while_offline_is_a_no_op() {
    let f = fixture(false, ClientConfig::default());
    write_offline(&f, "X").await;

    let report = f.client.flush().await;

    assert!(report.skipped);
    assert_eq!(f.remote.call_count(), 0);
    assert_eq!(f.client.pending_count().await, 1);
}

// ===========================================
// Drain Tests
// ===========================================

#[tokio::test]
async fn reconnect_drains_and_reports_permanent_failure() {
    let mut f = fixture(false, ClientConfig::default());
    write_offline(&f, "bad").await;
    write_offline(&f, "good").await;
    assert_eq!(f.client.last_sync_at().await, None);

    f.network.set_online(true);
    f.remote
        .queue_result(Err(RemoteError::Validation("name rejected".into())));

    let report = f.client.flush().await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(f.client.pending_count().await, 0);
    assert_eq!(f.client.last_sync_at().await, Some(1_700_000_000_000));

    let failure = f.failures.try_recv().unwrap();
    assert_eq!(failure.action.payload, product("bad"));
    assert!(matches!(failure.reason, TerminalReason::Permanent(_)));
    assert!(f.failures.try_recv().is_err());
}

#[tokio::test]
async fn fifo_order_is_kept_across_collections() {
    let f = fixture(false, ClientConfig::default());
    for name in ["A", "B"] {
        write_offline(&f, name).await;
    }
    f.client
        .write(Mutation::delete("orders", "o-1"), accepted)
        .await
        .unwrap();

    f.network.set_online(true);
    f.client.flush().await;

    let calls = f.remote.calls();
    let order: Vec<(String, Option<String>)> = calls
        .iter()
        .map(|c| (c.collection.clone(), c.record_key.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("products".to_string(), None),
            ("products".to_string(), None),
            ("orders".to_string(), Some("o-1".to_string())),
        ]
    );
    assert_eq!(calls[0].payload, Some(product("A")));
    assert_eq!(calls[1].payload, Some(product("B")));
}

#[tokio::test]
async fn retryable_failure_exhausts_after_max_retries_cycles() {
    let mut f = fixture(false, ClientConfig::default());
    f.client
        .write(
            Mutation::insert("products", product("X")).with_max_retries(2),
            accepted,
        )
        .await
        .unwrap();

    f.network.set_online(true);
    f.remote.fail_always(Some(RemoteError::Network("unreachable".into())));

    let first = f.client.flush().await;
    assert_eq!(first.retried, 1);
    assert!(f.failures.try_recv().is_err());

    let second = f.client.flush().await;
    assert_eq!(second.dropped, 1);
    assert_eq!(f.client.pending_count().await, 0);

    let failure = f.failures.try_recv().unwrap();
    assert!(matches!(
        failure.reason,
        TerminalReason::RetriesExhausted { attempts: 2, .. }
    ));
    assert!(f.failures.try_recv().is_err());
}

#[tokio::test]
async fn started_client_drains_on_reconnect() {
    let f = fixture(false, ClientConfig::default());
    write_offline(&f, "A").await;
    write_offline(&f, "B").await;

    f.client.start().await;
    f.network.set_online(true);

    tokio::time::timeout(Duration::from_secs(5), async {
        while f.client.pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue should drain after reconnect");

    assert_eq!(f.remote.call_count(), 2);
    f.client.shutdown();
}

// ===========================================
// Restart Tests
// ===========================================

#[tokio::test]
async fn queue_survives_restart() {
    let f = fixture(false, ClientConfig::default());
    for name in ["A", "B", "C"] {
        write_offline(&f, name).await;
    }
    drop(f.client);

    let remote = MockRemote::new();
    let restarted = OfflineClient::builder(
        Arc::new(f.store.clone()),
        Arc::new(ManualNetworkMonitor::new(true)),
        Arc::new(remote.clone()),
    )
    .build()
    .unwrap();

    assert_eq!(restarted.pending_count().await, 3);
    let report = restarted.flush().await;

    assert_eq!(report.succeeded, 3);
    let payloads: Vec<Option<Payload>> = remote.calls().into_iter().map(|c| c.payload).collect();
    assert_eq!(
        payloads,
        vec![Some(product("A")), Some(product("B")), Some(product("C"))]
    );
}

#[tokio::test]
async fn namespaces_do_not_share_state() {
    let f = fixture(false, ClientConfig::default());
    write_offline(&f, "A").await;

    let other = OfflineClient::builder(
        Arc::new(f.store.clone()),
        Arc::new(ManualNetworkMonitor::new(false)),
        Arc::new(MockRemote::new()),
    )
    .config(ClientConfig::default().with_namespace("@other"))
    .build()
    .unwrap();

    assert_eq!(other.pending_count().await, 0);
    assert_eq!(f.client.pending_count().await, 1);
}

#[tokio::test]
async fn read_fault_at_start_does_not_lose_stored_queue() {
    let f = fixture(false, ClientConfig::default());
    for name in ["A", "B", "C"] {
        write_offline(&f, name).await;
    }
    drop(f.client);

    let second = OfflineClient::builder(
        Arc::new(f.store.clone()),
        Arc::new(ManualNetworkMonitor::new(false)),
        Arc::new(MockRemote::new()),
    )
    .build()
    .unwrap();
    f.store.fail_reads(true);
    assert_eq!(second.pending_count().await, 0);
    f.store.fail_reads(false);

    second
        .write(Mutation::insert("products", product("D")), accepted)
        .await
        .unwrap();
    assert_eq!(second.pending_count().await, 4);
    drop(second);

    let third = OfflineClient::builder(
        Arc::new(f.store.clone()),
        Arc::new(ManualNetworkMonitor::new(false)),
        Arc::new(MockRemote::new()),
    )
    .build()
    .unwrap();
    assert_eq!(third.pending_count().await, 4);
}

#[tokio::test]
async fn writes_during_read_fault_are_merged_once_readable() {
    let f = fixture(false, ClientConfig::default());
    write_offline(&f, "A").await;
    drop(f.client);

    let second = OfflineClient::builder(
        Arc::new(f.store.clone()),
        Arc::new(ManualNetworkMonitor::new(false)),
        Arc::new(MockRemote::new()),
    )
    .build()
    .unwrap();
    f.store.fail_reads(true);
    second
        .write(Mutation::insert("products", product("B")), accepted)
        .await
        .unwrap();
    assert_eq!(second.pending_count().await, 1);

    f.store.fail_reads(false);
    assert_eq!(second.pending_count().await, 2);
}
