//! End-to-end scenarios from spec.md §8, driven against the `AddressTable`
//! and the bus message parser directly (a live NATS server is not
//! available in this test environment, so these exercise the same code
//! path a real `service-discovery.register` message would hit once
//! decoded).

use service_discovery::bus::{parse_register, parse_unregister};
use service_discovery::table::AddressTable;
use tokio::time::Duration;

async fn apply_register(table: &AddressTable, payload: &[u8]) {
    let msg = parse_register(payload).expect("well-formed register message");
    table.add(&msg.uris, &msg.host).await;
}

async fn apply_unregister(table: &AddressTable, payload: &[u8]) {
    let msg = parse_unregister(payload).expect("well-formed unregister message");
    table.remove(&msg.uris, &msg.host).await;
}

#[tokio::test]
async fn scenario_single_register_then_lookup() {
    let table = AddressTable::new(Duration::from_secs(120), Duration::from_secs(30), Duration::from_secs(60));
    table.set_warm();

    apply_register(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;

    assert_eq!(table.lookup("foo.com.").await, vec!["192.168.0.1"]);
    table.shutdown().await;
}

#[tokio::test]
async fn scenario_two_ips_preserve_order_in_routes_snapshot() {
    let table = AddressTable::new(Duration::from_secs(120), Duration::from_secs(30), Duration::from_secs(60));

    apply_register(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;
    apply_register(&table, br#"{"host":"192.168.0.2","uris":["foo.com"]}"#).await;

    let snapshot = table.get_all_addresses().await;
    assert_eq!(
        snapshot.get("foo.com."),
        Some(&vec!["192.168.0.1".to_string(), "192.168.0.2".to_string()])
    );
    table.shutdown().await;
}

#[tokio::test]
async fn scenario_unregister_removes_single_ip() {
    let table = AddressTable::new(Duration::from_secs(120), Duration::from_secs(30), Duration::from_secs(60));

    apply_register(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;
    apply_register(&table, br#"{"host":"192.168.0.2","uris":["foo.com"]}"#).await;
    apply_unregister(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;

    assert_eq!(table.lookup("foo.com.").await, vec!["192.168.0.2"]);
    table.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scenario_staleness_pruning() {
    let table = AddressTable::new(Duration::from_secs(30), Duration::from_secs(5), Duration::from_secs(0));

    apply_register(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;

    tokio::time::advance(Duration::from_secs(40)).await;
    tokio::task::yield_now().await;

    assert!(table.lookup("foo.com.").await.is_empty());
    table.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scenario_pause_on_disconnect_then_resume() {
    let table = AddressTable::new(Duration::from_secs(30), Duration::from_secs(5), Duration::from_secs(20));

    apply_register(&table, br#"{"host":"192.168.0.1","uris":["foo.com"]}"#).await;

    // Bus goes down: pruning pauses.
    table.pause_pruning();
    tokio::time::advance(Duration::from_secs(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(table.lookup("foo.com.").await, vec!["192.168.0.1"]);

    // Bus comes back: grace period, then staleness threshold, then gone.
    table.resume_pruning().await;
    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert_eq!(table.lookup("foo.com.").await, vec!["192.168.0.1"]);

    tokio::time::advance(Duration::from_secs(40)).await;
    tokio::task::yield_now().await;
    assert!(table.lookup("foo.com.").await.is_empty());
    table.shutdown().await;
}

#[tokio::test]
async fn scenario_malformed_messages_never_panic_and_are_dropped() {
    let table = AddressTable::new(Duration::from_secs(120), Duration::from_secs(30), Duration::from_secs(60));

    assert!(parse_register(b"not json at all").is_err());
    assert!(parse_register(br#"{"host":"","uris":["foo.com"]}"#).is_err());
    assert!(parse_register(br#"{"host":"1.2.3.4","uris":[]}"#).is_err());

    assert!(table.lookup("foo.com.").await.is_empty());
    table.shutdown().await;
}
