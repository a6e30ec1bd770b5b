//! End-to-end flow over the in-process backend: register a table, start
//! the daemon, fire simulated row changes, and observe them on the bus.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tabletap::{MemoryBackend, RegistrationManager, RouteDaemon, TapConfig};

fn config() -> TapConfig {
    let mut values = HashMap::new();
    values.insert("BROKER_URI".to_string(), "broker:9092".to_string());
    values.insert("REGISTRY_LIBRARY".to_string(), "TABLETAP".to_string());
    TapConfig::from_values(values)
}

#[tokio::test]
async fn captured_changes_reach_the_bus() {
    let backend = MemoryBackend::new();
    backend.install_table("SALES", "SALES", "ORDERS", "ORDERS", &["ID", "TOTAL"]);

    let manager = RegistrationManager::new(
        "TABLETAP",
        backend.catalog(),
        backend.ddl(),
        backend.admin(),
    );
    let table = manager.resolve("SALES", "ORDERS").await.unwrap().unwrap();
    let registration = manager.create(&table).await.unwrap();

    let daemon = RouteDaemon::new(config(), backend.catalog(), backend.opener(), backend.bus());
    assert_eq!(daemon.start().await.unwrap(), 1);

    let events = [
        r#"{"table":"SALES.ORDERS","operation":"INSERT","row":{"ID":1,"TOTAL":9}}"#,
        r#"{"table":"SALES.ORDERS","operation":"UPDATE","row":{"ID":1,"TOTAL":12}}"#,
        r#"{"table":"SALES.ORDERS","operation":"DELETE","row":{"ID":1,"TOTAL":12}}"#,
    ];
    for event in events {
        backend.push_event("TABLETAP", &registration.id, Bytes::from(event));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while backend.published().len() < events.len() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "events were not forwarded in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let published = backend.published();
    for (expected, (topic, payload)) in events.iter().zip(published.iter()) {
        assert_eq!(topic, &registration.id);
        assert_eq!(payload, expected);
        // Payloads stay valid JSON end to end.
        serde_json::from_str::<serde_json::Value>(payload).unwrap();
    }

    daemon.shutdown();
    daemon.join().await.unwrap();

    // Removing the registration tears down all three backing objects.
    manager.delete(&table).await.unwrap().unwrap();
    assert!(manager.list().await.unwrap().is_empty());
}
