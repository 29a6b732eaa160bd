//! Confirms the facade re-exports are wired to the same types underneath —
//! a service depending only on `relay` can still drive a full round trip.

use std::sync::Arc;
use std::time::Duration;

use relay::{Action, Broker, RelayClient, WorkerBuilder};
use relay_test::InMemoryBroker;
use serde_json::json;

#[tokio::test]
async fn facade_types_drive_a_pseudo_sync_round_trip() {
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    let client = RelayClient::new(broker.clone(), "relay", "test", "orchestrator");

    let worker = WorkerBuilder::new(broker, "relay", "test", "billing")
        .handler("billing.invoice.create", |_action: Action, _ctx| async move { Ok(Some(json!({"ok": true}))) })
        .build();
    let worker_task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    let action = Action::new("billing.invoice.create", json!({})).unwrap();
    let response = client.send_pseudo_sync(action, Duration::from_secs(2)).await;

    worker.stop(Duration::from_secs(1)).await;
    worker_task.await.unwrap();

    assert!(response.success);
}
