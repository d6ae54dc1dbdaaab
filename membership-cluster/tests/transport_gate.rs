use async_trait::async_trait;
use parking_lot::Mutex;

use membership_core::address::UniqueAddress;
use membership_core::dead_letter::DeadLetter;
use membership_remote::transport::{Delivery, Transport};

use crate::common::{node, start_cluster};

mod common;

#[derive(Debug, Default)]
struct LoopbackTransport {
    delivered: Mutex<Vec<(UniqueAddress, String)>>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    type Message = String;

    async fn send(&self, to: &UniqueAddress, message: Self::Message) -> anyhow::Result<()> {
        self.delivered.lock().push((to.clone(), message));
        Ok(())
    }
}

#[tokio::test]
async fn quarantined_traffic_goes_to_dead_letters() -> anyhow::Result<()> {
    let (cluster, _) = start_cluster(|_| {})?;
    let a = node("10.0.0.1:2552", 42);
    let b = node("10.0.0.2:2552", 3);
    let mut dead = cluster.subscribe::<DeadLetter>();
    let gate = cluster.gate(LoopbackTransport::default());
    cluster.quarantine_node(&a, "test");
    assert_eq!(gate.send(&a, "hello".to_string()).await?, Delivery::DeadLettered);
    assert_eq!(gate.send(&b, "hello".to_string()).await?, Delivery::Sent);
    assert_eq!(gate.receive(&a, "hi".to_string()), None);
    assert_eq!(gate.receive(&b, "hi".to_string()), Some("hi".to_string()));
    assert_eq!(cluster.dead_letters().count(), 2);
    assert_eq!(dead.drain().len(), 2);
    assert_eq!(gate.transport().delivered.lock().len(), 1);
    cluster.shutdown().await;
    Ok(())
}
