use std::sync::Arc;
use std::time::Duration;

use dsys_broadcast::Peer;
use dsys_runtime::{Address, Communicator, FakeNetwork, LinkAction, Message, Transport};

fn addrs() -> (Address, Address, Address) {
    (
        "127.0.0.1:19901".parse().unwrap(),
        "127.0.0.1:19902".parse().unwrap(),
        "127.0.0.1:19903".parse().unwrap(),
    )
}

fn make_comm(
    network: &Arc<FakeNetwork>,
    name: &str,
    addr: Address,
) -> Communicator {
    let net_rx = network.register(addr.clone());
    Communicator::new(name, addr.clone(), Arc::new(network.transport_for(addr)), net_rx)
}

/// S3: p1 sends "x" then "y"; the direct link p1->p3 drops both. p3 still delivers
/// exactly `[p1: x, p1: y]` thanks to p2 forwarding what it received from p1.
#[tokio::test]
async fn flood_reaches_peer_around_a_broken_direct_link() {
    let network = FakeNetwork::new();
    let (p1_addr, p2_addr, p3_addr) = addrs();

    {
        let (p1, p3) = (p1_addr.clone(), p3_addr.clone());
        network.set_filter(Arc::new(move |_msg, from, to| {
            if *from == p1 && *to == p3 {
                LinkAction::Drop
            } else {
                LinkAction::Deliver
            }
        }));
    }

    let comm1 = make_comm(&network, "p1", p1_addr.clone());
    let comm2 = make_comm(&network, "p2", p2_addr.clone());
    let mut comm3 = make_comm(&network, "p3", p3_addr.clone());

    let inbox1 = comm1.inbox_sender();
    let mut outbox3 = comm3.take_outbox();

    let peers = vec![p1_addr.clone(), p2_addr.clone(), p3_addr.clone()];
    tokio::spawn(Peer::new(comm1, "p1", peers.clone().into_iter().filter(|a| a != &p1_addr).collect()).run());
    tokio::spawn(Peer::new(comm2, "p2", peers.clone().into_iter().filter(|a| a != &p2_addr).collect()).run());
    tokio::spawn(Peer::new(comm3, "p3", peers.into_iter().filter(|a| a != &p3_addr).collect()).run());

    inbox1.send(Message::text("SEND", "x", p1_addr.clone()).local()).unwrap();
    inbox1.send(Message::text("SEND", "y", p1_addr).local()).unwrap();

    let mut delivered = Vec::new();
    for _ in 0..2 {
        let msg = tokio::time::timeout(Duration::from_secs(2), outbox3.recv())
            .await
            .expect("timed out")
            .expect("outbox closed");
        delivered.push(msg.body_str().unwrap().to_string());
    }
    assert_eq!(delivered, vec!["p1: x".to_string(), "p1: y".to_string()]);
}

/// S4: p2 receives z, x, y from p1 in that wall-clock order; p2's local feed is
/// still `[p1: x, p1: y, p1: z]` because the hold-back queue reorders by seq_no.
#[tokio::test]
async fn holdback_queue_reorders_out_of_order_arrivals() {
    let network = FakeNetwork::new();
    let (p1_addr, p2_addr, p3_addr) = addrs();

    let mut comm2 = make_comm(&network, "p2", p2_addr.clone());
    let mut outbox2 = comm2.take_outbox();
    tokio::spawn(Peer::new(comm2, "p2", vec![p1_addr.clone(), p3_addr.clone()]).run());

    let injector = network.transport_for(p1_addr.clone());
    let bcast = |seq_no: u64, body: &str| {
        Message::new("BCAST", serde_json::Value::String(body.to_string()), p1_addr.clone())
            .with_header("from", "p1")
            .with_header("seq_no", seq_no)
            .with_header("sender", "p1")
    };

    for (seq, body) in [(3u64, "z"), (1, "x"), (2, "y")] {
        injector.send(&bcast(seq, body), &p2_addr).await.unwrap();
    }

    let mut delivered = Vec::new();
    for _ in 0..3 {
        let msg = tokio::time::timeout(Duration::from_secs(2), outbox2.recv())
            .await
            .expect("timed out")
            .expect("outbox closed");
        delivered.push(msg.body_str().unwrap().to_string());
    }
    assert_eq!(
        delivered,
        vec!["p1: x".to_string(), "p1: y".to_string(), "p1: z".to_string()]
    );
}
