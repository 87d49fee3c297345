use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dsys_guarantees::{Receiver, Sender};
use dsys_runtime::{Address, Communicator, FakeNetwork, LinkAction, Message};

const SENDER_ADDR: &str = "127.0.0.1:19701";
const RECEIVER_ADDR: &str = "127.0.0.1:19702";

/// S1: `INFO-1{a}, INFO-1{a}, INFO-1{b}` through a link that delivers every copy
/// once and triples up the second copy of "a". The receiver's local feed must be
/// exactly `[a, b]`.
#[tokio::test]
async fn info1_delivers_each_body_at_most_once() {
    let network = FakeNetwork::new();
    let sender_addr: Address = SENDER_ADDR.parse().unwrap();
    let receiver_addr: Address = RECEIVER_ADDR.parse().unwrap();

    let sender_net_rx = network.register(sender_addr.clone());
    let receiver_net_rx = network.register(receiver_addr.clone());

    let duplicate_next_a = Arc::new(AtomicBool::new(false));
    {
        let duplicate_next_a = duplicate_next_a.clone();
        network.set_filter(Arc::new(move |msg, _from, _to| {
            if msg.msg_type == "INFO-1" && msg.body_str() == Some("a") {
                if !duplicate_next_a.swap(true, Ordering::SeqCst) {
                    return LinkAction::Deliver;
                }
                return LinkAction::Duplicate(3);
            }
            LinkAction::Deliver
        }));
    }

    let sender_comm = Communicator::new(
        "sender",
        sender_addr.clone(),
        Arc::new(network.transport_for(sender_addr.clone())),
        sender_net_rx,
    );
    let inbox = sender_comm.inbox_sender();

    let mut receiver_comm = Communicator::new(
        "receiver",
        receiver_addr,
        Arc::new(network.transport_for(RECEIVER_ADDR.parse().unwrap())),
        receiver_net_rx,
    );
    let mut outbox = receiver_comm.take_outbox();

    tokio::spawn(Sender::new(sender_comm, RECEIVER_ADDR.parse().unwrap()).run());
    tokio::spawn(Receiver::new(receiver_comm).run());

    inbox
        .send(Message::text("INFO-1", "a", sender_addr.clone()).local())
        .unwrap();
    inbox
        .send(Message::text("INFO-1", "a", sender_addr.clone()).local())
        .unwrap();
    inbox
        .send(Message::text("INFO-1", "b", sender_addr).local())
        .unwrap();

    let mut delivered = Vec::new();
    for _ in 0..2 {
        let msg = tokio::time::timeout(Duration::from_secs(2), outbox.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("outbox closed");
        delivered.push(msg.body_str().unwrap().to_string());
    }
    // no third delivery should ever show up
    assert!(tokio::time::timeout(Duration::from_millis(200), outbox.recv())
        .await
        .is_err());

    assert_eq!(delivered, vec!["a".to_string(), "b".to_string()]);
}

/// S2: sender emits `INFO-4` locally as "1","2","3" while the link drops the first
/// transmission of "2". The receiver's local feed must be exactly `[1,2,3]` in order.
#[tokio::test]
async fn info4_preserves_sender_order_despite_one_drop() {
    let network = FakeNetwork::new();
    let sender_addr: Address = "127.0.0.1:19801".parse().unwrap();
    let receiver_addr: Address = "127.0.0.1:19802".parse().unwrap();

    let sender_net_rx = network.register(sender_addr.clone());
    let receiver_net_rx = network.register(receiver_addr.clone());

    let dropped_two_once = Arc::new(AtomicBool::new(false));
    {
        let dropped_two_once = dropped_two_once.clone();
        network.set_filter(Arc::new(move |msg, _from, _to| {
            if msg.msg_type == "INFO-4" && msg.body_str() == Some("2") {
                if !dropped_two_once.swap(true, Ordering::SeqCst) {
                    return LinkAction::Drop;
                }
            }
            LinkAction::Deliver
        }));
    }

    let sender_comm = Communicator::new(
        "sender",
        sender_addr.clone(),
        Arc::new(network.transport_for(sender_addr.clone())),
        sender_net_rx,
    );
    let inbox = sender_comm.inbox_sender();
    let sender = Sender::new(sender_comm, receiver_addr.clone())
        .with_echo_timeout(Duration::from_millis(50));

    let mut receiver_comm = Communicator::new(
        "receiver",
        receiver_addr,
        Arc::new(network.transport_for("127.0.0.1:19802".parse().unwrap())),
        receiver_net_rx,
    );
    let mut outbox = receiver_comm.take_outbox();

    tokio::spawn(sender.run());
    tokio::spawn(Receiver::new(receiver_comm).run());

    for body in ["1", "2", "3"] {
        inbox
            .send(Message::text("INFO-4", body, sender_addr.clone()).local())
            .unwrap();
    }

    let mut delivered = Vec::new();
    for _ in 0..3 {
        let msg = tokio::time::timeout(Duration::from_secs(2), outbox.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("outbox closed");
        delivered.push(msg.body_str().unwrap().to_string());
    }

    assert_eq!(
        delivered,
        vec!["1".to_string(), "2".to_string(), "3".to_string()]
    );
}
