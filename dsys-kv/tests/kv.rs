use std::sync::Arc;
use std::time::Duration;

use dsys_kv::{Node, Tuning};
use dsys_runtime::{Address, FakeNetwork, LinkAction, Message, Runtime};
use serde_json::Value;
use tokio::sync::mpsc;

/// Failure-detector intervals fast enough to exercise in a test without
/// changing the protocol itself (spec §4.4.4 fixes the guarantee, not the
/// interval lengths).
fn fast_tuning() -> Tuning {
    Tuning {
        check_live_interval: Duration::from_millis(60),
        probe_timeout: Duration::from_millis(60),
        check_dead_interval: Duration::from_millis(150),
        ack_delay: Duration::from_millis(20),
        fanout: 5,
    }
}

struct Handle {
    addr: Address,
    inbox: mpsc::UnboundedSender<Message>,
    outbox: mpsc::UnboundedReceiver<Message>,
}

fn spawn_node(network: &Arc<FakeNetwork>, name: &str, addr: Address, tuning: Tuning) -> Handle {
    let net_rx = network.register(addr.clone());
    let transport = Arc::new(network.transport_for(addr.clone()));
    let node = Node::with_tuning(name, tuning);
    let mut runtime = Runtime::new(name, addr.clone(), node, transport, net_rx);
    let inbox = runtime.inbox_sender();
    let outbox = runtime.take_outbox();
    tokio::spawn(runtime.run());
    Handle { addr, inbox, outbox }
}

fn send_local(h: &Handle, msg_type: &str, body: impl Into<String>) {
    h.inbox
        .send(Message::text(msg_type, body.into(), h.addr.clone()).local())
        .unwrap();
}

async fn next(h: &mut Handle) -> Message {
    tokio::time::timeout(Duration::from_secs(2), h.outbox.recv())
        .await
        .expect("timed out waiting for local reply")
        .expect("outbox closed")
}

async fn recv_type(h: &mut Handle, expect: &str) -> Message {
    loop {
        let msg = next(h).await;
        if msg.msg_type == expect {
            return msg;
        }
    }
}

async fn members_of(h: &mut Handle) -> Vec<String> {
    send_local(h, "GET_MEMBERS", "");
    let resp = recv_type(h, "MEMBERS").await;
    resp.body
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

/// Polls every handle's `GET_MEMBERS` until all report exactly `expected`
/// members (gossip convergence is probabilistic in *when*, not *whether*).
async fn wait_for_convergence(handles: &mut [Handle], expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut all_converged = true;
            for h in handles.iter_mut() {
                if members_of(h).await.len() != expected {
                    all_converged = false;
                }
            }
            if all_converged {
                return;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
    .await
    .expect("group never converged");
}

fn addr(port: u16) -> Address {
    format!("127.0.0.1:{port}").parse().unwrap()
}

/// S5: a 4-node group converges; `PUT` issued on node 0 routes (directly or
/// forwarded) to the rendezvous owner, and `GET` issued from a different node
/// returns the value. The owner then leaves cleanly (its data is drained to
/// its peers via `LEAVE`'s hand-off), and the value is still readable
/// afterward from a node that is neither the old owner nor the reader.
#[tokio::test]
async fn put_routes_to_owner_and_survives_a_clean_leave() {
    let network = FakeNetwork::new();
    let addrs = [addr(20101), addr(20102), addr(20103), addr(20104)];
    let tuning = fast_tuning();

    let mut handles: Vec<Handle> = addrs
        .iter()
        .enumerate()
        .map(|(i, a)| spawn_node(&network, &(i + 1).to_string(), a.clone(), tuning))
        .collect();

    send_local(&handles[0], "JOIN", addrs[0].to_string());
    for h in handles.iter().skip(1) {
        send_local(h, "JOIN", addrs[0].to_string());
    }
    wait_for_convergence(&mut handles, 4).await;

    send_local(&handles[0], "LOOKUP", "k1");
    let lookup = recv_type(&mut handles[0], "LOOKUP_RESP").await;
    let owner_name = lookup.body_str().unwrap().to_string();
    assert!(!owner_name.is_empty());
    let owner_idx = owner_name.parse::<usize>().unwrap() - 1;

    send_local(&handles[0], "PUT", "k1=v1");
    let _ = recv_type(&mut handles[0], "PUT_RESP").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reader_idx = (owner_idx + 1) % handles.len();
    send_local(&handles[reader_idx], "GET", "k1");
    let get_resp = recv_type(&mut handles[reader_idx], "GET_RESP").await;
    assert_eq!(get_resp.body, Value::String("v1".to_string()));

    send_local(&handles[owner_idx], "LEAVE", "");
    tokio::time::sleep(Duration::from_millis(200).max(tuning.ack_delay * 3)).await;

    let remaining_idx = (0..handles.len())
        .find(|&i| i != owner_idx && i != reader_idx)
        .unwrap();
    send_local(&handles[remaining_idx], "GET", "k1");
    let get_resp = recv_type(&mut handles[remaining_idx], "GET_RESP").await;
    assert_eq!(get_resp.body, Value::String("v1".to_string()));
}

/// S6 (failure detection half): once two nodes have joined into a group, all
/// traffic to one of them is cut. Within a handful of `checkLive`/`timeout`
/// cycles the other node places it in `failed` and `GET_MEMBERS` drops to a
/// single member.
#[tokio::test]
async fn silent_peer_is_moved_to_failed_after_missed_probes() {
    let network = FakeNetwork::new();
    let (a1, a2) = (addr(20201), addr(20202));
    let tuning = fast_tuning();

    let mut h1 = spawn_node(&network, "1", a1.clone(), tuning);
    let h2 = spawn_node(&network, "2", a2.clone(), tuning);

    send_local(&h1, "JOIN", a1.to_string());
    send_local(&h2, "JOIN", a1.to_string());
    wait_for_convergence(std::slice::from_mut(&mut h1), 2).await;

    // node 2 goes silent: every datagram addressed to or from it vanishes.
    let cut = a2.clone();
    network.set_filter(Arc::new(move |_msg, from, to| {
        if *from == cut || *to == cut {
            LinkAction::Drop
        } else {
            LinkAction::Deliver
        }
    }));
    drop(h2);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let members = members_of(&mut h1).await;
            if members.len() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
    .await
    .expect("node 2 was never marked failed");
}
