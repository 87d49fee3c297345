use std::collections::{BinaryHeap, HashMap, HashSet};

use dsys_runtime::{Address, Communicator, Message};
use log::trace;
use serde_json::Value;

use crate::holdback::Entry;

/// One member of a fully-connected broadcast group (spec §4.2).
///
/// Delivery is both reliable (flood: forward every unseen body once to the rest of
/// the group) and per-author FIFO (hold-back queue keyed by `from`, draining in
/// sequence order).
pub struct Peer {
    comm: Communicator,
    name: String,
    peers: Vec<Address>,
    seq_no: u64,
    last_delivered: HashMap<String, u64>,
    hold_back: HashMap<String, BinaryHeap<Entry>>,
    seen: HashSet<Value>,
}

impl Peer {
    pub fn new(comm: Communicator, name: impl Into<String>, peers: Vec<Address>) -> Self {
        Self {
            comm,
            name: name.into(),
            peers,
            seq_no: 0,
            last_delivered: HashMap::new(),
            hold_back: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            let msg = match self.comm.recv(None).await {
                Some(msg) => msg,
                None => return,
            };

            if msg.is_local() && msg.msg_type == "SEND" {
                self.on_local_send(msg).await;
            } else if !msg.is_local() && msg.msg_type == "BCAST" {
                self.on_bcast(msg).await;
            } else if msg.is_local() {
                let err = Message::text(
                    "ERROR",
                    format!("unknown command: {}", msg.msg_type),
                    self.comm.addr().clone(),
                );
                self.comm.send_local(err);
            } else {
                let err = Message::text(
                    "ERROR",
                    format!("unknown message: {}", msg.msg_type),
                    self.comm.addr().clone(),
                );
                self.comm.send(&err, &msg.sender).await;
            }
        }
    }

    async fn on_local_send(&mut self, msg: Message) {
        self.seq_no += 1;
        let bcast = Message::new("BCAST", msg.body, self.comm.addr().clone())
            .with_header("from", self.name.clone())
            .with_header("seq_no", self.seq_no)
            .with_header("sender", self.name.clone());
        self.flood(&bcast).await;
    }

    async fn on_bcast(&mut self, msg: Message) {
        let from = header_str(&msg, "from");
        let forwarder = header_str(&msg, "sender");
        if self.seen.contains(&msg.body) || forwarder == self.name {
            return;
        }
        self.seen.insert(msg.body.clone());

        if from != self.name {
            let mut forwarded = msg.clone();
            forwarded
                .headers
                .insert("sender".to_string(), self.name.clone().into());
            self.flood(&forwarded).await;
        }

        let seq_no = header_u64(&msg, "seq_no");
        let expected = self.last_delivered.get(&from).copied().unwrap_or(0) + 1;
        match seq_no.cmp(&expected) {
            std::cmp::Ordering::Equal => {
                self.deliver(&from, msg.body);
                self.drain_hold_back(&from);
            }
            std::cmp::Ordering::Greater => {
                self.hold_back
                    .entry(from)
                    .or_default()
                    .push(Entry { seq_no, message: msg });
            }
            std::cmp::Ordering::Less => {
                trace!("{}: dropping already-delivered seq {seq_no} from {from}", self.name);
            }
        }
    }

    fn drain_hold_back(&mut self, from: &str) {
        loop {
            let next_expected = self.last_delivered.get(from).copied().unwrap_or(0) + 1;
            let ready = matches!(self.hold_back.get(from).and_then(|q| q.peek()), Some(e) if e.seq_no == next_expected);
            if !ready {
                return;
            }
            let entry = self.hold_back.get_mut(from).unwrap().pop().unwrap();
            self.deliver(from, entry.message.body);
        }
    }

    fn deliver(&mut self, from: &str, body: Value) {
        *self.last_delivered.entry(from.to_string()).or_insert(0) += 1;
        let text = body.as_str().map(str::to_string).unwrap_or_else(|| body.to_string());
        let deliver_msg = Message::text("DELIVER", format!("{from}: {text}"), self.comm.addr().clone());
        self.comm.send_local(deliver_msg);
    }

    async fn flood(&self, msg: &Message) {
        for peer in &self.peers {
            self.comm.send(msg, peer).await;
        }
    }
}

fn header_str(msg: &Message, key: &str) -> String {
    msg.headers
        .get(key)
        .and_then(|h| h.as_str())
        .unwrap_or_default()
        .to_string()
}

fn header_u64(msg: &Message, key: &str) -> u64 {
    msg.headers.get(key).and_then(|h| h.as_u64()).unwrap_or(0)
}
