use std::collections::HashSet;

use dsys_runtime::{Communicator, Message};

/// Receives the four `INFO-*` message types and delivers them to the local user
/// according to each guarantee (spec §4.1).
pub struct Receiver {
    comm: Communicator,
    delivered: HashSet<Message>,
}

impl Receiver {
    pub fn new(comm: Communicator) -> Self {
        Self {
            comm,
            delivered: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            let msg = match self.comm.recv(None).await {
                Some(msg) => msg,
                None => return,
            };

            match msg.msg_type.as_str() {
                "INFO-1" => {
                    // At-most-once: deliver the first time this body is seen, never again.
                    if self.delivered.insert(msg.clone()) {
                        self.comm.send_local(msg);
                    }
                }
                "INFO-2" => {
                    // At-least-once: always deliver, duplicates allowed, always echo.
                    self.comm.send_local(msg.clone());
                    self.comm.send(&msg, &msg.sender).await;
                }
                "INFO-3" | "INFO-4" => {
                    // Exactly-once (INFO-4 additionally end-to-end ordered by the sender's
                    // single-outstanding discipline): echo unconditionally, deliver once.
                    if self.delivered.insert(msg.clone()) {
                        self.comm.send_local(msg.clone());
                    }
                    self.comm.send(&msg, &msg.sender).await;
                }
                other => {
                    let err = Message::text(
                        "ERROR",
                        format!("unknown message type: {other}"),
                        self.comm.addr().clone(),
                    );
                    self.comm.send(&err, &msg.sender).await;
                }
            }
        }
    }
}
