use std::collections::VecDeque;
use std::time::Duration;

use dsys_runtime::{Address, Communicator, Message};
use log::debug;

use crate::DEFAULT_ECHO_TIMEOUT;

/// Drives the four `INFO-*` message types toward `recv_addr`.
///
/// `INFO-2`/`INFO-3`/`INFO-4` all retransmit until a matching echo comes back; while
/// waiting, further local commands are buffered rather than dropped, and are only
/// handed to the network once the current transfer completes. For `INFO-4` this
/// single-outstanding discipline is what preserves sender-issue order end to end.
pub struct Sender {
    comm: Communicator,
    recv_addr: Address,
    pending: VecDeque<Message>,
    echo_timeout: Duration,
}

impl Sender {
    pub fn new(comm: Communicator, recv_addr: Address) -> Self {
        Self {
            comm,
            recv_addr,
            pending: VecDeque::new(),
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
        }
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    pub async fn run(mut self) {
        loop {
            let msg = match self.pending.pop_front() {
                Some(msg) => msg,
                None => match self.comm.recv_local().await {
                    Some(msg) => msg,
                    None => return,
                },
            };

            match msg.msg_type.as_str() {
                "INFO-1" => {
                    // At-most-once: fire and forget, no retry.
                    self.comm.send(&msg, &self.recv_addr).await;
                }
                "INFO-2" | "INFO-3" | "INFO-4" => {
                    self.send_until_echoed(msg).await;
                }
                other => {
                    let err = Message::text("ERROR", format!("unknown command: {other}"), self.comm.addr().clone());
                    self.comm.send_local(err);
                }
            }
        }
    }

    /// Retransmits `msg` until an echo with the same (type, body) comes back, buffering
    /// any locally-originated messages seen in the meantime.
    async fn send_until_echoed(&mut self, msg: Message) {
        loop {
            self.comm.send(&msg, &self.recv_addr).await;
            match self.comm.recv(Some(self.echo_timeout)).await {
                None => {
                    debug!("{}: echo timeout, retransmitting {}", self.comm.name(), msg.msg_type);
                    continue;
                }
                Some(resp) if resp.is_local() => {
                    self.pending.push_back(resp);
                }
                Some(resp) => {
                    // A late echo for an earlier transfer is benign and discarded;
                    // only a matching (type, body) ends the retry loop.
                    if resp == msg {
                        return;
                    }
                }
            }
        }
    }
}
