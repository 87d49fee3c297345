//! Client-side RPC proxy (spec §4.3), grounded in
//! `original_source/rpc/solution/client.py`'s `StoreProxy`/`RpcClient`.

use std::collections::VecDeque;
use std::time::Duration;

use dsys_runtime::{Address, Communicator, Message};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::RpcError;

/// Default time to wait for a reply before retrying an idempotent call, or
/// before giving up on a non-idempotent `append` (spec §4.3).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Client-side RPC transport: sends `REQUEST`s and waits for `RESULT`/`ERROR`
/// replies, buffering any locally-originated command that arrives while a call is
/// outstanding so the caller still sees a synchronous call/return contract.
pub struct RpcClient {
    comm: Communicator,
    server_addr: Address,
    pending_local: VecDeque<Message>,
    call_timeout: Duration,
}

impl RpcClient {
    pub fn new(comm: Communicator, server_addr: Address) -> Self {
        Self {
            comm,
            server_addr,
            pending_local: VecDeque::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &Address {
        self.comm.addr()
    }

    pub fn inbox_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.comm.inbox_sender()
    }

    pub fn take_outbox(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.comm.take_outbox()
    }

    pub fn send_local(&self, msg: Message) {
        self.comm.send_local(msg);
    }

    /// Returns the next locally-originated command, preferring anything buffered
    /// while a previous call was outstanding.
    pub async fn next_local_command(&mut self) -> Option<Message> {
        if let Some(msg) = self.pending_local.pop_front() {
            return Some(msg);
        }
        self.comm.recv_local().await
    }

    /// Invokes `func` with `args` on the server, honoring spec §4.3's retry policy:
    /// `append` is sent once with a 1s timeout and never retried; every other
    /// operation is retransmitted until a non-timeout reply arrives.
    pub async fn call(&mut self, func: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let mut packet = vec![json!(func)];
        packet.extend(args);
        let msg = Message::new("REQUEST", Value::Array(packet), self.addr().clone());

        if func == "append" {
            self.comm.send(&msg, &self.server_addr).await;
            match self.recv_reply(self.call_timeout).await {
                None => Err(RpcError::Timeout),
                Some(resp) if resp.msg_type == "ERROR" => Err(RpcError::Remote(
                    resp.body_str().unwrap_or_default().to_string(),
                )),
                Some(resp) => Ok(resp.body),
            }
        } else {
            loop {
                self.comm.send(&msg, &self.server_addr).await;
                match self.recv_reply(self.call_timeout).await {
                    None => continue,
                    Some(resp) if resp.msg_type == "ERROR" => {
                        return Err(RpcError::Remote(
                            resp.body_str().unwrap_or_default().to_string(),
                        ));
                    }
                    Some(resp) => return Ok(resp.body),
                }
            }
        }
    }

    /// Waits up to `budget` for a network reply, buffering (not discarding) any
    /// locally-originated message observed in the meantime.
    async fn recv_reply(&mut self, budget: Duration) -> Option<Message> {
        let deadline = Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.comm.recv(Some(remaining)).await {
                None => return None,
                Some(msg) if msg.is_local() => self.pending_local.push_back(msg),
                Some(msg) => return Some(msg),
            }
        }
    }
}

/// Client-side proxy for the four store operations (spec §4.3).
pub struct StoreProxy {
    client: RpcClient,
}

impl StoreProxy {
    pub fn new(comm: Communicator, server_addr: Address) -> Self {
        Self {
            client: RpcClient::new(comm, server_addr),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_call_timeout(timeout);
        self
    }

    pub fn inbox_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.client.inbox_sender()
    }

    pub fn take_outbox(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.client.take_outbox()
    }

    pub fn send_local(&self, msg: Message) {
        self.client.send_local(msg);
    }

    pub async fn next_local_command(&mut self) -> Option<Message> {
        self.client.next_local_command().await
    }

    pub async fn get(&mut self, key: impl Into<String>) -> Result<Value, RpcError> {
        self.client.call("get", vec![json!(key.into())]).await
    }

    pub async fn put(
        &mut self,
        key: impl Into<String>,
        value: Value,
        overwrite: bool,
    ) -> Result<Value, RpcError> {
        self.client
            .call("put", vec![json!(key.into()), value, json!(overwrite)])
            .await
    }

    pub async fn append(&mut self, key: impl Into<String>, value: Value) -> Result<Value, RpcError> {
        self.client.call("append", vec![json!(key.into()), value]).await
    }

    pub async fn remove(&mut self, key: impl Into<String>) -> Result<Value, RpcError> {
        self.client.call("remove", vec![json!(key.into())]).await
    }
}
