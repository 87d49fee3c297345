//! In-memory RPC store server (spec §4.3: "logical, not fully present in the
//! source"). Deduplicates idempotent operations by (client address, request
//! content); `append` is applied unconditionally since the client's no-retry
//! policy is what keeps it correct (spec §4.3, §4.4.6).

use std::collections::HashMap;

use dsys_runtime::{Address, Communicator, Message};
use log::debug;
use serde_json::Value;

use crate::error::RpcError;

pub struct Server {
    comm: Communicator,
    store: HashMap<String, Value>,
    /// Keyed by (client address, canonical JSON of the request body); `Value`
    /// itself isn't `Hash`, so the request content is keyed by its serialized form.
    dedup: HashMap<(Address, String), Value>,
}

impl Server {
    pub fn new(comm: Communicator) -> Self {
        Self {
            comm,
            store: HashMap::new(),
            dedup: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            let msg = match self.comm.recv(None).await {
                Some(msg) => msg,
                None => return,
            };
            if msg.is_local() || msg.msg_type != "REQUEST" {
                continue;
            }
            let reply = self.handle(&msg);
            debug!("{} -> {}: {:?}", msg.sender, self.comm.addr(), reply.msg_type);
            self.comm.send(&reply, &msg.sender).await;
        }
    }

    fn handle(&mut self, msg: &Message) -> Message {
        match self.dispatch(msg) {
            Ok(body) => Message::new("RESULT", body, self.comm.addr().clone()),
            Err(err) => Message::text("ERROR", err.to_string(), self.comm.addr().clone()),
        }
    }

    fn dispatch(&mut self, msg: &Message) -> Result<Value, RpcError> {
        let packet = msg
            .body
            .as_array()
            .ok_or_else(|| RpcError::Malformed("request body is not an array".into()))?;
        let func = packet
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Malformed("missing function name".into()))?
            .to_string();

        // append is non-idempotent by design: the client never retries it, so the
        // server never needs to (and must not) dedupe it.
        if func == "append" {
            return self.apply(&func, packet);
        }

        let dedup_key = (msg.sender.clone(), msg.body.to_string());
        if let Some(cached) = self.dedup.get(&dedup_key) {
            return Ok(cached.clone());
        }
        let result = self.apply(&func, packet)?;
        self.dedup.insert(dedup_key, result.clone());
        Ok(result)
    }

    fn apply(&mut self, func: &str, packet: &[Value]) -> Result<Value, RpcError> {
        match func {
            "get" => {
                let key = arg_str(packet, 1)?;
                Ok(self
                    .store
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())))
            }
            "put" => {
                let key = arg_str(packet, 1)?;
                let value = packet.get(2).cloned().unwrap_or(Value::Null);
                let overwrite = packet.get(3).and_then(Value::as_bool).unwrap_or(true);
                let written = overwrite || !self.store.contains_key(&key);
                if written {
                    self.store.insert(key, value);
                }
                Ok(Value::Bool(written))
            }
            "append" => {
                let key = arg_str(packet, 1)?;
                let value = packet.get(2).cloned().unwrap_or(Value::Null);
                let entry = self
                    .store
                    .entry(key)
                    .or_insert_with(|| Value::String(String::new()));
                let combined = match (entry.as_str(), value.as_str()) {
                    (Some(existing), Some(addition)) => Value::String(format!("{existing}{addition}")),
                    _ => value,
                };
                *entry = combined.clone();
                Ok(combined)
            }
            "remove" => {
                let key = arg_str(packet, 1)?;
                Ok(Value::Bool(self.store.remove(&key).is_some()))
            }
            other => Err(RpcError::Malformed(format!("unknown function: {other}"))),
        }
    }
}

fn arg_str(packet: &[Value], idx: usize) -> Result<String, RpcError> {
    packet
        .get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RpcError::Malformed(format!("argument {idx} is not a string")))
}
