//! Sharded KV node: client command surface, node-to-node gossip/placement
//! protocol and failure detection (spec §4.4), grounded in
//! `original_source/kv-sharding/solution/node.py`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use dsys_runtime::{Address, Context, Message, Process};
use log::{debug, warn};
use rand::seq::SliceRandom;
use serde_json::Value;

use crate::hashing::target_node;

const CHECK_LIVE_INTERVAL: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const CHECK_DEAD_INTERVAL: Duration = Duration::from_secs(10);
const ACK_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_FANOUT: usize = 5;

/// Tuning knobs for the failure detector and gossip fanout (spec §4.4.4),
/// overridable via CLI flag or config file; defaults match the spec exactly.
#[derive(Clone, Copy, Debug)]
pub struct Tuning {
    pub check_live_interval: Duration,
    pub probe_timeout: Duration,
    pub check_dead_interval: Duration,
    pub ack_delay: Duration,
    pub fanout: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            check_live_interval: CHECK_LIVE_INTERVAL,
            probe_timeout: PROBE_TIMEOUT,
            check_dead_interval: CHECK_DEAD_INTERVAL,
            ack_delay: ACK_DELAY,
            fanout: DEFAULT_FANOUT,
        }
    }
}

/// One member of the sharded store. `group` maps every known node's address to
/// its name; `alive`/`failed` partition `group`'s keys (minus any node this
/// process has never heard of yet, which is in neither set).
pub struct Node {
    name: String,
    group: HashMap<Address, String>,
    alive: HashSet<Address>,
    failed: HashSet<Address>,
    k: usize,
    checking_node: Option<Address>,
    data: HashMap<String, String>,
    tuning: Tuning,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tuning(name, Tuning::default())
    }

    pub fn with_tuning(name: impl Into<String>, tuning: Tuning) -> Self {
        Self {
            name: name.into(),
            group: HashMap::new(),
            alive: HashSet::new(),
            failed: HashSet::new(),
            k: tuning.fanout,
            checking_node: None,
            data: HashMap::new(),
            tuning,
        }
    }

    fn target(&self, key: &str) -> Option<Address> {
        target_node(key, self.alive.iter()).cloned()
    }

    /// Up to `k = min(5, |group|)` random members of `alive`, the fanout every
    /// gossip in spec §4.4.3/§4.4.4 uses.
    fn gossip_targets(&self) -> Vec<Address> {
        let fanout = self.k.min(self.group.len());
        let pool: Vec<Address> = self.alive.iter().cloned().collect();
        pool.choose_multiple(&mut rand::thread_rng(), fanout)
            .cloned()
            .collect()
    }

    fn gossip(&self, ctx: &Context<'_>, msg_type: &str, body: Value) {
        let msg = Message::new(msg_type, body, ctx.addr().clone());
        for member in self.gossip_targets() {
            ctx.send(msg.clone(), member);
        }
    }

    fn receive_local(&mut self, ctx: &mut Context<'_>, msg: Message) {
        match msg.msg_type.as_str() {
            "JOIN" => {
                ctx.set_timer("checkLive", self.tuning.check_live_interval);
                ctx.set_timer("checkDead", self.tuning.check_dead_interval);
                let seed: Address = match msg.body_str().and_then(|s| s.parse().ok()) {
                    Some(addr) => addr,
                    None => return reply_error(ctx, "JOIN body is not an address"),
                };
                if &seed == ctx.addr() {
                    self.alive.clear();
                    self.alive.insert(ctx.addr().clone());
                    self.failed.clear();
                    self.group.clear();
                    self.group.insert(ctx.addr().clone(), self.name.clone());
                } else {
                    self.group.insert(ctx.addr().clone(), self.name.clone());
                    self.alive.insert(ctx.addr().clone());
                    ctx.send(Message::new("JOIN", group_to_value(&self.group), ctx.addr().clone()), seed);
                }
            }
            "LEAVE" => {
                self.alive.remove(ctx.addr());
                for (key, value) in self.data.clone() {
                    if let Some(target) = self.target(&key) {
                        ctx.send(
                            Message::new("PUT_IN_YOUR_DATA", kv_pair(&key, &value), ctx.addr().clone()),
                            target,
                        );
                    }
                }
                let leave_msg = Message::new("LEAVE", Value::String(ctx.addr().to_string()), ctx.addr().clone());
                for member in self.alive.iter().cloned().collect::<Vec<_>>() {
                    ctx.send(leave_msg.clone(), member);
                }
                self.data.clear();
                self.group.clear();
                self.alive.clear();
                self.failed.clear();
            }
            "GET_MEMBERS" => {
                let members: Vec<Value> = self.group.values().cloned().map(Value::String).collect();
                ctx.send_local(Message::new("MEMBERS", Value::Array(members), ctx.addr().clone()));
            }
            "GET" => {
                let key = msg.body_str().unwrap_or_default().to_string();
                if let Some(value) = self.data.get(&key) {
                    ctx.send_local(Message::text("GET_RESP", value.clone(), ctx.addr().clone()));
                } else if let Some(target) = self.target(&key) {
                    ctx.send(Message::text("GET", key, ctx.addr().clone()), target);
                } else {
                    ctx.send_local(Message::text("GET_RESP", "", ctx.addr().clone()));
                }
            }
            "PUT" => {
                let body = msg.body_str().unwrap_or_default();
                if let Some((key, value)) = body.split_once('=') {
                    match self.target(key) {
                        Some(target) if target == *ctx.addr() => {
                            self.data.insert(key.to_string(), value.to_string());
                        }
                        Some(target) => {
                            ctx.send(
                                Message::new("PUT_IN_YOUR_DATA", kv_pair(key, value), ctx.addr().clone()),
                                target,
                            );
                        }
                        None => {
                            // No alive members at all: nothing to place the key on, so
                            // keep it locally rather than dropping the write.
                            self.data.insert(key.to_string(), value.to_string());
                        }
                    }
                    ctx.set_timer("PUT_RESP", self.tuning.ack_delay);
                } else {
                    reply_error(ctx, "PUT body must be \"key=value\"");
                }
            }
            "DELETE" => {
                let key = msg.body_str().unwrap_or_default().to_string();
                if self.data.remove(&key).is_some() {
                    // already local
                } else if let Some(target) = self.target(&key) {
                    ctx.send(Message::text("DELETE", key, ctx.addr().clone()), target);
                }
                ctx.set_timer("DELETE_RESP", self.tuning.ack_delay);
            }
            "LOOKUP" => {
                let key = msg.body_str().unwrap_or_default();
                let owner = if self.data.contains_key(key) {
                    self.name.clone()
                } else {
                    self.target(key)
                        .and_then(|target| self.group.get(&target).cloned())
                        .unwrap_or_default()
                };
                ctx.send_local(Message::text("LOOKUP_RESP", owner, ctx.addr().clone()));
            }
            "COUNT_RECORDS" => {
                ctx.send_local(Message::new(
                    "COUNT_RECORDS_RESP",
                    Value::from(self.data.len()),
                    ctx.addr().clone(),
                ));
            }
            "DUMP_KEYS" => {
                let keys: Vec<Value> = self.data.keys().cloned().map(Value::String).collect();
                ctx.send_local(Message::new("DUMP_KEYS_RESP", Value::Array(keys), ctx.addr().clone()));
            }
            other => reply_error(ctx, &format!("unknown command: {other}")),
        }
    }

    fn receive_remote(&mut self, ctx: &mut Context<'_>, msg: Message) {
        match msg.msg_type.as_str() {
            "PUT_IN_YOUR_DATA" => {
                if let Some((key, value)) = pair_from_kv(&msg.body) {
                    self.data.insert(key, value);
                }
            }
            "GET" => {
                let key = msg.body_str().unwrap_or_default();
                let value = self.data.get(key).cloned().unwrap_or_default();
                ctx.send(Message::text("GIVE_YOU_DATA", value, ctx.addr().clone()), msg.sender);
            }
            "GIVE_YOU_DATA" => {
                let value = msg.body_str().unwrap_or_default().to_string();
                ctx.send_local(Message::text("GET_RESP", value, ctx.addr().clone()));
            }
            "DELETE" => {
                let key = msg.body_str().unwrap_or_default();
                self.data.remove(key);
            }
            "JOIN" => {
                let remote_group = value_to_group(&msg.body);
                if remote_group != self.group {
                    self.group.extend(remote_group.clone());
                    self.alive.extend(remote_group.keys().cloned());

                    for key in self.data.keys().cloned().collect::<Vec<_>>() {
                        if let Some(target) = self.target(&key) {
                            if target != *ctx.addr() {
                                let value = self.data.remove(&key).unwrap();
                                ctx.send(
                                    Message::new("PUT_IN_YOUR_DATA", kv_pair(&key, &value), ctx.addr().clone()),
                                    target,
                                );
                            }
                        }
                    }

                    for addr in remote_group.keys() {
                        self.failed.remove(addr);
                    }
                    self.gossip(ctx, "JOIN", group_to_value(&self.group));
                }
            }
            "LEAVE" => {
                let addr: Option<Address> = msg.body_str().and_then(|s| s.parse().ok());
                if let Some(addr) = addr {
                    if self.alive.contains(&addr) || self.failed.contains(&addr) {
                        self.group.remove(&addr);
                        self.alive.remove(&addr);
                        self.failed.remove(&addr);
                        for member in self.gossip_targets() {
                            ctx.send(msg.clone(), member);
                        }
                    }
                }
            }
            "ARE YOU OKAY?" => {
                let probe_addr: Option<Address> = msg.body_str().and_then(|s| s.parse().ok());
                if let Some(probe_addr) = probe_addr {
                    let reply = Message::new(
                        "I AM OKAY",
                        Value::Array(vec![
                            Value::String(ctx.addr().to_string()),
                            Value::String(self.name.clone()),
                        ]),
                        ctx.addr().clone(),
                    );
                    ctx.send(reply, probe_addr);
                }
                self.gossip(ctx, "JOIN", group_to_value(&self.group));
            }
            "I AM OKAY" => {
                if let Some(addr) = msg.body.as_array().and_then(|a| a.first()).and_then(Value::as_str) {
                    let matches_probe = self.checking_node.as_ref().map(|c| c.as_str() == addr).unwrap_or(false);
                    if matches_probe {
                        self.checking_node = None;
                        ctx.cancel_timer("timeout");
                        ctx.set_timer("checkLive", self.tuning.check_live_interval);
                    }
                }
            }
            "ARE YOU LIVE?" => {
                let probe_addr: Option<Address> = msg.body_str().and_then(|s| s.parse().ok());
                if let Some(probe_addr) = probe_addr {
                    ctx.send(
                        Message::new("I LIVE", group_to_value(&self.group), ctx.addr().clone()),
                        probe_addr,
                    );
                }
            }
            "I LIVE" => {
                let remote_group = value_to_group(&msg.body);
                self.group.extend(remote_group.clone());
                self.alive.extend(remote_group.keys().cloned());
                for addr in remote_group.keys() {
                    self.failed.remove(addr);
                }
                self.gossip(ctx, "JOIN", group_to_value(&self.group));
            }
            "HE IS DEAD" => {
                let addr: Option<Address> = msg.body_str().and_then(|s| s.parse().ok());
                if let Some(addr) = addr {
                    self.group.remove(&addr);
                    self.alive.remove(&addr);
                    self.failed.insert(addr);
                    self.gossip(ctx, "KILL HIM", addrs_to_value(self.failed.iter()));
                }
            }
            "KILL HIM" => {
                let received: HashSet<Address> = value_to_addrs(&msg.body).into_iter().collect();
                if self.failed != received {
                    let newcomers: HashSet<Address> = received.difference(&self.failed).cloned().collect();
                    if !newcomers.is_empty() {
                        for addr in &newcomers {
                            self.group.remove(addr);
                        }
                        self.alive.retain(|a| !newcomers.contains(a));
                        self.failed.extend(newcomers);
                    }
                    self.gossip(ctx, "KILL HIM", addrs_to_value(self.failed.iter()));
                }
            }
            other => {
                warn!("{}: unknown message {other} from {}", self.name, msg.sender);
                ctx.send(
                    Message::text("ERROR", format!("unknown message: {other}"), ctx.addr().clone()),
                    msg.sender.clone(),
                );
            }
        }
    }
}

impl Process for Node {
    fn receive(&mut self, ctx: &mut Context<'_>, msg: Message) {
        if msg.is_local() {
            self.receive_local(ctx, msg);
        } else {
            self.receive_remote(ctx, msg);
        }
    }

    fn on_timer(&mut self, ctx: &mut Context<'_>, timer: &str) {
        match timer {
            "checkLive" => {
                if let Some(target) = self.alive.iter().cloned().collect::<Vec<_>>().choose(&mut rand::thread_rng()).cloned() {
                    self.checking_node = Some(target.clone());
                    ctx.send(
                        Message::new("ARE YOU OKAY?", Value::String(ctx.addr().to_string()), ctx.addr().clone()),
                        target,
                    );
                    ctx.set_timer("timeout", self.tuning.probe_timeout);
                }
            }
            "timeout" => {
                if let Some(dead) = self.checking_node.take() {
                    self.failed.insert(dead.clone());
                    self.alive.remove(&dead);
                    self.group.remove(&dead);
                    self.gossip(ctx, "HE IS DEAD", Value::String(dead.to_string()));
                }
                ctx.set_timer("checkLive", self.tuning.check_live_interval);
            }
            "checkDead" => {
                if let Some(seed) = self.failed.iter().cloned().collect::<Vec<_>>().choose(&mut rand::thread_rng()).cloned() {
                    ctx.send(
                        Message::new("ARE YOU LIVE?", Value::String(ctx.addr().to_string()), ctx.addr().clone()),
                        seed,
                    );
                }
                ctx.set_timer("checkDead", self.tuning.check_dead_interval);
            }
            "PUT_RESP" => ctx.send_local(Message::empty("PUT_RESP", ctx.addr().clone())),
            "DELETE_RESP" => ctx.send_local(Message::empty("DELETE_RESP", ctx.addr().clone())),
            other => debug!("{}: unknown timer {other}", self.name),
        }
    }
}

fn reply_error(ctx: &Context<'_>, text: &str) {
    ctx.send_local(Message::text("ERROR", text, ctx.addr().clone()));
}

fn kv_pair(key: &str, value: &str) -> Value {
    Value::Array(vec![Value::String(key.to_string()), Value::String(value.to_string())])
}

fn pair_from_kv(body: &Value) -> Option<(String, String)> {
    let arr = body.as_array()?;
    let key = arr.first()?.as_str()?.to_string();
    let value = arr.get(1)?.as_str()?.to_string();
    Some((key, value))
}

fn group_to_value(group: &HashMap<Address, String>) -> Value {
    let map = group
        .iter()
        .map(|(addr, name)| (addr.to_string(), Value::String(name.clone())))
        .collect();
    Value::Object(map)
}

fn value_to_group(value: &Value) -> HashMap<Address, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(addr, name)| Some((addr.parse::<Address>().ok()?, name.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn addrs_to_value<'a>(addrs: impl Iterator<Item = &'a Address>) -> Value {
    Value::Array(addrs.map(|a| Value::String(a.to_string())).collect())
}

fn value_to_addrs(value: &Value) -> Vec<Address> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str()?.parse::<Address>().ok()).collect())
        .unwrap_or_default()
}
