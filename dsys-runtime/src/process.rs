//! The actor-callback half of the runtime contract (spec §6.1): `receive(ctx, msg)` /
//! `on_timer(ctx, timer)` invoked by a driving [`Runtime`]. Used by the sharded KV
//! node, whose original Python solution is built on `dslib`'s `Process`/`Runtime`
//! rather than a plain polling loop.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use tokio::sync::mpsc;
use tokio::time::sleep_until;

use crate::address::Address;
use crate::error::Result;
use crate::message::Message;
use crate::transport::{Transport, UdpTransport};

/// A single-threaded, event-driven process. The runtime guarantees that `receive`
/// and `on_timer` never run concurrently with each other or with themselves.
pub trait Process: Send {
    fn receive(&mut self, ctx: &mut Context<'_>, msg: Message);
    fn on_timer(&mut self, ctx: &mut Context<'_>, timer: &str);
}

/// Handed to `Process` callbacks. Outbound sends are queued and flushed by the
/// runtime after the callback returns, so callbacks never block on I/O.
pub struct Context<'a> {
    addr: &'a Address,
    name: &'a str,
    out_tx: &'a mpsc::UnboundedSender<(Message, Address)>,
    local_out_tx: &'a mpsc::UnboundedSender<Message>,
    timers: &'a mut HashMap<String, Instant>,
}

impl<'a> Context<'a> {
    pub fn addr(&self) -> &Address {
        self.addr
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Best-effort send over the network; no delivery guarantee.
    pub fn send(&self, msg: Message, dest: Address) {
        let _ = self.out_tx.send((msg, dest));
    }

    /// Enqueues `msg` to the local user mailbox.
    pub fn send_local(&self, msg: Message) {
        let _ = self.local_out_tx.send(msg.local());
    }

    /// Schedules a one-shot callback. Re-arming an existing name overwrites its deadline.
    pub fn set_timer(&mut self, name: impl Into<String>, after: Duration) {
        self.timers.insert(name.into(), Instant::now() + after);
    }

    /// Idempotent: canceling a timer that isn't armed is a no-op.
    pub fn cancel_timer(&mut self, name: &str) {
        self.timers.remove(name);
    }
}

/// Drives a [`Process`] from network and local events, on a single task.
pub struct Runtime<P: Process> {
    process: P,
    addr: Address,
    name: String,
    transport: Arc<dyn Transport>,
    net_rx: mpsc::UnboundedReceiver<Message>,
    local_rx: mpsc::UnboundedReceiver<Message>,
    local_in_tx: mpsc::UnboundedSender<Message>,
    local_out_tx: mpsc::UnboundedSender<Message>,
    local_out_rx: Option<mpsc::UnboundedReceiver<Message>>,
    timers: HashMap<String, Instant>,
}

impl<P: Process> Runtime<P> {
    pub fn new(
        name: impl Into<String>,
        addr: Address,
        process: P,
        transport: Arc<dyn Transport>,
        net_rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        let (local_in_tx, local_rx) = mpsc::unbounded_channel();
        let (local_out_tx, local_out_rx) = mpsc::unbounded_channel();
        Self {
            process,
            addr,
            name: name.into(),
            transport,
            net_rx,
            local_rx,
            local_in_tx,
            local_out_tx,
            local_out_rx: Some(local_out_rx),
            timers: HashMap::new(),
        }
    }

    /// Binds a real UDP socket and wraps it in a `Runtime`. If `addr` requests an
    /// ephemeral port (`:0`), the process identity becomes the port the OS actually
    /// assigned.
    pub async fn bind_udp(name: impl Into<String>, addr: Address, process: P) -> Result<Self> {
        let (transport, local_addr, net_rx) = UdpTransport::bind(&addr).await?;
        Ok(Self::new(name, local_addr, process, Arc::new(transport), net_rx))
    }

    pub fn inbox_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.local_in_tx.clone()
    }

    pub fn take_outbox(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.local_out_rx
            .take()
            .expect("outbox already taken")
    }

    /// Runs the event loop until both the network and local channels are closed.
    pub async fn run(mut self) {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<(Message, Address)>();

        loop {
            let next_timer = self
                .timers
                .iter()
                .min_by_key(|(_, deadline)| **deadline)
                .map(|(name, deadline)| (name.clone(), *deadline));
            let check = next_timer.clone();
            let timer_sleep = async move {
                match next_timer {
                    Some((_, deadline)) => sleep_until(tokio::time::Instant::from_std(deadline)).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                Some((msg, dest)) = out_rx.recv() => {
                    if let Err(err) = self.transport.send(&msg, &dest).await {
                        warn!("{}: send to {dest} failed: {err}", self.name);
                    }
                }
                Some(mut msg) = self.net_rx.recv() => {
                    msg.local = false;
                    let mut ctx = Context {
                        addr: &self.addr,
                        name: &self.name,
                        out_tx: &out_tx,
                        local_out_tx: &self.local_out_tx,
                        timers: &mut self.timers,
                    };
                    self.process.receive(&mut ctx, msg);
                }
                Some(mut msg) = self.local_rx.recv() => {
                    msg.local = true;
                    let mut ctx = Context {
                        addr: &self.addr,
                        name: &self.name,
                        out_tx: &out_tx,
                        local_out_tx: &self.local_out_tx,
                        timers: &mut self.timers,
                    };
                    self.process.receive(&mut ctx, msg);
                }
                _ = timer_sleep => {
                    if let Some((name, deadline)) = check {
                        // A rearm/cancel inside the callback that fired this same
                        // iteration is impossible (single-threaded), but a previous
                        // iteration may have already consumed this exact timer.
                        if self.timers.get(&name) == Some(&deadline) {
                            self.timers.remove(&name);
                            let mut ctx = Context {
                                addr: &self.addr,
                                name: &self.name,
                                out_tx: &out_tx,
                                local_out_tx: &self.local_out_tx,
                                timers: &mut self.timers,
                            };
                            self.process.on_timer(&mut ctx, &name);
                        }
                    }
                }
                else => break,
            }
        }
    }
}
