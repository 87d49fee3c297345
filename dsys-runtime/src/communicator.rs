//! The polling-style half of the runtime contract (spec §6.1): `while let Some(msg) =
//! comm.recv() { ... }`. Used by the delivery-guarantee pair and the RPC client proxy,
//! the protocols whose original Python solutions drive themselves with a plain loop
//! rather than callbacks.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::error::Result;
use crate::message::Message;
use crate::transport::{Transport, UdpTransport};

pub struct Communicator {
    name: String,
    addr: Address,
    transport: Arc<dyn Transport>,
    net_rx: mpsc::UnboundedReceiver<Message>,
    local_rx: mpsc::UnboundedReceiver<Message>,
    local_in_tx: mpsc::UnboundedSender<Message>,
    local_out_tx: mpsc::UnboundedSender<Message>,
    local_out_rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl Communicator {
    pub fn new(
        name: impl Into<String>,
        addr: Address,
        transport: Arc<dyn Transport>,
        net_rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        let (local_in_tx, local_rx) = mpsc::unbounded_channel();
        let (local_out_tx, local_out_rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            addr,
            transport,
            net_rx,
            local_rx,
            local_in_tx,
            local_out_tx,
            local_out_rx: Some(local_out_rx),
        }
    }

    /// Binds a real UDP socket and wraps it in a `Communicator`. If `addr` requests an
    /// ephemeral port (`:0`), the process identity becomes the port the OS actually
    /// assigned, so callers never have to re-read `addr()` after binding.
    pub async fn bind_udp(name: impl Into<String>, addr: Address) -> Result<Self> {
        let (transport, local_addr, net_rx) = UdpTransport::bind(&addr).await?;
        Ok(Self::new(name, local_addr, Arc::new(transport), net_rx))
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A sender external drivers (CLI front-ends, test harnesses) use to inject
    /// locally-originated commands, as if the local user had typed them.
    pub fn inbox_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.local_in_tx.clone()
    }

    /// Takes the channel of messages this process has delivered to its local user via
    /// [`Communicator::send_local`]. Can only be taken once.
    pub fn take_outbox(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.local_out_rx
            .take()
            .expect("outbox already taken")
    }

    /// Best-effort send over the network; no delivery guarantee.
    pub async fn send(&self, msg: &Message, dest: &Address) {
        if let Err(err) = self.transport.send(msg, dest).await {
            warn!("{}: send to {dest} failed: {err}", self.name);
        }
    }

    /// Enqueues `msg` to the local user mailbox. Never fails, never duplicates.
    pub fn send_local(&self, msg: Message) {
        let _ = self.local_out_tx.send(msg.local());
    }

    /// Blocks until a message arrives (network or local) or `timeout` elapses.
    pub async fn recv(&mut self, timeout: Option<Duration>) -> Option<Message> {
        let fut = self.recv_any();
        match timeout {
            Some(d) => tokio::time::timeout(d, fut).await.unwrap_or(None),
            None => fut.await,
        }
    }

    async fn recv_any(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            Some(mut msg) = self.net_rx.recv() => {
                msg.local = false;
                Some(msg)
            }
            Some(mut msg) = self.local_rx.recv() => {
                msg.local = true;
                Some(msg)
            }
            else => None,
        }
    }

    /// Blocks until a locally-originated message arrives, ignoring the network.
    pub async fn recv_local(&mut self) -> Option<Message> {
        self.local_rx.recv().await.map(|mut m| {
            m.local = true;
            m
        })
    }
}
