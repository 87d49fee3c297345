//! The unreliable link the core protocols run over (spec §6.1, §5).
//!
//! `UdpTransport` is the real thing: a UDP socket, no delivery guarantee, possible
//! loss/duplication/reordering courtesy of the network. `FakeTransport` is an
//! in-process stand-in with a scriptable link filter, used by the protocol crates'
//! own tests to exercise loss/duplication/reordering deterministically (spec §8).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::error::Result;
use crate::message::Message;

const MAX_DATAGRAM: usize = 64 * 1024;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Best-effort, fire-and-forget send; no delivery guarantee (spec §6.1).
    async fn send(&self, msg: &Message, dest: &Address) -> Result<()>;
}

/// A UDP-backed transport. Binds one socket per process and spawns a background
/// task that decodes inbound datagrams onto an unbounded channel.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Binds `addr` and returns the transport, the socket's actual local address (with
    /// `:0` resolved to the ephemeral port the OS picked), and the channel of decoded
    /// inbound messages.
    pub async fn bind(addr: &Address) -> Result<(Self, Address, mpsc::UnboundedReceiver<Message>)> {
        let socket = Arc::new(UdpSocket::bind(addr.as_str()).await?);
        let local_addr = Address::new(socket.local_addr()?.to_string())
            .expect("socket local_addr is always a valid host:port");
        let (tx, rx) = mpsc::unbounded_channel();

        let recv_socket = socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, _from)) => match serde_json::from_slice::<Message>(&buf[..len]) {
                        Ok(mut msg) => {
                            msg.local = false;
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!("dropping malformed datagram: {err}"),
                    },
                    Err(err) => {
                        warn!("udp recv error: {err}");
                        break;
                    }
                }
            }
        });

        Ok((Self { socket }, local_addr, rx))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, msg: &Message, dest: &Address) -> Result<()> {
        let bytes = serde_json::to_vec(msg)?;
        self.socket.send_to(&bytes, dest.as_str()).await?;
        Ok(())
    }
}

/// What a fake link does with one send attempt.
#[derive(Clone)]
pub enum LinkAction {
    Deliver,
    Drop,
    /// Deliver `n` copies (n == 0 behaves like `Drop`).
    Duplicate(usize),
}

pub type LinkFilter = Arc<dyn Fn(&Message, &Address, &Address) -> LinkAction + Send + Sync>;

/// An in-process network shared by every [`FakeTransport`] created from it. Tests
/// install a [`LinkFilter`] to script loss, duplication and reordering between
/// specific peers.
pub struct FakeNetwork {
    inboxes: Mutex<HashMap<Address, mpsc::UnboundedSender<Message>>>,
    filter: Mutex<LinkFilter>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: Mutex::new(HashMap::new()),
            filter: Mutex::new(Arc::new(|_, _, _| LinkAction::Deliver)),
        })
    }

    /// Registers `addr` as a reachable endpoint and returns its inbound channel.
    pub fn register(self: &Arc<Self>, addr: Address) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().unwrap().insert(addr, tx);
        rx
    }

    pub fn set_filter(&self, filter: LinkFilter) {
        *self.filter.lock().unwrap() = filter;
    }

    pub fn transport_for(self: &Arc<Self>, addr: Address) -> FakeTransport {
        FakeTransport {
            network: self.clone(),
            from: addr,
        }
    }

    fn deliver(&self, dest: &Address, msg: Message) {
        let inboxes = self.inboxes.lock().unwrap();
        match inboxes.get(dest) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!("fake network: inbox for {dest} is closed");
                }
            }
            None => debug!("fake network: no such address {dest}"),
        }
    }
}

pub struct FakeTransport {
    network: Arc<FakeNetwork>,
    from: Address,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, msg: &Message, dest: &Address) -> Result<()> {
        let action = (self.network.filter.lock().unwrap())(msg, &self.from, dest);
        match action {
            LinkAction::Deliver => self.network.deliver(dest, msg.clone()),
            LinkAction::Drop => {}
            LinkAction::Duplicate(n) => {
                for _ in 0..n {
                    self.network.deliver(dest, msg.clone());
                }
            }
        }
        Ok(())
    }
}
