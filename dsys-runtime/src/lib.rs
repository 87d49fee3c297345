//! Shared messaging runtime for the `dsys-*` protocol crates (spec §6.1).
//!
//! This is the "external collaborator" the core protocols are specified against:
//! message/address types, an unreliable transport (real UDP or an in-process fake
//! for tests), and the two execution styles the original solutions mix — a plain
//! polling loop (`Communicator`) and actor callbacks driven by a [`process::Runtime`].

pub mod address;
pub mod communicator;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod process;
pub mod transport;

pub use address::Address;
pub use communicator::Communicator;
pub use error::{Result, RuntimeError};
pub use message::{HeaderValue, Message};
pub use process::{Context, Process, Runtime};
pub use transport::{FakeNetwork, FakeTransport, LinkAction, LinkFilter, Transport, UdpTransport};
