//! Sharded KV store with gossip membership, failure detection and rendezvous
//! hashing for placement (spec §4.4).

pub mod hashing;
pub mod node;

pub use node::{Node, Tuning};
