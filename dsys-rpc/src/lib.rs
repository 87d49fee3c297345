//! Idempotent RPC between a client proxy and a KV store server (spec §4.3).

pub mod error;
pub mod proxy;
pub mod server;

pub use error::RpcError;
pub use proxy::{RpcClient, StoreProxy, DEFAULT_CALL_TIMEOUT};
pub use server::Server;
